// ============================================================
// Layer 3 — Vocabulary
// ============================================================
// Bidirectional token ↔ id mapping. Ids are dense (0..len),
// unique, and fixed for the lifetime of a run. Every configured
// language owns exactly one reserved tag token, and the six
// sentinels (PAD, BOS, EOS, UNK, MASK, <length>) are resolved
// once so the rest of the system only ever sees ids.

use std::collections::{BTreeMap, HashMap};

use crate::config::SpecialTokenConfig;
use crate::error::{NatError, NatResult};

/// Ids of the reserved sentinel tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad:    u32,
    pub bos:    u32,
    pub eos:    u32,
    pub unk:    u32,
    pub mask:   u32,
    pub length: u32,
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    id_to_token:   Vec<String>,
    token_to_id:   HashMap<String, u32>,
    specials:      SpecialTokens,
    /// language code → tag id
    language_tags: BTreeMap<String, u32>,
}

impl Vocabulary {
    /// Build from a token → id map (e.g. `Tokenizer::get_vocab(true)`).
    ///
    /// Fails with `NatError::Config` if ids are not dense and unique,
    /// or if a sentinel or language tag is missing.
    pub fn from_id_map(
        map:       HashMap<String, u32>,
        specials:  &SpecialTokenConfig,
        languages: &BTreeMap<String, String>,
    ) -> NatResult<Self> {
        let mut id_to_token: Vec<Option<String>> = vec![None; map.len()];
        for (token, &id) in &map {
            let slot = id_to_token.get_mut(id as usize).ok_or_else(|| {
                NatError::Config(format!(
                    "vocabulary ids are not dense: '{token}' has id {id} but size is {}",
                    map.len()
                ))
            })?;
            if let Some(existing) = slot {
                return Err(NatError::Config(format!(
                    "vocabulary id {id} assigned to both '{existing}' and '{token}'"
                )));
            }
            *slot = Some(token.clone());
        }
        // len(map) slots filled by len(map) distinct ids → no holes remain
        let id_to_token: Vec<String> = id_to_token.into_iter().flatten().collect();

        let lookup = |surface: &str| -> NatResult<u32> {
            map.get(surface).copied().ok_or_else(|| {
                NatError::Config(format!("token '{surface}' is missing from the vocabulary"))
            })
        };

        let specials = SpecialTokens {
            pad:    lookup(&specials.pad)?,
            bos:    lookup(&specials.bos)?,
            eos:    lookup(&specials.eos)?,
            unk:    lookup(&specials.unk)?,
            mask:   lookup(&specials.mask)?,
            length: lookup(&specials.length)?,
        };

        let mut language_tags = BTreeMap::new();
        for (code, tag) in languages {
            language_tags.insert(code.clone(), lookup(tag)?);
        }

        Ok(Self { id_to_token, token_to_id: map, specials, language_tags })
    }

    /// Build from an ordered token list where the index is the id.
    pub fn from_tokens<S: AsRef<str>>(
        tokens:    &[S],
        specials:  &SpecialTokenConfig,
        languages: &BTreeMap<String, String>,
    ) -> NatResult<Self> {
        let mut map = HashMap::with_capacity(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            if map.insert(token.as_ref().to_string(), id as u32).is_some() {
                return Err(NatError::Config(format!(
                    "duplicate token '{}' in vocabulary",
                    token.as_ref()
                )));
            }
        }
        Self::from_id_map(map, specials, languages)
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    pub fn specials(&self) -> SpecialTokens {
        self.specials
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// Tag id for a language code. The adapter must not guess,
    /// so an unknown code is a hard error.
    pub fn tag_for(&self, language: &str) -> NatResult<u32> {
        self.language_tags
            .get(language)
            .copied()
            .ok_or_else(|| NatError::UnknownLanguage { language: language.to_string() })
    }

    pub fn is_language_tag(&self, id: u32) -> bool {
        self.language_tags.values().any(|&t| t == id)
    }

    /// True for sentinels and language tags.
    pub fn is_reserved(&self, id: u32) -> bool {
        let s = self.specials;
        [s.pad, s.bos, s.eos, s.unk, s.mask, s.length].contains(&id) || self.is_language_tag(id)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Small vocabulary used across the crate's tests:
    /// 0..=5 sentinels, 6 en_XX, 7 de_DE, then words.
    pub(crate) fn sample_vocabulary() -> Vocabulary {
        let tokens = [
            "<pad>", "<s>", "</s>", "<unk>", "<mask>", "<length>",
            "en_XX", "de_DE",
            "hello", "world", "hallo", "welt", "the", "die",
        ];
        Vocabulary::from_tokens(&tokens, &SpecialTokenConfig::default(), &languages()).unwrap()
    }

    pub(crate) fn languages() -> BTreeMap<String, String> {
        let mut l = BTreeMap::new();
        l.insert("en".to_string(), "en_XX".to_string());
        l.insert("de".to_string(), "de_DE".to_string());
        l
    }

    #[test]
    fn test_resolves_specials_and_tags() {
        let v = sample_vocabulary();
        let s = v.specials();
        assert_eq!((s.pad, s.bos, s.eos, s.mask), (0, 1, 2, 4));
        assert_eq!(v.tag_for("en").unwrap(), 6);
        assert_eq!(v.tag_for("de").unwrap(), 7);
        assert_eq!(v.token(8), Some("hello"));
        assert_eq!(v.id("welt"), Some(11));
        assert!(v.is_reserved(7));
        assert!(!v.is_reserved(8));
    }

    #[test]
    fn test_unknown_language_is_an_error() {
        let v = sample_vocabulary();
        assert!(matches!(
            v.tag_for("fr"),
            Err(NatError::UnknownLanguage { ref language }) if language == "fr"
        ));
    }

    #[test]
    fn test_rejects_sparse_ids() {
        let mut map = HashMap::new();
        for (i, t) in ["<pad>", "<s>", "</s>", "<unk>", "<mask>", "<length>", "en_XX", "de_DE"]
            .iter()
            .enumerate()
        {
            map.insert(t.to_string(), i as u32);
        }
        map.insert("gap".to_string(), 42);
        let err = Vocabulary::from_id_map(map, &SpecialTokenConfig::default(), &languages());
        assert!(matches!(err, Err(NatError::Config(_))));
    }

    #[test]
    fn test_rejects_missing_tag() {
        let tokens = ["<pad>", "<s>", "</s>", "<unk>", "<mask>", "<length>", "en_XX"];
        let err = Vocabulary::from_tokens(&tokens, &SpecialTokenConfig::default(), &languages());
        assert!(matches!(err, Err(NatError::Config(ref m)) if m.contains("de_DE")));
    }

    #[test]
    fn test_rejects_duplicate_tokens() {
        let tokens = ["<pad>", "<pad>"];
        let err = Vocabulary::from_tokens(&tokens, &SpecialTokenConfig::default(), &languages());
        assert!(matches!(err, Err(NatError::Config(_))));
    }
}
