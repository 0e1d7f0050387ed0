// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds, saves and loads the word-level tokenizer shared by
// training and translation.
//
// In tokenizers 0.15, train_from_files requires Trainer::Model
// to equal ModelWrapper. Instead of fighting the trainer types
// the vocabulary is counted here and the HuggingFace tokenizer
// JSON is written directly, then loaded back.
//
// Id layout of a freshly built tokenizer:
//
//   0..6    sentinels in SpecialTokenConfig::surface_forms() order
//   6..     one tag per configured language (sorted by code)
//   then    corpus words, most frequent first
//
// Sentinels and tags are registered as special added tokens, so
// they are never split and are skipped when decoding.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::{
    NormalizedString, Normalizer, OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer,
    Tokenizer,
};

use crate::config::SpecialTokenConfig;

const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    /// Load the saved tokenizer, or build one from `texts` if none exists.
    pub fn load_or_build(
        &self,
        texts:      &[String],
        vocab_size: usize,
        specials:   &SpecialTokenConfig,
        languages:  &BTreeMap<String, String>,
    ) -> Result<Tokenizer> {
        if self.path().exists() {
            tracing::info!("Loading existing tokenizer from '{}'", self.path().display());
            self.load()
        } else {
            tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
            self.build_and_save(texts, vocab_size, specials, languages)
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }

    fn build_and_save(
        &self,
        texts:      &[String],
        vocab_size: usize,
        specials:   &SpecialTokenConfig,
        languages:  &BTreeMap<String, String>,
    ) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let json = word_level_json(texts, vocab_size, specials, languages)?;
        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(&json)?)
            .with_context(|| format!("Cannot write tokenizer JSON to '{}'", path.display()))?;

        let tokenizer = Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot reload tokenizer: {e}"))?;
        tracing::info!(
            "Tokenizer built with {} entries, saved to '{}'",
            tokenizer.get_vocab_size(true),
            path.display()
        );
        Ok(tokenizer)
    }
}

/// Build a tokenizer in memory without touching the filesystem.
pub fn build_word_level(
    texts:      &[String],
    vocab_size: usize,
    specials:   &SpecialTokenConfig,
    languages:  &BTreeMap<String, String>,
) -> Result<Tokenizer> {
    let json = word_level_json(texts, vocab_size, specials, languages)?;
    Tokenizer::from_str(&json.to_string())
        .map_err(|e| anyhow::anyhow!("Cannot build tokenizer: {e}"))
}

/// Normaliser stored in the tokenizer JSON and used to count words:
/// lowercased, accents kept.
fn normalizer() -> BertNormalizer {
    BertNormalizer::new(true, true, Some(false), true)
}

/// Words exactly as the saved tokenizer will see them at encode time.
fn pieces(text: &str) -> Result<Vec<String>> {
    let mut normalized = NormalizedString::from(text);
    normalizer()
        .normalize(&mut normalized)
        .map_err(|e| anyhow::anyhow!("Cannot normalise {text:?}: {e}"))?;

    let mut pretokenized = PreTokenizedString::from(normalized);
    Whitespace::default()
        .pre_tokenize(&mut pretokenized)
        .map_err(|e| anyhow::anyhow!("Cannot pre-tokenise {text:?}: {e}"))?;

    Ok(pretokenized
        .get_splits(OffsetReferential::Normalized, OffsetType::Byte)
        .into_iter()
        .map(|(piece, _, _)| piece.to_string())
        .collect())
}

fn word_level_json(
    texts:      &[String],
    vocab_size: usize,
    specials:   &SpecialTokenConfig,
    languages:  &BTreeMap<String, String>,
) -> Result<serde_json::Value> {
    let reserved: Vec<String> = specials
        .surface_forms()
        .into_iter()
        .map(str::to_string)
        .chain(languages.values().cloned())
        .collect();

    let mut freq: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for piece in pieces(text)? {
            *freq.entry(piece).or_insert(0) += 1;
        }
    }
    // most frequent first, ties alphabetical so ids are reproducible
    let mut words: Vec<(String, usize)> = freq.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut vocab = serde_json::Map::new();
    let mut added = Vec::new();
    for token in &reserved {
        let id = vocab.len();
        vocab.insert(token.clone(), serde_json::json!(id));
        added.push(serde_json::json!({
            "id": id, "content": token, "single_word": false,
            "lstrip": false, "rstrip": false, "normalized": false, "special": true
        }));
    }
    for (word, _) in words {
        if vocab.len() >= vocab_size.max(reserved.len()) {
            break;
        }
        if !vocab.contains_key(&word) {
            let id = vocab.len();
            vocab.insert(word, serde_json::json!(id));
        }
    }

    Ok(serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added,
        "normalizer": serde_json::to_value(normalizer())?,
        "pre_tokenizer": serde_json::to_value(Whitespace::default())?,
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": specials.unk
        }
    }))
}

/// True when a tokenizer file is present in `dir`.
pub fn exists_in(dir: &Path) -> bool {
    dir.join(TOKENIZER_FILE).exists()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::vocabulary::tests::languages;

    pub(crate) fn sample_tokenizer() -> Tokenizer {
        let texts = vec!["Hello world".to_string(), "Hallo Welt".to_string(), "hello".to_string()];
        build_word_level(&texts, 100, &SpecialTokenConfig::default(), &languages()).unwrap()
    }

    #[test]
    fn test_reserved_ids_come_first() {
        let tok   = sample_tokenizer();
        let vocab = tok.get_vocab(true);
        assert_eq!(vocab["<pad>"], 0);
        assert_eq!(vocab["<length>"], 5);
        assert_eq!(vocab["de_DE"], 6);
        assert_eq!(vocab["en_XX"], 7);
        // "hello" occurs twice, so it gets the first word id
        assert_eq!(vocab["hello"], 8);
    }

    #[test]
    fn test_vocab_size_caps_words() {
        let texts = vec!["a b c d e f".to_string()];
        let tok = build_word_level(&texts, 10, &SpecialTokenConfig::default(), &languages()).unwrap();
        assert_eq!(tok.get_vocab_size(true), 10);
    }

    #[test]
    fn test_pieces_split_punctuation() {
        assert_eq!(pieces("Hello, World!").unwrap(), vec!["hello", ",", "world", "!"]);
        assert_eq!(pieces("Straße,  ÜBER").unwrap(), vec!["straße", ",", "über"]);
    }

    #[test]
    fn test_accented_words_encode_to_their_ids() {
        let texts = vec!["Schön über die Straße".to_string()];
        let tok   = build_word_level(&texts, 100, &SpecialTokenConfig::default(), &languages()).unwrap();
        let vocab = tok.get_vocab(true);
        let unk   = vocab["<unk>"];

        let encoding = tok.encode("schön Über straße", false).unwrap();
        let expected = vec![vocab["schön"], vocab["über"], vocab["straße"]];
        assert_eq!(encoding.get_ids(), expected.as_slice());
        assert!(!encoding.get_ids().contains(&unk));
    }

    #[test]
    fn test_store_round_trip() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        assert!(!exists_in(dir.path()));
        let built = store
            .load_or_build(&["guten tag".to_string()], 50, &SpecialTokenConfig::default(), &languages())
            .unwrap();
        assert!(exists_in(dir.path()));
        let loaded = store.load().unwrap();
        assert_eq!(built.get_vocab(true), loaded.get_vocab(true));
    }
}
