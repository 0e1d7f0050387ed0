// ============================================================
// Layer 4 — Language Tag Adapter
// ============================================================
// Bridges raw text and tagged Sequences:
//
//   encode   text + language → [tag] (<length>) ids... [EOS]
//   decode   ids → text, with sentinels and tags dropped
//
// The tag is resolved BEFORE the tokenizer runs, so an unknown
// language fails with NatError::UnknownLanguage without doing
// any tokenisation work. The optional <length> marker is put
// in front of source content for the mask-predict variant.

use tokenizers::Tokenizer;

use crate::config::NatConfig;
use crate::domain::sequence::Sequence;
use crate::domain::vocabulary::Vocabulary;
use crate::error::{NatError, NatResult};

pub struct TagAdapter {
    tokenizer:     Tokenizer,
    vocabulary:    Vocabulary,
    length_marker: bool,
}

impl TagAdapter {
    /// Resolve the vocabulary from the tokenizer's own id map.
    pub fn new(tokenizer: Tokenizer, config: &NatConfig) -> NatResult<Self> {
        let vocabulary = Vocabulary::from_id_map(
            tokenizer.get_vocab(true),
            &config.special_tokens,
            &config.languages,
        )?;
        Ok(Self { tokenizer, vocabulary, length_marker: false })
    }

    /// Prefix source content with the `<length>` token.
    pub fn with_length_marker(mut self, enabled: bool) -> Self {
        self.length_marker = enabled;
        self
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    fn content_ids(&self, text: &str) -> NatResult<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| NatError::Tokenization(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Target-side sequence: `[tag] ids [EOS]`.
    pub fn encode(&self, text: &str, language: &str) -> NatResult<Sequence> {
        let tag = self.vocabulary.tag_for(language)?;
        let ids = self.content_ids(text)?;
        Ok(Sequence::tagged(language, tag, &ids, Some(self.vocabulary.specials().eos)))
    }

    /// Source-side sequence, with the `<length>` marker when enabled.
    pub fn encode_source(&self, text: &str, language: &str) -> NatResult<Sequence> {
        if !self.length_marker {
            return self.encode(text, language);
        }
        let tag = self.vocabulary.tag_for(language)?;
        let mut ids = vec![self.vocabulary.specials().length];
        ids.extend(self.content_ids(text)?);
        Ok(Sequence::tagged(language, tag, &ids, Some(self.vocabulary.specials().eos)))
    }

    /// Text for decoder output; reserved ids are skipped.
    pub fn decode(&self, ids: &[u32]) -> NatResult<String> {
        let content: Vec<u32> = ids
            .iter()
            .copied()
            .filter(|&id| !self.vocabulary.is_reserved(id))
            .collect();
        self.tokenizer
            .decode(&content, true)
            .map_err(|e| NatError::Tokenization(e.to_string()))
    }
}
