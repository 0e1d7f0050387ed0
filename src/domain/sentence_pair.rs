// ============================================================
// Layer 3 — SentencePair
// ============================================================
// A raw parallel-corpus entry before tokenisation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentencePair {
    pub source_lang: String,
    pub target_lang: String,
    pub source:      String,
    pub target:      String,
}

impl SentencePair {
    pub fn new(
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        source:      impl Into<String>,
        target:      impl Into<String>,
    ) -> Self {
        Self {
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            source:      source.into(),
            target:      target.into(),
        }
    }

    /// Whitespace word counts (source, target), as used for corpus stats.
    pub fn word_counts(&self) -> (usize, usize) {
        (self.source.split_whitespace().count(), self.target.split_whitespace().count())
    }
}
