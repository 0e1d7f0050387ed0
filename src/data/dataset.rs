use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::sequence::Sequence;

/// One tagged source/target pair, not yet padded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationSample {
    pub source: Sequence,
    pub target: Sequence,
}

impl TranslationSample {
    pub fn new(source: Sequence, target: Sequence) -> Self {
        Self { source, target }
    }

    pub fn direction(&self) -> (&str, &str) {
        (self.source.language(), self.target.language())
    }
}

pub struct TranslationDataset {
    samples: Vec<TranslationSample>,
}

impl TranslationDataset {
    pub fn new(samples: Vec<TranslationSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<TranslationSample> for TranslationDataset {
    fn get(&self, index: usize) -> Option<TranslationSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
