// ============================================================
// Run Configuration
// ============================================================
// One immutable, validated configuration value built once per
// run and passed explicitly to every component.
//
// TOML layout:
//
//   batch_size            = 32
//   max_length            = 128
//   padding               = "longest"
//   shift_labels_right    = true
//   refinement_iterations = 10
//   mask_iterations       = 10
//   source_length_token   = false
//
//   [languages]
//   en = "en_XX"
//   de = "de_DE"
//
//   [model]
//   d_model = 512
//   n_heads = 8
//   ...
//
// Loading never silently coerces: every constraint violation
// surfaces as NatError::Config.

mod model;
mod training;

pub use model::ModelVariantConfig;
pub use training::TrainingConfig;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NatError, NatResult};

// ─── PaddingStrategy ─────────────────────────────────────────────────────────
/// How sequences in a batch are padded. Only `Longest` is accepted
/// by this core; the others parse so they can be rejected with a
/// clear message instead of a TOML type error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaddingStrategy {
    /// Pad to the longest sequence in the batch, capped at `max_length`.
    #[default]
    Longest,
    /// Pad every sequence to `max_length`.
    MaxLength,
    /// Leave sequences ragged.
    DoNotPad,
}

impl PaddingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaddingStrategy::Longest  => "longest",
            PaddingStrategy::MaxLength => "max_length",
            PaddingStrategy::DoNotPad => "do_not_pad",
        }
    }
}

// ─── SpecialTokenConfig ──────────────────────────────────────────────────────
/// Surface forms of the sentinel tokens, resolved against the
/// tokenizer vocabulary when the Vocabulary is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialTokenConfig {
    pub bos:    String,
    pub eos:    String,
    pub pad:    String,
    pub unk:    String,
    pub mask:   String,
    pub length: String,
}

impl Default for SpecialTokenConfig {
    fn default() -> Self {
        Self {
            bos:    "<s>".to_string(),
            eos:    "</s>".to_string(),
            pad:    "<pad>".to_string(),
            unk:    "<unk>".to_string(),
            mask:   "<mask>".to_string(),
            length: "<length>".to_string(),
        }
    }
}

impl SpecialTokenConfig {
    /// All sentinel surface forms in a fixed order
    /// (pad, bos, eos, unk, mask, length).
    pub fn surface_forms(&self) -> [&str; 6] {
        [&self.pad, &self.bos, &self.eos, &self.unk, &self.mask, &self.length]
    }
}

// ─── NatConfig ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatConfig {
    /// Language code → tag token surface form (e.g. "en" → "en_XX")
    pub languages: BTreeMap<String, String>,

    /// Sequences per batch
    pub batch_size: usize,

    /// Padding cap in tokens (language tag and sentinels included)
    pub max_length: usize,

    #[serde(default)]
    pub padding: PaddingStrategy,

    /// Feed the decoder BOS + target[..L-1] during training
    pub shift_labels_right: bool,

    /// Refine-NAT iteration budget
    pub refinement_iterations: usize,

    /// CMLM mask-predict iteration budget
    pub mask_iterations: usize,

    /// Put the `<length>` token in front of source content
    #[serde(default)]
    pub source_length_token: bool,

    pub model: ModelVariantConfig,

    #[serde(default)]
    pub special_tokens: SpecialTokenConfig,

    #[serde(default)]
    pub training: TrainingConfig,
}

impl Default for NatConfig {
    fn default() -> Self {
        let mut languages = BTreeMap::new();
        languages.insert("en".to_string(), "en_XX".to_string());
        languages.insert("de".to_string(), "de_DE".to_string());
        Self {
            languages,
            batch_size:            32,
            max_length:            128,
            padding:               PaddingStrategy::Longest,
            shift_labels_right:    true,
            refinement_iterations: 10,
            mask_iterations:       10,
            source_length_token:   false,
            model:                 ModelVariantConfig::default(),
            special_tokens:        SpecialTokenConfig::default(),
            training:              TrainingConfig::default(),
        }
    }
}

impl NatConfig {
    /// Read, parse and validate a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> NatResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            NatError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!("Loaded config from '{}'", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml_str(toml: &str) -> NatResult<Self> {
        let config: Self = toml::from_str(toml)
            .map_err(|e| NatError::Config(format!("Failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> NatResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| NatError::Config(format!("Failed to serialise TOML: {e}")))
    }

    /// Check every constraint; the first violation wins.
    pub fn validate(&self) -> NatResult<()> {
        if self.languages.is_empty() {
            return Err(NatError::Config("languages must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for (code, tag) in &self.languages {
            if tag.trim().is_empty() {
                return Err(NatError::Config(format!("language '{code}' has an empty tag")));
            }
            if !seen.insert(tag.as_str()) {
                return Err(NatError::Config(format!(
                    "tag '{tag}' is assigned to more than one language"
                )));
            }
        }
        for form in self.special_tokens.surface_forms() {
            if seen.contains(form) {
                return Err(NatError::Config(format!(
                    "tag '{form}' collides with a special token"
                )));
            }
        }

        if self.batch_size == 0 {
            return Err(NatError::Config("batch_size must be > 0".into()));
        }
        if self.max_length == 0 {
            return Err(NatError::Config("max_length must be > 0".into()));
        }
        if self.padding != PaddingStrategy::Longest {
            return Err(NatError::Config(format!(
                "padding must be \"longest\", got \"{}\"",
                self.padding.as_str()
            )));
        }
        if self.refinement_iterations == 0 {
            return Err(NatError::Config("refinement_iterations must be > 0".into()));
        }
        if self.mask_iterations == 0 {
            return Err(NatError::Config("mask_iterations must be > 0".into()));
        }

        self.model.validate()?;
        self.training.validate()?;
        Ok(())
    }
}
