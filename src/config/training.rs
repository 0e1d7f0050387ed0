use serde::{Deserialize, Serialize};

use crate::error::{NatError, NatResult};

/// Optimiser and loop settings for the teacher-forced training path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate:   f64,
    pub beta_1:          f32,
    pub beta_2:          f32,
    pub epsilon:         f32,
    /// Label smoothing for cross-entropy; 0 disables it
    pub label_smoothing: f32,
    /// Linear learning-rate warmup; 0 keeps the rate constant
    pub warmup_steps:    usize,
    /// Weight of the length-head cross-entropy; 0 leaves the head untrained
    pub length_loss_weight: f64,
    pub epochs:          usize,
    /// Log and record metrics every `log_steps` optimiser steps
    pub log_steps:       usize,
    /// Fraction of the corpus used for training; the rest validates
    pub train_fraction:  f64,
    pub seed:            u64,
    /// Upper bound on the word-level tokenizer vocabulary, sentinels included
    pub vocab_size:      usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate:   5e-5,
            beta_1:          0.9,
            beta_2:          0.997,
            epsilon:         1e-9,
            label_smoothing: 0.1,
            warmup_steps:    4000,
            length_loss_weight: 0.1,
            epochs:          10,
            log_steps:       100,
            train_fraction:  0.9,
            seed:            42,
            vocab_size:      32000,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> NatResult<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(NatError::Config("training.learning_rate must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return Err(NatError::Config("training.label_smoothing must be in [0, 1)".into()));
        }
        if !(self.length_loss_weight >= 0.0 && self.length_loss_weight.is_finite()) {
            return Err(NatError::Config("training.length_loss_weight must be >= 0".into()));
        }
        if self.epochs == 0 || self.log_steps == 0 {
            return Err(NatError::Config("training.epochs and training.log_steps must be > 0".into()));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(NatError::Config("training.train_fraction must be in (0, 1]".into()));
        }
        if self.vocab_size == 0 {
            return Err(NatError::Config("training.vocab_size must be > 0".into()));
        }
        Ok(())
    }

    /// Learning rate for optimiser step `step` (1-indexed).
    pub fn learning_rate_at(&self, step: usize) -> f64 {
        if self.warmup_steps == 0 {
            return self.learning_rate;
        }
        self.learning_rate * (step as f64 / self.warmup_steps as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_ramps_then_holds() {
        let cfg = TrainingConfig { warmup_steps: 4, learning_rate: 1.0, ..TrainingConfig::default() };
        assert_eq!(cfg.learning_rate_at(1), 0.25);
        assert_eq!(cfg.learning_rate_at(4), 1.0);
        assert_eq!(cfg.learning_rate_at(100), 1.0);
        let flat = TrainingConfig { warmup_steps: 0, ..cfg };
        assert_eq!(flat.learning_rate_at(1), 1.0);
    }

    #[test]
    fn test_rejects_bad_smoothing() {
        let cfg = TrainingConfig { label_smoothing: 1.0, ..TrainingConfig::default() };
        assert!(cfg.validate().is_err());
    }
}
