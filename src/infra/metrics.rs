// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends training metrics to two CSV files in the run directory:
//
//   steps.csv    every `log_steps` optimiser steps
//     step,epoch,train_loss,learning_rate
//
//   metrics.csv  once per epoch
//     epoch,steps,train_loss,val_loss,val_token_accuracy
//
// Token accuracy counts positions whose argmax equals the label,
// over non-PAD labels only.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// One row of per-step training metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMetrics {
    pub step:          usize,
    pub epoch:         usize,
    /// Mean loss over the steps since the previous row
    pub train_loss:    f64,
    pub learning_rate: f64,
}

/// One row of per-epoch metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:              usize,
    /// Optimiser steps taken so far in the run
    pub steps:              usize,
    pub train_loss:         f64,
    pub val_loss:           f64,
    /// Range [0.0, 1.0]
    pub val_token_accuracy: f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, steps: usize, train_loss: f64, val_loss: f64, val_token_accuracy: f64) -> Self {
        Self { epoch, steps, train_loss, val_loss, val_token_accuracy }
    }

    /// True if this epoch beat the previous best validation loss.
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }
}

pub struct MetricsLogger {
    steps_path:  PathBuf,
    epochs_path: PathBuf,
}

impl MetricsLogger {
    /// Create the directory and write CSV headers for new files.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let steps_path  = dir.join("steps.csv");
        let epochs_path = dir.join("metrics.csv");
        write_header(&steps_path, "step,epoch,train_loss,learning_rate")?;
        write_header(&epochs_path, "epoch,steps,train_loss,val_loss,val_token_accuracy")?;

        Ok(Self { steps_path, epochs_path })
    }

    pub fn log_step(&self, m: &StepMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.steps_path)?;
        writeln!(f, "{},{},{:.6},{:.8}", m.step, m.epoch, m.train_loss, m.learning_rate)?;
        Ok(())
    }

    pub fn log_epoch(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.epochs_path)?;
        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6}",
            m.epoch, m.steps, m.train_loss, m.val_loss, m.val_token_accuracy,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );
        Ok(())
    }

    pub fn steps_path(&self) -> &Path {
        &self.steps_path
    }

    pub fn epochs_path(&self) -> &Path {
        &self.epochs_path
    }
}

fn write_header(path: &Path, header: &str) -> Result<()> {
    if !path.exists() {
        let mut f = fs::File::create(path)?;
        writeln!(f, "{header}")?;
        tracing::debug!("Created metrics CSV: '{}'", path.display());
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics::new(2, 200, 2.5, 2.3, 0.2);
        assert!(m.is_improvement(3.0));
        assert!(!m.is_improvement(2.0));
    }

    #[test]
    fn test_rows_append_after_header() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log_step(&StepMetrics { step: 100, epoch: 1, train_loss: 4.2, learning_rate: 5e-5 }).unwrap();
        logger.log_epoch(&EpochMetrics::new(1, 100, 4.0, 3.9, 0.25)).unwrap();

        let steps = fs::read_to_string(logger.steps_path()).unwrap();
        assert_eq!(steps.lines().count(), 2);
        assert!(steps.lines().nth(1).unwrap().starts_with("100,1,4.200000"));

        // reopening keeps existing rows
        let again = MetricsLogger::new(dir.path()).unwrap();
        let epochs = fs::read_to_string(again.epochs_path()).unwrap();
        assert_eq!(epochs.lines().count(), 2);
    }
}
