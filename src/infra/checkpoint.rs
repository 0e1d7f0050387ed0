// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// Run directory layout:
//
//   checkpoints/
//     model_epoch_1.mpk.gz   ← weights after epoch 1
//     model_epoch_2.mpk.gz
//     ...
//     latest_epoch.json      ← number of the latest saved epoch
//     run_config.json        ← the validated NatConfig of the run
//     model_config.json      ← NatTransformerConfig (incl. vocab size)
//
// Translation rebuilds the exact architecture from
// model_config.json before loading weights into it; the
// recorder refuses weights that do not match the architecture.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use std::{fs, path::PathBuf};

use crate::config::NatConfig;
use crate::error::NatError;
use crate::ml::model::{NatTransformer, NatTransformerConfig};

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Write `model_epoch_{epoch}` and move the latest-epoch pointer.
    pub fn save_model<B: Backend>(&self, model: &NatTransformer<B>, epoch: usize) -> Result<()> {
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest_path = self.dir.join("latest_epoch.json");
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write latest_epoch.json")?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Load the latest saved weights into `model`.
    pub fn load_model<B: Backend>(
        &self,
        model:  NatTransformer<B>,
        device: &B::Device,
    ) -> Result<NatTransformer<B>> {
        let epoch = self.latest_epoch()?;
        let path  = self.dir.join(format!("model_epoch_{epoch}"));

        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;

        Ok(model.load_record(record))
    }

    /// Save the run and architecture configs before training starts.
    pub fn save_run(&self, config: &NatConfig, model: &NatTransformerConfig) -> Result<()> {
        let run_path = self.dir.join("run_config.json");
        fs::write(&run_path, serde_json::to_string_pretty(config)?)
            .with_context(|| format!("Cannot write config to '{}'", run_path.display()))?;

        let model_path = self.dir.join("model_config.json");
        fs::write(&model_path, serde_json::to_string_pretty(model)?)
            .with_context(|| format!("Cannot write config to '{}'", model_path.display()))?;

        tracing::debug!("Saved run configuration to '{}'", self.dir.display());
        Ok(())
    }

    /// Load and re-validate the saved configs.
    pub fn load_run(&self) -> Result<(NatConfig, NatTransformerConfig)> {
        let run_path = self.dir.join("run_config.json");
        let json = fs::read_to_string(&run_path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' first.",
                run_path.display()
            )
        })?;
        let config: NatConfig = serde_json::from_str(&json)?;
        config.validate()?;

        let model_path = self.dir.join("model_config.json");
        let json = fs::read_to_string(&model_path)
            .with_context(|| format!("Cannot read config from '{}'", model_path.display()))?;
        let model: NatTransformerConfig = serde_json::from_str(&json)?;

        Ok((config, model))
    }

    fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join("latest_epoch.json");
        if !path.exists() {
            return Err(NatError::Checkpoint(format!(
                "no saved epoch in '{}'. Have you run 'train' first?",
                self.dir.display()
            ))
            .into());
        }
        let s = fs::read_to_string(&path)?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}
