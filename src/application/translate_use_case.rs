// ============================================================
// Layer 2 — TranslateUseCase
// ============================================================
// Loads a trained run and translates one sentence:
//
//   Step 1: Load run config + model config  (Layer 6 - infra)
//   Step 2: Load tokenizer                  (Layer 6 - infra)
//   Step 3: Rebuild model, load weights     (Layer 5 - ml)
//   Step 4: Tag + tokenise the source       (Layer 4 - data)
//   Step 5: Encode once                     (Layer 5 - ml)
//   Step 6: Target length: given, or the length head's suggestion
//   Step 7: Iterative decoding, target tag pinned at position 0
//   Step 8: Detokenise                      (Layer 4 - data)

use anyhow::Result;
use burn::prelude::*;
use std::path::Path;

use crate::data::{
    batcher::{pad_batch, TokenBatch},
    tag_adapter::TagAdapter,
};
use crate::domain::hypothesis::DecodeOutcome;
use crate::error::NatError;
use crate::infra::{
    checkpoint::CheckpointManager,
    tokenizer_store::{exists_in, TokenizerStore},
};
use crate::ml::engine::NatEngine;

/// Which iterative decoder produces the translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderKind {
    Refine,
    MaskPredict,
}

#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub text:          String,
    pub source_lang:   String,
    pub target_lang:   String,
    pub decoder:       DecoderKind,
    /// Decoder length in tokens; None asks the length head
    pub target_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub text:             String,
    pub ids:              Vec<u32>,
    pub target_length:    usize,
    pub length_predicted: bool,
    pub outcome:          DecodeOutcome,
    pub iterations:       usize,
    pub masked_trace:     Vec<usize>,
}

pub struct TranslateUseCase<B: Backend> {
    adapter:    TagAdapter,
    engine:     NatEngine<B>,
    max_length: usize,
}

impl TranslateUseCase<burn::backend::Wgpu> {
    /// Load on the default WGPU device.
    pub fn load(artifacts_dir: impl AsRef<Path>) -> Result<Self> {
        Self::load_on(artifacts_dir, burn::backend::wgpu::WgpuDevice::default())
    }
}

impl<B: Backend> TranslateUseCase<B> {
    pub fn load_on(artifacts_dir: impl AsRef<Path>, device: B::Device) -> Result<Self> {
        let dir = artifacts_dir.as_ref();

        let checkpoints = CheckpointManager::new(dir.join("checkpoints"))?;
        let (config, model_cfg) = checkpoints.load_run()?;

        if !exists_in(dir) {
            anyhow::bail!("No tokenizer in '{}'. Have you run 'train' first?", dir.display());
        }
        let tokenizer = TokenizerStore::new(dir).load()?;
        let adapter   = TagAdapter::new(tokenizer, &config)?.with_length_marker(config.source_length_token);

        let model  = checkpoints.load_model(model_cfg.init::<B>(&device), &device)?;
        let engine = NatEngine::new(model, &config, adapter.vocabulary().specials(), device)?;
        tracing::info!("Translation model ready (vocab={}, max_length={})", model_cfg.vocab_size, config.max_length);

        Ok(Self { adapter, engine, max_length: config.max_length })
    }

    pub fn from_parts(adapter: TagAdapter, engine: NatEngine<B>, max_length: usize) -> Self {
        Self { adapter, engine, max_length }
    }

    pub fn translate(&self, request: &TranslateRequest) -> Result<Translation> {
        let vocabulary = self.adapter.vocabulary();
        let target_tag = vocabulary.tag_for(&request.target_lang)?;
        let source     = self.adapter.encode_source(&request.text, &request.source_lang)?;

        let padded = pad_batch(&[source], self.max_length, vocabulary.specials().pad);
        let batch  = TokenBatch::from_padded(&padded, self.engine.device());
        let state  = self.engine.encode(&batch);

        let (target_length, length_predicted) = match request.target_length {
            Some(len) => (len, false),
            None => {
                let suggested = self.engine.predict_lengths(&state)?;
                (suggested.first().copied().unwrap_or(0), true)
            }
        };
        if target_length > self.max_length {
            return Err(NatError::Config(format!(
                "target length {target_length} exceeds max_length {}",
                self.max_length
            ))
            .into());
        }
        tracing::debug!("Decoding {} tokens (predicted: {})", target_length, length_predicted);

        let output = match request.decoder {
            DecoderKind::Refine => {
                self.engine.decode_refine_tagged(&state, &[target_length], &[target_tag])?
            }
            DecoderKind::MaskPredict => {
                self.engine.decode_mask_predict_tagged(&state, &[target_length], &[target_tag])?
            }
        };
        let sequence = output
            .sequences
            .into_iter()
            .next()
            .ok_or_else(|| NatError::shape(1, 0, "decoded sequences"))?;

        if sequence.outcome.is_budget_exhausted() {
            tracing::warn!("Iteration budget exhausted; returning the best-effort hypothesis");
        }

        Ok(Translation {
            text:             self.adapter.decode(&sequence.tokens)?,
            ids:              sequence.tokens,
            target_length,
            length_predicted,
            outcome:          sequence.outcome,
            iterations:       sequence.iterations,
            masked_trace:     sequence.masked_trace,
        })
    }
}
