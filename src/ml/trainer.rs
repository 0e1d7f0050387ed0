// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Teacher-forced train + validation loop using Burn's
// DataLoader and Adam.
//
//   source  → engine.encode_for_training → EncoderState
//   shifted → engine.train_step          → logits [b, l, v]
//   logits, labels → label-smoothed cross-entropy (PAD ignored)
//   + length_loss_weight × length-head cross-entropy
//
// Training runs on B (Autodiff<Wgpu> in the binary); model.valid()
// returns the model on B::InnerBackend, so the validation batcher
// uses the inner backend too. Dropout is gated by ForwardMode,
// which encode() sets to Inference for validation.
//
// Reference: Kingma & Ba (2015) Adam, Szegedy et al. (2016) label smoothing

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::config::NatConfig;
use crate::data::{
    batcher::TranslationBatcher,
    dataset::TranslationDataset,
    label_shift::TeacherForcing,
};
use crate::domain::vocabulary::SpecialTokens;
use crate::error::NatError;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger, StepMetrics},
};
use crate::ml::engine::NatEngine;
use crate::ml::model::{NatTransformer, NatTransformerConfig};
use crate::ml::state::EncoderState;

type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Where a training run writes its weights and metrics.
pub struct RunArtifacts<'a> {
    pub checkpoints: &'a CheckpointManager,
    pub metrics:     &'a MetricsLogger,
}

/// Final numbers of a run, for the caller to report.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub epochs:             usize,
    pub steps:              usize,
    pub train_loss:         f64,
    pub val_loss:           f64,
    pub val_token_accuracy: f64,
}

pub fn run_training(
    config:        &NatConfig,
    model_cfg:     &NatTransformerConfig,
    specials:      SpecialTokens,
    train_dataset: TranslationDataset,
    val_dataset:   TranslationDataset,
    artifacts:     RunArtifacts<'_>,
) -> Result<TrainingSummary> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<TrainBackend>(config, model_cfg, specials, train_dataset, val_dataset, artifacts, device)
}

pub fn train_loop<B: AutodiffBackend>(
    config:        &NatConfig,
    model_cfg:     &NatTransformerConfig,
    specials:      SpecialTokens,
    train_dataset: TranslationDataset,
    val_dataset:   TranslationDataset,
    artifacts:     RunArtifacts<'_>,
    device:        B::Device,
) -> Result<TrainingSummary> {
    let t = &config.training;

    // ── Build model ───────────────────────────────────────────────────────────
    let model: NatTransformer<B> = model_cfg.init(&device);
    let mut engine = NatEngine::new(model, config, specials, device.clone())?;
    tracing::info!(
        "Model ready: {}+{} layers, d_model={}, vocab={}",
        config.model.num_encoder_layers,
        config.model.num_decoder_layers,
        config.model.d_model,
        model_cfg.vocab_size,
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let mut optim = AdamConfig::new()
        .with_beta_1(t.beta_1)
        .with_beta_2(t.beta_2)
        .with_epsilon(t.epsilon)
        .init::<B, NatTransformer<B>>();

    // ── Data loaders ──────────────────────────────────────────────────────────
    let forcing = TeacherForcing::new(config.shift_labels_right, specials.bos);

    let train_batcher = TranslationBatcher::<B>::new(device.clone(), config.max_length, specials.pad, forcing);
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(config.batch_size)
        .shuffle(t.seed)
        .num_workers(1)
        .build(train_dataset);

    let val_batcher = TranslationBatcher::<B::InnerBackend>::new(device.clone(), config.max_length, specials.pad, forcing);
    let val_loader  = DataLoaderBuilder::new(val_batcher)
        .batch_size(config.batch_size)
        .num_workers(1)
        .build(val_dataset);

    let train_ce = loss_fn::<B>(specials.pad, t.label_smoothing, &device);
    let val_ce   = loss_fn::<B::InnerBackend>(specials.pad, t.label_smoothing, &device);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let max_steps     = config.model.max_training_steps;
    let mut step      = 0usize;
    let mut best_val  = f64::INFINITY;
    let mut summary   = None;

    for epoch in 1..=t.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;
        let mut window_sum     = 0.0f64;
        let mut window_steps   = 0usize;

        for batch in train_loader.iter() {
            if batch.labels.dims()[1] == 0 {
                tracing::warn!("Skipping batch with empty targets");
                continue;
            }

            let state    = engine.encode_for_training(&batch.source);
            let logits   = engine.train_step(&state, &batch.decoder_input)?;
            let mut loss = sequence_loss(&train_ce, logits, batch.labels);
            if t.length_loss_weight > 0.0 {
                let lengths = length_loss(engine.model(), &state, &batch.decoder_input.lengths, &device);
                loss = loss + lengths.mul_scalar(t.length_loss_weight);
            }

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            step += 1;
            if !loss_val.is_finite() {
                return Err(NatError::NumericalInstability {
                    context: format!("training loss at step {step}"),
                }
                .into());
            }
            train_loss_sum += loss_val;
            train_batches  += 1;
            window_sum     += loss_val;
            window_steps   += 1;

            // Backward pass + Adam update
            let lr    = t.learning_rate_at(step);
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, engine.model());
            engine = engine.map_model(|model| optim.step(lr, model, grads));

            if step % t.log_steps == 0 {
                let row = StepMetrics {
                    step,
                    epoch,
                    train_loss:    window_sum / window_steps as f64,
                    learning_rate: lr,
                };
                tracing::info!("step {:>6} | loss={:.4} | lr={:.2e}", step, row.train_loss, lr);
                artifacts.metrics.log_step(&row)?;
                window_sum   = 0.0;
                window_steps = 0;
            }

            if step >= max_steps {
                break;
            }
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else { f64::NAN };

        // ── Validation phase ──────────────────────────────────────────────────
        let valid = NatEngine::new(engine.model().valid(), config, specials, device.clone())?;

        let mut val_loss_sum = 0.0f64;
        let mut val_batches  = 0usize;
        let mut correct      = 0i64;
        let mut total        = 0i64;

        for batch in val_loader.iter() {
            if batch.labels.dims()[1] == 0 {
                continue;
            }
            let state  = valid.encode(&batch.source);
            let logits = valid.train_step(&state, &batch.decoder_input)?;

            // argmax(2) returns [b, l, 1]; drop the last axis before comparing
            let [b, l, _] = logits.dims();
            let preds = logits.clone().argmax(2).reshape([b, l]);
            let real  = batch.labels.clone().not_equal_elem(specials.pad as i32);

            correct += preds
                .equal(batch.labels.clone())
                .int()
                .mul(real.clone().int())
                .sum()
                .into_scalar()
                .elem::<i64>();
            total += real.int().sum().into_scalar().elem::<i64>();

            val_loss_sum += sequence_loss(&val_ce, logits, batch.labels).into_scalar().elem::<f64>();
            val_batches  += 1;
        }

        let avg_val_loss = if val_batches > 0 { val_loss_sum / val_batches as f64 } else { f64::NAN };
        let accuracy     = if total > 0 { correct as f64 / total as f64 } else { 0.0 };

        let row = EpochMetrics::new(epoch, step, avg_train_loss, avg_val_loss, accuracy);
        tracing::info!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | token_acc={:.1}%",
            epoch, t.epochs, avg_train_loss, avg_val_loss, accuracy * 100.0,
        );
        if row.is_improvement(best_val) {
            best_val = row.val_loss;
            tracing::info!("New best validation loss: {:.4}", best_val);
        }
        artifacts.metrics.log_epoch(&row)?;

        artifacts.checkpoints.save_model(engine.model(), epoch)?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);

        summary = Some(TrainingSummary {
            epochs:             epoch,
            steps:              step,
            train_loss:         avg_train_loss,
            val_loss:           avg_val_loss,
            val_token_accuracy: accuracy,
        });

        if step >= max_steps {
            tracing::info!("Reached max_training_steps ({})", max_steps);
            break;
        }
    }

    tracing::info!("Training complete!");
    summary.ok_or_else(|| NatError::Config("training.epochs must be > 0".into()).into())
}

fn loss_fn<B: Backend>(pad: u32, smoothing: f32, device: &B::Device) -> CrossEntropyLoss<B> {
    CrossEntropyLossConfig::new()
        .with_pad_tokens(Some(vec![pad as usize]))
        .with_smoothing((smoothing > 0.0).then_some(smoothing))
        .init(device)
}

/// Cross-entropy of the length head against the decoder lengths.
fn length_loss<B: Backend>(
    model:   &NatTransformer<B>,
    state:   &EncoderState<B>,
    lengths: &[usize],
    device:  &B::Device,
) -> Tensor<B, 1> {
    let scores  = model.length_logits(state.memory.clone(), state.pad_mask.clone());
    let cap     = model.max_length();
    let targets: Vec<i32> = lengths.iter().map(|&l| l.min(cap) as i32).collect();
    let targets = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), device);
    CrossEntropyLossConfig::new().init(device).forward(scores, targets)
}

/// Token-level cross-entropy over [b, l, v] logits and [b, l] labels.
fn sequence_loss<B: Backend>(
    ce:     &CrossEntropyLoss<B>,
    logits: Tensor<B, 3>,
    labels: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    let [b, l, v] = logits.dims();
    ce.forward(logits.reshape([b * l, v]), labels.reshape([b * l]))
}
