// ============================================================
// Layer 5 — Engine (the core's call surface)
// ============================================================
//   encode(batch)                          → EncoderState
//   decode_refine(&state, lengths)         → DecodeOutput
//   decode_mask_predict(&state, lengths)   → DecodeOutput
//   train_step(&state, shifted_targets)    → logits (causal)
//   predict_lengths(&state)                → suggested lengths
//
// The `*_tagged` decode variants pin a target language tag at
// position 0 of every hypothesis. Decoding refuses a state made
// by `encode_for_training`.
//
// Decoding borrows the engine and the encoder state immutably;
// every mutable decoding structure lives inside the decode call.
// Training replaces the model by value (`map_model`), so there
// is exactly one writer at a time.

use burn::prelude::*;

use crate::config::NatConfig;
use crate::data::batcher::TokenBatch;
use crate::decoding::{MaskPredictDecoder, RefineDecoder};
use crate::domain::hypothesis::DecodeOutput;
use crate::domain::logits::Logits;
use crate::domain::traits::TokenPredictor;
use crate::domain::vocabulary::SpecialTokens;
use crate::error::{NatError, NatResult};
use crate::ml::model::{ForwardMode, NatTransformer};
use crate::ml::state::EncoderState;

pub struct NatEngine<B: Backend> {
    model:        NatTransformer<B>,
    specials:     SpecialTokens,
    refine:       RefineDecoder,
    mask_predict: MaskPredictDecoder,
    device:       B::Device,
}

impl<B: Backend> NatEngine<B> {
    pub fn new(
        model:    NatTransformer<B>,
        config:   &NatConfig,
        specials: SpecialTokens,
        device:   B::Device,
    ) -> NatResult<Self> {
        Ok(Self {
            model,
            specials,
            refine:       RefineDecoder::from_config(config, specials)?,
            mask_predict: MaskPredictDecoder::from_config(config, specials)?,
            device,
        })
    }

    pub fn model(&self) -> &NatTransformer<B> {
        &self.model
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn specials(&self) -> SpecialTokens {
        self.specials
    }

    /// Replace the model with `f(model)`, e.g. an optimiser step.
    pub fn map_model<F>(mut self, f: F) -> Self
    where
        F: FnOnce(NatTransformer<B>) -> NatTransformer<B>,
    {
        self.model = f(self.model);
        self
    }

    pub fn into_model(self) -> NatTransformer<B> {
        self.model
    }

    /// Encode for decoding: no dropout.
    pub fn encode(&self, batch: &TokenBatch<B>) -> EncoderState<B> {
        self.encode_in(batch, ForwardMode::Inference)
    }

    /// Encode for the teacher-forced path: dropout active, and the
    /// following `train_step` runs in the same mode.
    pub fn encode_for_training(&self, batch: &TokenBatch<B>) -> EncoderState<B> {
        self.encode_in(batch, ForwardMode::Train)
    }

    fn encode_in(&self, batch: &TokenBatch<B>, mode: ForwardMode) -> EncoderState<B> {
        let pad_mask = batch.pad_mask();
        let memory   = self.model.encode(batch.ids.clone(), pad_mask.clone(), mode);
        EncoderState { memory, pad_mask, lengths: batch.lengths.clone(), mode }
    }

    fn predictor<'a>(
        &'a self,
        state:          &'a EncoderState<B>,
        target_lengths: &'a [usize],
    ) -> NatResult<ModelPredictor<'a, B>> {
        if state.mode() == ForwardMode::Train {
            return Err(NatError::Config(
                "decoding needs an encoder state from encode(), not encode_for_training()".into(),
            ));
        }
        Ok(ModelPredictor { engine: self, state, target_lengths })
    }

    pub fn decode_refine(
        &self,
        state:          &EncoderState<B>,
        target_lengths: &[usize],
    ) -> NatResult<DecodeOutput> {
        self.refine.decode(&self.predictor(state, target_lengths)?, target_lengths)
    }

    pub fn decode_mask_predict(
        &self,
        state:          &EncoderState<B>,
        target_lengths: &[usize],
    ) -> NatResult<DecodeOutput> {
        self.mask_predict.decode(&self.predictor(state, target_lengths)?, target_lengths)
    }

    /// Refine-NAT with `target_tags[b]` fixed at position 0 of example b.
    pub fn decode_refine_tagged(
        &self,
        state:          &EncoderState<B>,
        target_lengths: &[usize],
        target_tags:    &[u32],
    ) -> NatResult<DecodeOutput> {
        let predictor = self.predictor(state, target_lengths)?;
        self.refine.decode_tagged(&predictor, target_lengths, target_tags)
    }

    /// Mask-predict with `target_tags[b]` committed at position 0 of example b.
    pub fn decode_mask_predict_tagged(
        &self,
        state:          &EncoderState<B>,
        target_lengths: &[usize],
        target_tags:    &[u32],
    ) -> NatResult<DecodeOutput> {
        let predictor = self.predictor(state, target_lengths)?;
        self.mask_predict.decode_tagged(&predictor, target_lengths, target_tags)
    }

    /// Teacher-forced decoder pass over `shifted` (see data::label_shift),
    /// causally masked so no position sees the label it predicts.
    /// Returns logits [batch, tgt_len, vocab_size] for an external loss.
    pub fn train_step(&self, state: &EncoderState<B>, shifted: &TokenBatch<B>) -> NatResult<Tensor<B, 3>> {
        if shifted.batch_size() != state.batch_size() {
            return Err(NatError::shape(state.batch_size(), shifted.batch_size(), "shifted target batch size"));
        }
        let logits = self.model.decode_teacher_forced(
            shifted.ids.clone(),
            shifted.pad_mask(),
            state.memory.clone(),
            state.pad_mask.clone(),
            state.mode,
        );
        let total = logits.clone().sum().into_scalar().elem::<f64>();
        if !total.is_finite() {
            return Err(NatError::NumericalInstability { context: "teacher-forced logits".into() });
        }
        Ok(logits)
    }

    /// Argmax of the length head per example, in `0..=max_length`.
    pub fn predict_lengths(&self, state: &EncoderState<B>) -> NatResult<Vec<usize>> {
        let scores = self.model.length_logits(state.memory.clone(), state.pad_mask.clone());
        let best = scores
            .argmax(1)
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| NatError::Shape(format!("length prediction: {e:?}")))?;
        Ok(best.into_iter().map(|l| l.max(0) as usize).collect())
    }
}

// ─── ModelPredictor ──────────────────────────────────────────────────────────
/// One decoder pass of the Transformer over a finished EncoderState.
struct ModelPredictor<'a, B: Backend> {
    engine:         &'a NatEngine<B>,
    state:          &'a EncoderState<B>,
    target_lengths: &'a [usize],
}

impl<B: Backend> TokenPredictor for ModelPredictor<'_, B> {
    fn batch_size(&self) -> usize {
        self.state.batch_size()
    }

    fn predict(&self, grid: &[Vec<u32>]) -> NatResult<Logits> {
        let batch = grid.len();
        let width = grid.first().map_or(0, Vec::len);
        if batch != self.target_lengths.len() {
            return Err(NatError::shape(self.target_lengths.len(), batch, "hypothesis rows"));
        }
        let device = &self.engine.device;

        let ids_flat: Vec<i32> = grid.iter().flatten().map(|&t| t as i32).collect();
        let pad_flat: Vec<i32> = self
            .target_lengths
            .iter()
            .flat_map(|&len| (0..width).map(move |p| (p >= len) as i32))
            .collect();
        let ids      = Tensor::<B, 1, Int>::from_ints(ids_flat.as_slice(), device).reshape([batch, width]);
        let tgt_pad  = Tensor::<B, 1, Int>::from_ints(pad_flat.as_slice(), device)
            .reshape([batch, width])
            .equal_elem(1);

        let logits = self.engine.model.decode(
            ids,
            tgt_pad,
            self.state.memory.clone(),
            self.state.pad_mask.clone(),
            ForwardMode::Inference,
        );
        let [b, l, v] = logits.dims();
        let data = logits
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| NatError::Shape(format!("decoder logits: {e:?}")))?;
        Logits::new(data, [b, l, v])
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::pad_batch;
    use crate::domain::hypothesis::DecodeOutcome;
    use crate::domain::sequence::Sequence;
    use crate::domain::vocabulary::tests::sample_vocabulary;
    use crate::ml::model::tests::tiny_config;
    use burn::backend::NdArray;

    type B = NdArray;

    fn engine(refine: usize, mask: usize) -> NatEngine<B> {
        let config = NatConfig {
            refinement_iterations: refine,
            mask_iterations:       mask,
            ..NatConfig::default()
        };
        let device = Default::default();
        let model  = tiny_config().init::<B>(&device);
        NatEngine::new(model, &config, sample_vocabulary().specials(), device).unwrap()
    }

    fn source_batch(engine: &NatEngine<B>) -> TokenBatch<B> {
        let padded = pad_batch(
            &[
                Sequence::tagged("en", 6, &[8, 9], Some(2)),
                Sequence::tagged("en", 6, &[12], Some(2)),
            ],
            8,
            0,
        );
        TokenBatch::from_padded(&padded, engine.device())
    }

    #[test]
    fn test_refine_respects_lengths_and_budget() {
        let engine = engine(3, 4);
        let state  = engine.encode(&source_batch(&engine));
        let out    = engine.decode_refine(&state, &[4, 2]).unwrap();
        assert_eq!(out.sequences[0].tokens.len(), 4);
        assert_eq!(out.sequences[1].tokens.len(), 2);
        assert!(out.passes <= 3);
        assert!(out.sequences.iter().all(|s| s.iterations <= 3));
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let engine = engine(5, 5);
        let state  = engine.encode(&source_batch(&engine));
        let a = engine.decode_refine(&state, &[3, 3]).unwrap();
        let b = engine.decode_refine(&state, &[3, 3]).unwrap();
        assert_eq!(a.token_ids(), b.token_ids());
        let c = engine.decode_mask_predict(&state, &[3, 3]).unwrap();
        let d = engine.decode_mask_predict(&state, &[3, 3]).unwrap();
        assert_eq!(c.token_ids(), d.token_ids());
    }

    #[test]
    fn test_mask_predict_schedule_through_model() {
        let engine = engine(10, 4);
        let state  = engine.encode(&source_batch(&engine));
        let out    = engine.decode_mask_predict(&state, &[4, 4]).unwrap();
        for seq in &out.sequences {
            assert_eq!(seq.masked_trace, vec![3, 2, 1, 0]);
            assert_eq!(seq.outcome, DecodeOutcome::Completed);
            assert_eq!(seq.tokens.len(), 4);
        }
    }

    #[test]
    fn test_zero_target_length() {
        let engine = engine(3, 3);
        let state  = engine.encode(&source_batch(&engine));
        let out    = engine.decode_mask_predict(&state, &[0, 0]).unwrap();
        assert!(out.sequences.iter().all(|s| s.tokens.is_empty()));
        assert_eq!(out.passes, 0);
    }

    #[test]
    fn test_length_batch_mismatch() {
        let engine = engine(3, 3);
        let state  = engine.encode(&source_batch(&engine));
        assert!(matches!(engine.decode_refine(&state, &[3]), Err(NatError::Shape(_))));
        assert!(matches!(engine.decode_mask_predict(&state, &[3, 3, 3]), Err(NatError::Shape(_))));
    }

    #[test]
    fn test_train_step_shapes() {
        let engine  = engine(3, 3);
        let state   = engine.encode_for_training(&source_batch(&engine));
        let shifted = pad_batch(
            &[Sequence::untagged("de", vec![1, 7, 10]), Sequence::untagged("de", vec![1, 7])],
            8,
            0,
        );
        let logits = engine.train_step(&state, &TokenBatch::from_padded(&shifted, engine.device())).unwrap();
        assert_eq!(logits.dims(), [2, 3, 16]);

        let single = pad_batch(&[Sequence::untagged("de", vec![1, 7])], 8, 0);
        let err = engine.train_step(&state, &TokenBatch::from_padded(&single, engine.device()));
        assert!(matches!(err, Err(NatError::Shape(_))));
    }

    #[test]
    fn test_train_step_does_not_see_the_next_label() {
        let engine = engine(3, 3);
        let state  = engine.encode(&source_batch(&engine));
        // ShiftRight input [BOS, y0, y1]: input 1 is label 0
        let logits_with = |y0: u32| {
            let shifted = pad_batch(
                &[Sequence::untagged("de", vec![1, y0, 11]), Sequence::untagged("de", vec![1, 7])],
                8,
                0,
            );
            let logits = engine.train_step(&state, &TokenBatch::from_padded(&shifted, engine.device())).unwrap();
            logits.slice([0..1, 0..1, 0..16]).into_data().convert::<f32>().to_vec::<f32>().unwrap()
        };
        let a = logits_with(10);
        let b = logits_with(13);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5, "{x} vs {y}");
        }
    }

    #[test]
    fn test_training_state_is_rejected_by_decoders() {
        let engine = engine(3, 3);
        let state  = engine.encode_for_training(&source_batch(&engine));
        assert!(matches!(engine.decode_refine(&state, &[3, 3]), Err(NatError::Config(_))));
        assert!(matches!(engine.decode_mask_predict(&state, &[3, 3]), Err(NatError::Config(_))));
        assert!(matches!(engine.decode_refine_tagged(&state, &[3, 3], &[7, 7]), Err(NatError::Config(_))));
    }

    #[test]
    fn test_tagged_decoding_keeps_the_tag() {
        let engine = engine(4, 3);
        let state  = engine.encode(&source_batch(&engine));
        let de     = 7;
        for out in [
            engine.decode_refine_tagged(&state, &[4, 2], &[de, de]).unwrap(),
            engine.decode_mask_predict_tagged(&state, &[4, 2], &[de, de]).unwrap(),
        ] {
            for seq in &out.sequences {
                assert_eq!(seq.tokens[0], de);
                assert!(!seq.tokens[1..].contains(&4));
            }
        }
    }

    #[test]
    fn test_predicted_lengths_in_range() {
        let engine  = engine(3, 3);
        let state   = engine.encode(&source_batch(&engine));
        let lengths = engine.predict_lengths(&state).unwrap();
        assert_eq!(lengths.len(), 2);
        assert!(lengths.iter().all(|&l| l <= engine.model().max_length()));
    }
}
