// ============================================================
// Layer 5b — Iterative Non-Autoregressive Decoding
// ============================================================
// Both decoders run against a TokenPredictor (one parallel
// decoder pass over the whole hypothesis) and keep all mutable
// state inside the call: the hypothesis, the iteration counter,
// and the mask or refinement snapshot are created at iteration
// 0 and dropped on return.
//
//   refine       — Refine-NAT: repeated argmax refinement until
//                  a fixed point or the iteration budget
//   mask_predict — CMLM: mask everything, then predict and
//                  re-mask the least confident positions on a
//                  linearly decaying schedule
//   stopping     — the shared halting rules
//
// All examples of a batch advance in lock-step. An example that
// reaches a terminal state is frozen in the hypothesis and
// ignored by every later pass. The `*_tagged` entry points pin
// each example's target language tag at position 0; neither
// decoder ever predicts MASK or PAD.

pub mod stopping;

pub mod refine;

pub mod mask_predict;

#[cfg(test)]
pub(crate) mod testing;

pub use mask_predict::{masked_count, MaskPredictDecoder};
pub use refine::RefineDecoder;
pub use stopping::{StopReason, StoppingPolicy};

use crate::domain::hypothesis::DecoderHypothesis;
use crate::domain::logits::Logits;
use crate::domain::traits::TokenPredictor;
use crate::error::{NatError, NatResult};

/// Run one pass and check the logits cover the whole grid.
pub(crate) fn checked_pass<P: TokenPredictor>(
    predictor: &P,
    grid:      &[Vec<u32>],
) -> NatResult<Logits> {
    let logits = predictor.predict(grid)?;
    let [batch, len, _] = logits.dims();
    let width = grid.first().map_or(0, Vec::len);
    if batch != grid.len() {
        return Err(NatError::shape(grid.len(), batch, "logits batch dimension"));
    }
    if len != width {
        return Err(NatError::shape(width, len, "logits length dimension"));
    }
    Ok(logits)
}

/// Decode calls must receive one target length per encoded example.
pub(crate) fn check_batch<P: TokenPredictor>(predictor: &P, target_lengths: &[usize]) -> NatResult<()> {
    if predictor.batch_size() != target_lengths.len() {
        return Err(NatError::Shape(format!(
            "encoder state has batch size {} but {} target lengths were given",
            predictor.batch_size(),
            target_lengths.len()
        )));
    }
    Ok(())
}

/// Pin one target tag per example at position 0.
pub(crate) fn pin_tags(hypothesis: &mut DecoderHypothesis, target_tags: &[u32]) -> NatResult<()> {
    if target_tags.len() != hypothesis.batch_size() {
        return Err(NatError::shape(hypothesis.batch_size(), target_tags.len(), "target tags"));
    }
    for (b, &tag) in target_tags.iter().enumerate() {
        hypothesis.pin_first(b, tag);
    }
    Ok(())
}
