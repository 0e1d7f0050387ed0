// ============================================================
// CMLM Mask-Predict Decoder
// ============================================================
// States: INIT → (PREDICT → REMASK) ⟲ → DONE
//
//   INIT     every real position is MASK, all flags "masked"
//   PREDICT  one decoder pass over the partially masked
//            hypothesis; every still-masked position takes its
//            argmax token (never MASK or PAD) and that token's
//            probability
//   REMASK   after iteration i of N, exactly
//                round(L · (N − i) / N)
//            positions stay masked: the least confident of the
//            positions predicted in this pass, lower index first
//            on equal confidence. Everything else is committed
//            for good; committed tokens are never re-predicted
//            and never re-masked. A pinned target tag counts as
//            committed from the start and L excludes it.
//   DONE     no masked positions remain, or the budget is spent
//            (leftover masked positions keep their last
//            prediction instead of MASK)

use crate::config::NatConfig;
use crate::decoding::stopping::StoppingPolicy;
use crate::decoding::{check_batch, checked_pass, pin_tags};
use crate::domain::hypothesis::{DecodeOutcome, DecodeOutput, DecodedSequence, DecoderHypothesis};
use crate::domain::logits::Logits;
use crate::domain::traits::TokenPredictor;
use crate::domain::vocabulary::SpecialTokens;
use crate::error::NatResult;

/// Positions that stay masked after `iteration` (1-indexed) of `total`
/// for a target of length `len`: `round(len * (total - iteration) / total)`
/// with halves rounded up, computed in integers.
pub fn masked_count(len: usize, iteration: usize, total: usize) -> usize {
    if total == 0 {
        return 0;
    }
    let remaining = total.saturating_sub(iteration);
    (2 * len * remaining + total) / (2 * total)
}

/// Per-position "still masked" flags.
#[derive(Debug, Clone)]
pub struct MaskState {
    masked: Vec<Vec<bool>>,
}

impl MaskState {
    fn all_masked(target_lengths: &[usize]) -> Self {
        let width = target_lengths.iter().copied().max().unwrap_or(0);
        Self {
            masked: target_lengths
                .iter()
                .map(|&len| (0..width).map(|p| p < len).collect())
                .collect(),
        }
    }

    pub fn is_masked(&self, b: usize, p: usize) -> bool {
        self.masked[b][p]
    }

    pub fn masked_positions(&self, b: usize) -> Vec<usize> {
        self.masked[b]
            .iter()
            .enumerate()
            .filter_map(|(p, &m)| m.then_some(p))
            .collect()
    }

    pub fn count(&self, b: usize) -> usize {
        self.masked[b].iter().filter(|&&m| m).count()
    }
}

/// Working state of one mask-predict call.
#[derive(Debug, Clone)]
pub struct MaskPredictState {
    hypothesis: DecoderHypothesis,
    mask:       MaskState,
    traces:     Vec<Vec<usize>>,
    outcomes:   Vec<Option<(DecodeOutcome, usize)>>,
}

impl MaskPredictState {
    pub fn hypothesis(&self) -> &DecoderHypothesis {
        &self.hypothesis
    }

    pub fn mask(&self) -> &MaskState {
        &self.mask
    }

    pub fn is_done(&self) -> bool {
        self.hypothesis.all_frozen()
    }

    /// Decoder input: committed tokens as-is, masked positions as MASK.
    pub fn input_grid(&self, mask_id: u32) -> Vec<Vec<u32>> {
        self.hypothesis
            .grid()
            .iter()
            .enumerate()
            .map(|(b, row)| {
                row.iter()
                    .enumerate()
                    .map(|(p, &t)| if self.mask.is_masked(b, p) { mask_id } else { t })
                    .collect()
            })
            .collect()
    }

    fn finish(self) -> DecodeOutput {
        let passes = self.hypothesis.iteration();
        let sequences = self
            .outcomes
            .iter()
            .zip(self.traces)
            .enumerate()
            .map(|(b, (outcome, masked_trace))| {
                let (outcome, iterations) = outcome.unwrap_or((DecodeOutcome::Completed, 0));
                DecodedSequence {
                    tokens:      self.hypothesis.tokens(b).to_vec(),
                    confidences: self.hypothesis.confidences(b).to_vec(),
                    outcome,
                    iterations,
                    masked_trace,
                }
            })
            .collect();
        DecodeOutput { sequences, passes }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaskPredictDecoder {
    policy: StoppingPolicy,
    mask:   u32,
    pad:    u32,
}

impl MaskPredictDecoder {
    pub fn new(iterations: usize, mask: u32, pad: u32) -> NatResult<Self> {
        Ok(Self { policy: StoppingPolicy::new(iterations)?, mask, pad })
    }

    pub fn from_config(config: &NatConfig, specials: SpecialTokens) -> NatResult<Self> {
        Self::new(config.mask_iterations, specials.mask, specials.pad)
    }

    pub fn iterations(&self) -> usize {
        self.policy.budget()
    }

    pub fn init(&self, target_lengths: &[usize]) -> MaskPredictState {
        MaskPredictState {
            hypothesis: DecoderHypothesis::new(target_lengths, self.mask, self.pad),
            mask:       MaskState::all_masked(target_lengths),
            traces:     vec![Vec::new(); target_lengths.len()],
            outcomes:   vec![None; target_lengths.len()],
        }
    }

    /// Like `init`, with `target_tags[b]` committed at position 0 of row b.
    pub fn init_tagged(&self, target_lengths: &[usize], target_tags: &[u32]) -> NatResult<MaskPredictState> {
        let mut state = self.init(target_lengths);
        pin_tags(&mut state.hypothesis, target_tags)?;
        for b in 0..state.hypothesis.batch_size() {
            for p in 0..state.hypothesis.pinned(b) {
                state.mask.masked[b][p] = false;
            }
        }
        Ok(state)
    }

    /// PREDICT + REMASK for one iteration. Returns how many examples
    /// finished in this iteration.
    pub fn step(&self, state: &mut MaskPredictState, logits: &Logits) -> usize {
        let iteration = state.hypothesis.advance();
        let total     = self.policy.budget();
        let mut finished = 0;

        for b in 0..state.hypothesis.batch_size() {
            if state.hypothesis.is_frozen(b) {
                continue;
            }

            // ── PREDICT: only currently masked positions are touched ─────────
            let candidates = state.mask.masked_positions(b);
            for &p in &candidates {
                let prediction = logits.best_excluding(b, p, &[self.mask, self.pad]);
                state.hypothesis.write(b, p, prediction.token, prediction.confidence);
            }

            // ── REMASK: lowest confidence first, lower index on ties ─────────
            let len  = state.hypothesis.free_length(b);
            let keep = masked_count(len, iteration, total).min(candidates.len());
            let confidences = state.hypothesis.confidences(b);
            let mut ranked = candidates.clone();
            ranked.sort_by(|&x, &y| confidences[x].total_cmp(&confidences[y]).then(x.cmp(&y)));

            for &p in &candidates {
                state.mask.masked[b][p] = false;
            }
            for &p in &ranked[..keep] {
                state.mask.masked[b][p] = true;
            }
            state.traces[b].push(keep);

            if let Some(reason) = self.policy.after_remask(keep, iteration) {
                // forced termination leaves last predictions in place of MASK
                for &p in &ranked[..keep] {
                    state.mask.masked[b][p] = false;
                }
                state.outcomes[b] = Some((reason.outcome(), iteration));
                state.hypothesis.freeze(b);
                finished += 1;
            }
        }
        finished
    }

    /// Decode a batch whose encoder pass is already complete.
    /// A zero target length yields an empty hypothesis without any
    /// decoder pass.
    pub fn decode<P: TokenPredictor>(
        &self,
        predictor:      &P,
        target_lengths: &[usize],
    ) -> NatResult<DecodeOutput> {
        check_batch(predictor, target_lengths)?;
        self.run(predictor, self.init(target_lengths))
    }

    /// `decode` with each example's target language tag fixed at position 0.
    pub fn decode_tagged<P: TokenPredictor>(
        &self,
        predictor:      &P,
        target_lengths: &[usize],
        target_tags:    &[u32],
    ) -> NatResult<DecodeOutput> {
        check_batch(predictor, target_lengths)?;
        let state = self.init_tagged(target_lengths, target_tags)?;
        self.run(predictor, state)
    }

    fn run<P: TokenPredictor>(&self, predictor: &P, mut state: MaskPredictState) -> NatResult<DecodeOutput> {
        while !state.is_done() {
            let grid     = state.input_grid(self.mask);
            let logits   = checked_pass(predictor, &grid)?;
            let finished = self.step(&mut state, &logits);
            tracing::debug!(
                "mask-predict iteration {}/{}: {} example(s) finished",
                state.hypothesis.iteration(),
                self.iterations(),
                finished
            );
        }
        Ok(state.finish())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::testing::ScriptedPredictor;
    use crate::error::NatError;

    const MASK: u32 = 4;
    const PAD:  u32 = 0;
    const VOCAB: usize = 16;

    fn decoder(n: usize) -> MaskPredictDecoder {
        MaskPredictDecoder::new(n, MASK, PAD).unwrap()
    }

    /// Predicts token 8+p at position p with a score that grows with p,
    /// so position 0 is always the least confident.
    fn rising_confidence(batch: usize) -> ScriptedPredictor {
        ScriptedPredictor::scored(batch, VOCAB, |grid| {
            grid.iter()
                .map(|row| {
                    (0..row.len())
                        .map(|p| (8 + p as u32 % 8, 1.0 + p as f32))
                        .collect()
                })
                .collect()
        })
    }

    #[test]
    fn test_schedule_values() {
        assert_eq!((1..=4).map(|i| masked_count(4, i, 4)).collect::<Vec<_>>(), vec![3, 2, 1, 0]);
        // 5 * 1 / 2 = 2.5 rounds up
        assert_eq!(masked_count(5, 1, 2), 3);
        assert_eq!(masked_count(0, 1, 3), 0);
        assert_eq!(masked_count(7, 7, 7), 0);
    }

    #[test]
    fn test_scenario_four_by_four() {
        let predictor = rising_confidence(1);
        let out = decoder(4).decode(&predictor, &[4]).unwrap();
        let seq = &out.sequences[0];
        assert_eq!(seq.masked_trace, vec![3, 2, 1, 0]);
        assert_eq!(seq.outcome, DecodeOutcome::Completed);
        assert_eq!(seq.iterations, 4);
        assert_eq!(seq.tokens, vec![8, 9, 10, 11]);
        assert!(!seq.tokens.contains(&MASK));
    }

    #[test]
    fn test_trace_matches_schedule_for_many_shapes() {
        for n in 1..=6 {
            for len in 1..=9 {
                let predictor = rising_confidence(1);
                let out = decoder(n).decode(&predictor, &[len]).unwrap();
                let trace = &out.sequences[0].masked_trace;
                for (i, &count) in trace.iter().enumerate() {
                    assert_eq!(count, masked_count(len, i + 1, n), "len={len} n={n}");
                }
                assert!(trace.windows(2).all(|w| w[0] >= w[1]));
                assert_eq!(trace.last(), Some(&0));
                assert!(trace.len() <= n);
            }
        }
    }

    #[test]
    fn test_least_confident_positions_stay_masked() {
        let predictor = rising_confidence(1);
        let d = decoder(4);
        let mut state = d.init(&[4]);
        let logits = predictor.predict(&state.input_grid(MASK)).unwrap();
        d.step(&mut state, &logits);
        // three lowest-confidence positions are 0, 1, 2
        assert_eq!(state.mask().masked_positions(0), vec![0, 1, 2]);
        assert_eq!(state.input_grid(MASK)[0], vec![MASK, MASK, MASK, 11]);
    }

    #[test]
    fn test_equal_confidence_masks_lower_index_first() {
        let predictor = ScriptedPredictor::scored(1, VOCAB, |grid| {
            vec![(0..grid[0].len()).map(|_| (9, 2.0)).collect()]
        });
        let d = decoder(2);
        let mut state = d.init(&[4]);
        let logits = predictor.predict(&state.input_grid(MASK)).unwrap();
        d.step(&mut state, &logits);
        assert_eq!(state.mask().masked_positions(0), vec![0, 1]);
    }

    #[test]
    fn test_committed_tokens_are_never_rewritten() {
        // the model changes its mind every pass; commitments must hold
        let predictor = ScriptedPredictor::scored(1, VOCAB, |grid| {
            let masked = grid[0].iter().filter(|&&t| t == MASK).count() as u32;
            vec![(0..grid[0].len()).map(|p| (8 + masked % 8, 1.0 + p as f32)).collect()]
        });
        let out = decoder(4).decode(&predictor, &[4]).unwrap();
        // pass 1 saw 4 masks: commits pos 3 → 12; pass 2 saw 3: pos 2 → 11; ...
        assert_eq!(out.sequences[0].tokens, vec![9, 10, 11, 12]);
        for grid in predictor.seen() {
            let committed: Vec<u32> = grid[0].iter().copied().filter(|&t| t != MASK).collect();
            let expected_tail = &[9, 10, 11, 12][4 - committed.len()..];
            assert_eq!(committed, expected_tail);
        }
    }

    #[test]
    fn test_zero_length_skips_decoder() {
        let predictor = rising_confidence(1);
        let out = decoder(3).decode(&predictor, &[0]).unwrap();
        assert!(out.sequences[0].tokens.is_empty());
        assert_eq!(out.sequences[0].outcome, DecodeOutcome::Completed);
        assert_eq!(predictor.calls(), 0);
        assert_eq!(out.passes, 0);
    }

    #[test]
    fn test_short_example_finishes_early_and_stays_frozen() {
        let predictor = rising_confidence(2);
        let out = decoder(4).decode(&predictor, &[1, 4]).unwrap();
        // len 1: round(0.75)=1, round(0.5)=1, round(0.25)=0
        assert_eq!(out.sequences[0].masked_trace, vec![1, 1, 0]);
        assert_eq!(out.sequences[0].iterations, 3);
        assert_eq!(out.sequences[0].tokens, vec![8]);
        assert_eq!(out.sequences[1].masked_trace, vec![3, 2, 1, 0]);
        assert_eq!(out.passes, 4);
        let last = predictor.seen().pop().unwrap();
        assert_eq!(last[0], vec![8, PAD, PAD, PAD]);
    }

    #[test]
    fn test_target_tag_is_committed_at_position_zero() {
        const TAG: u32 = 7;
        let predictor = rising_confidence(1);
        let d = decoder(3);
        let out = d.decode_tagged(&predictor, &[4], &[TAG]).unwrap();
        let seq = &out.sequences[0];
        assert_eq!(seq.tokens[0], TAG);
        assert_eq!(&seq.tokens[1..], &[9, 10, 11]);
        // three free positions on a three-step schedule
        assert_eq!(seq.masked_trace, vec![2, 1, 0]);
        assert_eq!(seq.outcome, DecodeOutcome::Completed);
        // the tag is visible to the model from the first pass on
        assert!(predictor.seen().iter().all(|g| g[0][0] == TAG));
        assert_eq!(predictor.seen()[0][0], vec![TAG, MASK, MASK, MASK]);
    }

    #[test]
    fn test_mask_is_never_predicted() {
        // MASK always scores highest; the runner-up must be taken
        let predictor = ScriptedPredictor::scored(1, VOCAB, |grid| {
            vec![(0..grid[0].len()).map(|_| (MASK, 9.0)).collect()]
        });
        let out = decoder(2).decode(&predictor, &[3]).unwrap();
        assert!(!out.sequences[0].tokens.contains(&MASK));
        assert!(!out.sequences[0].tokens.contains(&PAD));
        assert_eq!(out.sequences[0].masked_trace, vec![2, 0]);
    }

    #[test]
    fn test_batch_mismatch_is_shape_error() {
        let predictor = rising_confidence(3);
        assert!(matches!(decoder(2).decode(&predictor, &[2, 2]), Err(NatError::Shape(_))));
    }
}
