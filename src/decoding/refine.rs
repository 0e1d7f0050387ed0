// ============================================================
// Refine-NAT Iterative Refinement Decoder
// ============================================================
// States: INIT → REFINE ⟲ → {CONVERGED | BUDGET_EXHAUSTED}
//
//   INIT    every real position holds the placeholder token;
//           the first pass therefore sees only the source
//   REFINE  feed the whole current hypothesis (unmasked,
//           unshifted) through the decoder, take the per-
//           position argmax (lowest id on ties, never MASK or
//           PAD) as candidate; a pinned tag is left alone
//   check   candidate == current  → CONVERGED
//           otherwise adopt it, bump the counter, and stop
//           with BUDGET_EXHAUSTED once counter == budget
//
// The first pass counts as iteration 1 and is compared with the
// placeholder hypothesis, so a decoder that is the identity
// after its first pass converges at iteration 2.

use crate::config::NatConfig;
use crate::decoding::stopping::StoppingPolicy;
use crate::decoding::{check_batch, checked_pass, pin_tags};
use crate::domain::hypothesis::{DecodeOutcome, DecodeOutput, DecodedSequence, DecoderHypothesis};
use crate::domain::logits::{Logits, Prediction};
use crate::domain::traits::TokenPredictor;
use crate::domain::vocabulary::SpecialTokens;
use crate::error::NatResult;

#[derive(Debug, Clone, Copy)]
pub struct RefineDecoder {
    policy:      StoppingPolicy,
    placeholder: u32,
    pad:         u32,
}

/// Working state of one Refine-NAT call. The hypothesis doubles as
/// the previous-iteration snapshot each candidate is compared with.
#[derive(Debug, Clone)]
pub struct RefinementState {
    hypothesis: DecoderHypothesis,
    outcomes:   Vec<Option<(DecodeOutcome, usize)>>,
}

impl RefinementState {
    pub fn hypothesis(&self) -> &DecoderHypothesis {
        &self.hypothesis
    }

    pub fn is_done(&self) -> bool {
        self.hypothesis.all_frozen()
    }

    fn finish(self) -> DecodeOutput {
        let passes = self.hypothesis.iteration();
        let sequences = self
            .outcomes
            .iter()
            .enumerate()
            .map(|(b, outcome)| {
                // only zero-length rows are frozen without a recorded outcome
                let (outcome, iterations) = outcome.unwrap_or((DecodeOutcome::Converged, 0));
                DecodedSequence {
                    tokens:       self.hypothesis.tokens(b).to_vec(),
                    confidences:  self.hypothesis.confidences(b).to_vec(),
                    outcome,
                    iterations,
                    masked_trace: Vec::new(),
                }
            })
            .collect();
        DecodeOutput { sequences, passes }
    }
}

impl RefineDecoder {
    pub fn new(budget: usize, placeholder: u32, pad: u32) -> NatResult<Self> {
        Ok(Self { policy: StoppingPolicy::new(budget)?, placeholder, pad })
    }

    /// Budget from `refinement_iterations`; MASK is the neutral placeholder.
    pub fn from_config(config: &NatConfig, specials: SpecialTokens) -> NatResult<Self> {
        Self::new(config.refinement_iterations, specials.mask, specials.pad)
    }

    pub fn budget(&self) -> usize {
        self.policy.budget()
    }

    pub fn init(&self, target_lengths: &[usize]) -> RefinementState {
        RefinementState {
            hypothesis: DecoderHypothesis::new(target_lengths, self.placeholder, self.pad),
            outcomes:   vec![None; target_lengths.len()],
        }
    }

    /// Like `init`, with `target_tags[b]` pinned at position 0 of row b.
    pub fn init_tagged(&self, target_lengths: &[usize], target_tags: &[u32]) -> NatResult<RefinementState> {
        let mut state = self.init(target_lengths);
        pin_tags(&mut state.hypothesis, target_tags)?;
        Ok(state)
    }

    /// Apply one pass worth of logits. Returns how many examples
    /// reached a terminal state in this pass.
    pub fn step(&self, state: &mut RefinementState, logits: &Logits) -> usize {
        let iteration = state.hypothesis.advance();
        let mut settled = 0;

        for b in 0..state.hypothesis.batch_size() {
            if state.hypothesis.is_frozen(b) {
                continue;
            }
            let start = state.hypothesis.pinned(b);
            let len   = state.hypothesis.target_length(b);
            let candidate: Vec<Prediction> = (start..len)
                .map(|p| logits.best_excluding(b, p, &[self.placeholder, self.pad]))
                .collect();
            let changed = candidate
                .iter()
                .zip(&state.hypothesis.tokens(b)[start..])
                .any(|(c, &t)| c.token != t);

            for (offset, c) in candidate.iter().enumerate() {
                state.hypothesis.write(b, start + offset, c.token, c.confidence);
            }

            if let Some(reason) = self.policy.after_refinement(changed, iteration) {
                state.outcomes[b] = Some((reason.outcome(), iteration));
                state.hypothesis.freeze(b);
                settled += 1;
            }
        }
        settled
    }

    /// Decode a batch whose encoder pass is already complete.
    /// `target_lengths` must have one entry per encoded example.
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

    fn run<P: TokenPredictor>(&self, predictor: &P, mut state: RefinementState) -> NatResult<DecodeOutput> {
        while !state.is_done() {
            let logits  = checked_pass(predictor, state.hypothesis.grid())?;
            let settled = self.step(&mut state, &logits);
            tracing::debug!(
                "refine pass {}: {} example(s) settled",
                state.hypothesis.iteration(),
                settled
            );
        }

        let output = state.finish();
        tracing::debug!(
            "Refine-NAT finished after {} pass(es), budget exhausted: {}",
            output.passes,
            output.any_budget_exhausted()
        );
        Ok(output)
    }
}
