// ============================================================
// Layer 3 — Decoder Hypothesis and Decode Results
// ============================================================
// DecoderHypothesis is the per-call working state of an
// iterative decoder: one row of token ids per batch element,
// all rows padded to the widest target length so the batch
// stays rectangular. Each row carries a frozen flag; once set,
// every write to that row is refused. Positions past a row's
// own target length hold PAD and are never written. A row may
// also start with a pinned position 0 (the target language tag)
// that no decoder pass can overwrite.
//
// A hypothesis is created at iteration 0, owned by exactly one
// decode call, and dropped when the stopping policy halts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct DecoderHypothesis {
    tokens:         Vec<Vec<u32>>,
    confidence:     Vec<Vec<f32>>,
    target_lengths: Vec<usize>,
    pinned:         Vec<usize>,
    frozen:         Vec<bool>,
    iteration:      usize,
}

impl DecoderHypothesis {
    /// Every real position is set to `fill`, padding positions to `pad`.
    /// Rows of length 0 start frozen.
    pub fn new(target_lengths: &[usize], fill: u32, pad: u32) -> Self {
        let width = target_lengths.iter().copied().max().unwrap_or(0);
        let tokens = target_lengths
            .iter()
            .map(|&len| (0..width).map(|p| if p < len { fill } else { pad }).collect())
            .collect();
        Self {
            tokens,
            confidence:     vec![vec![0.0; width]; target_lengths.len()],
            target_lengths: target_lengths.to_vec(),
            pinned:         vec![0; target_lengths.len()],
            frozen:         target_lengths.iter().map(|&len| len == 0).collect(),
            iteration:      0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.tokens.len()
    }

    /// Padded width shared by all rows.
    pub fn width(&self) -> usize {
        self.tokens.first().map_or(0, Vec::len)
    }

    pub fn target_length(&self, b: usize) -> usize {
        self.target_lengths[b]
    }

    pub fn target_lengths(&self) -> &[usize] {
        &self.target_lengths
    }

    /// The full rectangular grid, padding included.
    pub fn grid(&self) -> &[Vec<u32>] {
        &self.tokens
    }

    /// Real (unpadded) tokens of row `b`.
    pub fn tokens(&self, b: usize) -> &[u32] {
        &self.tokens[b][..self.target_lengths[b]]
    }

    pub fn confidences(&self, b: usize) -> &[f32] {
        &self.confidence[b][..self.target_lengths[b]]
    }

    /// Commit `token` at position 0 of row `b` for good. A row with
    /// nothing left to predict is frozen. Returns false for an empty row.
    pub fn pin_first(&mut self, b: usize, token: u32) -> bool {
        if self.target_lengths[b] == 0 {
            return false;
        }
        self.tokens[b][0]     = token;
        self.confidence[b][0] = 1.0;
        self.pinned[b]        = 1;
        if self.target_lengths[b] == 1 {
            self.frozen[b] = true;
        }
        true
    }

    /// Leading positions of row `b` that decoding never touches.
    pub fn pinned(&self, b: usize) -> usize {
        self.pinned[b]
    }

    /// Positions of row `b` the decoder still has to fill.
    pub fn free_length(&self, b: usize) -> usize {
        self.target_lengths[b] - self.pinned[b]
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn advance(&mut self) -> usize {
        self.iteration += 1;
        self.iteration
    }

    pub fn is_frozen(&self, b: usize) -> bool {
        self.frozen[b]
    }

    pub fn all_frozen(&self) -> bool {
        self.frozen.iter().all(|&f| f)
    }

    pub fn freeze(&mut self, b: usize) {
        self.frozen[b] = true;
    }

    /// Write one position. Refused (returns false) when the row is
    /// frozen, `p` is pinned, or `p` lies in the row's padding.
    pub fn write(&mut self, b: usize, p: usize, token: u32, confidence: f32) -> bool {
        if self.frozen[b] || p < self.pinned[b] || p >= self.target_lengths[b] {
            return false;
        }
        self.tokens[b][p]     = token;
        self.confidence[b][p] = confidence;
        true
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────
/// Terminal state reached by one example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeOutcome {
    /// Refine-NAT reached a fixed point.
    Converged,
    /// Mask-predict committed every position.
    Completed,
    /// The iteration budget ran out first; the hypothesis is best-effort.
    BudgetExhausted,
}

impl DecodeOutcome {
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, DecodeOutcome::BudgetExhausted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedSequence {
    pub tokens:      Vec<u32>,
    /// Per-position probability of the chosen token
    pub confidences: Vec<f32>,
    pub outcome:     DecodeOutcome,
    /// Decoder passes that touched this example
    pub iterations:  usize,
    /// Mask-predict only: masked count after each iteration
    pub masked_trace: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeOutput {
    pub sequences: Vec<DecodedSequence>,
    /// Decoder passes run for the whole batch (lock-step)
    pub passes:    usize,
}

impl DecodeOutput {
    pub fn token_ids(&self) -> Vec<Vec<u32>> {
        self.sequences.iter().map(|s| s.tokens.clone()).collect()
    }

    pub fn any_budget_exhausted(&self) -> bool {
        self.sequences.iter().any(|s| s.outcome.is_budget_exhausted())
    }
}
