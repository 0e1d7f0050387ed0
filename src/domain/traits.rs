// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between layers:
//
//   CorpusSource   — anything that yields parallel sentence pairs
//                    (JSON-lines files today)
//   TokenPredictor — one non-autoregressive decoder pass over a
//                    full hypothesis grid. The Transformer engine
//                    implements it on top of a finished
//                    EncoderState; tests implement it with
//                    scripted logits so each decoder can be
//                    checked without weights.

use anyhow::Result;

use crate::domain::logits::Logits;
use crate::domain::sentence_pair::SentencePair;
use crate::error::NatResult;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
pub trait CorpusSource {
    /// Load every available sentence pair.
    fn load_pairs(&self) -> Result<Vec<SentencePair>>;
}

// ─── TokenPredictor ───────────────────────────────────────────────────────────
/// One parallel decoder pass.
///
/// `grid` has `batch_size()` rows of equal width; the returned
/// logits must have shape `[batch_size, width, vocab]`. The pass is
/// read-only with respect to the predictor, so the same predictor
/// may serve many concurrent decode calls.
pub trait TokenPredictor {
    fn batch_size(&self) -> usize;

    fn predict(&self, grid: &[Vec<u32>]) -> NatResult<Logits>;
}

impl<P: TokenPredictor + ?Sized> TokenPredictor for &P {
    fn batch_size(&self) -> usize {
        (**self).batch_size()
    }

    fn predict(&self, grid: &[Vec<u32>]) -> NatResult<Logits> {
        (**self).predict(grid)
    }
}
