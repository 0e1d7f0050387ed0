// ============================================================
// Layer 3 — Host-side Logits
// ============================================================
// Decoder output copied off the device as a flat row-major
// buffer of shape [batch, len, vocab]. Token selection happens
// here, not on the device, so that argmax ties resolve the same
// way on every backend: the lowest token id wins.

use crate::error::{NatError, NatResult};

/// A selected token and the probability mass the softmax gives it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub token:      u32,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct Logits {
    data:  Vec<f32>,
    batch: usize,
    len:   usize,
    vocab: usize,
}

impl Logits {
    /// Wrap a flat buffer. Rejects a size mismatch (`Shape`) and any
    /// NaN or infinity (`NumericalInstability`).
    pub fn new(data: Vec<f32>, [batch, len, vocab]: [usize; 3]) -> NatResult<Self> {
        if data.len() != batch * len * vocab {
            return Err(NatError::shape(batch * len * vocab, data.len(), "logits buffer size"));
        }
        if vocab == 0 && batch * len > 0 {
            return Err(NatError::Shape("logits have an empty vocabulary axis".into()));
        }
        if let Some(i) = data.iter().position(|x| !x.is_finite()) {
            return Err(NatError::NumericalInstability {
                context: format!(
                    "decoder logits at batch {}, position {}",
                    i / (len * vocab),
                    (i / vocab) % len
                ),
            });
        }
        Ok(Self { data, batch, len, vocab })
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.batch, self.len, self.vocab]
    }

    pub fn row(&self, b: usize, p: usize) -> &[f32] {
        let start = (b * self.len + p) * self.vocab;
        &self.data[start..start + self.vocab]
    }

    /// Argmax at (b, p), lowest id on ties, with its softmax probability.
    pub fn best(&self, b: usize, p: usize) -> Prediction {
        self.best_excluding(b, p, &[])
    }

    /// Argmax over every id not in `excluded`. The confidence is still
    /// the probability under the full softmax. Falls back to the plain
    /// argmax if every id is excluded.
    pub fn best_excluding(&self, b: usize, p: usize, excluded: &[u32]) -> Prediction {
        let row = self.row(b, p);
        let mut best: Option<(usize, f32)> = None;
        for (id, &v) in row.iter().enumerate() {
            if excluded.contains(&(id as u32)) {
                continue;
            }
            // strict: an equal score never displaces a lower id
            if best.map_or(true, |(_, top)| v > top) {
                best = Some((id, v));
            }
        }
        let (best_id, best_val) = match best {
            Some(found) => found,
            None if excluded.is_empty() => return Prediction { token: 0, confidence: 0.0 },
            None => return self.best(b, p),
        };
        let max   = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let denom: f32 = row.iter().map(|&v| (v - max).exp()).sum();
        Prediction { token: best_id as u32, confidence: (best_val - max).exp() / denom }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tie_break_prefers_lowest_id() {
        // ids 3 and 7 share the maximum score
        let mut row = vec![0.0f32; 10];
        row[7] = 5.0;
        row[3] = 5.0;
        let logits = Logits::new(row, [1, 1, 10]).unwrap();
        assert_eq!(logits.best(0, 0).token, 3);
    }

    #[test]
    fn test_confidence_is_softmax_probability() {
        let logits = Logits::new(vec![0.0, 0.0, 0.0, 0.0], [1, 1, 4]).unwrap();
        let p = logits.best(0, 0);
        assert_eq!(p.token, 0);
        assert!((p.confidence - 0.25).abs() < 1e-6);

        let ln3 = 3.0f32.ln();
        let logits = Logits::new(vec![ln3, 0.0], [1, 1, 2]).unwrap();
        assert!((logits.best(0, 0).confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_rows_are_addressed_row_major() {
        let data: Vec<f32> = (0..12).map(|x| x as f32).collect();
        let logits = Logits::new(data, [2, 2, 3]).unwrap();
        assert_eq!(logits.row(1, 0), &[6.0, 7.0, 8.0]);
        assert_eq!(logits.best(1, 1).token, 2);
    }

    #[test]
    fn test_excluded_ids_are_skipped() {
        // MASK (4) scores highest, PAD (0) second; 9 is the best real token
        let mut row = vec![0.0f32; 10];
        row[4] = 6.0;
        row[0] = 5.0;
        row[9] = 3.0;
        let logits = Logits::new(row.clone(), [1, 1, 10]).unwrap();
        assert_eq!(logits.best(0, 0).token, 4);

        let p = logits.best_excluding(0, 0, &[4, 0]);
        assert_eq!(p.token, 9);
        let denom: f32 = row.iter().map(|&v| (v - 6.0f32).exp()).sum();
        assert!((p.confidence - (-3.0f32).exp() / denom).abs() < 1e-6);
    }

    #[test]
    fn test_excluding_everything_falls_back() {
        let logits = Logits::new(vec![1.0, 2.0], [1, 1, 2]).unwrap();
        assert_eq!(logits.best_excluding(0, 0, &[0, 1]).token, 1);
    }

    #[test]
    fn test_rejects_non_finite() {
        let err = Logits::new(vec![0.0, f32::NAN, 0.0, 0.0], [1, 2, 2]).unwrap_err();
        assert!(matches!(err, NatError::NumericalInstability { ref context } if context.contains("position 0")));
        assert!(Logits::new(vec![f32::INFINITY], [1, 1, 1]).is_err());
    }

    #[test]
    fn test_rejects_wrong_size() {
        assert!(matches!(Logits::new(vec![0.0; 5], [1, 2, 3]), Err(NatError::Shape(_))));
    }
}
