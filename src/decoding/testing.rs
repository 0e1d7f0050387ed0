//! Scripted predictors for decoder tests.

use std::cell::RefCell;

use crate::domain::logits::Logits;
use crate::domain::traits::TokenPredictor;
use crate::error::NatResult;

type Script = Box<dyn Fn(&[Vec<u32>]) -> Vec<Vec<(u32, f32)>>>;

/// Flat logits where each position's chosen token scores `margin`
/// and every other token scores 0.
pub(crate) fn logits_for(tokens: &[Vec<u32>], vocab: usize, margin: f32) -> Vec<f32> {
    let scored: Vec<Vec<(u32, f32)>> = tokens
        .iter()
        .map(|row| row.iter().map(|&t| (t, margin)).collect())
        .collect();
    scored_logits(&scored, vocab)
}

fn scored_logits(scored: &[Vec<(u32, f32)>], vocab: usize) -> Vec<f32> {
    let mut data = Vec::new();
    for row in scored {
        for &(token, score) in row {
            let mut position = vec![0.0f32; vocab];
            position[token as usize] = score;
            data.extend(position);
        }
    }
    data
}

/// Turns each input grid into output logits through a closure and
/// remembers every grid it was shown.
pub(crate) struct ScriptedPredictor {
    batch:  usize,
    vocab:  usize,
    script: Script,
    seen:   RefCell<Vec<Vec<Vec<u32>>>>,
}

impl ScriptedPredictor {
    /// The closure picks one token per position; it scores well above the rest.
    pub(crate) fn new<F>(batch: usize, vocab: usize, f: F) -> Self
    where
        F: Fn(&[Vec<u32>]) -> Vec<Vec<u32>> + 'static,
    {
        Self::scored(batch, vocab, move |grid| {
            f(grid)
                .into_iter()
                .map(|row| row.into_iter().map(|t| (t, 4.0)).collect())
                .collect()
        })
    }

    /// The closure picks a token and its raw score per position, which
    /// controls the resulting softmax confidence.
    pub(crate) fn scored<F>(batch: usize, vocab: usize, f: F) -> Self
    where
        F: Fn(&[Vec<u32>]) -> Vec<Vec<(u32, f32)>> + 'static,
    {
        Self { batch, vocab, script: Box::new(f), seen: RefCell::new(Vec::new()) }
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.borrow().len()
    }

    pub(crate) fn seen(&self) -> Vec<Vec<Vec<u32>>> {
        self.seen.borrow().clone()
    }
}

impl TokenPredictor for ScriptedPredictor {
    fn batch_size(&self) -> usize {
        self.batch
    }

    fn predict(&self, grid: &[Vec<u32>]) -> NatResult<Logits> {
        self.seen.borrow_mut().push(grid.to_vec());
        let scored = (self.script)(grid);
        let width  = grid.first().map_or(0, Vec::len);
        Logits::new(scored_logits(&scored, self.vocab), [grid.len(), width, self.vocab])
    }
}
