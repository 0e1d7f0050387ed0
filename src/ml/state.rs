use burn::prelude::*;

use crate::ml::model::ForwardMode;

/// Encoder output for one batch. Built once by `NatEngine::encode`
/// and only ever read afterwards: both decoders and the training
/// path consume it by reference.
#[derive(Debug, Clone)]
pub struct EncoderState<B: Backend> {
    /// shape: [batch_size, src_len, d_model]
    pub(crate) memory:   Tensor<B, 3>,
    /// shape: [batch_size, src_len], true marks padding
    pub(crate) pad_mask: Tensor<B, 2, Bool>,
    pub(crate) lengths:  Vec<usize>,
    pub(crate) mode:     ForwardMode,
}

impl<B: Backend> EncoderState<B> {
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    /// Real source length of each example.
    pub fn source_lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn mode(&self) -> ForwardMode {
        self.mode
    }

    pub fn memory(&self) -> &Tensor<B, 3> {
        &self.memory
    }
}
