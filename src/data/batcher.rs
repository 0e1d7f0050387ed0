// ============================================================
// Layer 4 — Batching & Padding
// ============================================================
// Turns tagged Sequences into rectangular batches.
//
// Padding strategy is "longest in batch, capped":
//
//   padded_len = min(max(len of each sequence), max_length)
//
// Sequences longer than the cap are truncated from the tail of
// their content; the language tag at position 0 and the EOS
// sentinel survive. The padding mask is true for real tokens.
//
// Two halves:
//   pad_batch           — pure host-side padding (no Burn)
//   TranslationBatcher  — Burn Batcher producing tensors for
//                         the DataLoader, including the
//                         teacher-forced decoder input

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::TranslationSample;
use crate::data::label_shift::TeacherForcing;
use crate::domain::sequence::Sequence;

// ─── PaddedBatch ──────────────────────────────────────────────────────────────
/// Host-side rectangular batch. All rows share `padded_len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedBatch {
    pub(crate) ids:     Vec<Vec<u32>>,
    pub(crate) mask:    Vec<Vec<bool>>,
    pub(crate) lengths: Vec<usize>,
    pub(crate) pad:     u32,
}

impl PaddedBatch {
    /// Build directly from rows that already share a width.
    pub(crate) fn from_rows(ids: Vec<Vec<u32>>, lengths: Vec<usize>, pad: u32) -> Self {
        let mask = ids
            .iter()
            .zip(&lengths)
            .map(|(row, &len)| (0..row.len()).map(|p| p < len).collect())
            .collect();
        Self { ids, mask, lengths, pad }
    }

    pub fn batch_size(&self) -> usize {
        self.ids.len()
    }

    pub fn padded_len(&self) -> usize {
        self.ids.first().map_or(0, Vec::len)
    }

    pub fn ids(&self) -> &[Vec<u32>] {
        &self.ids
    }

    /// true = real token, false = padding
    pub fn mask(&self) -> &[Vec<bool>] {
        &self.mask
    }

    /// Real (unpadded, post-truncation) length of each row.
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn pad_id(&self) -> u32 {
        self.pad
    }
}

/// Pad (and if needed truncate) a group of sequences.
pub fn pad_batch(sequences: &[Sequence], max_length: usize, pad: u32) -> PaddedBatch {
    let longest    = sequences.iter().map(Sequence::len).max().unwrap_or(0);
    let padded_len = longest.min(max_length);

    let mut ids     = Vec::with_capacity(sequences.len());
    let mut lengths = Vec::with_capacity(sequences.len());
    for seq in sequences {
        let seq = seq.truncated(padded_len);
        let mut row = seq.ids().to_vec();
        lengths.push(row.len());
        row.resize(padded_len, pad);
        ids.push(row);
    }

    if longest > max_length {
        tracing::debug!("Truncated batch from {} to {} tokens", longest, max_length);
    }
    PaddedBatch::from_rows(ids, lengths, pad)
}

// ─── TokenBatch ───────────────────────────────────────────────────────────────
/// Device-side view of a PaddedBatch.
#[derive(Debug, Clone)]
pub struct TokenBatch<B: Backend> {
    /// shape: [batch_size, padded_len]
    pub ids:     Tensor<B, 2, Int>,
    /// shape: [batch_size, padded_len]; 1 = real token, 0 = padding
    pub mask:    Tensor<B, 2, Int>,
    pub lengths: Vec<usize>,
}

impl<B: Backend> TokenBatch<B> {
    pub fn from_padded(batch: &PaddedBatch, device: &B::Device) -> Self {
        let [b, l] = [batch.batch_size(), batch.padded_len()];
        let ids_flat: Vec<i32> = batch.ids.iter().flatten().map(|&x| x as i32).collect();
        let mask_flat: Vec<i32> = batch.mask.iter().flatten().map(|&m| m as i32).collect();
        Self {
            ids:     Tensor::<B, 1, Int>::from_ints(ids_flat.as_slice(), device).reshape([b, l]),
            mask:    Tensor::<B, 1, Int>::from_ints(mask_flat.as_slice(), device).reshape([b, l]),
            lengths: batch.lengths.clone(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    /// Burn attention convention: true marks a padding position.
    pub fn pad_mask(&self) -> Tensor<B, 2, Bool> {
        self.mask.clone().equal_elem(0)
    }
}

// ─── TranslationBatch ─────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TranslationBatch<B: Backend> {
    /// Encoder input
    pub source:        TokenBatch<B>,
    /// Teacher-forced decoder input
    pub decoder_input: TokenBatch<B>,
    /// Per-position supervision targets, PAD where ignored.
    /// shape: [batch_size, decoder_input padded_len]
    pub labels:        Tensor<B, 2, Int>,
}

// ─── TranslationBatcher ──────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct TranslationBatcher<B: Backend> {
    device:     B::Device,
    max_length: usize,
    pad:        u32,
    forcing:    TeacherForcing,
}

impl<B: Backend> TranslationBatcher<B> {
    pub fn new(device: B::Device, max_length: usize, pad: u32, forcing: TeacherForcing) -> Self {
        Self { device, max_length, pad, forcing }
    }
}

impl<B: Backend> Batcher<TranslationSample, TranslationBatch<B>> for TranslationBatcher<B> {
    fn batch(&self, items: Vec<TranslationSample>) -> TranslationBatch<B> {
        let sources: Vec<Sequence> = items.iter().map(|s| s.source.clone()).collect();
        let targets: Vec<Sequence> = items.into_iter().map(|s| s.target).collect();

        let source  = pad_batch(&sources, self.max_length, self.pad);
        let targets = pad_batch(&targets, self.max_length, self.pad);
        let (decoder_input, labels) = self.forcing.prepare(&targets);

        let labels_flat: Vec<i32> = labels.ids.iter().flatten().map(|&x| x as i32).collect();
        let labels = Tensor::<B, 1, Int>::from_ints(labels_flat.as_slice(), &self.device)
            .reshape([labels.batch_size(), labels.padded_len()]);

        TranslationBatch {
            source:        TokenBatch::from_padded(&source, &self.device),
            decoder_input: TokenBatch::from_padded(&decoder_input, &self.device),
            labels,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    const PAD: u32 = 0;

    fn seq(lang: &str, tag: u32, raw_len: usize) -> Sequence {
        // raw_len counts the tag and the EOS
        let content: Vec<u32> = (0..raw_len - 2).map(|i| 100 + i as u32).collect();
        Sequence::tagged(lang, tag, &content, Some(2))
    }

    #[test]
    fn test_capped_longest_padding_and_truncation() {
        let batch = pad_batch(&[seq("en", 6, 10), seq("de", 7, 20)], 15, PAD);
        assert_eq!(batch.padded_len(), 15);
        assert!(batch.ids().iter().all(|row| row.len() == 15));
        assert_eq!(batch.lengths(), &[10, 15]);
        // the long row keeps its tag at position 0 and its EOS at the end
        assert_eq!(batch.ids()[1][0], 7);
        assert_eq!(batch.ids()[1][14], 2);
        assert_eq!(batch.ids()[0][0], 6);
    }

    #[test]
    fn test_padding_mask_marks_only_real_tokens() {
        let batch = pad_batch(&[seq("en", 6, 3), seq("en", 6, 5)], 64, PAD);
        assert_eq!(batch.padded_len(), 5);
        assert_eq!(batch.mask()[0], vec![true, true, true, false, false]);
        assert_eq!(batch.ids()[0][3..], [PAD, PAD]);
        assert!(batch.mask()[1].iter().all(|&m| m));
    }

    #[test]
    fn test_padded_len_is_min_of_longest_and_cap() {
        for cap in 1..12 {
            let batch = pad_batch(&[seq("en", 6, 4), seq("en", 6, 7), seq("de", 7, 2)], cap, PAD);
            assert_eq!(batch.padded_len(), 7.min(cap));
            for (row, &len) in batch.mask().iter().zip(batch.lengths()) {
                assert_eq!(row.iter().filter(|&&m| m).count(), len);
                assert!(row[len..].iter().all(|&m| !m));
            }
        }
    }

    #[test]
    fn test_empty_group() {
        let batch = pad_batch(&[], 8, PAD);
        assert_eq!(batch.batch_size(), 0);
        assert_eq!(batch.padded_len(), 0);
    }

    #[test]
    fn test_token_batch_tensors() {
        type B = NdArray;
        let device = Default::default();
        let padded = pad_batch(&[seq("en", 6, 3), seq("en", 6, 4)], 16, PAD);
        let batch  = TokenBatch::<B>::from_padded(&padded, &device);
        assert_eq!(batch.ids.dims(), [2, 4]);
        let pad_mask: Vec<bool> = batch.pad_mask().into_data().to_vec::<bool>().unwrap();
        assert_eq!(pad_mask, vec![false, false, false, true, false, false, false, false]);
    }
}
