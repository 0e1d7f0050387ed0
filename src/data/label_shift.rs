// ============================================================
// Layer 4 — Label Shift (teacher forcing)
// ============================================================
// Builds the decoder input and the supervision targets from a
// padded target batch. Both come out with the same width, so the
// loss compares position p of the logits with position p of the
// labels without any realignment.
//
//   ShiftRight  input  = [BOS, y0, y1, ..., y(L-2)]
//               labels = [y0,  y1, y2, ..., y(L-1)]
//
//   DropLast    input  = [y0, ..., y(L-2)]
//               labels = [y1, ..., y(L-1)]
//
// The input mask mirrors the label mask: a position is real only
// where its label is real.

use crate::data::batcher::PaddedBatch;

/// Right-shift one row: BOS in front, last token dropped.
pub fn shift_right(labels: &[u32], bos: u32) -> Vec<u32> {
    if labels.is_empty() {
        return Vec::new();
    }
    std::iter::once(bos)
        .chain(labels[..labels.len() - 1].iter().copied())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeacherForcing {
    /// `shift_labels_right = true`
    ShiftRight { bos: u32 },
    /// `shift_labels_right = false`
    DropLast,
}

impl TeacherForcing {
    pub fn new(shift_labels_right: bool, bos: u32) -> Self {
        if shift_labels_right {
            TeacherForcing::ShiftRight { bos }
        } else {
            TeacherForcing::DropLast
        }
    }

    /// Returns `(decoder_input, labels)`, both of the same width.
    pub fn prepare(&self, targets: &PaddedBatch) -> (PaddedBatch, PaddedBatch) {
        let pad = targets.pad_id();
        match *self {
            TeacherForcing::ShiftRight { bos } => {
                let inputs = targets.ids().iter().map(|row| shift_right(row, bos)).collect();
                let lengths = targets.lengths().to_vec();
                (
                    PaddedBatch::from_rows(inputs, lengths.clone(), pad),
                    PaddedBatch::from_rows(targets.ids().to_vec(), lengths, pad),
                )
            }
            TeacherForcing::DropLast => {
                let width = targets.padded_len().saturating_sub(1);
                let lengths: Vec<usize> =
                    targets.lengths().iter().map(|&len| len.saturating_sub(1)).collect();
                let inputs = targets.ids().iter().map(|row| row[..width].to_vec()).collect();
                let labels = targets
                    .ids()
                    .iter()
                    .map(|row| row.get(1..).map(<[u32]>::to_vec).unwrap_or_default())
                    .collect();
                (
                    PaddedBatch::from_rows(inputs, lengths.clone(), pad),
                    PaddedBatch::from_rows(labels, lengths, pad),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::pad_batch;
    use crate::domain::sequence::Sequence;

    const BOS: u32 = 1;
    const PAD: u32 = 0;

    #[test]
    fn test_shift_right_layout() {
        for len in 1..8usize {
            let labels: Vec<u32> = (0..len as u32).map(|i| 10 + i).collect();
            let shifted = shift_right(&labels, BOS);
            assert_eq!(shifted.len(), len);
            assert_eq!(shifted[0], BOS);
            for k in 1..len {
                assert_eq!(shifted[k], labels[k - 1]);
            }
        }
        assert!(shift_right(&[], BOS).is_empty());
    }

    #[test]
    fn test_shift_right_batch_keeps_width_and_mask() {
        let targets = pad_batch(
            &[
                Sequence::tagged("de", 7, &[10, 11], Some(2)),
                Sequence::tagged("de", 7, &[10], Some(2)),
            ],
            16,
            PAD,
        );
        let (input, labels) = TeacherForcing::new(true, BOS).prepare(&targets);
        assert_eq!(input.padded_len(), labels.padded_len());
        assert_eq!(input.ids()[0], vec![BOS, 7, 10, 11]);
        assert_eq!(labels.ids()[0], vec![7, 10, 11, 2]);
        assert_eq!(input.mask()[1], vec![true, true, true, false]);
        assert_eq!(labels.ids()[1], vec![7, 10, 2, PAD]);
    }

    #[test]
    fn test_drop_last_split() {
        let targets = pad_batch(&[Sequence::tagged("de", 7, &[10, 11], Some(2))], 16, PAD);
        let (input, labels) = TeacherForcing::new(false, BOS).prepare(&targets);
        assert_eq!(input.ids()[0], vec![7, 10, 11]);
        assert_eq!(labels.ids()[0], vec![10, 11, 2]);
        assert_eq!(input.lengths(), &[3]);
    }
}
