// ============================================================
// Layer 3 — Sequence
// ============================================================
// One tokenised sentence: [tag] content... [EOS]
//
// The language tag always sits at position 0. Tag and trailing
// EOS are "protected": truncation removes content tokens from
// the end of the content span and never touches the sentinels.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    language: String,
    ids:      Vec<u32>,
    /// Number of protected tokens at the start (the tag, plus BOS if present)
    prefix:   usize,
    /// Number of protected tokens at the end (EOS if present)
    suffix:   usize,
}

impl Sequence {
    /// `[tag] content [eos]`
    pub fn tagged(language: impl Into<String>, tag: u32, content: &[u32], eos: Option<u32>) -> Self {
        let mut ids = Vec::with_capacity(content.len() + 2);
        ids.push(tag);
        ids.extend_from_slice(content);
        if let Some(eos) = eos {
            ids.push(eos);
        }
        Self { language: language.into(), ids, prefix: 1, suffix: eos.is_some() as usize }
    }

    /// A raw id list with no protected positions (e.g. decoder output).
    pub fn untagged(language: impl Into<String>, ids: Vec<u32>) -> Self {
        Self { language: language.into(), ids, prefix: 0, suffix: 0 }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Logical length (no padding is ever stored here).
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn tag(&self) -> Option<u32> {
        (self.prefix > 0).then(|| self.ids[0])
    }

    pub fn content(&self) -> &[u32] {
        &self.ids[self.prefix..self.ids.len() - self.suffix]
    }

    /// Copy of this sequence cut down to at most `max_len` tokens.
    ///
    /// Content is dropped from its tail first. If `max_len` is smaller
    /// than the protected tokens themselves, the prefix wins over the
    /// suffix.
    pub fn truncated(&self, max_len: usize) -> Sequence {
        if self.ids.len() <= max_len {
            return self.clone();
        }
        let prefix_kept = self.prefix.min(max_len);
        let suffix_kept = self.suffix.min(max_len - prefix_kept);
        let content_kept = max_len - prefix_kept - suffix_kept;

        let content = self.content();
        let mut ids = Vec::with_capacity(max_len);
        ids.extend_from_slice(&self.ids[..prefix_kept]);
        ids.extend_from_slice(&content[..content_kept.min(content.len())]);
        ids.extend_from_slice(&self.ids[self.ids.len() - suffix_kept..]);

        Sequence {
            language: self.language.clone(),
            ids,
            prefix: prefix_kept,
            suffix: suffix_kept,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_is_first() {
        let s = Sequence::tagged("en", 6, &[8, 9], Some(2));
        assert_eq!(s.ids(), &[6, 8, 9, 2]);
        assert_eq!(s.tag(), Some(6));
        assert_eq!(s.content(), &[8, 9]);
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn test_truncation_keeps_tag_and_eos() {
        let s = Sequence::tagged("en", 6, &[10, 11, 12, 13, 14], Some(2));
        let t = s.truncated(4);
        assert_eq!(t.ids(), &[6, 10, 11, 2]);
        assert_eq!(t.tag(), Some(6));
    }

    #[test]
    fn test_truncation_noop_when_short_enough() {
        let s = Sequence::tagged("de", 7, &[10], Some(2));
        assert_eq!(s.truncated(10), s);
    }

    #[test]
    fn test_truncation_below_protected_size_keeps_tag() {
        let s = Sequence::tagged("de", 7, &[10, 11], Some(2));
        assert_eq!(s.truncated(1).ids(), &[7]);
        assert_eq!(s.truncated(2).ids(), &[7, 2]);
    }

    #[test]
    fn test_untagged_has_no_protected_tokens() {
        let s = Sequence::untagged("de", vec![3, 4, 5]);
        assert_eq!(s.tag(), None);
        assert_eq!(s.truncated(2).ids(), &[3, 4]);
    }
}
