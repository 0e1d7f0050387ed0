// ============================================================
// Layer 4 — Parallel Corpus Loader
// ============================================================
// Reads a JSON-lines parallel corpus, one pair per line:
//
//   {"translation": {"en": "Hello world", "de": "Hallo Welt"}}
//
// Each line may carry any number of languages; only the chosen
// source and target are read. Lines missing either side, or
// that fail to parse, are skipped with a warning rather than
// failing the whole load.
//
// Text is normalised before it reaches the tokenizer: Unicode
// space variants and control characters become plain spaces,
// and runs of whitespace collapse to one.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::sentence_pair::SentencePair;
use crate::domain::traits::CorpusSource;

#[derive(Debug, Deserialize)]
struct CorpusLine {
    translation: HashMap<String, String>,
}

/// Loads sentence pairs for one translation direction.
/// Implements the CorpusSource trait from Layer 3.
pub struct JsonlCorpus {
    path:        PathBuf,
    source_lang: String,
    target_lang: String,
}

impl JsonlCorpus {
    pub fn new(
        path:        impl Into<PathBuf>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            path:        path.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_line(&self, line: &str) -> Result<Option<SentencePair>> {
        let parsed: CorpusLine = serde_json::from_str(line)?;
        let source = parsed.translation.get(&self.source_lang).map(|s| normalize(s));
        let target = parsed.translation.get(&self.target_lang).map(|s| normalize(s));
        Ok(match (source, target) {
            (Some(s), Some(t)) if !s.is_empty() && !t.is_empty() => Some(SentencePair::new(
                self.source_lang.clone(),
                self.target_lang.clone(),
                s,
                t,
            )),
            _ => None,
        })
    }
}

impl CorpusSource for JsonlCorpus {
    fn load_pairs(&self) -> Result<Vec<SentencePair>> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read corpus '{}'", self.path.display()))?;

        let mut pairs   = Vec::new();
        let mut skipped = 0usize;
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match self.parse_line(line) {
                Ok(Some(pair)) => pairs.push(pair),
                Ok(None) => skipped += 1,
                Err(e) => {
                    tracing::warn!("Skipping corpus line {}: {}", n + 1, e);
                    skipped += 1;
                }
            }
        }

        tracing::info!(
            "Loaded {} {}→{} pairs from '{}' ({} skipped)",
            pairs.len(),
            self.source_lang,
            self.target_lang,
            self.path.display(),
            skipped
        );
        Ok(pairs)
    }
}

/// Collapse whitespace and strip invisible characters.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── CorpusStats ──────────────────────────────────────────────────────────────
/// Whitespace-word length statistics of a corpus, per side.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CorpusStats {
    pub pairs:          usize,
    pub max_length_src: usize,
    pub max_length_tgt: usize,
    pub avg_length_src: f64,
    pub avg_length_tgt: f64,
}

impl CorpusStats {
    pub fn compute(pairs: &[SentencePair]) -> Self {
        if pairs.is_empty() {
            return Self::default();
        }
        let mut stats = Self { pairs: pairs.len(), ..Self::default() };
        let (mut sum_src, mut sum_tgt) = (0usize, 0usize);
        for pair in pairs {
            let (src, tgt) = pair.word_counts();
            stats.max_length_src = stats.max_length_src.max(src);
            stats.max_length_tgt = stats.max_length_tgt.max(tgt);
            sum_src += src;
            sum_tgt += tgt;
        }
        stats.avg_length_src = sum_src as f64 / pairs.len() as f64;
        stats.avg_length_tgt = sum_tgt as f64 / pairs.len() as f64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn corpus_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        f
    }

    #[test]
    fn test_loads_requested_direction() {
        let f = corpus_file(&[
            r#"{"translation": {"en": "Hello  world", "de": "Hallo Welt"}}"#,
            r#"{"translation": {"en": "the", "de": "die"}}"#,
        ]);
        let pairs = JsonlCorpus::new(f.path(), "en", "de").load_pairs().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], SentencePair::new("en", "de", "Hello world", "Hallo Welt"));
    }

    #[test]
    fn test_skips_broken_and_one_sided_lines() {
        let f = corpus_file(&[
            r#"{"translation": {"en": "Hello", "de": "Hallo"}}"#,
            r#"{"translation": {"en": "only english"}}"#,
            "not json",
            "",
            r#"{"translation": {"en": "   ", "de": "leer"}}"#,
        ]);
        let pairs = JsonlCorpus::new(f.path(), "en", "de").load_pairs().unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_missing_file_is_error() {
        let corpus = JsonlCorpus::new("/definitely/not/here.jsonl", "en", "de");
        assert!(corpus.load_pairs().is_err());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a\u{00A0}\tb\r\n  c\u{200B}"), "a b c");
    }

    #[test]
    fn test_stats() {
        let pairs = vec![
            SentencePair::new("en", "de", "a b c", "x"),
            SentencePair::new("en", "de", "a", "x y z w"),
        ];
        let stats = CorpusStats::compute(&pairs);
        assert_eq!(stats.max_length_src, 3);
        assert_eq!(stats.max_length_tgt, 4);
        assert!((stats.avg_length_src - 2.0).abs() < 1e-9);
        assert!((stats.avg_length_tgt - 2.5).abs() < 1e-9);
        assert_eq!(CorpusStats::compute(&[]), CorpusStats::default());
    }
}
