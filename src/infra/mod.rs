// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File-system concerns shared by training and translation:
//
//   checkpoint.rs      — model weights (CompactRecorder) plus the
//                        run and architecture configs as JSON, so
//                        translation rebuilds the same model
//
//   tokenizer_store.rs — builds a word-level tokenizer with the
//                        sentinels and language tags reserved
//                        first, or loads a saved one
//
//   metrics.rs         — per-step and per-epoch CSV metrics

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer training, saving, and loading
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;
