// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from a raw parallel corpus to device-ready batches.
//
//   corpus.jsonl
//       │
//       ▼
//   JsonlCorpus         → SentencePairs for one direction
//       │
//       ▼
//   split_train_val     → seeded shuffle, train/validation
//       │
//       ▼
//   TagAdapter          → tokenizer ids wrapped as [tag] ... [EOS]
//       │
//       ▼
//   TranslationDataset  → Burn Dataset of tagged pairs
//       │
//       ▼
//   TranslationBatcher  → padding + label shift → tensors
//       │
//       ▼
//   DataLoader          → feeds the training loop

/// JSON-lines corpus loading and length statistics
pub mod corpus;

/// Language tag insertion and detokenisation
pub mod tag_adapter;

/// Burn Dataset of tagged sentence pairs
pub mod dataset;

/// Longest-capped padding and Burn batching
pub mod batcher;

/// Teacher-forced decoder input construction
pub mod label_shift;

/// Seeded train/validation split
pub mod splitter;
