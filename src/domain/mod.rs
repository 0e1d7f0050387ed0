// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that define what the translation system
// works with. No Burn types here: everything in this layer
// is testable on the host without a device.
//
//   vocabulary     — dense token ↔ id map with language tags
//                    and BOS/EOS/PAD/MASK sentinels
//   sequence       — one tokenised, tagged sentence
//   sentence_pair  — a raw source/target pair from a corpus
//   logits         — host-side per-position scores with
//                    deterministic argmax and confidence
//   hypothesis     — decoder working state and decode results
//   traits         — seams between layers (corpus source,
//                    token predictor)

pub mod vocabulary;

pub mod sequence;

pub mod sentence_pair;

pub mod logits;

pub mod hypothesis;

pub mod traits;
