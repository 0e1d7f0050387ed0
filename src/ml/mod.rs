// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Transformer code lives here. Decoding algorithms in
// `decoding` only see the TokenPredictor trait; this layer
// supplies the implementation backed by a Burn model.
//
//   positional.rs — sinusoidal position table
//   model.rs      — encoder/decoder stacks, tied embeddings,
//                   optional pre-norm and positional attention,
//                   length head
//   state.rs      — encoder output shared by decoding passes
//   engine.rs     — encode / decode / train_step / predict_lengths
//   trainer.rs    — teacher-forced training loop with validation
//                   and per-epoch checkpoints
//
// Reference: Vaswani et al. (2017) Attention Is All You Need
//            Gu et al. (2018) Non-Autoregressive NMT
//            Ghazvininejad et al. (2019) Mask-Predict

pub mod positional;

/// Transformer encoder-decoder with a length head
pub mod model;

pub mod state;

/// Call surface used by decoding, training and translation
pub mod engine;

/// Full training loop with validation and checkpointing
pub mod trainer;
