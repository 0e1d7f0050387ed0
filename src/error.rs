// ============================================================
// Core Error Types
// ============================================================
// Typed failures raised by the translation core. Configuration
// and shape errors signal caller bugs and always propagate;
// an exhausted iteration budget is NOT an error (see
// domain::hypothesis::DecodeOutcome).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NatError {
    /// A configuration constraint was violated. Raised at construction.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A language code has no configured tag token.
    #[error("No tag token configured for language '{language}'")]
    UnknownLanguage { language: String },

    /// The tokenizer rejected its input.
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    /// Batch dimensions of two inputs disagree.
    #[error("Shape mismatch: {0}")]
    Shape(String),

    /// Non-finite values appeared in logits or loss.
    #[error("Non-finite values in {context}")]
    NumericalInstability { context: String },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type NatResult<T> = Result<T, NatError>;

impl NatError {
    pub fn shape(expected: usize, actual: usize, what: &str) -> Self {
        NatError::Shape(format!("{what}: expected {expected}, got {actual}"))
    }
}
