//! Error taxonomy for the retrieval stack.
//!
//! Structural failures (dimension, alignment, corruption) are always
//! distinct variants so callers can match on them; only a single bad
//! chunk during ingestion is ever swallowed, and that happens in the
//! pipeline, not here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VtaError>;

#[derive(Debug, Error)]
pub enum VtaError {
    /// Invalid parameters detected at construction time. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Zero or non-finite norm; the vector cannot be normalized.
    #[error("Degenerate vector: {0}")]
    DegenerateVector(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Alignment error: {vectors} vectors for {metadata} metadata records")]
    Alignment { vectors: usize, metadata: usize },

    /// Persisted vector/metadata files are unreadable or disagree.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// Embedding provider rejected the input because it is too long.
    #[error("Input too long for embedding model: {0}")]
    InputTooLong(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Too many consecutive embedding failures during ingestion.
    #[error("Embedding provider outage: {0}")]
    EmbeddingOutage(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VtaError {
    /// Programmer/data errors that must never be collapsed into a skip.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::Alignment { .. } | Self::CorruptIndex(_)
        )
    }

    /// Whether the failure is attributable to input length.
    pub fn is_input_too_long(&self) -> bool {
        matches!(self, Self::InputTooLong(_))
    }
}
