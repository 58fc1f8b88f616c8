//! Vector index error types.

use thiserror::Error;

/// Errors that can occur during vector index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Index created with an unusable dimension
    #[error("Invalid dimension: {0}")]
    InvalidDimension(usize),

    /// Serialized index bytes could not be decoded
    #[error("Corrupt index buffer: {0}")]
    Corrupt(String),

    /// The underlying engine reported a failure
    #[error("Index engine error: {0}")]
    Engine(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
