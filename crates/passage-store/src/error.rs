//! Storage layer error types.

use passage_index::IndexError;
use passage_types::Label;
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// A label is not covered by any document
    #[error("Document not found for label {0}")]
    DocumentNotFound(Label),

    /// Address table, vector table and index disagree
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Snapshot bytes could not be decoded
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    /// Index engine error
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether the error means in-memory state can no longer be trusted.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            StoreError::DocumentNotFound(_) | StoreError::Invariant(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
