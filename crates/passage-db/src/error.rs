//! Database error types.

use passage_index::IndexError;
use passage_search::SearchError;
use passage_store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`crate::VectorDatabase`] operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Vectors do not match each other or the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Caller passed arguments that break the operation's contract
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// State was restored from an index-only snapshot
    #[error("Database '{0}' holds an index-only snapshot; clear it first")]
    IndexOnly(String),

    /// No base folder configured for this database
    #[error("Database '{0}' has no base folder")]
    NotPersistent(String),

    /// In-memory state was inconsistent and has been dropped
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Index engine error
    #[error("Index error: {0}")]
    Index(IndexError),

    /// Storage error
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Search error
    #[error("Search error: {0}")]
    Search(SearchError),
}

impl DatabaseError {
    /// Whether the database dropped its state because of this error.
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            DatabaseError::Invariant(_) => true,
            DatabaseError::Store(e) => e.is_invariant_violation(),
            DatabaseError::Search(e) => e.is_invariant_violation(),
            _ => false,
        }
    }
}

impl From<IndexError> for DatabaseError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { expected, actual } => {
                DatabaseError::DimensionMismatch { expected, actual }
            }
            other => DatabaseError::Index(other),
        }
    }
}

impl From<StoreError> for DatabaseError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Index(inner) => inner.into(),
            other => DatabaseError::Store(other),
        }
    }
}

impl From<SearchError> for DatabaseError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Index(inner) => inner.into(),
            other => DatabaseError::Search(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_is_lifted() {
        let err: DatabaseError = IndexError::DimensionMismatch {
            expected: 3,
            actual: 2,
        }
        .into();
        assert!(matches!(
            err,
            DatabaseError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_invariant_classification() {
        let err: DatabaseError = StoreError::DocumentNotFound(7).into();
        assert!(err.is_invariant_violation());

        let err: DatabaseError = StoreError::Corrupt("short".to_string()).into();
        assert!(!err.is_invariant_violation());

        let err: DatabaseError = SearchError::Store(StoreError::Invariant("x".into())).into();
        assert!(err.is_invariant_violation());
    }
}
