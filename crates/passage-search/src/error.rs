//! Search error types.

use passage_index::IndexError;
use passage_store::StoreError;
use thiserror::Error;

/// Errors that can occur while clustering and scoring hits.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Index engine rejected a probe
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Address table or vector table lookup failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SearchError {
    /// Whether the failure means the searched state is inconsistent.
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            SearchError::Store(e) => e.is_invariant_violation(),
            SearchError::Index(_) => false,
        }
    }
}
