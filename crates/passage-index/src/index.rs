//! Vector index trait and types.
//!
//! Defines the narrow contract the database needs from a nearest-neighbor
//! engine: dense sequential labels, inner-product ranking, delete with
//! renumbering, and an opaque byte round trip.

use std::ops::Range;

use passage_types::Label;

use crate::error::IndexError;

/// A single raw hit from the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Dense vector label
    pub label: Label,
    /// Inner product against the query (higher = more similar)
    pub score: f32,
}

impl SearchHit {
    pub fn new(label: Label, score: f32) -> Self {
        Self { label, score }
    }
}

/// Trait for vector indexes.
///
/// Labels are assigned sequentially on insertion and always cover
/// `[0, len())`. Implementations must be thread-safe for shared read access.
pub trait VectorIndex: Send + Sync {
    /// Create an empty index with a fixed dimension.
    fn with_dimension(dimension: usize) -> Result<Self, IndexError>
    where
        Self: Sized;

    /// Restore an index from bytes produced by [`VectorIndex::to_bytes`].
    fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError>
    where
        Self: Sized;

    /// Get the vector dimension
    fn dimension(&self) -> usize;

    /// Get the number of vectors in the index
    fn len(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append row-major vectors, returning the labels they were assigned.
    fn add(&mut self, flat: &[f32]) -> Result<Range<Label>, IndexError>;

    /// Append vectors given as rows. Every row must match the dimension.
    fn add_rows(&mut self, rows: &[Vec<f32>]) -> Result<Range<Label>, IndexError> {
        let dimension = self.dimension();
        let mut flat = Vec::with_capacity(rows.len() * dimension);
        for row in rows {
            if row.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        self.add(&flat)
    }

    /// Search for the k vectors with the largest inner product.
    /// Returns results sorted by score (best first).
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError>;

    /// Delete labels and renumber the survivors contiguously from 0.
    /// Returns the number of vectors removed.
    fn remove_labels(&mut self, labels: &[Label]) -> Result<usize, IndexError>;

    /// Serialize the full index state.
    fn to_bytes(&self) -> Result<Vec<u8>, IndexError>;
}
