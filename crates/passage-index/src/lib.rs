//! # passage-index
//!
//! Vector index adapter for passage-db.
//!
//! The database treats the nearest-neighbor engine as an external
//! collaborator with a narrow contract, expressed here as the
//! [`VectorIndex`] trait. [`HnswIndex`] adapts usearch to it: inner-product
//! HNSW search over a dense, renumbering label space.
//!
//! ## Features
//! - Sequential dense labels, renumbered contiguously after deletes
//! - Inner-product ranking, best first
//! - Opaque little-endian byte round trip for persistence

pub mod error;
pub mod hnsw;
pub mod index;

pub use error::IndexError;
pub use hnsw::{HnswConfig, HnswIndex};
pub use index::{SearchHit, VectorIndex};
