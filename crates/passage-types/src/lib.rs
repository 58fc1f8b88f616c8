//! # passage-types
//!
//! Shared domain types for the passage database.
//!
//! This crate defines the data structures used by every layer:
//! - Labels, documents and chunk spans (the address model)
//! - Passage results returned by search
//! - Cosine similarity and summary statistics
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use passage_types::{cosine_similarity, ChunkSpan};
//!
//! let span = ChunkSpan::new(0, 12);
//! assert_eq!(span.end(), 12);
//! assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod similarity;

pub use config::{ScoreWeights, SearchSettings, Settings};
pub use document::{ChunkSpan, Document, Label, PassageResult};
pub use error::TypesError;
pub use similarity::{cosine_similarity, dot, l2_norm, mean_and_std_dev};
