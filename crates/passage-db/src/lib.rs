//! # passage-db
//!
//! Document-chunk retrieval over a dense-label vector index.
//!
//! Documents are inserted as chunks, one vector and one byte span per
//! chunk. Searches return ranked multi-chunk passages built by the
//! clustering engine. State is persisted as versioned snapshots (or the
//! older index-only transactional format) with debounced, atomic writes.
//!
//! ## Usage
//!
//! ```rust
//! use passage_db::{DatabaseOptions, VectorDatabase};
//! use passage_types::ChunkSpan;
//!
//! let db: VectorDatabase = VectorDatabase::open("notes", DatabaseOptions::in_memory()).unwrap();
//! db.insert("intro", "hello world", vec![ChunkSpan::new(0, 11)], vec![vec![1.0, 0.0]], None)
//!     .unwrap();
//!
//! let results = db.search(&[], &[1.0, 0.0], 1, 0.0, 0).unwrap();
//! assert_eq!(results[0].path_name, "intro");
//! assert_eq!(results[0].content, "hello world");
//! ```

pub mod database;
pub mod error;
pub mod factory;
pub mod options;
pub mod state;

pub use database::{LoadOutcome, VectorDatabase};
pub use error::DatabaseError;
pub use factory::DatabaseFactory;
pub use options::{DatabaseOptions, PersistenceMode};
pub use state::{DatabaseStats, DocumentInfo, PersistState};
