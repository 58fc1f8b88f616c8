//! Storage layer for passage-db.
//!
//! Provides:
//! - The chunk address table mapping dense labels to documents and spans
//! - Two-phase removal plans that keep index, vectors and spans aligned
//! - Versioned and transactional snapshot formats with integrity checks
//! - Atomic snapshot writes and stale-version cleanup
//! - A debounced, cancelable flush scheduler

pub mod error;
pub mod files;
pub mod flush;
pub mod snapshot;
pub mod table;

pub use error::StoreError;
pub use files::SnapshotFiles;
pub use flush::{FlushScheduler, DEFAULT_FLUSH_DELAY};
pub use snapshot::{RestoredState, Snapshot, TransactionalSnapshot};
pub use table::{AddressTable, RemovalPlan};
