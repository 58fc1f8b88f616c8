//! In-memory database state and its persistence lifecycle.

use std::fmt;

use passage_store::AddressTable;
use serde::Serialize;

use crate::options::PersistenceMode;

/// Persistence lifecycle of a database instance.
///
/// `Unloaded → Loaded → Dirty → (flush) → Loaded`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistState {
    /// Nothing usable was loaded and nothing has changed since
    Unloaded,
    /// In-memory state matches the last snapshot read or written
    Loaded,
    /// Mutated since the last snapshot
    Dirty,
}

impl PersistState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistState::Unloaded => "unloaded",
            PersistState::Loaded => "loaded",
            PersistState::Dirty => "dirty",
        }
    }
}

impl fmt::Display for PersistState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a database's contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseStats {
    pub key: String,
    /// Vectors in the index
    pub vectors: usize,
    /// Entries in the span table
    pub spans: usize,
    /// Rows in the raw vector table
    pub stored_vectors: usize,
    pub documents: usize,
    /// Fixed on first insert
    pub dimension: Option<usize>,
    pub state: PersistState,
    pub index_only: bool,
}

/// One stored document, without its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub name: String,
    pub start_label: usize,
    pub length: usize,
}

/// Everything guarded by the database mutex.
pub(crate) struct DbState<I> {
    pub index: Option<I>,
    pub table: AddressTable,
    pub vectors: Vec<Vec<f32>>,
    pub persist: PersistState,
    /// Restored from an index-only snapshot; no address table available
    pub index_only: bool,
    pub mode: PersistenceMode,
    /// Bumped on every change; lets a finished flush tell whether it wrote
    /// the latest state
    pub generation: u64,
}

impl<I> DbState<I> {
    pub fn new(mode: PersistenceMode) -> Self {
        Self {
            index: None,
            table: AddressTable::new(),
            vectors: Vec::new(),
            persist: PersistState::Unloaded,
            index_only: false,
            mode,
            generation: 0,
        }
    }

    /// Drop all content and return to `Unloaded`.
    pub fn reset(&mut self) {
        self.index = None;
        self.table.clear();
        self.vectors.clear();
        self.index_only = false;
        self.persist = PersistState::Unloaded;
        self.generation += 1;
    }

    pub fn mark_dirty(&mut self) {
        self.persist = PersistState::Dirty;
        self.generation += 1;
    }

    /// Record the transaction id of a mutation (transactional mode only).
    pub fn record_transaction(&mut self, transaction_id: Option<&str>) {
        if let (
            Some(id),
            PersistenceMode::Transactional {
                transaction_id: current,
                ..
            },
        ) = (transaction_id, &mut self.mode)
        {
            *current = id.to_string();
        }
    }

    /// Point the persistence mode at a new version.
    pub fn set_version(&mut self, version: u64) -> Result<(), String> {
        match &mut self.mode {
            PersistenceMode::Versioned { version: current } => *current = version,
            PersistenceMode::Transactional {
                collection_version, ..
            } => {
                *collection_version = u32::try_from(version)
                    .map_err(|_| format!("collection version {version} exceeds u32"))?;
            }
        }
        Ok(())
    }
}
