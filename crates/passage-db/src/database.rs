//! The database connector.
//!
//! One [`VectorDatabase`] owns the index, address table and raw vector table
//! for a single key. All public operations run to completion under one
//! mutex; the only background work is the debounced snapshot flush, which
//! captures state under the same mutex. Snapshot writers are serialized by
//! a second, per-instance lock held from capture through rename.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use passage_index::{HnswIndex, VectorIndex};
use passage_search::{ClusterEngine, SearchCorpus, SearchError, SearchRequest};
use passage_store::{
    FlushScheduler, RestoredState, Snapshot, SnapshotFiles, TransactionalSnapshot,
};
use passage_types::{ChunkSpan, Label, PassageResult};
use tracing::{debug, error, info, warn};

use crate::error::DatabaseError;
use crate::options::{DatabaseOptions, PersistenceMode};
use crate::state::{DatabaseStats, DbState, DocumentInfo, PersistState};

/// Result of reading a snapshot from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Snapshot restored
    Loaded { vectors: usize, documents: usize },
    /// No snapshot file for this key and version
    Missing,
    /// Transactional snapshot written for another transaction or version
    Mismatch,
}

/// A document-chunk vector database bound to one key.
pub struct VectorDatabase<I: VectorIndex + 'static = HnswIndex> {
    key: String,
    files: Option<SnapshotFiles>,
    engine: ClusterEngine,
    state: Arc<Mutex<DbState<I>>>,
    writer: Arc<Mutex<()>>,
    flusher: FlushScheduler,
}

impl<I: VectorIndex + 'static> VectorDatabase<I> {
    /// Open the database for `key`, restoring its snapshot if one is usable.
    ///
    /// An unusable snapshot is logged and the database starts empty.
    pub fn open(key: impl Into<String>, options: DatabaseOptions) -> Result<Self, DatabaseError> {
        let key = key.into();
        validate_key(&key)?;
        options.validate().map_err(DatabaseError::InvalidInput)?;

        let files = options
            .base_folder
            .as_ref()
            .map(|base| SnapshotFiles::new(base, key.clone()));
        let database = Self {
            engine: ClusterEngine::new(options.search, options.weights),
            state: Arc::new(Mutex::new(DbState::new(options.mode))),
            writer: Arc::new(Mutex::new(())),
            flusher: FlushScheduler::new(options.flush_delay),
            files,
            key,
        };

        if let Some(files) = &database.files {
            match load_snapshot(files, &database.state, &database.writer) {
                Ok(outcome) => debug!(key = %database.key, ?outcome, "Opened database"),
                Err(e) => warn!(
                    key = %database.key,
                    error = %e,
                    "Discarding unusable snapshot, starting empty"
                ),
            }
        }
        Ok(database)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether snapshots are written to disk.
    pub fn is_persistent(&self) -> bool {
        self.files.is_some()
    }

    /// Add a document with one span per vector.
    ///
    /// Returns the labels assigned to the document. An insert without
    /// vectors is ignored.
    pub fn insert(
        &self,
        name: &str,
        content: &str,
        spans: Vec<ChunkSpan>,
        vectors: Vec<Vec<f32>>,
        transaction_id: Option<&str>,
    ) -> Result<Range<Label>, DatabaseError> {
        let Some(width) = vectors.first().map(Vec::len) else {
            debug!(key = %self.key, name, "Ignoring insert without vectors");
            return Ok(0..0);
        };
        if spans.len() != vectors.len() {
            return Err(DatabaseError::InvalidInput(format!(
                "{} spans for {} vectors",
                spans.len(),
                vectors.len()
            )));
        }
        if let Some(row) = vectors.iter().find(|row| row.len() != width) {
            return Err(DatabaseError::DimensionMismatch {
                expected: width,
                actual: row.len(),
            });
        }
        if let Some(row) = vectors.iter().position(|row| row.iter().any(|v| !v.is_finite())) {
            return Err(DatabaseError::InvalidInput(format!(
                "vector {row} of '{name}' has a non-finite component"
            )));
        }

        let labels = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.index_only {
                return Err(DatabaseError::IndexOnly(self.key.clone()));
            }

            if state.index.is_none() {
                state.index = Some(I::with_dimension(width)?);
                info!(key = %self.key, dimension = width, "Created index");
            }
            let labels = match state.index.as_mut() {
                Some(index) => index.add_rows(&vectors)?,
                None => return Err(DatabaseError::Invariant("index missing".to_string())),
            };

            let table_labels = state.table.append(name, content, spans);
            if table_labels != labels {
                state.reset();
                return Err(DatabaseError::Invariant(format!(
                    "index assigned labels {labels:?}, address table expected {table_labels:?}"
                )));
            }
            state.vectors.extend(vectors);
            state.record_transaction(transaction_id);
            state.mark_dirty();
            labels
        };

        debug!(key = %self.key, name, labels = ?labels, "Inserted document");
        self.schedule_flush();
        Ok(labels)
    }

    /// Remove every document named `name`. Returns how many were removed.
    pub fn remove(&self, name: &str, transaction_id: Option<&str>) -> Result<usize, DatabaseError> {
        let removed = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.index_only {
                return Err(DatabaseError::IndexOnly(self.key.clone()));
            }

            let plan = state.table.plan_removal(name);
            if plan.is_empty() {
                debug!(key = %self.key, name, "Nothing to remove");
                return Ok(0);
            }

            let labels = plan.labels();
            let deleted = match state.index.as_mut() {
                Some(index) => index.remove_labels(&labels)?,
                None => 0,
            };
            if deleted != labels.len() {
                state.reset();
                return Err(DatabaseError::Invariant(format!(
                    "index deleted {} of {} labels for '{}'",
                    deleted,
                    labels.len(),
                    name
                )));
            }

            state.table.apply_removal(&plan);
            state.vectors = plan.retain_surviving(std::mem::take(&mut state.vectors));
            state.record_transaction(transaction_id);
            state.mark_dirty();
            plan.document_count()
        };

        info!(key = %self.key, name, documents = removed, "Removed documents");
        self.schedule_flush();
        Ok(removed)
    }

    /// Clustered search: up to `k` passages, best first.
    ///
    /// `content_size` pads each passage by that many neighboring chunks.
    pub fn search(
        &self,
        keywords: &[String],
        query: &[f32],
        k: usize,
        min_relevance: f32,
        content_size: usize,
    ) -> Result<Vec<PassageResult>, DatabaseError> {
        let request = SearchRequest::new(query, k)
            .with_keywords(keywords)
            .with_min_relevance(min_relevance)
            .with_content_size(content_size);
        self.run_search(|engine, corpus| engine.search(corpus, &request))
    }

    /// Per-chunk search: one passage per raw hit, padded by `content_size`
    /// bytes on each side.
    pub fn search_chunks(
        &self,
        query: &[f32],
        k: usize,
        min_relevance: f32,
        content_size: usize,
    ) -> Result<Vec<PassageResult>, DatabaseError> {
        let request = SearchRequest::new(query, k)
            .with_min_relevance(min_relevance)
            .with_content_size(content_size);
        self.run_search(|engine, corpus| engine.search_chunks(corpus, &request))
    }

    /// Serialized index bytes, or `None` before the first insert.
    pub fn get_buffer(&self) -> Result<Option<Vec<u8>>, DatabaseError> {
        let state = self.state.lock();
        Ok(state.index.as_ref().map(|i| i.to_bytes()).transpose()?)
    }

    /// Write a snapshot for `version` now and make it the current version.
    pub fn save_to_disk(&self, version: u64) -> Result<PathBuf, DatabaseError> {
        let files = self.require_files()?;
        self.state
            .lock()
            .set_version(version)
            .map_err(DatabaseError::InvalidInput)?;
        self.flusher.cancel();
        write_snapshot(files, &self.state, &self.writer)
    }

    /// Replace in-memory state with the snapshot for `version`.
    ///
    /// When no usable snapshot exists the database is left empty. Corrupt or
    /// inconsistent snapshots also leave it empty and return the error.
    pub fn load_from_disk(&self, version: u64) -> Result<LoadOutcome, DatabaseError> {
        let files = self.require_files()?;
        self.flusher.cancel();
        self.state
            .lock()
            .set_version(version)
            .map_err(DatabaseError::InvalidInput)?;
        load_snapshot(files, &self.state, &self.writer)
    }

    /// Cancel any pending flush and write immediately.
    ///
    /// Memory-only databases have nothing to write and return `None`.
    pub fn flush_now(&self) -> Result<Option<PathBuf>, DatabaseError> {
        self.flusher.cancel();
        match &self.files {
            Some(files) => write_snapshot(files, &self.state, &self.writer).map(Some),
            None => Ok(None),
        }
    }

    /// Wait for a pending flush to fire.
    pub async fn wait_idle(&self) {
        self.flusher.wait_idle().await;
    }

    /// Whether a debounced flush is waiting.
    pub fn has_pending_flush(&self) -> bool {
        self.flusher.is_pending()
    }

    pub fn stats(&self) -> DatabaseStats {
        let state = self.state.lock();
        DatabaseStats {
            key: self.key.clone(),
            vectors: state.index.as_ref().map_or(0, |i| i.len()),
            spans: state.table.len(),
            stored_vectors: state.vectors.len(),
            documents: state.table.documents().len(),
            dimension: state.index.as_ref().map(|i| i.dimension()),
            state: state.persist,
            index_only: state.index_only,
        }
    }

    /// Stored documents in label order.
    pub fn documents(&self) -> Vec<DocumentInfo> {
        self.state
            .lock()
            .table
            .documents()
            .iter()
            .map(|doc| DocumentInfo {
                name: doc.name.clone(),
                start_label: doc.start_label,
                length: doc.length,
            })
            .collect()
    }

    /// Drop all content, including an index-only snapshot, and schedule a
    /// flush of the now-empty database.
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.reset();
            state.mark_dirty();
        }
        info!(key = %self.key, "Cleared database");
        self.schedule_flush();
    }

    fn run_search<F>(&self, search: F) -> Result<Vec<PassageResult>, DatabaseError>
    where
        F: FnOnce(&ClusterEngine, &SearchCorpus<'_, I>) -> Result<Vec<PassageResult>, SearchError>,
    {
        let mut guard = self.state.lock();
        if guard.index_only {
            return Err(DatabaseError::IndexOnly(self.key.clone()));
        }

        let outcome = {
            let state = &*guard;
            let Some(index) = state.index.as_ref() else {
                return Ok(Vec::new());
            };
            match state.table.verify(index.len(), state.vectors.len()) {
                Ok(()) => {
                    let corpus = SearchCorpus::new(index, &state.table, &state.vectors);
                    search(&self.engine, &corpus).map_err(DatabaseError::from)
                }
                Err(e) => Err(DatabaseError::from(e)),
            }
        };

        match outcome {
            Err(e) if e.is_invariant_violation() => {
                guard.reset();
                error!(key = %self.key, error = %e, "Dropped inconsistent state");
                Err(e)
            }
            other => other,
        }
    }

    fn require_files(&self) -> Result<&SnapshotFiles, DatabaseError> {
        self.files
            .as_ref()
            .ok_or_else(|| DatabaseError::NotPersistent(self.key.clone()))
    }

    fn schedule_flush(&self) {
        let Some(files) = self.files.clone() else {
            return;
        };
        let state = Arc::clone(&self.state);
        let writer = Arc::clone(&self.writer);
        let key = self.key.clone();
        self.flusher.schedule(move || {
            if let Err(e) = write_snapshot(&files, &state, &writer) {
                error!(key = %key, error = %e, "Background flush failed");
            }
        });
    }
}

impl<I: VectorIndex + 'static> std::fmt::Debug for VectorDatabase<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorDatabase")
            .field("key", &self.key)
            .field("base", &self.files.as_ref().map(|files| files.base()))
            .field("flusher", &self.flusher)
            .finish()
    }
}

/// Keys become part of file names. A key ending in `-<digits>` would name
/// its transactional file like another key's versioned snapshot.
fn validate_key(key: &str) -> Result<(), DatabaseError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(DatabaseError::InvalidInput(format!(
            "database key '{key}' must be non-empty ASCII letters, digits, '-', '_' or '.'"
        )));
    }

    let version_suffix = key
        .rsplit_once('-')
        .is_some_and(|(_, tail)| !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()));
    if version_suffix {
        return Err(DatabaseError::InvalidInput(format!(
            "database key '{key}' must not end in '-<digits>'"
        )));
    }
    Ok(())
}

enum Restored<I> {
    Full(RestoredState<I>),
    IndexOnly(Option<I>),
    Missing,
    Mismatch,
}

fn read_snapshot<I: VectorIndex>(
    files: &SnapshotFiles,
    mode: &PersistenceMode,
) -> Result<Restored<I>, DatabaseError> {
    match mode {
        PersistenceMode::Versioned { version } => {
            let Some(bytes) = files.read(&files.versioned_path(*version))? else {
                return Ok(Restored::Missing);
            };
            Ok(Restored::Full(Snapshot::decode(&bytes)?.restore()?))
        }
        PersistenceMode::Transactional {
            collection_version,
            transaction_id,
        } => {
            let Some(bytes) = files.read(&files.transactional_path())? else {
                return Ok(Restored::Missing);
            };
            let snapshot = TransactionalSnapshot::decode(&bytes)?;
            if !snapshot.matches(transaction_id, *collection_version) {
                info!(
                    expected_transaction = %transaction_id,
                    found_transaction = %snapshot.transaction_id,
                    expected_version = collection_version,
                    found_version = snapshot.collection_version,
                    "Transactional snapshot does not match"
                );
                return Ok(Restored::Mismatch);
            }
            let index = if snapshot.index.is_empty() {
                None
            } else {
                Some(I::from_bytes(&snapshot.index)?)
            };
            Ok(Restored::IndexOnly(index))
        }
    }
}

/// Replace the shared state with whatever the snapshot on disk holds.
/// Anything short of a clean restore leaves the state empty.
fn load_snapshot<I: VectorIndex>(
    files: &SnapshotFiles,
    shared: &Mutex<DbState<I>>,
    writer: &Mutex<()>,
) -> Result<LoadOutcome, DatabaseError> {
    let _writing = writer.lock();
    let mut state = shared.lock();
    let restored = read_snapshot::<I>(files, &state.mode);
    state.reset();

    let outcome = match restored? {
        Restored::Full(restored) => {
            let outcome = LoadOutcome::Loaded {
                vectors: restored.vectors.len(),
                documents: restored.table.documents().len(),
            };
            state.index = restored.index;
            state.table = restored.table;
            state.vectors = restored.vectors;
            state.persist = PersistState::Loaded;
            outcome
        }
        Restored::IndexOnly(index) => {
            let vectors = index.as_ref().map_or(0, |i| i.len());
            state.index_only = vectors > 0;
            state.index = index;
            state.persist = PersistState::Loaded;
            LoadOutcome::Loaded {
                vectors,
                documents: 0,
            }
        }
        Restored::Missing => LoadOutcome::Missing,
        Restored::Mismatch => LoadOutcome::Mismatch,
    };

    info!(key = %files.key(), ?outcome, "Snapshot load finished");
    Ok(outcome)
}

/// Capture the state under the lock, write it outside the lock, then mark
/// the state clean if nothing changed meanwhile. `writer` is held for the
/// whole call, so an older capture can never be renamed over a newer one.
fn write_snapshot<I: VectorIndex>(
    files: &SnapshotFiles,
    shared: &Mutex<DbState<I>>,
    writer: &Mutex<()>,
) -> Result<PathBuf, DatabaseError> {
    let _writing = writer.lock();
    let (path, bytes, generation, keep) = {
        let state = shared.lock();
        match &state.mode {
            PersistenceMode::Versioned { version } => {
                let snapshot =
                    Snapshot::capture(state.index.as_ref(), &state.table, &state.vectors)?;
                (
                    files.versioned_path(*version),
                    snapshot.encode()?,
                    state.generation,
                    Some(*version),
                )
            }
            PersistenceMode::Transactional {
                collection_version,
                transaction_id,
            } => {
                let index = match state.index.as_ref() {
                    Some(index) => index.to_bytes()?,
                    None => Vec::new(),
                };
                let snapshot = TransactionalSnapshot {
                    transaction_id: transaction_id.clone(),
                    collection_version: *collection_version,
                    index,
                };
                (
                    files.transactional_path(),
                    snapshot.encode()?,
                    state.generation,
                    None,
                )
            }
        }
    };

    files.write_atomic(&path, &bytes)?;
    if let Some(version) = keep {
        let removed = files.remove_stale(version);
        if removed > 0 {
            debug!(key = %files.key(), removed, "Removed stale snapshots");
        }
    }

    let mut state = shared.lock();
    if state.generation == generation {
        state.persist = PersistState::Loaded;
    }
    Ok(path)
}
