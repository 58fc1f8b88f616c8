//! End-to-end test infrastructure for passage-db.
//!
//! Provides a shared TestHarness and helpers for building chunked
//! documents and vectors.

use std::path::PathBuf;
use std::time::Duration;

use passage_db::{DatabaseOptions, VectorDatabase};
use passage_types::ChunkSpan;
use rand::Rng;

/// Shared test harness for E2E tests.
///
/// Owns a temp snapshot directory and opens databases persisting into it.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Snapshot directory
    pub base_folder: PathBuf,
}

impl TestHarness {
    /// Create a new test harness with a temp snapshot directory.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let base_folder = temp_dir.path().join("snapshots");
        Self {
            _temp_dir: temp_dir,
            base_folder,
        }
    }

    /// Options persisting into the harness directory at `version`.
    pub fn options(&self, version: u64) -> DatabaseOptions {
        DatabaseOptions::in_memory()
            .with_base_folder(&self.base_folder)
            .with_flush_delay(Duration::from_millis(50))
            .with_version(version)
    }

    /// Open (or reopen) the database for `key` at `version`.
    pub fn open(&self, key: &str, version: u64) -> VectorDatabase {
        VectorDatabase::open(key, self.options(version)).expect("Failed to open database")
    }

    /// Path of a versioned snapshot file.
    pub fn snapshot_path(&self, key: &str, version: u64) -> PathBuf {
        self.base_folder.join(format!("vector-{key}-{version}.bin"))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A chunked document: content plus one span per chunk.
#[derive(Debug, Clone)]
pub struct ChunkedDocument {
    pub content: String,
    pub spans: Vec<ChunkSpan>,
}

impl ChunkedDocument {
    /// Build a document whose chunks are the given pieces, concatenated.
    pub fn from_chunks<S: AsRef<str>>(chunks: &[S]) -> Self {
        let mut content = String::new();
        let mut spans = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let chunk = chunk.as_ref();
            spans.push(ChunkSpan::new(content.len(), chunk.len()));
            content.push_str(chunk);
        }
        Self { content, spans }
    }

    /// `count` numbered chunks like `"{prefix} chunk 3. "`.
    pub fn numbered(prefix: &str, count: usize) -> Self {
        let chunks: Vec<String> = (0..count)
            .map(|i| format!("{prefix} chunk {i}. "))
            .collect();
        Self::from_chunks(&chunks)
    }

    /// Insert into `db` under `name`.
    pub fn insert_into(&self, db: &VectorDatabase, name: &str, vectors: Vec<Vec<f32>>) {
        db.insert(name, &self.content, self.spans.clone(), vectors, None)
            .expect("Failed to insert document");
    }
}

/// Normalize a vector to unit length.
pub fn normalized(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

/// Unit basis vector `e_axis` in `dimension` dimensions.
pub fn basis(dimension: usize, axis: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dimension];
    vector[axis] = 1.0;
    vector
}

/// `count` unit vectors tightly packed around the first axis.
pub fn near_duplicates(count: usize, dimension: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|i| {
            let mut vector = basis(dimension, 0);
            vector[1] = 0.001 * i as f32;
            normalized(vector)
        })
        .collect()
}

/// `count` random unit vectors.
pub fn random_vectors(rng: &mut impl Rng, count: usize, dimension: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|_| normalized((0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect()))
        .collect()
}
