//! HNSW index implementation using usearch.
//!
//! Vectors are keyed by their dense label. Deletes rebuild the graph from
//! the surviving rows so labels stay contiguous from 0 and no tombstones
//! degrade recall.
//!
//! Serialized layout (little-endian):
//! `PHNS` magic, u32 format version, u32 dimension, u64 vector count, then
//! the usearch buffer.

use std::io::{Cursor, Read};
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use passage_types::Label;
use tracing::debug;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::IndexError;
use crate::index::{SearchHit, VectorIndex};

const MAGIC: &[u8; 4] = b"PHNS";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// HNSW index configuration
#[derive(Debug, Clone, PartialEq)]
pub struct HnswConfig {
    /// Vector dimension
    pub dimension: usize,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
    /// Initial reserved capacity
    pub capacity: usize,
}

impl HnswConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
            capacity: 1024,
        }
    }

    pub fn with_connectivity(mut self, m: usize) -> Self {
        self.connectivity = m;
        self
    }

    pub fn with_expansion(mut self, ef_add: usize, ef_search: usize) -> Self {
        self.expansion_add = ef_add;
        self.expansion_search = ef_search;
        self
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimension,
            metric: MetricKind::IP,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        }
    }
}

/// Inner-product HNSW index wrapper around usearch.
pub struct HnswIndex {
    index: Index,
    config: HnswConfig,
}

impl HnswIndex {
    /// Create an empty index from a full configuration.
    pub fn with_config(config: HnswConfig) -> Result<Self, IndexError> {
        if config.dimension == 0 {
            return Err(IndexError::InvalidDimension(config.dimension));
        }
        let index = Index::new(&config.options()).map_err(engine)?;
        index.reserve(config.capacity).map_err(engine)?;
        Ok(Self { index, config })
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Copy out the stored vector for a label.
    pub fn vector(&self, label: Label) -> Option<Vec<f32>> {
        if label >= self.len() {
            return None;
        }
        let mut row = vec![0f32; self.config.dimension];
        match self.index.get(label as u64, &mut row) {
            Ok(found) if found > 0 => Some(row),
            _ => None,
        }
    }

    fn check_width(&self, actual: usize) -> Result<(), IndexError> {
        if actual != self.config.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dimension,
                actual,
            });
        }
        Ok(())
    }

    fn ensure_capacity(&self, additional: usize) -> Result<(), IndexError> {
        let needed = self.index.size() + additional;
        let capacity = self.index.capacity();
        if needed > capacity {
            let grown = needed.max(capacity * 2).max(self.config.capacity);
            self.index.reserve(grown).map_err(engine)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("config", &self.config)
            .field("len", &self.index.size())
            .finish()
    }
}

impl VectorIndex for HnswIndex {
    fn with_dimension(dimension: usize) -> Result<Self, IndexError> {
        Self::with_config(HnswConfig::new(dimension))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN {
            return Err(IndexError::Corrupt(format!(
                "buffer too short: {} bytes",
                bytes.len()
            )));
        }

        let mut cursor = Cursor::new(bytes);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(IndexError::Corrupt("bad magic".to_string()));
        }

        let version = cursor.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {}",
                version
            )));
        }

        let dimension = cursor.read_u32::<LittleEndian>()? as usize;
        let count = cursor.read_u64::<LittleEndian>()? as usize;
        if dimension == 0 {
            return Err(IndexError::Corrupt("zero dimension".to_string()));
        }

        let restored = Self::with_config(HnswConfig::new(dimension))?;
        if count > 0 {
            restored
                .index
                .load_from_buffer(&bytes[HEADER_LEN..])
                .map_err(|e| IndexError::Corrupt(format!("engine rejected buffer: {}", e)))?;
        }
        if restored.index.size() != count {
            return Err(IndexError::Corrupt(format!(
                "header declares {} vectors, engine holds {}",
                count,
                restored.index.size()
            )));
        }

        debug!(dimension, count, "Decoded HNSW index");
        Ok(restored)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn len(&self) -> usize {
        self.index.size()
    }

    fn add(&mut self, flat: &[f32]) -> Result<Range<Label>, IndexError> {
        let dimension = self.config.dimension;
        if flat.len() % dimension != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: flat.len() % dimension,
            });
        }

        let start = self.len();
        let rows = flat.len() / dimension;
        self.ensure_capacity(rows)?;
        for (offset, row) in flat.chunks_exact(dimension).enumerate() {
            self.index
                .add((start + offset) as u64, row)
                .map_err(engine)?;
        }
        let end = self.len();

        debug!(start, end, "Added vectors");
        Ok(start..end)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.check_width(query.len())?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let matches = self
            .index
            .search(query, k.min(self.len()))
            .map_err(engine)?;

        // usearch reports inner-product distance as 1 - dot
        let mut hits: Vec<SearchHit> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .map(|(&key, &distance)| SearchHit::new(key as Label, 1.0 - distance))
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.label.cmp(&b.label)));

        debug!(k, found = hits.len(), "Search complete");
        Ok(hits)
    }

    fn remove_labels(&mut self, labels: &[Label]) -> Result<usize, IndexError> {
        let total = self.len();
        let mut doomed = vec![false; total];
        for &label in labels {
            if label < total {
                doomed[label] = true;
            }
        }

        let removed = doomed.iter().filter(|d| **d).count();
        if removed == 0 {
            return Ok(0);
        }

        let rebuilt = Self::with_config(self.config.clone())?;
        rebuilt.ensure_capacity(total - removed)?;
        let mut row = vec![0f32; self.config.dimension];
        let mut next: u64 = 0;
        for (label, gone) in doomed.iter().enumerate() {
            if *gone {
                continue;
            }
            let found = self.index.get(label as u64, &mut row).map_err(engine)?;
            if found == 0 {
                return Err(IndexError::Engine(format!("label {} missing from graph", label)));
            }
            rebuilt.index.add(next, &row).map_err(engine)?;
            next += 1;
        }
        *self = rebuilt;

        debug!(removed, remaining = self.len(), "Removed vectors");
        Ok(removed)
    }

    fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        let count = self.len();
        let engine_len = if count > 0 {
            self.index.serialized_length()
        } else {
            0
        };

        let mut buf = Vec::with_capacity(HEADER_LEN + engine_len);
        buf.extend_from_slice(MAGIC);
        buf.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        buf.write_u32::<LittleEndian>(self.config.dimension as u32)?;
        buf.write_u64::<LittleEndian>(count as u64)?;
        if engine_len > 0 {
            let mut body = vec![0u8; engine_len];
            self.index.save_to_buffer(&mut body).map_err(engine)?;
            buf.extend_from_slice(&body);
        }
        Ok(buf)
    }
}

fn engine(err: impl std::fmt::Display) -> IndexError {
    IndexError::Engine(err.to_string())
}
