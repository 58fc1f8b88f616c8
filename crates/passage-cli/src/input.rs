//! JSON input files for the CLI.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use passage_types::ChunkSpan;
use serde::Deserialize;

/// One chunk of a document: its byte span and vector.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub start_offset: usize,
    pub length: usize,
    pub vector: Vec<f32>,
}

/// A chunked document ready for insertion.
///
/// ```json
/// { "content": "...", "chunks": [{ "startOffset": 0, "length": 12, "vector": [0.1, 0.2] }] }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkFile {
    pub content: String,
    pub chunks: Vec<ChunkRecord>,
}

impl ChunkFile {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read chunk file {}", path.display()))?;
        let file: ChunkFile = serde_json::from_str(&text)
            .with_context(|| format!("Invalid chunk file {}", path.display()))?;
        file.check()?;
        Ok(file)
    }

    /// Every span must lie inside the content.
    fn check(&self) -> Result<()> {
        for (i, chunk) in self.chunks.iter().enumerate() {
            let end = chunk.start_offset.saturating_add(chunk.length);
            if end > self.content.len() {
                bail!(
                    "chunk {} spans bytes {}..{} beyond content length {}",
                    i,
                    chunk.start_offset,
                    end,
                    self.content.len()
                );
            }
        }
        Ok(())
    }

    /// Split into parallel span and vector lists.
    pub fn into_parts(self) -> (String, Vec<ChunkSpan>, Vec<Vec<f32>>) {
        let (spans, vectors) = self
            .chunks
            .into_iter()
            .map(|c| (ChunkSpan::new(c.start_offset, c.length), c.vector))
            .unzip();
        (self.content, spans, vectors)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryInput {
    Vector(Vec<f32>),
    Object { vector: Vec<f32> },
}

/// Read a query vector: either a bare JSON array or `{ "vector": [...] }`.
pub fn read_query(path: &Path) -> Result<Vec<f32>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read query file {}", path.display()))?;
    let query: QueryInput = serde_json::from_str(&text)
        .with_context(|| format!("Invalid query file {}", path.display()))?;
    Ok(match query {
        QueryInput::Vector(vector) | QueryInput::Object { vector } => vector,
    })
}
