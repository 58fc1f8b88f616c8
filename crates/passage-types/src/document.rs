//! Address model: labels, documents, chunk spans and passage results.
//!
//! Every stored vector is addressed by a dense label. Labels are grouped into
//! contiguous per-document ranges, and each label owns exactly one chunk span
//! inside its document's content.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Dense vector label assigned by the index in insertion order.
///
/// Labels always cover `[0, ntotal)`; removals renumber the survivors.
pub type Label = usize;

/// A byte range inside a document's content, one per vector label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSpan {
    /// Byte offset into the parent document's content
    pub start_offset: usize,
    /// Byte length of the chunk
    pub length: usize,
}

impl ChunkSpan {
    pub fn new(start_offset: usize, length: usize) -> Self {
        Self {
            start_offset,
            length,
        }
    }

    /// Exclusive end offset of the chunk.
    pub fn end(&self) -> usize {
        self.start_offset + self.length
    }
}

/// A stored document and the label range that belongs to it.
///
/// Names are not unique: inserting the same name twice keeps both records
/// until the name is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Removal key
    pub name: String,
    /// Full raw text
    pub content: String,
    /// First vector label belonging to this document
    pub start_label: Label,
    /// Number of labels belonging to this document
    pub length: usize,
}

impl Document {
    pub fn new(
        name: impl Into<String>,
        content: impl Into<String>,
        start_label: Label,
        length: usize,
    ) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            start_label,
            length,
        }
    }

    /// Exclusive end of the label range.
    pub fn end_label(&self) -> Label {
        self.start_label + self.length
    }

    /// Label range owned by this document.
    pub fn labels(&self) -> Range<Label> {
        self.start_label..self.end_label()
    }

    /// Whether `label` falls inside this document's range.
    pub fn contains(&self, label: Label) -> bool {
        self.start_label <= label && label < self.end_label()
    }
}

/// A ranked passage returned from search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassageResult {
    /// Materialized text of the passage
    pub content: String,
    /// Relevance score (combined score for clustered search, raw inner
    /// product for per-chunk search)
    pub relevance: f32,
    /// Name of the owning document
    pub path_name: String,
    /// Vector labels the passage was built from, ascending
    pub labels: Vec<Label>,
}
