//! Chunk address table.
//!
//! Maps contiguous ranges of vector labels to documents and, per label, to a
//! byte span inside that document's content. The table mirrors the index's
//! dense label space: span `i` always describes vector label `i`.

use std::ops::Range;

use passage_types::{ChunkSpan, Document, Label};
use tracing::debug;

use crate::error::StoreError;

/// Labels scheduled for deletion, computed before anything is mutated.
///
/// Built by [`AddressTable::plan_removal`]; applying it to the index, the
/// vector table and the address table keeps all three aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalPlan {
    /// Positions of the doomed documents, ascending (insertion order)
    documents: Vec<usize>,
    /// Label range of each doomed document, in the same order
    ranges: Vec<Range<Label>>,
}

impl RemovalPlan {
    /// Whether the plan removes nothing.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of documents the plan removes.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Every doomed label, ascending.
    pub fn labels(&self) -> Vec<Label> {
        let mut labels: Vec<Label> = self.ranges.iter().flat_map(|r| r.clone()).collect();
        labels.sort_unstable();
        labels
    }

    /// Total number of doomed labels.
    pub fn label_count(&self) -> usize {
        self.ranges.iter().map(|r| r.len()).sum()
    }

    /// Drop the doomed positions from a sequence parallel to the label space.
    pub fn retain_surviving<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .enumerate()
            .filter(|(label, _)| !self.covers(*label))
            .map(|(_, item)| item)
            .collect()
    }

    fn covers(&self, label: Label) -> bool {
        self.ranges.iter().any(|r| r.contains(&label))
    }

    /// How far a label that survives the plan moves down.
    fn shift_for(&self, label: Label) -> usize {
        self.ranges
            .iter()
            .filter(|r| r.end <= label)
            .map(|r| r.len())
            .sum()
    }
}

/// Document records plus the flat span sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressTable {
    documents: Vec<Document>,
    spans: Vec<ChunkSpan>,
}

impl AddressTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from persisted parts, checking label coverage.
    pub fn from_parts(documents: Vec<Document>, spans: Vec<ChunkSpan>) -> Result<Self, StoreError> {
        let table = Self { documents, spans };
        table.check_coverage()?;
        Ok(table)
    }

    /// Document records in insertion order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Span per label.
    pub fn spans(&self) -> &[ChunkSpan] {
        &self.spans
    }

    /// Number of labels addressed by the table.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Split into persisted parts.
    pub fn into_parts(self) -> (Vec<Document>, Vec<ChunkSpan>) {
        (self.documents, self.spans)
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.spans.clear();
    }

    /// Append a document whose labels start right after the current last label.
    ///
    /// Returns the label range assigned to the document.
    pub fn append(
        &mut self,
        name: impl Into<String>,
        content: impl Into<String>,
        spans: Vec<ChunkSpan>,
    ) -> Range<Label> {
        let start_label = self.spans.len();
        let length = spans.len();
        let document = Document::new(name, content, start_label, length);

        debug!(name = %document.name, start_label, length, "Appended document");
        self.documents.push(document);
        self.spans.extend(spans);
        start_label..start_label + length
    }

    /// Compute which labels removing `name` would delete.
    ///
    /// All documents with that name are included, in insertion order.
    pub fn plan_removal(&self, name: &str) -> RemovalPlan {
        let mut plan = RemovalPlan::default();
        for (position, document) in self.documents.iter().enumerate() {
            if document.name == name {
                plan.documents.push(position);
                plan.ranges.push(document.labels());
            }
        }
        plan
    }

    /// Apply a plan built from this table: drop the spans and documents and
    /// shift the surviving documents' start labels down.
    pub fn apply_removal(&mut self, plan: &RemovalPlan) {
        if plan.is_empty() {
            return;
        }

        let spans = std::mem::take(&mut self.spans);
        self.spans = plan.retain_surviving(spans);

        let documents = std::mem::take(&mut self.documents);
        self.documents = documents
            .into_iter()
            .enumerate()
            .filter(|(position, _)| !plan.documents.contains(position))
            .map(|(_, mut document)| {
                document.start_label -= plan.shift_for(document.start_label);
                document
            })
            .collect();

        debug!(
            documents = plan.document_count(),
            labels = plan.label_count(),
            remaining = self.spans.len(),
            "Removed documents"
        );
    }

    /// Find the document owning a label.
    ///
    /// A miss means the table no longer covers the label space.
    pub fn document_for_label(&self, label: Label) -> Result<&Document, StoreError> {
        self.documents
            .iter()
            .find(|doc| doc.contains(label))
            .ok_or(StoreError::DocumentNotFound(label))
    }

    /// Materialize the text covered by labels `lo..=hi`, clamped to the
    /// document's own label range.
    pub fn content_window(&self, document: &Document, lo: Label, hi: Label) -> String {
        if document.length == 0 {
            return String::new();
        }

        let lo = lo.max(document.start_label);
        let hi = hi.min(document.end_label() - 1);
        if lo > hi {
            return String::new();
        }

        let Some(spans) = self.spans.get(lo..=hi) else {
            return String::new();
        };
        let start = spans.iter().map(|s| s.start_offset).min().unwrap_or(0);
        let end = spans.iter().map(|s| s.end()).max().unwrap_or(0);
        slice_content(&document.content, start, end)
    }

    /// Materialize one label's span padded by `padding` bytes on each side.
    pub fn padded_span(&self, document: &Document, label: Label, padding: usize) -> String {
        match self.spans.get(label) {
            Some(span) => slice_content(
                &document.content,
                span.start_offset.saturating_sub(padding),
                span.end().saturating_add(padding),
            ),
            None => String::new(),
        }
    }

    /// Check the table against the index's vector count and the raw
    /// vector table's length.
    pub fn verify(&self, ntotal: usize, vector_count: usize) -> Result<(), StoreError> {
        if self.documents.is_empty() && !self.spans.is_empty() {
            return Err(StoreError::Invariant(format!(
                "{} spans but no documents",
                self.spans.len()
            )));
        }
        if self.spans.len() != ntotal {
            return Err(StoreError::Invariant(format!(
                "span table has {} entries, index has {} vectors",
                self.spans.len(),
                ntotal
            )));
        }
        if vector_count != ntotal {
            return Err(StoreError::Invariant(format!(
                "vector table has {} entries, index has {} vectors",
                vector_count, ntotal
            )));
        }
        self.check_coverage()
    }

    /// Documents must tile `[0, spans.len())` in order without gaps.
    fn check_coverage(&self) -> Result<(), StoreError> {
        let mut next = 0;
        for document in &self.documents {
            if document.start_label != next {
                return Err(StoreError::Invariant(format!(
                    "document '{}' starts at label {}, expected {}",
                    document.name, document.start_label, next
                )));
            }
            next = document.end_label();
        }
        if next != self.spans.len() {
            return Err(StoreError::Invariant(format!(
                "documents cover {} labels, span table has {}",
                next,
                self.spans.len()
            )));
        }
        Ok(())
    }
}

/// Slice `content[start..end]`, clamping to the content length and widening
/// to UTF-8 character boundaries.
fn slice_content(content: &str, start: usize, end: usize) -> String {
    let mut end = end.min(content.len());
    let mut start = start.min(end);
    while !content.is_char_boundary(start) {
        start -= 1;
    }
    while !content.is_char_boundary(end) {
        end += 1;
    }
    content[start..end].to_string()
}
