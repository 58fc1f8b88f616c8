//! Binary snapshot formats.
//!
//! Two alternative layouts, never mixed in one file (all integers
//! little-endian):
//!
//! - [`Snapshot`]: four u32 lengths (index, documents, spans, vectors)
//!   followed by the four payloads in that order. The index payload is the
//!   engine's opaque bytes; the other three are JSON.
//! - [`TransactionalSnapshot`]: u32 transaction-id length, the transaction
//!   id, a u32 collection version, then the index bytes. Index only.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use passage_index::VectorIndex;
use passage_types::{ChunkSpan, Document};
use tracing::debug;

use crate::error::StoreError;
use crate::table::AddressTable;

const SNAPSHOT_HEADER_LEN: usize = 16;

/// Full database state as written to disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Serialized index engine state
    pub index: Vec<u8>,
    /// Document table
    pub documents: Vec<Document>,
    /// Span per label
    pub spans: Vec<ChunkSpan>,
    /// Raw vector per label
    pub vectors: Vec<Vec<f32>>,
}

/// State rebuilt from a [`Snapshot`] after integrity checks passed.
#[derive(Debug)]
pub struct RestoredState<I> {
    /// Index engine, absent when the snapshot holds no vectors
    pub index: Option<I>,
    pub table: AddressTable,
    pub vectors: Vec<Vec<f32>>,
}

impl Snapshot {
    /// Encode header and payloads.
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let documents = serde_json::to_vec(&self.documents)?;
        let spans = serde_json::to_vec(&self.spans)?;
        let vectors = serde_json::to_vec(&self.vectors)?;

        let payloads: [&[u8]; 4] = [&self.index, &documents, &spans, &vectors];
        let total: usize = payloads.iter().map(|p| p.len()).sum();

        let mut buf = Vec::with_capacity(SNAPSHOT_HEADER_LEN + total);
        for payload in &payloads {
            buf.write_u32::<LittleEndian>(payload_len(payload)?)?;
        }
        for payload in &payloads {
            buf.extend_from_slice(payload);
        }
        Ok(buf)
    }

    /// Decode header and payloads. Does not interpret the index bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() < SNAPSHOT_HEADER_LEN {
            return Err(StoreError::Corrupt(format!(
                "snapshot too short: {} bytes",
                bytes.len()
            )));
        }

        let mut cursor = Cursor::new(bytes);
        let mut lengths = [0usize; 4];
        for length in lengths.iter_mut() {
            *length = cursor.read_u32::<LittleEndian>()? as usize;
        }

        let expected = SNAPSHOT_HEADER_LEN + lengths.iter().sum::<usize>();
        if expected != bytes.len() {
            return Err(StoreError::Corrupt(format!(
                "header describes {} bytes, file has {}",
                expected,
                bytes.len()
            )));
        }

        let mut sections = Vec::with_capacity(lengths.len());
        let mut offset = SNAPSHOT_HEADER_LEN;
        for len in lengths {
            sections.push(&bytes[offset..offset + len]);
            offset += len;
        }

        let index = sections[0].to_vec();
        let documents = serde_json::from_slice(sections[1])?;
        let spans = serde_json::from_slice(sections[2])?;
        let vectors = serde_json::from_slice(sections[3])?;

        Ok(Self {
            index,
            documents,
            spans,
            vectors,
        })
    }

    /// Capture the database state.
    pub fn capture<I: VectorIndex>(
        index: Option<&I>,
        table: &AddressTable,
        vectors: &[Vec<f32>],
    ) -> Result<Self, StoreError> {
        let index = match index {
            Some(index) => index.to_bytes()?,
            None => Vec::new(),
        };
        Ok(Self {
            index,
            documents: table.documents().to_vec(),
            spans: table.spans().to_vec(),
            vectors: vectors.to_vec(),
        })
    }

    /// Rebuild the index and tables, enforcing that span table, vector table
    /// and index all describe the same number of vectors.
    pub fn restore<I: VectorIndex>(self) -> Result<RestoredState<I>, StoreError> {
        let index = if self.index.is_empty() {
            None
        } else {
            Some(I::from_bytes(&self.index)?)
        };
        let ntotal = index.as_ref().map_or(0, |i| i.len());

        if self.documents.is_empty() && !self.spans.is_empty() {
            return Err(StoreError::Invariant(format!(
                "document table empty but span table has {} entries",
                self.spans.len()
            )));
        }

        let table = AddressTable::from_parts(self.documents, self.spans)?;
        table.verify(ntotal, self.vectors.len())?;
        if let Some(index) = &index {
            check_widths(&self.vectors, index.dimension())?;
        }

        debug!(
            vectors = ntotal,
            documents = table.documents().len(),
            "Restored snapshot"
        );
        Ok(RestoredState {
            index,
            table,
            vectors: self.vectors,
        })
    }
}

/// Index-only snapshot guarded by a transaction id and collection version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionalSnapshot {
    pub transaction_id: String,
    pub collection_version: u32,
    pub index: Vec<u8>,
}

impl TransactionalSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let id = self.transaction_id.as_bytes();
        let mut buf = Vec::with_capacity(8 + id.len() + self.index.len());
        buf.write_u32::<LittleEndian>(payload_len(id)?)?;
        buf.extend_from_slice(id);
        buf.write_u32::<LittleEndian>(self.collection_version)?;
        buf.extend_from_slice(&self.index);
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut cursor = Cursor::new(bytes);
        let id_len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| StoreError::Corrupt("missing transaction id length".to_string()))?
            as usize;

        if bytes.len() < 8 + id_len {
            return Err(StoreError::Corrupt(format!(
                "transaction id of {} bytes does not fit in {} byte file",
                id_len,
                bytes.len()
            )));
        }

        let mut id = vec![0u8; id_len];
        cursor.read_exact(&mut id)?;
        let transaction_id = String::from_utf8(id)
            .map_err(|e| StoreError::Corrupt(format!("transaction id: {}", e)))?;
        let collection_version = cursor.read_u32::<LittleEndian>()?;
        let index = bytes[8 + id_len..].to_vec();

        Ok(Self {
            transaction_id,
            collection_version,
            index,
        })
    }

    /// Whether this snapshot was written for the given transaction and version.
    pub fn matches(&self, transaction_id: &str, collection_version: u32) -> bool {
        self.transaction_id == transaction_id && self.collection_version == collection_version
    }
}

fn check_widths(vectors: &[Vec<f32>], dimension: usize) -> Result<(), StoreError> {
    match vectors.iter().position(|row| row.len() != dimension) {
        Some(label) => Err(StoreError::Invariant(format!(
            "vector {} has width {}, index dimension is {}",
            label,
            vectors[label].len(),
            dimension
        ))),
        None => Ok(()),
    }
}

fn payload_len(payload: &[u8]) -> Result<u32, StoreError> {
    u32::try_from(payload.len()).map_err(|_| {
        StoreError::Serialization(format!("payload of {} bytes exceeds u32", payload.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use passage_index::HnswIndex;

    fn sample_state() -> (HnswIndex, AddressTable, Vec<Vec<f32>>) {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]];
        let mut index = HnswIndex::with_dimension(2).unwrap();
        index.add_rows(&vectors).unwrap();

        let mut table = AddressTable::new();
        table.append(
            "doc1",
            "alpha beta",
            vec![ChunkSpan::new(0, 5), ChunkSpan::new(6, 4)],
        );
        table.append("doc2", "gamma", vec![ChunkSpan::new(0, 5)]);
        (index, table, vectors)
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (index, table, vectors) = sample_state();
        let snapshot = Snapshot::capture(Some(&index), &table, &vectors).unwrap();

        let bytes = snapshot.encode().unwrap();
        let decoded = Snapshot::decode(&bytes).unwrap();
        assert_eq!(decoded, snapshot);

        let restored: RestoredState<HnswIndex> = decoded.restore().unwrap();
        assert_eq!(restored.table, table);
        assert_eq!(restored.vectors, vectors);
        let restored_index = restored.index.unwrap();
        assert_eq!(restored_index.len(), index.len());
        assert_eq!(restored_index.vector(2), index.vector(2));
    }

    #[test]
    fn test_snapshot_header_lengths() {
        let (index, table, vectors) = sample_state();
        let snapshot = Snapshot::capture(Some(&index), &table, &vectors).unwrap();
        let bytes = snapshot.encode().unwrap();

        let index_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(index_len, snapshot.index.len());
        assert_eq!(&bytes[16..16 + index_len], &snapshot.index[..]);
    }

    #[test]
    fn test_empty_snapshot_restores_without_index() {
        let snapshot =
            Snapshot::capture::<HnswIndex>(None, &AddressTable::new(), &[]).unwrap();
        let bytes = snapshot.encode().unwrap();
        assert_eq!(bytes.len(), 16 + 2 + 2 + 2);

        let restored: RestoredState<HnswIndex> = Snapshot::decode(&bytes).unwrap().restore().unwrap();
        assert!(restored.index.is_none());
        assert!(restored.table.is_empty());
    }

    #[test]
    fn test_span_count_mismatch_is_fatal() {
        let (index, table, vectors) = sample_state();
        let mut snapshot = Snapshot::capture(Some(&index), &table, &vectors).unwrap();
        snapshot.spans.push(ChunkSpan::new(0, 1));
        snapshot.documents[1].length += 1;

        let result = snapshot.restore::<HnswIndex>();
        assert!(matches!(result, Err(StoreError::Invariant(_))));
    }

    #[test]
    fn test_vector_count_mismatch_is_fatal() {
        let (index, table, vectors) = sample_state();
        let mut snapshot = Snapshot::capture(Some(&index), &table, &vectors).unwrap();
        snapshot.vectors.pop();

        let result = snapshot.restore::<HnswIndex>();
        assert!(matches!(result, Err(StoreError::Invariant(_))));
    }

    #[test]
    fn test_vector_width_mismatch_is_fatal() {
        let (index, table, vectors) = sample_state();
        let mut snapshot = Snapshot::capture(Some(&index), &table, &vectors).unwrap();
        snapshot.vectors[1] = vec![0.0, 1.0, 0.0];

        let result = snapshot.restore::<HnswIndex>();
        assert!(matches!(result, Err(StoreError::Invariant(_))));
    }

    #[test]
    fn test_spans_without_documents_is_fatal() {
        let (index, table, vectors) = sample_state();
        let mut snapshot = Snapshot::capture(Some(&index), &table, &vectors).unwrap();
        snapshot.documents.clear();

        let result = snapshot.restore::<HnswIndex>();
        assert!(matches!(result, Err(StoreError::Invariant(_))));
    }

    #[test]
    fn test_truncated_snapshot_is_corrupt() {
        let (index, table, vectors) = sample_state();
        let bytes = Snapshot::capture(Some(&index), &table, &vectors)
            .unwrap()
            .encode()
            .unwrap();

        assert!(matches!(
            Snapshot::decode(&bytes[..bytes.len() - 3]),
            Err(StoreError::Corrupt(_))
        ));
        assert!(matches!(
            Snapshot::decode(&bytes[..10]),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_transactional_round_trip() {
        let snapshot = TransactionalSnapshot {
            transaction_id: "tx-42".to_string(),
            collection_version: 7,
            index: vec![1, 2, 3, 4],
        };
        let bytes = snapshot.encode().unwrap();
        assert_eq!(&bytes[..4], &5u32.to_le_bytes());
        assert_eq!(&bytes[4..9], b"tx-42");
        assert_eq!(&bytes[9..13], &7u32.to_le_bytes());

        let decoded = TransactionalSnapshot::decode(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
        assert!(decoded.matches("tx-42", 7));
        assert!(!decoded.matches("tx-41", 7));
        assert!(!decoded.matches("tx-42", 8));
    }

    #[test]
    fn test_transactional_truncated_is_corrupt() {
        let mut bytes = 100u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"short");
        assert!(matches!(
            TransactionalSnapshot::decode(&bytes),
            Err(StoreError::Corrupt(_))
        ));
        assert!(matches!(
            TransactionalSnapshot::decode(&[1, 2]),
            Err(StoreError::Corrupt(_))
        ));
    }
}
