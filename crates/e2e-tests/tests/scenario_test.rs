//! End-to-end retrieval scenarios: insert, search, remove, reload.

use std::fs;

use pretty_assertions::assert_eq;

use e2e_tests::{basis, near_duplicates, normalized, ChunkedDocument, TestHarness};
use passage_db::PersistState;
use passage_store::Snapshot;

/// One document, one chunk covering all of it: searching with its own
/// vector returns exactly that document's content.
#[test]
fn test_single_document_single_chunk() {
    let harness = TestHarness::new();
    let db = harness.open("kb", 1);

    let doc = ChunkedDocument::from_chunks(&["The quick brown fox jumps over the lazy dog."]);
    let vector = normalized(vec![0.3, 0.4, 0.5]);
    doc.insert_into(&db, "doc1", vec![vector.clone()]);

    let results = db.search(&[], &vector, 1, 0.0, 0).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].path_name, "doc1");
    assert_eq!(results[0].content, doc.content);
    assert_eq!(results[0].labels, vec![0]);
}

/// Removing the first document shifts the second one's labels down and
/// never resolves a hit to the removed document.
#[test]
fn test_multi_document_removal() {
    let harness = TestHarness::new();
    let db = harness.open("kb", 1);

    let doc1 = ChunkedDocument::numbered("first", 3);
    let doc2 = ChunkedDocument::numbered("second", 2);
    doc1.insert_into(&db, "doc1", vec![basis(4, 0), basis(4, 0), basis(4, 0)]);
    doc2.insert_into(&db, "doc2", vec![basis(4, 1), basis(4, 1)]);

    let before = db.search(&[], &basis(4, 1), 1, 0.5, 0).unwrap();
    assert_eq!(before[0].labels, vec![3, 4]);

    assert_eq!(db.remove("doc1", None).unwrap(), 1);

    let after = db.search(&[], &basis(4, 1), 1, 0.5, 0).unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].path_name, "doc2");
    assert_eq!(after[0].labels, vec![0, 1]);
    assert_eq!(after[0].content, before[0].content);

    for query in [basis(4, 0), basis(4, 1), normalized(vec![1.0, 1.0, 0.0, 0.0])] {
        for result in db.search(&[], &query, 5, -1.0, 1).unwrap() {
            assert_eq!(result.path_name, "doc2");
        }
    }
}

/// Twenty near-duplicate sequential chunks with k = 1 come back as one
/// passage spanning several adjacent chunks.
#[test]
fn test_oversampled_clustering() {
    let harness = TestHarness::new();
    let db = harness.open("kb", 1);

    let doc = ChunkedDocument::numbered("dense", 20);
    doc.insert_into(&db, "dense", near_duplicates(20, 3));

    let query = normalized(vec![1.0, 0.5, 0.0]);
    let results = db.search(&[], &query, 1, 0.0, 0).unwrap();

    assert_eq!(results.len(), 1);
    let labels = &results[0].labels;
    assert!(labels.len() > 1, "expected a multi-chunk passage, got {labels:?}");
    assert!(labels.windows(2).all(|pair| pair[1] == pair[0] + 1));
    for label in labels {
        assert!(results[0].content.contains(&format!("dense chunk {label}. ")));
    }
}

/// A snapshot whose span table disagrees with the index loads as empty and
/// reports the problem.
#[test]
fn test_corrupt_snapshot() {
    let harness = TestHarness::new();
    let db = harness.open("kb", 1);
    ChunkedDocument::numbered("doc", 3).insert_into(&db, "doc", near_duplicates(3, 2));
    let path = db.save_to_disk(1).unwrap();
    assert_eq!(path, harness.snapshot_path("kb", 1));

    let mut snapshot = Snapshot::decode(&fs::read(&path).unwrap()).unwrap();
    snapshot.spans.push(snapshot.spans[0]);
    snapshot.documents[0].length += 1;
    fs::write(&path, snapshot.encode().unwrap()).unwrap();

    let reopened = harness.open("kb", 1);
    let stats = reopened.stats();
    assert_eq!(stats.vectors, 0);
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.state, PersistState::Unloaded);

    let err = reopened.load_from_disk(1).unwrap_err();
    assert!(err.is_invariant_violation());
    assert!(reopened.documents().is_empty());
    assert!(reopened.search(&[], &basis(2, 0), 1, 0.0, 0).unwrap().is_empty());
}

/// Keywords lift a passage containing them above an otherwise equal one.
#[test]
fn test_keyword_boost_breaks_ties() {
    let harness = TestHarness::new();
    let db = harness.open("kb", 1);

    let shared = normalized(vec![1.0, 1.0]);
    ChunkedDocument::from_chunks(&["Tokio drives async tasks."]).insert_into(
        &db,
        "tokio",
        vec![shared.clone()],
    );
    ChunkedDocument::from_chunks(&["Rayon splits work across threads."]).insert_into(
        &db,
        "rayon",
        vec![shared.clone()],
    );

    let keywords = vec!["RAYON".to_string()];
    let results = db.search(&keywords, &shared, 2, 0.0, 0).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].path_name, "rayon");
    assert!(results[0].relevance > results[1].relevance);
}

/// Per-chunk search returns one padded passage per hit.
#[test]
fn test_raw_chunk_search() {
    let harness = TestHarness::new();
    let db = harness.open("kb", 1);

    let doc = ChunkedDocument::from_chunks(&["aaaa", "bbbb", "cccc"]);
    doc.insert_into(&db, "doc", vec![basis(3, 0), basis(3, 1), basis(3, 2)]);

    let results = db.search_chunks(&basis(3, 1), 1, 0.5, 2).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "aabbbbcc");
    assert_eq!(results[0].relevance, 1.0);
}

/// A debounced flush writes the snapshot once the quiet period passes.
#[tokio::test(start_paused = true)]
async fn test_debounced_flush_persists() {
    let harness = TestHarness::new();
    let db = harness.open("kb", 2);

    for i in 0..3 {
        ChunkedDocument::numbered(&format!("doc{i}"), 2).insert_into(
            &db,
            &format!("doc{i}"),
            near_duplicates(2, 2),
        );
    }
    assert!(db.has_pending_flush());
    assert!(!harness.snapshot_path("kb", 2).exists());

    db.wait_idle().await;
    assert!(harness.snapshot_path("kb", 2).exists());

    let reopened = harness.open("kb", 2);
    assert_eq!(reopened.documents(), db.documents());
}
