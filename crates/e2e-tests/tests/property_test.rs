//! Properties that must hold across arbitrary insert/remove sequences.

use pretty_assertions::assert_eq;
use rand::Rng;

use e2e_tests::{random_vectors, ChunkedDocument, TestHarness};
use passage_types::cosine_similarity;

const DIMENSION: usize = 6;

/// After every insert or remove, documents tile the label space exactly and
/// the span table, raw vector table and index agree on the vector count.
#[test]
fn test_label_density_under_random_operations() {
    let harness = TestHarness::new();
    let db = harness.open("density", 1);
    let mut rng = rand::rng();
    let mut expected_total = 0usize;

    for step in 0..60 {
        let names = ["a", "b", "c", "d", "e"];
        let name = names[rng.random_range(0..names.len())];

        let inserting = rng.random_bool(0.6);
        if inserting {
            let chunks = rng.random_range(1..6);
            let doc = ChunkedDocument::numbered(&format!("{name}{step}"), chunks);
            doc.insert_into(&db, name, random_vectors(&mut rng, chunks, DIMENSION));
            expected_total += chunks;
        } else {
            let removed_labels: usize = db
                .documents()
                .iter()
                .filter(|doc| doc.name == name)
                .map(|doc| doc.length)
                .sum();
            db.remove(name, None).unwrap();
            expected_total -= removed_labels;
        }

        let documents = db.documents();
        let mut next = 0;
        for doc in &documents {
            assert_eq!(doc.start_label, next, "gap before '{}'", doc.name);
            next += doc.length;
        }
        assert_eq!(next, expected_total);
        let stats = db.stats();
        assert_eq!(stats.vectors, expected_total);
        assert_eq!(stats.spans, expected_total);
        assert_eq!(stats.stored_vectors, expected_total);
        if !inserting {
            assert!(documents.iter().all(|doc| doc.name != name));
        }
    }
}

/// Saving and loading reproduces the tables, the index and search results.
#[test]
fn test_round_trip_persistence() {
    let harness = TestHarness::new();
    let db = harness.open("roundtrip", 1);
    let mut rng = rand::rng();

    for d in 0..5 {
        let chunks = rng.random_range(1..8);
        ChunkedDocument::numbered(&format!("doc{d}"), chunks).insert_into(
            &db,
            &format!("doc{d}"),
            random_vectors(&mut rng, chunks, DIMENSION),
        );
    }
    db.remove("doc2", None).unwrap();
    db.save_to_disk(4).unwrap();

    let reopened = harness.open("roundtrip", 4);
    assert_eq!(reopened.documents(), db.documents());
    assert_eq!(reopened.stats().vectors, db.stats().vectors);
    assert_eq!(reopened.stats().dimension, db.stats().dimension);

    let query = random_vectors(&mut rng, 1, DIMENSION).remove(0);
    assert_eq!(
        reopened.search(&[], &query, 3, -1.0, 1).unwrap(),
        db.search(&[], &query, 3, -1.0, 1).unwrap()
    );
}

/// Removing an earlier document leaves a later one's passages unchanged
/// apart from the label offset.
#[test]
fn test_removal_reindexing_preserves_later_documents() {
    let harness = TestHarness::new();
    let db = harness.open("reindex", 1);
    let mut rng = rand::rng();

    let a_vectors = random_vectors(&mut rng, 4, DIMENSION);
    let b_vectors = random_vectors(&mut rng, 5, DIMENSION);
    ChunkedDocument::numbered("alpha", 4).insert_into(&db, "A", a_vectors);
    ChunkedDocument::numbered("beta", 5).insert_into(&db, "B", b_vectors.clone());

    let before: Vec<_> = b_vectors
        .iter()
        .map(|q| db.search_chunks(q, 1, 0.99, 0).unwrap())
        .collect();

    db.remove("A", None).unwrap();

    for (query, before) in b_vectors.iter().zip(before) {
        let after = db.search_chunks(query, 1, 0.99, 0).unwrap();
        assert_eq!(after.len(), before.len());
        for (after, before) in after.iter().zip(&before) {
            if before.path_name != "B" {
                continue;
            }
            assert_eq!(after.path_name, "B");
            assert_eq!(after.content, before.content);
            assert_eq!(after.labels, vec![before.labels[0] - 4]);
        }
    }
}

/// Identical inputs give identical ordered results.
#[test]
fn test_clustering_determinism() {
    let harness = TestHarness::new();
    let db = harness.open("determinism", 1);
    let mut rng = rand::rng();

    for d in 0..6 {
        let chunks = rng.random_range(2..10);
        ChunkedDocument::numbered(&format!("doc{d}"), chunks).insert_into(
            &db,
            &format!("doc{d}"),
            random_vectors(&mut rng, chunks, DIMENSION),
        );
    }

    let query = random_vectors(&mut rng, 1, DIMENSION).remove(0);
    let keywords = vec!["chunk 1".to_string(), "doc3".to_string()];
    let first = db.search(&keywords, &query, 4, 0.0, 1).unwrap();
    for _ in 0..10 {
        assert_eq!(db.search(&keywords, &query, 4, 0.0, 1).unwrap(), first);
    }
}

#[test]
fn test_cosine_similarity_of_zero_vector() {
    let zero = vec![0.0; DIMENSION];
    let mut rng = rand::rng();
    for vector in random_vectors(&mut rng, 10, DIMENSION) {
        assert_eq!(cosine_similarity(&zero, &vector), 0.0);
        assert_eq!(cosine_similarity(&vector, &zero), 0.0);
    }
    assert_eq!(cosine_similarity(&zero, &zero), 0.0);
}
