//! Structural properties of clustered search over random corpora.

use passage_index::{HnswIndex, VectorIndex};
use passage_search::{ClusterEngine, SearchCorpus, SearchRequest};
use passage_store::AddressTable;
use passage_types::ChunkSpan;
use rand::Rng;

const DIMENSION: usize = 8;

fn random_vector(rng: &mut impl Rng) -> Vec<f32> {
    (0..DIMENSION).map(|_| rng.random_range(-1.0..1.0)).collect()
}

#[test]
fn test_results_respect_document_bounds_and_ranking() {
    let mut rng = rand::rng();

    for _ in 0..20 {
        let mut index = HnswIndex::with_dimension(DIMENSION).unwrap();
        let mut table = AddressTable::new();
        let mut vectors = Vec::new();

        for d in 0..rng.random_range(1..6) {
            let chunks = rng.random_range(1..12);
            let mut content = String::new();
            let mut spans = Vec::new();
            for c in 0..chunks {
                let text = format!("doc{d} chunk{c}. ");
                spans.push(ChunkSpan::new(content.len(), text.len()));
                content.push_str(&text);
            }
            let rows: Vec<Vec<f32>> = (0..chunks).map(|_| random_vector(&mut rng)).collect();
            table.append(format!("doc{d}"), content, spans);
            index.add_rows(&rows).unwrap();
            vectors.extend(rows);
        }
        table.verify(index.len(), vectors.len()).unwrap();

        let engine = ClusterEngine::default();
        let corpus = SearchCorpus::new(&index, &table, &vectors);
        let query = random_vector(&mut rng);
        let k = rng.random_range(1..5);
        let request = SearchRequest::new(&query, k)
            .with_min_relevance(-10.0)
            .with_content_size(rng.random_range(0..3));

        let results = engine.search(&corpus, &request).unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= k);
        assert!(results
            .windows(2)
            .all(|pair| pair[0].relevance >= pair[1].relevance));

        for result in &results {
            assert!(!result.labels.is_empty());
            assert!(result.labels.windows(2).all(|pair| pair[0] < pair[1]));
            for &label in &result.labels {
                let owner = table.document_for_label(label).unwrap();
                assert_eq!(owner.name, result.path_name);
                assert!(owner.content.contains(&result.content));
            }
        }

        let mut contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        contents.sort_unstable();
        contents.dedup();
        assert_eq!(contents.len(), results.len());
    }
}
