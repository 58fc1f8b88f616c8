//! # passage-search
//!
//! Turns raw nearest-neighbor hits into ranked passages.
//!
//! A broad, oversampled lookup is expanded with secondary neighbor probes,
//! swept in label order into spatially and semantically coherent clusters,
//! scored, ranked, and finally merged with nearby related clusters.
//!
//! ## Scoring
//! `0.6 × centroid similarity + 0.3 × keyword boost + 0.1 × diversity`,
//! with weights taken from [`passage_types::ScoreWeights`].

pub mod cluster;
pub mod error;
pub mod scorer;

pub use cluster::{Cluster, ClusterEngine, SearchCorpus, SearchRequest};
pub use error::SearchError;
pub use scorer::{diversity_score, keyword_boost, ClusterScore, RelevanceScorer};
