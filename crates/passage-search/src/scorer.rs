//! Cluster relevance scoring.
//!
//! combined = w_c × centroid similarity + w_k × keyword boost + w_d × diversity
//!
//! with default weights 0.6 / 0.3 / 0.1.

use passage_types::{cosine_similarity, mean_and_std_dev, ScoreWeights};

/// Penalty applied to the spread of member similarities.
const STD_DEV_PENALTY: f32 = 0.1;

/// Breakdown of a cluster's score.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterScore {
    /// Similarity-weighted average of the member vectors
    pub centroid: Vec<f32>,
    pub centroid_similarity: f32,
    pub keyword_boost: f32,
    pub diversity: f32,
    pub combined: f32,
}

/// Scores clusters against a query vector and keyword list.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    weights: ScoreWeights,
    weak_similarity: f32,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(ScoreWeights::default(), 0.1)
    }
}

impl RelevanceScorer {
    /// `weak_similarity`: members below it contribute `sim²` instead of
    /// `sim` to the centroid.
    pub fn new(weights: ScoreWeights, weak_similarity: f32) -> Self {
        Self {
            weights,
            weak_similarity,
        }
    }

    /// Score a cluster given its member vectors and materialized content.
    pub fn score(
        &self,
        query: &[f32],
        members: &[&[f32]],
        content: &str,
        keywords: &[String],
    ) -> ClusterScore {
        let similarities: Vec<f32> = members
            .iter()
            .map(|m| cosine_similarity(m, query))
            .collect();

        let centroid = self.centroid(members, &similarities);
        let centroid_similarity = cosine_similarity(&centroid, query);
        let keyword_boost = keyword_boost(content, keywords);
        let diversity = diversity_score(&similarities);

        let combined = self.weights.centroid * centroid_similarity
            + self.weights.keyword * keyword_boost
            + self.weights.diversity * diversity;

        ClusterScore {
            centroid,
            centroid_similarity,
            keyword_boost,
            diversity,
            combined,
        }
    }

    /// Weighted average of member vectors. Returns a zero vector when all
    /// weights vanish.
    pub fn centroid(&self, members: &[&[f32]], similarities: &[f32]) -> Vec<f32> {
        let dim = members.first().map_or(0, |m| m.len());
        let mut centroid = vec![0.0f32; dim];
        let mut total_weight = 0.0f32;

        for (member, &sim) in members.iter().zip(similarities) {
            let weight = if sim < self.weak_similarity {
                sim * sim
            } else {
                sim
            };
            for (acc, &value) in centroid.iter_mut().zip(member.iter()) {
                *acc += weight * value;
            }
            total_weight += weight;
        }

        if total_weight > 0.0 {
            for value in centroid.iter_mut() {
                *value /= total_weight;
            }
        } else {
            centroid.iter_mut().for_each(|v| *v = 0.0);
        }
        centroid
    }
}

/// Fraction of keywords found (case-insensitive substring) in `content`.
///
/// Blank keywords are ignored; with no usable keywords the boost is 0.
pub fn keyword_boost(content: &str, keywords: &[String]) -> f32 {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return 0.0;
    }

    let haystack = content.to_lowercase();
    let found = keywords.iter().filter(|k| haystack.contains(k.as_str())).count();
    found as f32 / keywords.len() as f32
}

/// `(mean − 0.1 × std_dev) × ln(1 + n)` over member similarities.
pub fn diversity_score(similarities: &[f32]) -> f32 {
    if similarities.is_empty() {
        return 0.0;
    }
    let (mean, std_dev) = mean_and_std_dev(similarities);
    (mean - STD_DEV_PENALTY * std_dev) * (1.0 + similarities.len() as f32).ln()
}
