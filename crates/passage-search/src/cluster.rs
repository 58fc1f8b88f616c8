//! Hit expansion, clustering and cluster merging.
//!
//! A search runs in stages:
//! 1. Broad lookup for `k × oversample` candidates, filtered by relevance.
//! 2. Expansion: the strongest `k × expansion_factor` candidates each probe
//!    their own `k + 1` neighbors; unseen labels join the hit set.
//! 3. Hits are sorted by label and swept into clusters using two pass-level
//!    statistics (average gap and average relevance).
//! 4. Clusters are materialized, scored, ranked and truncated to `k`.
//! 5. Retained clusters absorb nearby related clusters, then results are
//!    deduplicated by content.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use passage_index::{SearchHit, VectorIndex};
use passage_store::{AddressTable, StoreError};
use passage_types::{
    cosine_similarity, dot, Document, Label, PassageResult, ScoreWeights, SearchSettings,
};
use tracing::debug;

use crate::error::SearchError;
use crate::scorer::RelevanceScorer;

/// Read-only view of the state a search runs against.
pub struct SearchCorpus<'a, I> {
    pub index: &'a I,
    pub table: &'a AddressTable,
    /// Raw vectors, one per label
    pub vectors: &'a [Vec<f32>],
}

impl<'a, I: VectorIndex> SearchCorpus<'a, I> {
    pub fn new(index: &'a I, table: &'a AddressTable, vectors: &'a [Vec<f32>]) -> Self {
        Self {
            index,
            table,
            vectors,
        }
    }

    fn vector(&self, label: Label) -> Result<&'a [f32], StoreError> {
        self.vectors
            .get(label)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::Invariant(format!("no raw vector for label {label}")))
    }
}

/// Parameters of one search call.
#[derive(Debug, Clone)]
pub struct SearchRequest<'q> {
    pub query: &'q [f32],
    /// Keywords for the keyword boost, matched case-insensitively
    pub keywords: &'q [String],
    /// Number of passages wanted
    pub k: usize,
    /// Raw hits scoring below this are dropped before clustering
    pub min_relevance: f32,
    /// Padding around each passage: labels for clustered search, bytes for
    /// per-chunk search
    pub content_size: usize,
}

impl<'q> SearchRequest<'q> {
    pub fn new(query: &'q [f32], k: usize) -> Self {
        Self {
            query,
            keywords: &[],
            k,
            min_relevance: 0.0,
            content_size: 0,
        }
    }

    pub fn with_keywords(mut self, keywords: &'q [String]) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    pub fn with_content_size(mut self, content_size: usize) -> Self {
        self.content_size = content_size;
        self
    }
}

/// A group of nearby, related labels within one document.
#[derive(Debug, Clone)]
pub struct Cluster<'a> {
    pub document: &'a Document,
    pub labels: BTreeSet<Label>,
    pub centroid: Vec<f32>,
    pub score: f32,
    pub content: String,
}

impl Cluster<'_> {
    pub fn first_label(&self) -> Label {
        self.labels.first().copied().unwrap_or(self.document.start_label)
    }

    pub fn last_label(&self) -> Label {
        self.labels.last().copied().unwrap_or(self.document.start_label)
    }

    /// Label distance between two clusters' ranges; 0 when they overlap.
    fn range_distance(&self, other: &Cluster<'_>) -> usize {
        if other.first_label() > self.last_label() {
            other.first_label() - self.last_label()
        } else if self.first_label() > other.last_label() {
            self.first_label() - other.last_label()
        } else {
            0
        }
    }

    fn into_result(self) -> PassageResult {
        PassageResult {
            content: self.content,
            relevance: self.score,
            path_name: self.document.name.clone(),
            labels: self.labels.into_iter().collect(),
        }
    }
}

/// Statistics of one search pass that drive the sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PassStats {
    average_gap: f32,
    average_distance: f32,
}

impl PassStats {
    /// `hits` must be sorted by ascending label.
    fn compute(hits: &[SearchHit], settings: &SearchSettings) -> Self {
        match hits {
            [] => Self {
                average_gap: 0.0,
                average_distance: 0.0,
            },
            [only] => Self {
                average_gap: 0.0,
                average_distance: only.score,
            },
            _ => {
                let gaps: f32 = hits
                    .windows(2)
                    .map(|pair| (pair[1].label - pair[0].label).min(settings.max_gap) as f32)
                    .sum();
                let average_gap = gaps / (hits.len() - 1) as f32 * settings.gap_scale;
                let average_distance =
                    hits.iter().map(|h| h.score).sum::<f32>() / hits.len() as f32;
                Self {
                    average_gap,
                    average_distance,
                }
            }
        }
    }
}

/// A cluster still being built by the sweep.
struct OpenCluster<'a> {
    document: &'a Document,
    anchor: Label,
    anchor_vector: &'a [f32],
    labels: Vec<Label>,
}

impl<'a> OpenCluster<'a> {
    fn start(document: &'a Document, label: Label, vector: &'a [f32]) -> Self {
        Self {
            document,
            anchor: label,
            anchor_vector: vector,
            labels: vec![label],
        }
    }

    fn accepts(&self, document: &Document, label: Label, vector: &[f32], stats: PassStats) -> bool {
        let last = self.labels.last().copied().unwrap_or(self.anchor);
        std::ptr::eq(self.document, document)
            && (label - last) as f32 <= stats.average_gap
            && (label - self.anchor) as f32 <= 2.0 * stats.average_gap
            && cosine_similarity(self.anchor_vector, vector) >= stats.average_distance
    }
}

/// Clusters raw index hits into scored passages.
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    settings: SearchSettings,
    scorer: RelevanceScorer,
}

impl Default for ClusterEngine {
    fn default() -> Self {
        Self::new(SearchSettings::default(), ScoreWeights::default())
    }
}

impl ClusterEngine {
    pub fn new(settings: SearchSettings, weights: ScoreWeights) -> Self {
        let scorer = RelevanceScorer::new(weights, settings.weak_similarity);
        Self { settings, scorer }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Clustered search: up to `k` multi-chunk passages, best first.
    pub fn search<I: VectorIndex>(
        &self,
        corpus: &SearchCorpus<'_, I>,
        request: &SearchRequest<'_>,
    ) -> Result<Vec<PassageResult>, SearchError> {
        let ntotal = corpus.index.len();
        if ntotal == 0 || request.k == 0 {
            return Ok(Vec::new());
        }
        let k = request.k.min(ntotal);

        let broad = k.saturating_mul(self.settings.oversample).clamp(k, ntotal);
        let candidates: Vec<SearchHit> = corpus
            .index
            .search(request.query, broad)?
            .into_iter()
            .filter(|hit| hit.score >= request.min_relevance)
            .collect();
        if candidates.is_empty() {
            debug!(k, min_relevance = request.min_relevance, "No candidates above threshold");
            return Ok(Vec::new());
        }

        let hits = self.expand(corpus, request.query, &candidates, k)?;
        let stats = PassStats::compute(&hits, &self.settings);
        let groups = self.sweep(corpus, &hits, stats)?;

        let mut clusters = Vec::with_capacity(groups.len());
        for group in groups {
            clusters.push(self.materialize(corpus, request, group)?);
        }
        clusters.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.first_label().cmp(&b.first_label()))
        });

        debug!(
            candidates = candidates.len(),
            hits = hits.len(),
            clusters = clusters.len(),
            average_gap = stats.average_gap,
            average_distance = stats.average_distance,
            "Clustered search pass"
        );

        let merged = self.merge_retained(corpus, clusters, k, stats, request.content_size);
        Ok(dedup_by_content(merged.into_iter().map(Cluster::into_result)))
    }

    /// Per-chunk search: one passage per raw hit, each span padded by
    /// `content_size` bytes.
    pub fn search_chunks<I: VectorIndex>(
        &self,
        corpus: &SearchCorpus<'_, I>,
        request: &SearchRequest<'_>,
    ) -> Result<Vec<PassageResult>, SearchError> {
        let ntotal = corpus.index.len();
        if ntotal == 0 || request.k == 0 {
            return Ok(Vec::new());
        }

        let hits = corpus.index.search(request.query, request.k.min(ntotal))?;
        let mut results = Vec::with_capacity(hits.len());
        for hit in hits.into_iter().filter(|h| h.score >= request.min_relevance) {
            let document = corpus.table.document_for_label(hit.label)?;
            results.push(PassageResult {
                content: corpus
                    .table
                    .padded_span(document, hit.label, request.content_size),
                relevance: hit.score,
                path_name: document.name.clone(),
                labels: vec![hit.label],
            });
        }
        Ok(dedup_by_content(results))
    }

    /// Add each strong candidate's own neighbors to the hit set.
    ///
    /// Returns every hit sorted by ascending label. Newly found labels are
    /// scored by their inner product with the query.
    fn expand<I: VectorIndex>(
        &self,
        corpus: &SearchCorpus<'_, I>,
        query: &[f32],
        candidates: &[SearchHit],
        k: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut hits: BTreeMap<Label, f32> =
            candidates.iter().map(|h| (h.label, h.score)).collect();

        let probes = candidates
            .len()
            .min(k.saturating_mul(self.settings.expansion_factor));
        let neighbors = (k + 1).min(corpus.index.len());
        for candidate in &candidates[..probes] {
            let anchor = corpus.vector(candidate.label)?;
            for neighbor in corpus.index.search(anchor, neighbors)? {
                if hits.contains_key(&neighbor.label) {
                    continue;
                }
                let vector = corpus.vector(neighbor.label)?;
                hits.insert(neighbor.label, dot(query, vector));
            }
        }

        Ok(hits
            .into_iter()
            .map(|(label, score)| SearchHit::new(label, score))
            .collect())
    }

    /// Group label-sorted hits into clusters in a single pass.
    fn sweep<'a, I: VectorIndex>(
        &self,
        corpus: &SearchCorpus<'a, I>,
        hits: &[SearchHit],
        stats: PassStats,
    ) -> Result<Vec<OpenCluster<'a>>, SearchError> {
        let mut groups: Vec<OpenCluster<'a>> = Vec::new();
        for hit in hits {
            let document = corpus.table.document_for_label(hit.label)?;
            let vector = corpus.vector(hit.label)?;
            let joins = groups
                .last()
                .is_some_and(|open| open.accepts(document, hit.label, vector, stats));
            if let Some(open) = groups.last_mut().filter(|_| joins) {
                open.labels.push(hit.label);
            } else {
                groups.push(OpenCluster::start(document, hit.label, vector));
            }
        }
        Ok(groups)
    }

    fn materialize<'a, I: VectorIndex>(
        &self,
        corpus: &SearchCorpus<'a, I>,
        request: &SearchRequest<'_>,
        group: OpenCluster<'a>,
    ) -> Result<Cluster<'a>, SearchError> {
        let labels: BTreeSet<Label> = group.labels.into_iter().collect();
        let mut members = Vec::with_capacity(labels.len());
        for &label in &labels {
            members.push(corpus.vector(label)?);
        }

        let content = window(corpus.table, group.document, &labels, request.content_size);
        let score = self
            .scorer
            .score(request.query, &members, &content, request.keywords);

        Ok(Cluster {
            document: group.document,
            labels,
            centroid: score.centroid,
            score: score.combined,
            content,
        })
    }

    /// Keep the top `k` clusters, letting each absorb lower-ranked clusters
    /// of the same document that sit within `2 × average_gap` labels and
    /// whose centroids are related. Scores are left as ranked.
    fn merge_retained<'a, I: VectorIndex>(
        &self,
        corpus: &SearchCorpus<'a, I>,
        mut ranked: Vec<Cluster<'a>>,
        k: usize,
        stats: PassStats,
        content_size: usize,
    ) -> Vec<Cluster<'a>> {
        let retained = k.min(ranked.len());
        let reach = 2.0 * stats.average_gap;
        let mut absorbed = vec![false; ranked.len()];

        for i in 0..retained {
            if absorbed[i] {
                continue;
            }
            let mut grew = false;
            for j in (i + 1)..ranked.len() {
                if absorbed[j] {
                    continue;
                }
                let (keeper, other) = (&ranked[i], &ranked[j]);
                let related = std::ptr::eq(keeper.document, other.document)
                    && keeper.range_distance(other) as f32 <= reach
                    && cosine_similarity(&keeper.centroid, &other.centroid)
                        >= self.settings.merge_similarity;
                if !related {
                    continue;
                }
                let labels = other.labels.clone();
                ranked[i].labels.extend(labels);
                absorbed[j] = true;
                grew = true;
            }
            if grew {
                let keeper = &ranked[i];
                let content = window(corpus.table, keeper.document, &keeper.labels, content_size);
                debug!(
                    first = keeper.first_label(),
                    last = keeper.last_label(),
                    "Merged neighboring clusters"
                );
                ranked[i].content = content;
            }
        }

        ranked
            .into_iter()
            .zip(absorbed)
            .take(retained)
            .filter_map(|(cluster, absorbed)| (!absorbed).then_some(cluster))
            .collect()
    }
}

/// Content of `labels` padded by `content_size` labels on each side.
fn window(
    table: &AddressTable,
    document: &Document,
    labels: &BTreeSet<Label>,
    content_size: usize,
) -> String {
    let (Some(&first), Some(&last)) = (labels.first(), labels.last()) else {
        return String::new();
    };
    table.content_window(
        document,
        first.saturating_sub(content_size),
        last.saturating_add(content_size),
    )
}

/// Drop results whose content repeats an earlier one.
fn dedup_by_content(results: impl IntoIterator<Item = PassageResult>) -> Vec<PassageResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|result| seen.insert(result.content.clone()))
        .collect()
}
