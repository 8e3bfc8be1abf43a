//! Hybrid retrieval: vector and keyword channels fused into one ranking.
//!
//! Both channels are overfetched (`k * overfetch_factor`) so the fused list
//! can still fill `k` slots when the candidate sets barely intersect. Each
//! channel's scores are normalized to `[0, 1]` against that query's own best
//! score, then combined as a weighted sum. A chunk found by only one channel
//! scores zero on the other; a chunk found by both appears once.
//!
//! Weights are plain multipliers: the retriever accepts any non-negative
//! pair with a positive sum and does not normalize them; that is the
//! caller's concern.

use std::collections::HashMap;
use std::sync::Arc;

use crate::embedding::EmbeddingGateway;
use crate::error::{EngineError, Result};
use crate::models::{RetrievalResult, ScoredEntry};
use crate::store::IndexStore;

/// Hybrid retriever over an [`IndexStore`] and an [`EmbeddingGateway`].
pub struct Retriever {
    store: Arc<dyn IndexStore>,
    gateway: Arc<EmbeddingGateway>,
    overfetch_factor: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn IndexStore>,
        gateway: Arc<EmbeddingGateway>,
        overfetch_factor: usize,
    ) -> Self {
        Self {
            store,
            gateway,
            overfetch_factor: overfetch_factor.max(1),
        }
    }

    /// Retrieve the top-`k` chunks for `query` under the given channel
    /// weights.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        vector_weight: f64,
        keyword_weight: f64,
    ) -> Result<Vec<RetrievalResult>> {
        if query.trim().is_empty() {
            return Err(EngineError::InvalidQuery("query must not be empty".into()));
        }
        if k == 0 {
            return Err(EngineError::InvalidQuery("k must be at least 1".into()));
        }
        for (name, w) in [("vector", vector_weight), ("keyword", keyword_weight)] {
            if !w.is_finite() || w < 0.0 {
                return Err(EngineError::InvalidQuery(format!(
                    "{} weight must be a non-negative number",
                    name
                )));
            }
        }
        if vector_weight + keyword_weight <= 0.0 {
            return Err(EngineError::InvalidQuery(
                "at least one weight must be positive".into(),
            ));
        }

        let fetch = k * self.overfetch_factor;
        let query_vec = self.gateway.embed_query(query).await?;

        let (vector_hits, keyword_hits) = tokio::try_join!(
            self.store.vector_search(&query_vec, fetch),
            self.store.keyword_search(query, fetch),
        )?;

        let mut results = fuse(
            &vector_hits,
            &keyword_hits,
            vector_weight,
            keyword_weight,
        );
        results.truncate(k);
        Ok(results)
    }
}

/// Normalize a channel's scores to `[0, 1]` against its own best score.
///
/// An empty channel yields an empty map; a channel whose best score is not
/// positive contributes zero for every candidate. Negative ratios clamp to
/// zero so fused scores never dip below zero.
fn normalize_by_best(hits: &[ScoredEntry]) -> HashMap<&str, f64> {
    let best = hits.iter().map(|h| h.score).fold(f64::MIN, f64::max);
    hits.iter()
        .map(|h| {
            let norm = if best > 0.0 {
                (h.score / best).clamp(0.0, 1.0)
            } else {
                0.0
            };
            (h.chunk_id.as_str(), norm)
        })
        .collect()
}

/// Merge two channels into one descending ranking.
///
/// Deduplicates by chunk id before scoring, computes
/// `vector_weight * normalized_vector + keyword_weight * normalized_keyword`,
/// and breaks score ties by chunk id for determinism.
fn fuse(
    vector_hits: &[ScoredEntry],
    keyword_hits: &[ScoredEntry],
    vector_weight: f64,
    keyword_weight: f64,
) -> Vec<RetrievalResult> {
    let vector_norm = normalize_by_best(vector_hits);
    let keyword_norm = normalize_by_best(keyword_hits);

    let mut candidates: HashMap<&str, &ScoredEntry> = HashMap::new();
    for hit in vector_hits.iter().chain(keyword_hits.iter()) {
        candidates.entry(hit.chunk_id.as_str()).or_insert(hit);
    }

    let mut results: Vec<RetrievalResult> = candidates
        .into_iter()
        .map(|(chunk_id, entry)| {
            let v = vector_norm.get(chunk_id).copied().unwrap_or(0.0);
            let w = keyword_norm.get(chunk_id).copied().unwrap_or(0.0);
            RetrievalResult {
                chunk_id: entry.chunk_id.clone(),
                document_id: entry.document_id.clone(),
                ordinal: entry.ordinal,
                text: entry.text.clone(),
                source_name: entry.source_name.clone(),
                score: vector_weight * v + keyword_weight * w,
                vector_score: v,
                keyword_score: w,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    results
}
