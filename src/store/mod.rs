//! Storage abstraction for the vector index.
//!
//! The [`IndexStore`] trait defines every storage operation the ingestion
//! pipeline and retriever need: versioned atomic replacement of a document's
//! entries, deletion, and the two search channels. Document records live in
//! the same store as the entries, so the store is the single source of truth
//! for what is currently searchable and both survive a process restart.
//!
//! Two backends exist: [`sqlite::SqliteStore`] for persistence and
//! [`memory::InMemoryStore`] for tests.

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Document, IndexEntry, ScoredEntry};

/// Abstract storage backend for documents and their index entries.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Fetch a document record by id.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// List all document records, ordered by display name then id.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Atomically replace all entries of earlier versions of this document
    /// with `entries`, committing the document record in the same step.
    ///
    /// Returns `false` when the stored version is already at or past
    /// `document.version`: the write lost a race and was discarded without
    /// touching the index. There is never an intermediate state where two
    /// versions of one document are both searchable.
    async fn upsert(&self, document: &Document, entries: &[IndexEntry]) -> Result<bool>;

    /// Remove a document record and all of its entries. Returns whether the
    /// document existed.
    async fn delete(&self, document_id: &str) -> Result<bool>;

    /// Rank entries by cosine similarity against `query_vec`.
    ///
    /// Ties break by lower ordinal, then lower document id. Fails with
    /// [`crate::error::EngineError::DimensionMismatch`] when the query
    /// vector's dimensionality differs from the index's.
    async fn vector_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredEntry>>;

    /// Rank entries by term-frequency weighted token overlap with `query`.
    /// Entries with no overlapping terms are omitted.
    async fn keyword_search(&self, query: &str, k: usize) -> Result<Vec<ScoredEntry>>;
}

/// Lowercase alphanumeric tokens of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Distinct query terms, in first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for token in tokenize(query) {
        if !terms.contains(&token) {
            terms.push(token);
        }
    }
    terms
}

/// Term-frequency weighted overlap: the total number of occurrences of the
/// distinct query terms within `text`.
pub fn keyword_score(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_default() += 1;
    }
    terms
        .iter()
        .map(|t| counts.get(t).copied().unwrap_or(0) as f64)
        .sum()
}

/// Deterministic ranking shared by both backends: score descending, then
/// lower ordinal, then lower document id, then chunk id; truncated to `k`.
pub fn rank_and_truncate(mut entries: Vec<ScoredEntry>, k: usize) -> Vec<ScoredEntry> {
    entries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.ordinal.cmp(&b.ordinal))
            .then(a.document_id.cmp(&b.document_id))
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    entries.truncate(k);
    entries
}
