//! In-memory [`IndexStore`] implementation for tests.
//!
//! `HashMap` and `Vec` behind `std::sync::RwLock`; vector search is
//! brute-force cosine over every stored entry. Behavior matches the SQLite
//! backend, including version compare-and-swap and tie-breaking.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{EngineError, Result};
use crate::models::{Document, IndexEntry, ScoredEntry};

use super::{keyword_score, query_terms, rank_and_truncate, IndexStore};

/// In-memory store for tests and ephemeral indexes.
pub struct InMemoryStore {
    dims: usize,
    docs: RwLock<HashMap<String, Document>>,
    entries: RwLock<Vec<IndexEntry>>,
}

impl InMemoryStore {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            docs: RwLock::new(HashMap::new()),
            entries: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().unwrap().get(id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self.docs.read().unwrap().values().cloned().collect();
        docs.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn upsert(&self, document: &Document, entries: &[IndexEntry]) -> Result<bool> {
        let mut docs = self.docs.write().unwrap();
        if let Some(existing) = docs.get(&document.id) {
            if existing.version >= document.version {
                return Ok(false);
            }
        }

        let mut stored = self.entries.write().unwrap();
        stored.retain(|e| e.document_id != document.id);
        stored.extend(entries.iter().cloned());
        docs.insert(document.id.clone(), document.clone());
        Ok(true)
    }

    async fn delete(&self, document_id: &str) -> Result<bool> {
        let existed = self.docs.write().unwrap().remove(document_id).is_some();
        self.entries
            .write()
            .unwrap()
            .retain(|e| e.document_id != document_id);
        Ok(existed)
    }

    async fn vector_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        if query_vec.len() != self.dims {
            return Err(EngineError::DimensionMismatch {
                expected: self.dims,
                actual: query_vec.len(),
            });
        }

        let entries = self.entries.read().unwrap();
        let scored = entries
            .iter()
            .map(|e| ScoredEntry {
                chunk_id: e.chunk_id.clone(),
                document_id: e.document_id.clone(),
                ordinal: e.ordinal,
                text: e.text.clone(),
                source_name: e.source_name.clone(),
                score: cosine_similarity(query_vec, &e.vector) as f64,
            })
            .collect();
        Ok(rank_and_truncate(scored, k))
    }

    async fn keyword_search(&self, query: &str, k: usize) -> Result<Vec<ScoredEntry>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().unwrap();
        let scored = entries
            .iter()
            .filter_map(|e| {
                let score = keyword_score(&terms, &e.text);
                (score > 0.0).then(|| ScoredEntry {
                    chunk_id: e.chunk_id.clone(),
                    document_id: e.document_id.clone(),
                    ordinal: e.ordinal,
                    text: e.text.clone(),
                    source_name: e.source_name.clone(),
                    score,
                })
            })
            .collect();
        Ok(rank_and_truncate(scored, k))
    }
}
