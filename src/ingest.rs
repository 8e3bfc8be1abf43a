//! Ingestion pipeline orchestration.
//!
//! For each arriving document: fingerprint → reindex decision → chunk →
//! embed → versioned upsert. The document record (fingerprint, version)
//! commits in the same store transaction as its entries, so a failure at
//! any step leaves the previous version fully searchable and a retry simply
//! reprocesses the whole document.
//!
//! Concurrent ingestions of *different* documents run freely; ingestions of
//! the *same* document id serialize on a per-id async mutex, with the
//! store's version compare-and-swap as the backstop against stale writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::chunker::chunk_text;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingGateway;
use crate::error::Result;
use crate::fingerprint::{fingerprint, should_reindex};
use crate::models::{chunk_id, document_id, Document, IndexEntry, SourceKind};
use crate::store::IndexStore;

/// What happened to a document handed to [`IngestionPipeline::ingest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new version was chunked, embedded, and committed.
    Indexed {
        document_id: String,
        version: i64,
        chunks: usize,
    },
    /// The fingerprint matched the stored record; nothing was done.
    Unchanged { document_id: String },
    /// The write lost a version race and was discarded; the index already
    /// holds a newer version.
    Superseded { document_id: String },
}

/// One async mutex per document id, created on demand.
///
/// The registry itself is only held long enough to clone the per-document
/// lock, so unrelated documents never contend.
#[derive(Default)]
struct DocumentLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentLocks {
    fn for_document(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        map.entry(id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Orchestrates chunking, embedding, and storage for arriving documents.
pub struct IngestionPipeline {
    store: Arc<dyn IndexStore>,
    gateway: Arc<EmbeddingGateway>,
    chunking: ChunkingConfig,
    locks: DocumentLocks,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn IndexStore>,
        gateway: Arc<EmbeddingGateway>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            chunking,
            locks: DocumentLocks::default(),
        }
    }

    /// Ingest the extracted text of one document.
    ///
    /// `origin` is the stable source location (path or file id) the document
    /// id derives from; `display_name` is what search results cite.
    pub async fn ingest(
        &self,
        source: SourceKind,
        origin: &str,
        display_name: &str,
        text: &str,
    ) -> Result<IngestOutcome> {
        let doc_id = document_id(source, origin);

        let lock = self.locks.for_document(&doc_id);
        let _guard = lock.lock().await;

        let current = self.store.get_document(&doc_id).await?;
        let candidate = fingerprint(text);

        if !should_reindex(current.as_ref(), &candidate) {
            info!(document = %doc_id, "fingerprint unchanged, skipping reindex");
            return Ok(IngestOutcome::Unchanged { document_id: doc_id });
        }

        let spans = chunk_text(text, self.chunking.max_chars, self.chunking.overlap_chars)?;
        let texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
        // All chunks embed before anything is written: a document is never
        // searchable with only part of its vectors.
        let vectors = self.gateway.embed(&texts).await?;

        let now = chrono::Utc::now().timestamp();
        let version = current.as_ref().map(|d| d.version + 1).unwrap_or(1);
        let document = Document {
            id: doc_id.clone(),
            source,
            display_name: display_name.to_string(),
            fingerprint: candidate,
            version,
            created_at: current.as_ref().map(|d| d.created_at).unwrap_or(now),
            last_indexed_at: now,
        };

        let entries: Vec<IndexEntry> = spans
            .into_iter()
            .zip(vectors)
            .map(|(span, vector)| IndexEntry {
                chunk_id: chunk_id(&doc_id, version, span.ordinal),
                document_id: doc_id.clone(),
                version,
                ordinal: span.ordinal,
                start: span.start,
                end: span.end,
                text: span.text,
                vector,
                source_name: display_name.to_string(),
            })
            .collect();

        let chunks = entries.len();
        if self.store.upsert(&document, &entries).await? {
            info!(document = %doc_id, version, chunks, "document indexed");
            Ok(IngestOutcome::Indexed {
                document_id: doc_id,
                version,
                chunks,
            })
        } else {
            warn!(document = %doc_id, version, "stale reindex discarded");
            Ok(IngestOutcome::Superseded { document_id: doc_id })
        }
    }

    /// Remove a document and all of its index entries.
    pub async fn remove(&self, document_id: &str) -> Result<bool> {
        let lock = self.locks.for_document(document_id);
        let _guard = lock.lock().await;
        self.store.delete(document_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::EmbeddingClient;
    use crate::error::EngineError;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts embed calls; embeds each text to a constant vector.
    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingClient {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn pipeline() -> (IngestionPipeline, Arc<InMemoryStore>, Arc<CountingClient>) {
        let store = Arc::new(InMemoryStore::new(2));
        let client = Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
        });
        let config = EmbeddingConfig {
            provider: "openai".into(),
            model: "counting".into(),
            dims: 2,
            batch_size: 16,
            max_retries: 0,
            timeout_secs: 5,
            max_concurrent_batches: 2,
        };
        let gateway = Arc::new(EmbeddingGateway::new(client.clone(), &config));
        let chunking = ChunkingConfig {
            max_chars: 100,
            overlap_chars: 20,
        };
        (
            IngestionPipeline::new(store.clone(), gateway, chunking),
            store,
            client,
        )
    }

    #[tokio::test]
    async fn test_first_ingest_indexes_at_version_one() {
        let (pipeline, store, _) = pipeline();

        let outcome = pipeline
            .ingest(SourceKind::Upload, "notes.txt", "notes.txt", "some document text")
            .await
            .unwrap();

        let doc_id = document_id(SourceKind::Upload, "notes.txt");
        assert_eq!(
            outcome,
            IngestOutcome::Indexed {
                document_id: doc_id.clone(),
                version: 1,
                chunks: 1,
            }
        );
        let stored = store.get_document(&doc_id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_reingest_unchanged_is_noop() {
        let (pipeline, _, client) = pipeline();

        pipeline
            .ingest(SourceKind::Upload, "a.txt", "a.txt", "stable content")
            .await
            .unwrap();
        let calls_after_first = client.calls.load(Ordering::SeqCst);

        let outcome = pipeline
            .ingest(SourceKind::Upload, "a.txt", "a.txt", "stable content")
            .await
            .unwrap();

        assert!(matches!(outcome, IngestOutcome::Unchanged { .. }));
        // Exactly one embedding cycle happened across both calls.
        assert_eq!(client.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_formatting_only_edit_skips_reindex() {
        let (pipeline, _, _) = pipeline();

        pipeline
            .ingest(SourceKind::Upload, "a.txt", "a.txt", "alpha beta gamma")
            .await
            .unwrap();
        let outcome = pipeline
            .ingest(SourceKind::Upload, "a.txt", "a.txt", "alpha\n\tbeta   gamma\n")
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Unchanged { .. }));
    }

    #[tokio::test]
    async fn test_content_edit_bumps_version() {
        let (pipeline, store, _) = pipeline();

        pipeline
            .ingest(SourceKind::Drive, "file-1", "plan.md", "first draft")
            .await
            .unwrap();
        let outcome = pipeline
            .ingest(SourceKind::Drive, "file-1", "plan.md", "second draft")
            .await
            .unwrap();

        let doc_id = document_id(SourceKind::Drive, "file-1");
        assert!(matches!(
            outcome,
            IngestOutcome::Indexed { version: 2, .. }
        ));
        let stored = store.get_document(&doc_id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.fingerprint, fingerprint("second draft"));
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_last_good_version() {
        struct FailingClient;

        #[async_trait]
        impl EmbeddingClient for FailingClient {
            fn model_name(&self) -> &str {
                "failing"
            }
            fn dims(&self) -> usize {
                2
            }
            async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Err(EngineError::EmbeddingUnavailable("provider down".into()))
            }
        }

        let (pipeline, store, _) = pipeline();
        pipeline
            .ingest(SourceKind::Upload, "a.txt", "a.txt", "good version")
            .await
            .unwrap();

        let config = EmbeddingConfig {
            provider: "openai".into(),
            model: "failing".into(),
            dims: 2,
            batch_size: 16,
            max_retries: 0,
            timeout_secs: 5,
            max_concurrent_batches: 1,
        };
        let failing = IngestionPipeline::new(
            store.clone(),
            Arc::new(EmbeddingGateway::new(Arc::new(FailingClient), &config)),
            ChunkingConfig {
                max_chars: 100,
                overlap_chars: 20,
            },
        );

        let err = failing
            .ingest(SourceKind::Upload, "a.txt", "a.txt", "edited version")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmbeddingUnavailable(_)));

        // The record still points at the last successfully indexed state,
        // so a retry reprocesses the whole document.
        let doc_id = document_id(SourceKind::Upload, "a.txt");
        let stored = store.get_document(&doc_id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.fingerprint, fingerprint("good version"));
    }

    #[tokio::test]
    async fn test_concurrent_ingests_of_same_document_serialize() {
        let (pipeline, store, _) = pipeline();
        let pipeline = Arc::new(pipeline);

        let mut handles = Vec::new();
        for i in 0..8 {
            let p = pipeline.clone();
            handles.push(tokio::spawn(async move {
                p.ingest(
                    SourceKind::Upload,
                    "shared.txt",
                    "shared.txt",
                    &format!("revision number {}", i),
                )
                .await
                .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Every distinct revision indexed in some serial order; the final
        // version count equals the number of actual reindexes.
        let doc_id = document_id(SourceKind::Upload, "shared.txt");
        let stored = store.get_document(&doc_id).await.unwrap().unwrap();
        assert!(stored.version >= 1 && stored.version <= 8);

        // No mixed versions: every searchable entry belongs to one version.
        let hits = store.keyword_search("revision", 50).await.unwrap();
        assert!(!hits.is_empty());
        let versions: std::collections::HashSet<&str> = hits
            .iter()
            .map(|h| h.chunk_id.rsplit(':').nth(1).unwrap())
            .collect();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_deletes_document() {
        let (pipeline, store, _) = pipeline();
        pipeline
            .ingest(SourceKind::Upload, "a.txt", "a.txt", "to be deleted")
            .await
            .unwrap();

        let doc_id = document_id(SourceKind::Upload, "a.txt");
        assert!(pipeline.remove(&doc_id).await.unwrap());
        assert!(store.get_document(&doc_id).await.unwrap().is_none());
        assert!(!pipeline.remove(&doc_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_text_indexes_zero_chunks() {
        let (pipeline, store, _) = pipeline();
        let outcome = pipeline
            .ingest(SourceKind::Upload, "empty.txt", "empty.txt", "   \n ")
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Indexed { chunks: 0, .. }));

        let doc_id = document_id(SourceKind::Upload, "empty.txt");
        assert!(store.get_document(&doc_id).await.unwrap().is_some());
        assert!(store.keyword_search("empty", 10).await.unwrap().is_empty());
    }
}
