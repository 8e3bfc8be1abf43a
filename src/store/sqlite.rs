//! SQLite-backed [`IndexStore`] implementation.
//!
//! Documents, chunks, and chunk vectors live in one SQLite database (WAL
//! mode, schema in [`crate::migrate`]). Replacing a document's entries and
//! committing its record happen in a single transaction, with a version
//! compare-and-swap so a stale writer is detected and discarded; readers see
//! either the old chunk set or the new one, never a mixture.
//!
//! Keyword search uses the FTS5 table only to recall candidate rows; the
//! actual score is the same term-frequency overlap the in-memory backend
//! computes, so the two backends rank identically.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{EngineError, Result};
use crate::models::{Document, IndexEntry, ScoredEntry, SourceKind};

use super::{keyword_score, query_terms, rank_and_truncate, IndexStore};

/// SQLite implementation of the [`IndexStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let source_raw: String = row.get("source");
    let source = SourceKind::parse(&source_raw).ok_or_else(|| {
        EngineError::StoreUnavailable(format!("unknown source kind in store: {}", source_raw))
    })?;

    Ok(Document {
        id: row.get("id"),
        source,
        display_name: row.get("display_name"),
        fingerprint: row.get("fingerprint"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        last_indexed_at: row.get("last_indexed_at"),
    })
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, source, display_name, fingerprint, version, created_at, last_indexed_at \
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| document_from_row(&r)).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, source, display_name, fingerprint, version, created_at, last_indexed_at \
             FROM documents ORDER BY display_name ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn upsert(&self, document: &Document, entries: &[IndexEntry]) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Compare-and-swap on the stored version: a writer that lost the
        // race sees an equal or newer version and backs off.
        let stored_version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM documents WHERE id = ?")
                .bind(&document.id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(version) = stored_version {
            if version >= document.version {
                return Ok(false);
            }
        }

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, source, display_name, fingerprint, version, created_at, last_indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source = excluded.source,
                display_name = excluded.display_name,
                fingerprint = excluded.fingerprint,
                version = excluded.version,
                last_indexed_at = excluded.last_indexed_at
            "#,
        )
        .bind(&document.id)
        .bind(document.source.as_str())
        .bind(&document.display_name)
        .bind(&document.fingerprint)
        .bind(document.version)
        .bind(document.created_at)
        .bind(document.last_indexed_at)
        .execute(&mut *tx)
        .await?;

        for entry in entries {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, version, ordinal, start_offset, end_offset, text) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.chunk_id)
            .bind(&entry.document_id)
            .bind(entry.version)
            .bind(entry.ordinal)
            .bind(entry.start as i64)
            .bind(entry.end as i64)
            .bind(&entry.text)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, document_id, text) VALUES (?, ?, ?)")
                .bind(&entry.chunk_id)
                .bind(&entry.document_id)
                .bind(&entry.text)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT INTO chunk_vectors (chunk_id, document_id, embedding) VALUES (?, ?, ?)",
            )
            .bind(&entry.chunk_id)
            .bind(&entry.document_id)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn delete(&self, document_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn vector_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        if query_vec.len() != self.dims {
            return Err(EngineError::DimensionMismatch {
                expected: self.dims,
                actual: query_vec.len(),
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.document_id, cv.embedding,
                   c.ordinal, c.text, d.display_name
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = cv.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                ScoredEntry {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    ordinal: row.get("ordinal"),
                    text: row.get("text"),
                    source_name: row.get("display_name"),
                    score: cosine_similarity(query_vec, &vector) as f64,
                }
            })
            .collect();

        Ok(rank_and_truncate(scored, k))
    }

    async fn keyword_search(&self, query: &str, k: usize) -> Result<Vec<ScoredEntry>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // Quoted terms OR-ed together recall any chunk containing at least
        // one query term; ranking happens below, not in FTS5.
        let match_expr = terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR ");

        let rows = sqlx::query(
            r#"
            SELECT chunks_fts.chunk_id, chunks_fts.document_id,
                   c.ordinal, c.text, d.display_name
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.chunk_id
            JOIN documents d ON d.id = chunks_fts.document_id
            WHERE chunks_fts MATCH ?
            "#,
        )
        .bind(&match_expr)
        .fetch_all(&self.pool)
        .await?;

        let scored = rows
            .iter()
            .filter_map(|row| {
                let text: String = row.get("text");
                let score = keyword_score(&terms, &text);
                (score > 0.0).then(|| ScoredEntry {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    ordinal: row.get("ordinal"),
                    text,
                    source_name: row.get("display_name"),
                    score,
                })
            })
            .collect();

        Ok(rank_and_truncate(scored, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use crate::models::chunk_id;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        SqliteStore::new(pool, 2)
    }

    fn doc(id: &str, version: i64, fingerprint: &str) -> Document {
        Document {
            id: id.into(),
            source: SourceKind::Drive,
            display_name: format!("{}.md", id),
            fingerprint: fingerprint.into(),
            version,
            created_at: 100,
            last_indexed_at: 100 + version,
        }
    }

    fn entry(doc_id: &str, version: i64, ordinal: i64, text: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk_id: chunk_id(doc_id, version, ordinal),
            document_id: doc_id.into(),
            version,
            ordinal,
            start: 0,
            end: text.chars().count(),
            text: text.into(),
            vector,
            source_name: format!("{}.md", doc_id),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_roundtrip() {
        let store = test_store().await;
        let entries = vec![entry("d1", 1, 0, "hello chunk", vec![1.0, 0.0])];
        assert!(store.upsert(&doc("d1", 1, "fp1"), &entries).await.unwrap());

        let stored = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(stored.source, SourceKind::Drive);
        assert_eq!(stored.version, 1);
        assert_eq!(stored.fingerprint, "fp1");

        assert!(store.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reindex_replaces_old_version_atomically() {
        let store = test_store().await;

        let v1 = vec![
            entry("d1", 1, 0, "alpha text", vec![1.0, 0.0]),
            entry("d1", 1, 1, "beta text", vec![1.0, 0.0]),
        ];
        store.upsert(&doc("d1", 1, "fp1"), &v1).await.unwrap();

        let v2 = vec![entry("d1", 2, 0, "gamma text", vec![0.0, 1.0])];
        assert!(store.upsert(&doc("d1", 2, "fp2"), &v2).await.unwrap());

        // Only version-2 entries remain searchable, in every channel.
        let vec_hits = store.vector_search(&[0.0, 1.0], 10).await.unwrap();
        assert_eq!(vec_hits.len(), 1);
        assert_eq!(vec_hits[0].chunk_id, "d1:2:0");

        let kw_hits = store.keyword_search("alpha", 10).await.unwrap();
        assert!(kw_hits.is_empty());
        let kw_hits = store.keyword_search("gamma", 10).await.unwrap();
        assert_eq!(kw_hits.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_version_discarded() {
        let store = test_store().await;

        let v3 = vec![entry("d1", 3, 0, "newest", vec![1.0, 0.0])];
        store.upsert(&doc("d1", 3, "fp3"), &v3).await.unwrap();

        let stale = vec![entry("d1", 2, 0, "older", vec![0.0, 1.0])];
        assert!(!store.upsert(&doc("d1", 2, "fp2"), &stale).await.unwrap());

        let stored = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(stored.version, 3);
        let hits = store.keyword_search("newest", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_vector_search_ranks_by_similarity() {
        let store = test_store().await;
        let entries = vec![
            entry("d1", 1, 0, "east", vec![1.0, 0.0]),
            entry("d1", 1, 1, "north", vec![0.0, 1.0]),
            entry("d1", 1, 2, "northeast", vec![0.7, 0.7]),
        ];
        store.upsert(&doc("d1", 1, "fp1"), &entries).await.unwrap();

        let hits = store.vector_search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "east");
        assert_eq!(hits[1].text, "northeast");
    }

    #[tokio::test]
    async fn test_vector_search_dimension_mismatch() {
        let store = test_store().await;
        let err = store.vector_search(&[1.0, 0.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(err, EngineError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_keyword_search_matches_memory_backend_scoring() {
        let store = test_store().await;
        let entries = vec![
            entry("d1", 1, 0, "refund policy for refund requests", vec![1.0, 0.0]),
            entry("d1", 1, 1, "shipping times and carriers", vec![0.0, 1.0]),
        ];
        store.upsert(&doc("d1", 1, "fp1"), &entries).await.unwrap();

        let hits = store.keyword_search("refund policy", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 3.0);

        // Punctuation in the query must not break the FTS match expression.
        let hits = store.keyword_search("refund-policy?", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_document() {
        let store = test_store().await;
        let entries = vec![entry("d1", 1, 0, "to be removed", vec![1.0, 0.0])];
        store.upsert(&doc("d1", 1, "fp1"), &entries).await.unwrap();

        assert!(store.delete("d1").await.unwrap());
        assert!(!store.delete("d1").await.unwrap());
        assert!(store.keyword_search("removed", 10).await.unwrap().is_empty());
        assert!(store.vector_search(&[1.0, 0.0], 10).await.unwrap().is_empty());
    }
}
