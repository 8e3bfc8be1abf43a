//! Core data models for the retrieval engine.
//!
//! These types represent the documents, chunks, and search results that flow
//! through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Uploaded directly (local file drop).
    Upload,
    /// Synced from an external drive folder.
    Drive,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Upload => "upload",
            SourceKind::Drive => "drive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(SourceKind::Upload),
            "drive" => Some(SourceKind::Drive),
            _ => None,
        }
    }
}

/// An indexed document record.
///
/// Mutated only by the ingestion pipeline: each successful reindex bumps
/// `version` and replaces `fingerprint` and `last_indexed_at` together with
/// the document's index entries.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub source: SourceKind,
    pub display_name: String,
    /// SHA-256 over whitespace-normalized text; see [`crate::fingerprint`].
    pub fingerprint: String,
    /// Monotonically increasing, starting at 1 on first ingestion.
    pub version: i64,
    pub created_at: i64,
    pub last_indexed_at: i64,
}

/// One chunk of a document's text, as produced by the chunker.
///
/// `start` and `end` are character offsets into the source text. Ordinals
/// are contiguous from 0 for a given document version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub ordinal: i64,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// The persisted, searchable form of a chunk: text plus its embedding and
/// enough metadata to attribute results and retire superseded versions.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub version: i64,
    pub ordinal: i64,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub vector: Vec<f32>,
    pub source_name: String,
}

/// A candidate returned by a single search channel (vector or keyword).
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: i64,
    pub text: String,
    pub source_name: String,
    /// Raw channel score: cosine similarity or keyword overlap.
    pub score: f64,
}

/// A fused, ranked result with its contributing sub-scores, ready for
/// citation by a grounded answer layer.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: i64,
    pub text: String,
    pub source_name: String,
    pub score: f64,
    pub vector_score: f64,
    pub keyword_score: f64,
}

/// Derive the stable document id for a source location.
///
/// The same `(source, origin)` pair always maps to the same id, so repeated
/// ingestions of one file update one document instead of accumulating
/// duplicates.
pub fn document_id(source: SourceKind, origin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(origin.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Chunk ids embed the owning document id, version, and ordinal so entries
/// of a superseded version are addressable as a group.
pub fn chunk_id(document_id: &str, version: i64, ordinal: i64) -> String {
    format!("{}:{}:{}", document_id, version, ordinal)
}
