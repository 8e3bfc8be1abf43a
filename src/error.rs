//! Engine error taxonomy.
//!
//! Every failure mode of the retrieval engine maps to one of these variants.
//! Caller errors (`InvalidConfig`, `InvalidQuery`) are rejected immediately;
//! the embedding variants are transient and worth retrying with backoff;
//! `StoreUnavailable` is fatal to the current operation; `DimensionMismatch`
//! indicates a configuration or programming error and is never retried.

use thiserror::Error;

/// Failure taxonomy for the retrieval engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected before any work was attempted.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Query rejected before any search was issued.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The embedding provider could not be reached or refused the request.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The embedding provider answered, but the response did not line up
    /// with the request (wrong vector count or dimensionality).
    #[error("embedding response malformed: {0}")]
    EmbeddingMalformed(String),

    /// The index store backend failed or is unreachable.
    #[error("index store unavailable: {0}")]
    StoreUnavailable(String),

    /// A query vector's dimensionality differs from the index's.
    #[error("query vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EngineError {
    /// Whether a bounded retry with backoff is appropriate for this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::EmbeddingUnavailable(_) | EngineError::EmbeddingMalformed(_)
        )
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::EmbeddingUnavailable(err.to_string())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
