//! Embedding provider abstraction and the batching gateway.
//!
//! [`EmbeddingClient`] is the narrow seam to an external embedding provider:
//! one call, one batch, no policy. [`EmbeddingGateway`] wraps a client with
//! the engine's policy (batch splitting, bounded in-flight concurrency,
//! retry with exponential backoff, response validation) so callers get
//! the contract the pipeline depends on: order preserved, one vector per
//! input, all of the configured dimensionality, all-or-nothing.
//!
//! Also provides the vector utilities shared by the store backends:
//! [`cosine_similarity`], [`vec_to_blob`], and [`blob_to_vec`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::config::EmbeddingConfig;
use crate::error::{EngineError, Result};

/// A raw embedding backend. Implementations perform exactly one provider
/// call per `embed_batch` invocation; batching, retry, and validation live
/// in [`EmbeddingGateway`].
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-ada-002"`).
    fn model_name(&self) -> &str;

    /// Declared vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed one batch of texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Batching, retrying, concurrency-bounding front to an [`EmbeddingClient`].
pub struct EmbeddingGateway {
    client: Arc<dyn EmbeddingClient>,
    batch_size: usize,
    max_retries: u32,
    permits: Arc<Semaphore>,
}

impl EmbeddingGateway {
    pub fn new(client: Arc<dyn EmbeddingClient>, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            permits: Arc::new(Semaphore::new(config.max_concurrent_batches.max(1))),
        }
    }

    pub fn dims(&self) -> usize {
        self.client.dims()
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Embed a sequence of texts, returning one vector per input in order.
    ///
    /// Inputs are split into provider-sized batches. An empty input is a
    /// no-op success. Any batch failing after bounded retries fails the
    /// whole call: callers never see a partially embedded document.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch_with_retry(batch).await?);
        }
        Ok(vectors)
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| EngineError::EmbeddingMalformed("empty response for query".into()))
    }

    async fn embed_batch_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // 1s, 2s, 4s, ... capped at 32s.
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            // Hold the permit across the provider call so the semaphore
            // bounds in-flight requests, not merely dispatch rate.
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| EngineError::EmbeddingUnavailable("gateway shut down".into()))?;

            match self.client.embed_batch(batch).await {
                Ok(vectors) => match self.validate(batch.len(), vectors) {
                    Ok(vectors) => return Ok(vectors),
                    Err(err) => {
                        tracing::warn!(attempt, error = %err, "embedding response rejected");
                        last_err = Some(err);
                    }
                },
                Err(err) if err.is_retryable() => {
                    tracing::warn!(attempt, error = %err, "embedding call failed");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err
            .unwrap_or_else(|| EngineError::EmbeddingUnavailable("retries exhausted".into())))
    }

    fn validate(&self, expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
        if vectors.len() != expected {
            return Err(EngineError::EmbeddingMalformed(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                expected
            )));
        }
        let dims = self.client.dims();
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != dims {
                return Err(EngineError::EmbeddingMalformed(format!(
                    "vector {} has {} dimensions, expected {}",
                    i,
                    vector.len(),
                    dims
                )));
            }
        }
        Ok(vectors)
    }
}

// ============ OpenAI client ============

/// Embedding client for the OpenAI embeddings API.
///
/// Posts batches to `POST /v1/embeddings`. The API key is read from the
/// `OPENAI_API_KEY` environment variable at construction time.
pub struct OpenAiEmbeddings {
    model: String,
    dims: usize,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EngineError::InvalidConfig("OPENAI_API_KEY environment variable not set".into())
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            api_key,
            http,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::EmbeddingUnavailable(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::EmbeddingMalformed(e.to_string()))?;
        parse_openai_response(&json)
    }
}

/// Extract the `data[].embedding` arrays from an OpenAI response, in order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EngineError::EmbeddingMalformed("missing data array".into()))?;

    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EngineError::EmbeddingMalformed("missing embedding field".into()))?;
        vectors.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(vectors)
}

/// Build the configured embedding client.
pub fn create_client(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbeddings::new(config)?)),
        other => Err(EngineError::InvalidConfig(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
