//! HTTP query and sync API.
//!
//! Exposes the retrieval engine to the surrounding application: the outer
//! chat-completion layer calls `POST /search` to fetch grounded context, and
//! external sync sources (upload handlers, drive webhooks) push extracted
//! text through `POST /documents`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Hybrid retrieval: query + optional k and weights |
//! | `POST` | `/documents` | Ingest one extracted document |
//! | `GET`  | `/documents` | List indexed documents |
//! | `DELETE` | `/documents/{id}` | Remove a document and its chunks |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Caller errors map to 400, provider and store outages to 502/503, and
//! dimension mismatches to 500.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::embedding::{create_client, EmbeddingGateway};
use crate::error::EngineError;
use crate::ingest::{IngestOutcome, IngestionPipeline};
use crate::models::SourceKind;
use crate::retriever::Retriever;
use crate::store::sqlite::SqliteStore;
use crate::store::IndexStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IndexStore>,
    pub pipeline: Arc<IngestionPipeline>,
    pub retriever: Arc<Retriever>,
    pub default_k: usize,
    pub default_vector_weight: f64,
    pub default_keyword_weight: f64,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IndexStore>,
        gateway: Arc<EmbeddingGateway>,
        config: &Config,
    ) -> Self {
        let pipeline = Arc::new(IngestionPipeline::new(
            store.clone(),
            gateway.clone(),
            config.chunking.clone(),
        ));
        let retriever = Arc::new(Retriever::new(
            store.clone(),
            gateway,
            config.retrieval.overfetch_factor,
        ));
        Self {
            store,
            pipeline,
            retriever,
            default_k: config.retrieval.top_k,
            default_vector_weight: config.retrieval.vector_weight,
            default_keyword_weight: config.retrieval.keyword_weight,
        }
    }
}

/// Build the API router for the given state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/documents", post(ingest_document).get(list_documents))
        .route("/documents/{id}", delete(delete_document))
        .layer(cors)
        .with_state(state)
}

/// Start the server using the configured bind address and SQLite store.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn IndexStore> = Arc::new(SqliteStore::new(pool, config.embedding.dims));
    let client = create_client(&config.embedding)?;
    let gateway = Arc::new(EmbeddingGateway::new(client, &config.embedding));

    let state = AppState::new(store, gateway, config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "serving retrieval API");
    println!("Listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Handlers ============

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    k: Option<usize>,
    vector_weight: Option<f64>,
    keyword_weight: Option<f64>,
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let results = state
        .retriever
        .retrieve(
            &req.query,
            req.k.unwrap_or(state.default_k),
            req.vector_weight.unwrap_or(state.default_vector_weight),
            req.keyword_weight.unwrap_or(state.default_keyword_weight),
        )
        .await?;

    Ok(Json(serde_json::json!({ "results": results })))
}

#[derive(Deserialize)]
struct IngestRequest {
    source: String,
    origin: String,
    display_name: String,
    text: String,
}

async fn ingest_document(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let source = SourceKind::parse(&req.source).ok_or_else(|| {
        ApiError::bad_request(format!(
            "unknown source kind: {} (use upload or drive)",
            req.source
        ))
    })?;
    if req.origin.trim().is_empty() {
        return Err(ApiError::bad_request("origin must not be empty".into()));
    }

    let outcome = state
        .pipeline
        .ingest(source, &req.origin, &req.display_name, &req.text)
        .await?;

    let body = match outcome {
        IngestOutcome::Indexed {
            document_id,
            version,
            chunks,
        } => serde_json::json!({
            "status": "indexed",
            "document_id": document_id,
            "version": version,
            "chunks": chunks,
        }),
        IngestOutcome::Unchanged { document_id } => serde_json::json!({
            "status": "unchanged",
            "document_id": document_id,
        }),
        IngestOutcome::Superseded { document_id } => serde_json::json!({
            "status": "superseded",
            "document_id": document_id,
        }),
    };
    Ok(Json(body))
}

async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let documents = state.store.list_documents().await?;
    Ok(Json(serde_json::json!({ "documents": documents })))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.pipeline.remove(&id).await? {
        Ok(Json(serde_json::json!({ "deleted": id })))
    } else {
        Err(ApiError {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: format!("no document with id {}", id),
        })
    }
}

// ============ Error mapping ============

struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let (status, code) = match &err {
            EngineError::InvalidConfig(_) | EngineError::InvalidQuery(_) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            EngineError::EmbeddingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "embeddings_unavailable")
            }
            EngineError::EmbeddingMalformed(_) => (StatusCode::BAD_GATEWAY, "embeddings_malformed"),
            EngineError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            EngineError::DimensionMismatch { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}
