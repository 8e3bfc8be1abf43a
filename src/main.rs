//! # Groundwork CLI (`gnd`)
//!
//! The `gnd` binary is the operational interface to the retrieval engine:
//! database initialization, document ingestion, hybrid search, document
//! management, index statistics, and the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! gnd --config ./config/groundwork.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gnd init` | Create the SQLite database and run schema migrations |
//! | `gnd ingest` | Scan the uploads directory and (re)index changed documents |
//! | `gnd search "<query>"` | Hybrid search over the index |
//! | `gnd get <id>` | Print a document record and its chunks |
//! | `gnd documents` | List indexed documents |
//! | `gnd delete <id>` | Remove a document and its chunks |
//! | `gnd stats` | Index statistics |
//! | `gnd serve` | Start the HTTP query/sync API |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! gnd init --config ./config/groundwork.toml
//!
//! # Index everything under the uploads root
//! gnd ingest --config ./config/groundwork.toml
//!
//! # Ask a question with custom weights
//! gnd search "refund policy" --k 3 --vector-weight 0.7 --keyword-weight 0.3
//!
//! # Serve the query API
//! gnd serve --config ./config/groundwork.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use groundwork::chunker::chunk_text;
use groundwork::config::{load_config, Config};
use groundwork::db;
use groundwork::embedding::{create_client, EmbeddingGateway};
use groundwork::get::run_get;
use groundwork::ingest::{IngestOutcome, IngestionPipeline};
use groundwork::migrate;
use groundwork::models::SourceKind;
use groundwork::retriever::Retriever;
use groundwork::server::run_server;
use groundwork::sources::scan_uploads;
use groundwork::stats::run_stats;
use groundwork::store::sqlite::SqliteStore;
use groundwork::store::IndexStore;

/// Groundwork — a hybrid retrieval engine for grounded document question
/// answering.
#[derive(Parser)]
#[command(
    name = "gnd",
    about = "Groundwork — a hybrid retrieval engine for grounded document question answering",
    version,
    long_about = "Groundwork ingests plain-text documents, splits them into overlapping chunks, \
    embeds them, and answers queries by fusing vector similarity with keyword matching. \
    Results carry source attribution for grounded answer generation."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/groundwork.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (documents,
    /// chunks, chunk_vectors, chunks_fts). Idempotent.
    Init,

    /// Scan the uploads directory and index new or changed documents.
    ///
    /// Unchanged documents (by content fingerprint) are skipped without
    /// re-embedding; changed documents are re-chunked, re-embedded, and
    /// replaced atomically at a new version.
    Ingest {
        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Search the index.
    Search {
        /// The query string.
        query: String,

        /// Number of results to return (defaults to retrieval.top_k).
        #[arg(long)]
        k: Option<usize>,

        /// Weight of the vector similarity channel.
        #[arg(long)]
        vector_weight: Option<f64>,

        /// Weight of the keyword overlap channel.
        #[arg(long)]
        keyword_weight: Option<f64>,
    },

    /// Print a document record and its chunks.
    Get {
        /// Document id.
        id: String,
    },

    /// List indexed documents.
    Documents,

    /// Remove a document and all of its chunks from the index.
    Delete {
        /// Document id.
        id: String,
    },

    /// Show index statistics.
    Stats,

    /// Start the HTTP query/sync API server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            println!("Database initialized at {}", config.db.path.display());
        }
        Commands::Ingest { dry_run, limit } => {
            run_ingest(&config, dry_run, limit).await?;
        }
        Commands::Search {
            query,
            k,
            vector_weight,
            keyword_weight,
        } => {
            run_search(&config, &query, k, vector_weight, keyword_weight).await?;
        }
        Commands::Get { id } => {
            run_get(&config, &id).await?;
        }
        Commands::Documents => {
            run_documents(&config).await?;
        }
        Commands::Delete { id } => {
            run_delete(&config, &id).await?;
        }
        Commands::Stats => {
            run_stats(&config).await?;
        }
        Commands::Serve => {
            run_server(&config).await?;
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let pool = db::connect(config).await?;
    Ok(Arc::new(SqliteStore::new(pool, config.embedding.dims)))
}

fn open_gateway(config: &Config) -> Result<Arc<EmbeddingGateway>> {
    let client = create_client(&config.embedding)?;
    Ok(Arc::new(EmbeddingGateway::new(client, &config.embedding)))
}

async fn run_ingest(config: &Config, dry_run: bool, limit: Option<usize>) -> Result<()> {
    let uploads = config
        .uploads
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("No [uploads] section in config"))?;

    let mut documents = scan_uploads(uploads)?;
    if let Some(lim) = limit {
        documents.truncate(lim);
    }

    if dry_run {
        println!("ingest (dry-run)");
        println!("  documents found: {}", documents.len());
        let mut total_chunks = 0usize;
        for doc in &documents {
            total_chunks += chunk_text(
                &doc.text,
                config.chunking.max_chars,
                config.chunking.overlap_chars,
            )?
            .len();
        }
        println!("  estimated chunks: {}", total_chunks);
        return Ok(());
    }

    let store = open_store(config).await?;
    let gateway = open_gateway(config)?;
    let pipeline = IngestionPipeline::new(store.clone(), gateway, config.chunking.clone());

    let mut indexed = 0u64;
    let mut unchanged = 0u64;
    let mut chunks_written = 0u64;

    for doc in &documents {
        let outcome = pipeline
            .ingest(SourceKind::Upload, &doc.origin, &doc.display_name, &doc.text)
            .await
            .with_context(|| format!("Failed to ingest {}", doc.origin))?;

        match outcome {
            IngestOutcome::Indexed { chunks, .. } => {
                indexed += 1;
                chunks_written += chunks as u64;
            }
            IngestOutcome::Unchanged { .. } => unchanged += 1,
            IngestOutcome::Superseded { .. } => {}
        }
    }

    println!("ingest");
    println!("  documents found: {}", documents.len());
    println!("  indexed: {}", indexed);
    println!("  unchanged: {}", unchanged);
    println!("  chunks written: {}", chunks_written);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    vector_weight: Option<f64>,
    keyword_weight: Option<f64>,
) -> Result<()> {
    let store = open_store(config).await?;
    let gateway = open_gateway(config)?;
    let retriever = Retriever::new(
        store.clone(),
        gateway,
        config.retrieval.overfetch_factor,
    );

    let results = retriever
        .retrieve(
            query,
            k.unwrap_or(config.retrieval.top_k),
            vector_weight.unwrap_or(config.retrieval.vector_weight),
            keyword_weight.unwrap_or(config.retrieval.keyword_weight),
        )
        .await?;

    if results.is_empty() {
        println!("No results.");
        store.pool().close().await;
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let excerpt: String = result.text.chars().take(160).collect();
        println!(
            "{}. [{:.3}] {} (vector {:.2} / keyword {:.2})",
            i + 1,
            result.score,
            result.source_name,
            result.vector_score,
            result.keyword_score
        );
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!("    chunk: {}", result.chunk_id);
        println!();
    }

    store.pool().close().await;
    Ok(())
}

async fn run_documents(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let documents = store.list_documents().await?;

    if documents.is_empty() {
        println!("No documents indexed.");
    } else {
        println!(
            "{:<34} {:<8} {:>7}   {}",
            "ID", "SOURCE", "VERSION", "NAME"
        );
        for doc in &documents {
            println!(
                "{:<34} {:<8} {:>7}   {}",
                doc.id,
                doc.source.as_str(),
                doc.version,
                doc.display_name
            );
        }
    }

    store.pool().close().await;
    Ok(())
}

async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let deleted = store.delete(id).await?;
    store.pool().close().await;

    if !deleted {
        bail!("Document not found: {}", id);
    }
    println!("Deleted {}", id);
    Ok(())
}
