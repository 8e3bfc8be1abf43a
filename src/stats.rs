//! Index statistics overview.
//!
//! Quick summary of what's indexed: document and chunk counts, embedding
//! coverage, and a per-source breakdown. Used by `gnd stats` to confirm
//! ingestion is keeping up.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let total_vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Groundwork — Index Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        total_vectors,
        total_chunks,
        if total_chunks > 0 {
            (total_vectors * 100) / total_chunks
        } else {
            0
        }
    );

    let source_rows = sqlx::query(
        r#"
        SELECT
            d.source,
            COUNT(DISTINCT d.id) AS doc_count,
            COUNT(DISTINCT c.id) AS chunk_count,
            MAX(d.last_indexed_at) AS last_indexed
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        GROUP BY d.source
        ORDER BY doc_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !source_rows.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<12} {:>6} {:>8}   {}",
            "SOURCE", "DOCS", "CHUNKS", "LAST INDEXED"
        );
        println!("  {}", "-".repeat(48));

        for row in &source_rows {
            let source: String = row.get("source");
            let doc_count: i64 = row.get("doc_count");
            let chunk_count: i64 = row.get("chunk_count");
            let last_indexed: Option<i64> = row.get("last_indexed");
            let when = match last_indexed {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<12} {:>6} {:>8}   {}",
                source, doc_count, chunk_count, when
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts(ts)
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
