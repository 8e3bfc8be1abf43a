//! Document detail command.

use anyhow::{bail, Result};
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Print a document record and its chunk set.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;

    let doc = sqlx::query(
        "SELECT id, source, display_name, fingerprint, version, created_at, last_indexed_at \
         FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?;

    let doc = match doc {
        Some(row) => row,
        None => {
            pool.close().await;
            bail!("Document not found: {}", id);
        }
    };

    let display_name: String = doc.get("display_name");
    let source: String = doc.get("source");
    let version: i64 = doc.get("version");
    let fingerprint: String = doc.get("fingerprint");
    let last_indexed_at: i64 = doc.get("last_indexed_at");

    println!("Document {}", id);
    println!("  name:         {}", display_name);
    println!("  source:       {}", source);
    println!("  version:      {}", version);
    println!("  fingerprint:  {}", fingerprint);
    println!("  last indexed: {}", format_ts(last_indexed_at));

    let chunks = sqlx::query(
        "SELECT ordinal, start_offset, end_offset, text FROM chunks \
         WHERE document_id = ? ORDER BY ordinal ASC",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    println!("  chunks:       {}", chunks.len());
    println!();

    for row in &chunks {
        let ordinal: i64 = row.get("ordinal");
        let start: i64 = row.get("start_offset");
        let end: i64 = row.get("end_offset");
        let text: String = row.get("text");
        let preview: String = text.chars().take(120).collect();
        println!(
            "  [{}] chars {}..{}: {}",
            ordinal,
            start,
            end,
            preview.replace('\n', " ")
        );
    }

    pool.close().await;
    Ok(())
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}
