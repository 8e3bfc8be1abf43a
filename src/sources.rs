//! Uploads-directory scanner.
//!
//! Walks the configured uploads root and yields pre-extracted plain-text
//! documents for the ingestion pipeline. Format-specific extraction (PDF,
//! DOCX, Drive exports) happens upstream; whatever lands here is treated as
//! text. External sync sources push documents through the HTTP API instead.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::UploadsConfig;

/// A scanned document ready for ingestion.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Stable origin the document id derives from (path relative to root).
    pub origin: String,
    /// Name cited in search results.
    pub display_name: String,
    pub text: String,
}

/// Scan the uploads root for ingestable text documents.
///
/// Results are sorted by origin for deterministic processing order.
pub fn scan_uploads(config: &UploadsConfig) -> Result<Vec<SourceDocument>> {
    let root = &config.root;
    if !root.exists() {
        bail!("uploads root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/.DS_Store".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let text = std::fs::read_to_string(path).unwrap_or_default();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| rel_str.clone());

        documents.push(SourceDocument {
            origin: rel_str,
            display_name,
            text,
        });
    }

    documents.sort_by(|a, b| a.origin.cmp(&b.origin));

    Ok(documents)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
