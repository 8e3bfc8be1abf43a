//! Boundary-preferring text chunker.
//!
//! Splits extracted document text into overlapping [`ChunkSpan`]s of at most
//! `max_chars` characters. Cuts prefer the nearest preceding sentence or
//! paragraph boundary within a lookback window, falling back to whitespace
//! and finally to a hard character cut, so chunks rarely split mid-sentence.
//!
//! The walk is deterministic: the same input and configuration always
//! produce the same spans. That property is what makes fingerprint-based
//! reindex skipping meaningful: an unchanged document re-chunks to an
//! identical sequence.

use crate::error::{EngineError, Result};
use crate::models::ChunkSpan;

/// How far back from the hard cut to look for a natural boundary,
/// as a fraction of the chunk size.
const LOOKBACK_DIVISOR: usize = 4;

/// Split `text` into overlapping chunks of at most `max_chars` characters.
///
/// Offsets in the returned spans are character offsets into `text`, ordinals
/// are contiguous from 0, and consecutive chunks overlap by `overlap`
/// characters except where the boundary clamp has to keep the walk moving
/// forward. Empty or whitespace-only input produces no chunks.
///
/// Fails with [`EngineError::InvalidConfig`] when `overlap >= max_chars`.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Result<Vec<ChunkSpan>> {
    if max_chars == 0 {
        return Err(EngineError::InvalidConfig(
            "max chunk size must be greater than zero".into(),
        ));
    }
    if overlap >= max_chars {
        return Err(EngineError::InvalidConfig(format!(
            "chunk overlap ({}) must be smaller than max chunk size ({})",
            overlap, max_chars
        )));
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every character boundary, for slicing by char index.
    let byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    let total = byte_offsets.len();
    let byte_at = |char_idx: usize| -> usize {
        if char_idx >= total {
            text.len()
        } else {
            byte_offsets[char_idx]
        }
    };

    let chars: Vec<char> = text.chars().collect();
    let lookback = (max_chars / LOOKBACK_DIVISOR).max(1);

    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut ordinal = 0i64;

    while start < total {
        let end = if total - start <= max_chars {
            total
        } else {
            find_cut(&chars, start, start + max_chars, lookback)
        };

        spans.push(ChunkSpan {
            ordinal,
            start,
            end,
            text: text[byte_at(start)..byte_at(end)].to_string(),
        });
        ordinal += 1;

        if end == total {
            break;
        }
        // Step back by the overlap, but never to or before the previous
        // start; the walk must always make forward progress.
        start = end.saturating_sub(overlap).max(start + 1);
    }

    Ok(spans)
}

/// Pick the cut position for a chunk starting at `start` whose hard limit
/// is `hard`. Scans backwards through the lookback window for the nearest
/// sentence or paragraph boundary, falls back to any whitespace, and
/// degenerates to the hard cut when the window contains neither.
fn find_cut(chars: &[char], start: usize, hard: usize, lookback: usize) -> usize {
    let floor = hard.saturating_sub(lookback).max(start + 1);
    let mut whitespace_cut = None;

    let mut i = hard;
    while i > floor {
        let prev = chars[i - 1];
        if prev == '\n' || (matches!(prev, '.' | '!' | '?') && chars[i].is_whitespace()) {
            return i;
        }
        if whitespace_cut.is_none() && prev.is_whitespace() {
            whitespace_cut = Some(i);
        }
        i -= 1;
    }

    whitespace_cut.unwrap_or(hard)
}
