//! Chunking of statutes and court decisions into retrieval units
//!
//! This module handles splitting legal documents into chunks while:
//! - Splitting statutes at section (`§`) headers
//! - Sub-splitting oversized sections with an overlapping sliding window
//! - Separating a decision's principle from its full-text sections
//! - Producing deterministic chunk ids so re-ingestion overwrites
//!
//! Chunking never fails: documents without structural markers fall back to a
//! single chunk covering the whole text.

mod boundaries;
mod decision;
mod statute;
mod xml;

pub use boundaries::*;
pub use decision::*;
pub use statute::*;
pub use xml::*;

use blake3::Hasher;

/// Rough token estimate (four characters per token, rounded up)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Split text into windows of `size` characters, each overlapping the
/// previous one by `overlap` characters.
///
/// Windows are cut on character boundaries, never inside a UTF-8 sequence.
pub fn sliding_window(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let step = size.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    windows
}

/// Take at most `max_chars` characters. Returns the prefix and whether
/// anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Replace runs of whitespace with `_` so ids stay path- and key-safe
pub fn safe_id_component(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Compute a content hash for change detection
pub fn compute_content_hash(text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// First 12 hex chars of the content hash, for ids of unnamed sources
pub fn short_hash(text: &str) -> String {
    compute_content_hash(text)[..12].to_string()
}
