//! Provider-ready text for embedding requests

use crate::models::{ChunkMetadata, JudicialMetadata, StatuteMetadata};

const TRUNCATION_SUFFIX: &str = "...[truncated]";

pub fn statute_text(text: &str, meta: &StatuteMetadata) -> String {
    let chapter = meta
        .chapter
        .as_deref()
        .map(|c| format!(" - {}", c))
        .unwrap_or_default();

    format!(
        "Legal Statute - Civil Code Section §{}{}\n\n{}\n\n[This is a statutory provision from Czech Civil Code, effective {}]",
        meta.section, chapter, text, meta.version_date
    )
}

pub fn decision_text(text: &str, meta: &JudicialMetadata) -> String {
    let refs = if meta.statute_refs.is_empty() {
        "general principles".to_string()
    } else {
        meta.statute_refs.join(", ")
    };

    let year = meta
        .date
        .get(..4)
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or("unknown");

    format!(
        "Court Decision - {} ({})\nCase: {}\nInterprets: {}\n\n{}\n\n[This is judicial interpretation from Czech {}]",
        meta.court, year, meta.case_id, refs, text, meta.court
    )
}

/// Text sent to the embedding provider for a chunk
pub fn provider_text(text: &str, meta: &ChunkMetadata) -> String {
    match meta {
        ChunkMetadata::Statute(s) => statute_text(text, s),
        ChunkMetadata::Judicial(j) => decision_text(text, j),
    }
}

/// Bounded copy of the chunk text kept in the index payload
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_SUFFIX),
        None => text.to_string(),
    }
}
