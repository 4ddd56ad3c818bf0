//! Statute chunking

use super::{
    estimate_tokens, extract_statute_refs, find_section_headers, short_hash, sliding_window,
    split_at_markers,
};
use crate::config::ChunkConfig;
use crate::models::{Chunk, ChunkMetadata, StatuteMetadata};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Metadata shared by every section of one statute text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatuteSource {
    /// Effective date of this version of the text
    pub version_date: String,
    /// Name of the code, e.g. "Civil Code"
    pub source: String,
    pub book: Option<String>,
    pub chapter: Option<String>,
}

impl StatuteSource {
    fn metadata(&self, section: &str, sub_chunk: Option<usize>, refs: Vec<String>) -> ChunkMetadata {
        ChunkMetadata::Statute(StatuteMetadata {
            section: section.to_string(),
            sub_chunk,
            version_date: self.version_date.clone(),
            source: self.source.clone(),
            book: self.book.clone(),
            chapter: self.chapter.clone(),
            statute_refs: refs,
        })
    }
}

/// Split a statute into one chunk per section.
///
/// Sections too short to carry content are skipped. Sections above the token
/// threshold are split into overlapping windows with ids `statute_<N>_<i>`.
/// Text with no section headers becomes a single `statute_full_<hash>` chunk,
/// hashed over the source name and text.
pub fn chunk_statute(text: &str, source: &StatuteSource, config: &ChunkConfig) -> Vec<Chunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let headers = find_section_headers(text);
    if headers.is_empty() {
        debug!("No section headers found, emitting fallback chunk");
        return vec![Chunk {
            id: format!("statute_full_{}", short_hash(&format!("{}\n{}", source.source, text))),
            text: text.to_string(),
            metadata: source.metadata("full", None, extract_statute_refs(text)),
        }];
    }

    let mut chunks = Vec::new();
    let mut seen = HashSet::new();

    for (section, body) in split_at_markers(text, &headers) {
        if body.chars().count() < config.statute_min_chars {
            continue;
        }
        if !seen.insert(section.to_string()) {
            debug!("Skipping repeated section §{}", section);
            continue;
        }

        let own = format!("§{}", section.trim_end_matches(|c: char| c.is_ascii_alphabetic()));
        let refs: Vec<String> = extract_statute_refs(body)
            .into_iter()
            .filter(|r| *r != own)
            .collect();

        if estimate_tokens(body) > config.statute_max_tokens {
            let windows = sliding_window(body, config.window_chars, config.overlap_chars);
            debug!("Section §{} split into {} windows", section, windows.len());
            for (i, window) in windows.into_iter().enumerate() {
                chunks.push(Chunk {
                    id: format!("statute_{}_{}", section, i),
                    text: window,
                    metadata: source.metadata(section, Some(i), refs.clone()),
                });
            }
        } else {
            chunks.push(Chunk {
                id: format!("statute_{}", section),
                text: body.to_string(),
                metadata: source.metadata(section, None, refs),
            });
        }
    }

    chunks
}
