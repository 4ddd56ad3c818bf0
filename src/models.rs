//! Retrieval units and their provenance metadata.
//!
//! Chunk metadata is a tagged union keyed on `type`, so it survives the trip
//! through the queue table and the vector index as plain JSON.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// An atomic retrieval unit: text plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id derived from source identity
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChunkMetadata {
    Statute(StatuteMetadata),
    Judicial(JudicialMetadata),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatuteMetadata {
    /// Section number without the `§` symbol
    pub section: String,

    /// Window index when an oversized section was sub-split
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_chunk: Option<usize>,

    pub version_date: String,

    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,

    /// Other sections referenced from this section's text
    #[serde(default)]
    pub statute_refs: Vec<String>,
}

/// Which part of a decision a chunk carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudicialSubtype {
    /// The holding / legal maxim
    Principle,
    FullDecision,
}

impl std::fmt::Display for JudicialSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JudicialSubtype::Principle => write!(f, "principle"),
            JudicialSubtype::FullDecision => write!(f, "full_decision"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudicialMetadata {
    pub subtype: JudicialSubtype,

    pub case_id: String,

    pub court: String,

    /// ISO date (YYYY-MM-DD)
    pub date: String,

    /// Roman-numeral header of the decision section, for full-text chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    #[serde(default)]
    pub statute_refs: Vec<String>,

    #[serde(default = "default_true")]
    pub is_binding: bool,

    #[serde(default)]
    pub en_banc: bool,

    #[serde(default)]
    pub citation_count: u32,

    #[serde(default)]
    pub overruled: bool,

    /// Case ids this decision cites
    #[serde(default)]
    pub cites: Vec<String>,

    /// Authority weight, filled in when the chunk is indexed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl ChunkMetadata {
    /// Parse and validate metadata stored as JSON.
    ///
    /// Anything without a known `type` tag or with missing required fields
    /// is rejected here, at the ingestion boundary.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Metadata(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ChunkMetadata::Statute(_) => "statute",
            ChunkMetadata::Judicial(_) => "judicial",
        }
    }

    pub fn statute_refs(&self) -> &[String] {
        match self {
            ChunkMetadata::Statute(m) => &m.statute_refs,
            ChunkMetadata::Judicial(m) => &m.statute_refs,
        }
    }

    pub fn is_principle(&self) -> bool {
        matches!(
            self,
            ChunkMetadata::Judicial(JudicialMetadata {
                subtype: JudicialSubtype::Principle,
                ..
            })
        )
    }
}
