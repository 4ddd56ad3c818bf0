//! Attach exemplar statute and precedent hits to clusters

use super::{Anchor, DoctrineCluster};
use crate::chunk::DEFAULT_COURT;
use crate::error::{with_timeout, Result};
use crate::store::{MetadataFilter, QueryOptions, VectorIndex};
use crate::vector::CachedEmbedder;
use tracing::{debug, warn};

const STATUTE_ANCHOR_TOP_K: usize = 5;
const PRECEDENT_ANCHOR_TOP_K: usize = 3;
const PRINCIPLE_SNIPPET_CHARS: usize = 200;

/// Anchors clusters against the index. Lookup failures leave the anchor
/// empty.
pub struct ClusterAnchorer<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a CachedEmbedder<'a>,
}

impl<'a> ClusterAnchorer<'a> {
    pub fn new(index: &'a dyn VectorIndex, embedder: &'a CachedEmbedder<'a>) -> Self {
        Self { index, embedder }
    }

    pub async fn anchor_all(&self, clusters: &mut [DoctrineCluster]) {
        for cluster in clusters.iter_mut() {
            self.anchor(cluster).await;
        }
    }

    pub async fn anchor(&self, cluster: &mut DoctrineCluster) {
        if !cluster.common_sections.is_empty() {
            match self.statute_anchor(cluster).await {
                Ok(anchor) => cluster.statute_anchor = anchor,
                Err(e) => warn!("Statute anchor failed for {}: {}", cluster.id, e),
            }
        }

        if !cluster.members.is_empty() {
            match self.precedent_anchor(cluster).await {
                Ok(anchor) => cluster.precedent_anchor = anchor,
                Err(e) => warn!("Precedent anchor failed for {}: {}", cluster.id, e),
            }
        }
    }

    async fn statute_anchor(&self, cluster: &DoctrineCluster) -> Result<Option<Anchor>> {
        let query = cluster
            .common_sections
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        let options = QueryOptions::top_k(STATUTE_ANCHOR_TOP_K)
            .with_filter(MetadataFilter::chunk_type("statute"));
        self.top_hit(&query, &options).await
    }

    async fn precedent_anchor(&self, cluster: &DoctrineCluster) -> Result<Option<Anchor>> {
        let combined = cluster
            .members
            .iter()
            .take(3)
            .map(|m| {
                m.payload
                    .get_str("principle")
                    .unwrap_or_else(|| m.payload.text())
                    .chars()
                    .take(PRINCIPLE_SNIPPET_CHARS)
                    .collect::<String>()
            })
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if combined.is_empty() {
            return Ok(None);
        }

        let filter = MetadataFilter::new()
            .eq("court", DEFAULT_COURT)
            .eq("is_binding", true);
        let options = QueryOptions::top_k(PRECEDENT_ANCHOR_TOP_K).with_filter(filter);
        self.top_hit(&combined, &options).await
    }

    async fn top_hit(&self, text: &str, options: &QueryOptions) -> Result<Option<Anchor>> {
        let vector = self.embedder.embed(text).await?;
        let hits = with_timeout(self.embedder.timeout(), self.index.query(&vector, options)).await?;
        debug!("Anchor query returned {} hits", hits.len());
        Ok(hits.into_iter().next().map(|h| Anchor {
            id: h.id,
            score: h.score,
            payload: h.payload,
        }))
    }
}
