//! Doctrine discovery runs

use super::{
    agglomerative_cluster, enrich_with_keywords, ClusterAnchorer, ClusterMember, DoctrineCluster,
    DoctrineNamer,
};
use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::meta::{DoctrineUpdate, MetaDb};
use crate::store::{MetadataFilter, VectorIndex};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

const KEYWORDS_PER_CLUSTER: usize = 10;
const SAMPLE_CASES: usize = 3;

/// Summary of one persisted doctrine
#[derive(Debug, Clone, Serialize)]
pub struct StoredDoctrine {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub member_count: usize,
    pub avg_weight: f64,
    pub keywords: Vec<String>,
    pub statute_anchor: Option<String>,
    pub is_new: bool,
    pub sample_cases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub vectors_analyzed: usize,
    pub clusters_found: usize,
    pub clustering_ms: u128,
    pub new_doctrines: usize,
    pub updated_doctrines: usize,
    pub doctrines: Vec<StoredDoctrine>,
}

/// Samples stored vectors, clusters them and persists the largest clusters
/// as named doctrines
pub struct DoctrineDiscovery<'a> {
    index: &'a dyn VectorIndex,
    db: &'a MetaDb,
    namer: &'a dyn DoctrineNamer,
    config: &'a DiscoveryConfig,
    anchorer: Option<ClusterAnchorer<'a>>,
    chunk_type: String,
    dry_run: bool,
}

impl<'a> DoctrineDiscovery<'a> {
    pub fn new(
        index: &'a dyn VectorIndex,
        db: &'a MetaDb,
        namer: &'a dyn DoctrineNamer,
        config: &'a DiscoveryConfig,
    ) -> Self {
        Self {
            index,
            db,
            namer,
            config,
            anchorer: None,
            chunk_type: "judicial".to_string(),
            dry_run: false,
        }
    }

    pub fn with_anchorer(mut self, anchorer: ClusterAnchorer<'a>) -> Self {
        self.anchorer = Some(anchorer);
        self
    }

    pub fn chunk_type(mut self, chunk_type: &str) -> Self {
        self.chunk_type = chunk_type.to_string();
        self
    }

    /// Cluster and name without writing doctrines
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run(&self) -> Result<DiscoveryReport> {
        let filter = MetadataFilter::chunk_type(&self.chunk_type);
        let records = self
            .index
            .scroll(Some(&filter), self.config.max_vectors)
            .await?;

        info!(
            "Retrieved {} {} vectors for clustering",
            records.len(),
            self.chunk_type
        );

        let mut report = DiscoveryReport {
            vectors_analyzed: records.len(),
            ..DiscoveryReport::default()
        };
        if records.is_empty() {
            return Ok(report);
        }

        let items: Vec<ClusterMember> = records
            .into_iter()
            .filter(|r| !r.vector.is_empty())
            .map(ClusterMember::from)
            .collect();

        let min_similarity = self.config.min_similarity;
        let min_size = self.config.min_cluster_size;
        let started = Instant::now();
        let mut clusters = tokio::task::spawn_blocking(move || {
            agglomerative_cluster(items, min_similarity, min_size)
        })
        .await
        .map_err(|e| Error::Other(format!("clustering task failed: {}", e)))?;
        report.clustering_ms = started.elapsed().as_millis();
        report.clusters_found = clusters.len();

        info!(
            "Found {} clusters in {} ms",
            clusters.len(),
            report.clustering_ms
        );

        clusters.truncate(self.config.max_clusters);
        enrich_with_keywords(&mut clusters, KEYWORDS_PER_CLUSTER);
        if let Some(ref anchorer) = self.anchorer {
            anchorer.anchor_all(&mut clusters).await;
        }

        for (position, cluster) in clusters.iter().enumerate() {
            report.doctrines.push(self.persist(cluster, position).await?);
        }

        report.new_doctrines = report.doctrines.iter().filter(|d| d.is_new).count();
        report.updated_doctrines = report.doctrines.len() - report.new_doctrines;
        info!(
            "Stored {} doctrines ({} new, {} updated)",
            report.doctrines.len(),
            report.new_doctrines,
            report.updated_doctrines
        );
        Ok(report)
    }

    async fn persist(&self, cluster: &DoctrineCluster, position: usize) -> Result<StoredDoctrine> {
        let name = match self.namer.name(cluster, position).await {
            Ok(name) => name,
            Err(e) => {
                warn!("Naming cluster {} failed, using keywords: {}", position + 1, e);
                super::KeywordNamer::fallback(cluster, position)
            }
        };

        let case_ids = cluster.case_ids();
        let (id, is_new) = if self.dry_run {
            let existing = self.db.get_doctrine_by_name(&name.name).await?;
            (existing.map(|d| d.id).unwrap_or_default(), false)
        } else {
            let update = DoctrineUpdate {
                name: name.name.clone(),
                display_name: name.display_name.clone(),
                description: name.description.clone(),
                keywords: cluster.keywords.clone(),
                avg_confidence: cluster.avg_weight,
                legal_domain: self.config.legal_domain.clone(),
                members: case_ids.iter().map(|id| (id.clone(), 1.0)).collect(),
            };
            let upsert = self.db.upsert_doctrine(&update).await?;
            (upsert.id, upsert.created)
        };

        Ok(StoredDoctrine {
            id,
            name: name.name,
            display_name: name.display_name,
            description: name.description,
            member_count: case_ids.len(),
            avg_weight: cluster.avg_weight,
            keywords: cluster.keywords.clone(),
            statute_anchor: cluster
                .statute_anchor
                .as_ref()
                .and_then(|a| a.payload.get_str("section").map(str::to_string)),
            is_new,
            sample_cases: case_ids.into_iter().take(SAMPLE_CASES).collect(),
        })
    }
}
