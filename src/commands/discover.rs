//! Discover command: cluster stored decisions into doctrines

use crate::cluster::{ClusterAnchorer, DiscoveryReport, DoctrineDiscovery, KeywordNamer};
use crate::config::Config;
use crate::embed::Embedder;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::store::VectorIndex;
use crate::vector::{CachedEmbedder, EmbeddingCache};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    pub dry_run: bool,
    /// Skip statute and precedent anchoring
    pub no_anchors: bool,
}

pub async fn cmd_discover(
    config: &Config,
    db: &MetaDb,
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    options: DiscoverOptions,
) -> Result<DiscoveryReport> {
    info!(
        "Discovering doctrines (min similarity {}, min size {})",
        config.discovery.min_similarity, config.discovery.min_cluster_size
    );

    let cache = EmbeddingCache::new(config.search.cache_capacity);
    let cached = CachedEmbedder::new(
        embedder,
        &cache,
        Duration::from_secs(config.search.request_timeout_secs),
    );
    let namer = KeywordNamer;

    let mut discovery = DoctrineDiscovery::new(index, db, &namer, &config.discovery)
        .dry_run(options.dry_run);
    if !options.no_anchors {
        discovery = discovery.with_anchorer(ClusterAnchorer::new(index, &cached));
    }

    discovery.run().await
}

pub fn print_discovery_report(report: &DiscoveryReport, dry_run: bool) {
    println!(
        "\n🧭 Doctrine discovery{}\n",
        if dry_run { " (dry run)" } else { "" }
    );
    println!("  Vectors analysed: {}", report.vectors_analyzed);
    println!("  Clusters found: {}", report.clusters_found);
    println!("  Clustering time: {} ms", report.clustering_ms);
    if !dry_run {
        println!("  New doctrines: {}", report.new_doctrines);
        println!("  Updated doctrines: {}", report.updated_doctrines);
    }

    for d in &report.doctrines {
        println!(
            "\n• {} [{}] – {} decisions, avg weight {:.2}",
            d.display_name, d.name, d.member_count, d.avg_weight
        );
        if !d.keywords.is_empty() {
            println!("  keywords: {}", d.keywords.join(", "));
        }
        if let Some(ref anchor) = d.statute_anchor {
            println!("  anchored on: {}", anchor);
        }
        if !d.sample_cases.is_empty() {
            println!("  e.g. {}", d.sample_cases.join("; "));
        }
    }
}
