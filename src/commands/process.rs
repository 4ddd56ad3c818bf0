//! Process command: drain the queue into the vector index

use crate::config::Config;
use crate::embed::Embedder;
use crate::error::Result;
use crate::pipeline::{DrainSummary, EmbeddingProcessor};
use crate::progress::{advance_progress, finish_progress, start_progress_bar};
use crate::queue::IngestQueue;
use crate::store::VectorIndex;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Items claimed per batch; defaults to `queue.batch_size`
    pub batch_size: Option<usize>,
    /// Stop after this many batches
    pub max_batches: Option<usize>,
    pub quiet: bool,
}

pub async fn cmd_process(
    config: &Config,
    queue: &IngestQueue,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    options: ProcessOptions,
) -> Result<DrainSummary> {
    let batch_size = options.batch_size.unwrap_or(config.queue.batch_size).max(1);
    let timeout = Duration::from_secs(config.embedding.timeout_secs);
    let processor = EmbeddingProcessor::new(queue, embedder, index, &config.queue, timeout);

    let pending = queue.get_stats().await?.pending;
    info!("Processing {} pending chunks in batches of {}", pending, batch_size);

    let progress = start_progress_bar(pending, "Embedding chunks", options.quiet);

    let summary = processor
        .drain_limited(batch_size, options.max_batches, |batch| {
            advance_progress(&progress, batch.processed + batch.failed + batch.superseded)
        })
        .await?;

    finish_progress(progress, "Queue processed");
    Ok(summary)
}

pub fn print_process_summary(summary: &DrainSummary) {
    println!("\n✓ Queue processing complete");
    println!("  Batches: {}", summary.batches);
    println!("  Embedded: {}", summary.processed);
    println!("  Failed: {}", summary.failed);
    println!("  Still pending: {}", summary.remaining);
    if summary.failed > 0 {
        println!("\nRun 'precedent queue failed' to inspect failures and 'precedent queue retry' to requeue them.");
    }
}
