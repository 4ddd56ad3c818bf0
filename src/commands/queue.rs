//! Queue inspection and maintenance commands

use crate::error::Result;
use crate::queue::{IngestQueue, QueueItem, QueueStats};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub chunk_id: String,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub processed_at: Option<String>,
}

impl From<QueueItem> for FailedItem {
    fn from(item: QueueItem) -> Self {
        Self {
            chunk_id: item.chunk_id,
            retry_count: item.retry_count,
            error_message: item.error_message,
            processed_at: item.processed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueChange {
    pub affected: u64,
}

pub async fn cmd_queue_stats(queue: &IngestQueue) -> Result<QueueStats> {
    queue.get_stats().await
}

/// Requeue failed items still under the retry limit
pub async fn cmd_queue_retry(queue: &IngestQueue) -> Result<QueueChange> {
    let affected = queue.retry_failed().await?;
    info!("Requeued {} failed items", affected);
    Ok(QueueChange { affected })
}

/// Delete completed items, or every item with `all`
pub async fn cmd_queue_clear(queue: &IngestQueue, all: bool) -> Result<QueueChange> {
    let affected = if all {
        queue.clear_all().await?
    } else {
        queue.clear_completed().await?
    };
    info!("Removed {} queue items", affected);
    Ok(QueueChange { affected })
}

pub async fn cmd_queue_failed(queue: &IngestQueue, limit: usize) -> Result<Vec<FailedItem>> {
    Ok(queue
        .list_failed(limit)
        .await?
        .into_iter()
        .map(FailedItem::from)
        .collect())
}

pub fn print_queue_stats(stats: &QueueStats) {
    println!("\n📥 Processing Queue\n");
    println!("  Pending:    {}", stats.pending);
    println!("  Processing: {}", stats.processing);
    println!("  Completed:  {}", stats.completed);
    println!("  Failed:     {}", stats.failed);
    println!("  Total:      {}", stats.total);
}

pub fn print_failed_items(items: &[FailedItem]) {
    if items.is_empty() {
        println!("No failed items.");
        return;
    }

    println!("\n✗ Failed items\n");
    for item in items {
        println!("• {} (retries: {})", item.chunk_id, item.retry_count);
        if let Some(ref message) = item.error_message {
            println!("  {}", message);
        }
    }
}
