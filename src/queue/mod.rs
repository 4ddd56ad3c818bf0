//! Durable ingestion queue
//!
//! Chunks wait in the `processing_queue` table until the embedding processor
//! picks them up. Every item follows the same state machine:
//!
//! ```text
//! pending -> processing -> completed
//!                       -> failed -> pending (retry sweep, retry_count < max_retries)
//! ```
//!
//! Claiming is a conditional per-item update, so two processors pulling
//! batches concurrently never claim the same item.

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::meta::{now_timestamp, MetaDb};
use crate::models::{Chunk, ChunkMetadata};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Queue item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Processing => write!(f, "processing"),
            QueueStatus::Completed => write!(f, "completed"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            _ => Err(Error::Validation(format!("Unknown queue status: {}", s))),
        }
    }
}

/// A queued chunk
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub chunk_id: String,
    pub chunk_text: String,
    /// Tagged chunk metadata as JSON
    pub chunk_metadata: String,
    pub status: String,
    pub priority: i64,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub created_at: String,
    pub processed_at: Option<String>,
}

impl QueueItem {
    pub fn status(&self) -> Result<QueueStatus> {
        self.status.parse()
    }

    /// Rebuild the chunk, validating its metadata
    pub fn to_chunk(&self) -> Result<Chunk> {
        Ok(Chunk {
            id: self.chunk_id.clone(),
            text: self.chunk_text.clone(),
            metadata: ChunkMetadata::from_json(&self.chunk_metadata)?,
        })
    }
}

/// Per-status item counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Handle to the processing queue
#[derive(Clone)]
pub struct IngestQueue {
    pool: SqlitePool,
    max_retries: u32,
    insert_batch_size: usize,
}

impl IngestQueue {
    pub fn new(db: &MetaDb, config: &QueueConfig) -> Self {
        Self {
            pool: db.pool().clone(),
            max_retries: config.max_retries,
            insert_batch_size: config.insert_batch_size.max(1),
        }
    }

    /// Enqueue chunks as pending.
    ///
    /// Inserts run in transactions of `insert_batch_size` rows. A chunk id
    /// that is already queued is replaced and reset to pending, unless it is
    /// currently processing; in-flight items are left alone and not counted.
    pub async fn add_chunks(&self, chunks: &[Chunk], priority: i64) -> Result<usize> {
        let mut added = 0;

        for batch in chunks.chunks(self.insert_batch_size) {
            let mut tx = self.pool.begin().await?;
            for chunk in batch {
                let metadata = chunk.metadata.to_json()?;
                let result = sqlx::query(
                    r#"
                    INSERT INTO processing_queue (chunk_id, chunk_text, chunk_metadata, status, priority, retry_count, created_at)
                    VALUES (?, ?, ?, 'pending', ?, 0, ?)
                    ON CONFLICT(chunk_id) DO UPDATE SET
                        chunk_text = excluded.chunk_text,
                        chunk_metadata = excluded.chunk_metadata,
                        status = 'pending',
                        priority = excluded.priority,
                        retry_count = 0,
                        error_message = NULL,
                        created_at = excluded.created_at,
                        processed_at = NULL
                    WHERE processing_queue.status != 'processing'
                    "#,
                )
                .bind(&chunk.id)
                .bind(&chunk.text)
                .bind(metadata)
                .bind(priority)
                .bind(now_timestamp())
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 1 {
                    added += 1;
                } else {
                    debug!("Chunk {} is processing, not requeued", chunk.id);
                }
            }
            tx.commit().await?;
            debug!("Queued batch of {} chunks", batch.len());
        }

        info!("Queued {} chunks with priority {}", added, priority);
        Ok(added)
    }

    /// Peek at the next pending items, highest priority and oldest first
    pub async fn get_next_batch(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let items = sqlx::query_as::<_, QueueItem>(
            r#"
            SELECT * FROM processing_queue
            WHERE status = 'pending'
            ORDER BY priority DESC, created_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Transition one item from pending to processing.
    ///
    /// Returns false when the item was not pending (already claimed).
    pub async fn mark_processing(&self, chunk_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE processing_queue SET status = 'processing' WHERE chunk_id = ? AND status = 'pending'",
        )
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Claim up to `limit` pending items for processing.
    ///
    /// Items claimed by a concurrent puller between the read and the
    /// conditional update are skipped.
    pub async fn claim_next_batch(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let candidates = self.get_next_batch(limit).await?;
        let mut claimed = Vec::with_capacity(candidates.len());

        for mut item in candidates {
            if self.mark_processing(&item.chunk_id).await? {
                item.status = QueueStatus::Processing.to_string();
                claimed.push(item);
            } else {
                debug!("Item {} was claimed elsewhere", item.chunk_id);
            }
        }

        Ok(claimed)
    }

    /// Mark a processing item completed
    pub async fn mark_completed(&self, chunk_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE processing_queue SET status = 'completed', processed_at = ?, error_message = NULL
            WHERE chunk_id = ? AND status = 'processing'
            "#,
        )
        .bind(now_timestamp())
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark a processing item failed and count the attempt
    pub async fn mark_failed(&self, chunk_id: &str, message: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE processing_queue
            SET status = 'failed', retry_count = retry_count + 1, error_message = ?, processed_at = ?
            WHERE chunk_id = ? AND status = 'processing'
            "#,
        )
        .bind(message)
        .bind(now_timestamp())
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            warn!("Chunk {} failed: {}", chunk_id, message);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Return failed items with retries left to pending
    pub async fn retry_failed(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE processing_queue SET status = 'pending', error_message = NULL
            WHERE status = 'failed' AND retry_count < ?
            "#,
        )
        .bind(self.max_retries as i64)
        .execute(&self.pool)
        .await?;

        let retried = result.rows_affected();
        info!("Returned {} failed items to pending", retried);
        Ok(retried)
    }

    /// Failed items, most recently failed first
    pub async fn list_failed(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let items = sqlx::query_as::<_, QueueItem>(
            "SELECT * FROM processing_queue WHERE status = 'failed' ORDER BY processed_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Per-status counts
    pub async fn get_stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM processing_queue GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = count as usize;
            match status.parse::<QueueStatus>() {
                Ok(QueueStatus::Pending) => stats.pending = count,
                Ok(QueueStatus::Processing) => stats.processing = count,
                Ok(QueueStatus::Completed) => stats.completed = count,
                Ok(QueueStatus::Failed) => stats.failed = count,
                Err(_) => warn!("Ignoring {} queue rows with status '{}'", count, status),
            }
            stats.total += count;
        }

        Ok(stats)
    }

    /// Delete completed items
    pub async fn clear_completed(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM processing_queue WHERE status = 'completed'")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every item
    pub async fn clear_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM processing_queue")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::tests::setup_test_db;
    use crate::models::StatuteMetadata;
    use tempfile::TempDir;

    fn statute_chunk(n: usize) -> Chunk {
        Chunk {
            id: format!("statute_{}", n),
            text: format!("Ustanovení číslo {}", n),
            metadata: ChunkMetadata::Statute(StatuteMetadata {
                section: n.to_string(),
                sub_chunk: None,
                version_date: "2024-01-01".to_string(),
                source: "Civil Code".to_string(),
                book: None,
                chapter: None,
                statute_refs: vec![],
            }),
        }
    }

    async fn setup_queue() -> (IngestQueue, TempDir) {
        let (db, tmp) = setup_test_db().await;
        let queue = IngestQueue::new(&db, &QueueConfig::default());
        (queue, tmp)
    }

    #[tokio::test]
    async fn test_failures_then_retry_sweep() {
        let (queue, _tmp) = setup_queue().await;
        let chunks: Vec<Chunk> = (0..100).map(statute_chunk).collect();
        assert_eq!(queue.add_chunks(&chunks, 0).await.unwrap(), 100);

        let claimed = queue.claim_next_batch(3).await.unwrap();
        assert_eq!(claimed.len(), 3);
        for item in &claimed {
            assert!(queue.mark_failed(&item.chunk_id, "embedding timeout").await.unwrap());
        }

        let stats = queue.get_stats().await.unwrap();
        assert_eq!(stats.pending, 97);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.failed, 3);

        assert_eq!(queue.retry_failed().await.unwrap(), 3);
        let stats = queue.get_stats().await.unwrap();
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.pending, 100);
        assert_eq!(stats.total, 100);
    }

    #[tokio::test]
    async fn test_retry_sweep_respects_max_retries() {
        let (queue, _tmp) = setup_queue().await;
        queue.add_chunks(&[statute_chunk(1)], 0).await.unwrap();

        for _ in 0..3 {
            queue.claim_next_batch(1).await.unwrap();
            queue.mark_failed("statute_1", "boom").await.unwrap();
            queue.retry_failed().await.unwrap();
        }

        let stats = queue.get_stats().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);

        let failed = queue.list_failed(10).await.unwrap();
        assert_eq!(failed[0].retry_count, 3);
        assert_eq!(failed[0].error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_priority_then_age_order() {
        let (queue, _tmp) = setup_queue().await;
        queue.add_chunks(&[statute_chunk(1), statute_chunk(2)], 0).await.unwrap();
        queue.add_chunks(&[statute_chunk(3)], 5).await.unwrap();

        let batch = queue.get_next_batch(10).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|i| i.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["statute_3", "statute_1", "statute_2"]);
    }

    #[tokio::test]
    async fn test_claim_is_at_most_once() {
        let (queue, _tmp) = setup_queue().await;
        let chunks: Vec<Chunk> = (0..20).map(statute_chunk).collect();
        queue.add_chunks(&chunks, 0).await.unwrap();

        let (a, b) = tokio::join!(queue.claim_next_batch(15), queue.claim_next_batch(15));
        let mut ids: Vec<String> = a
            .unwrap()
            .into_iter()
            .chain(b.unwrap())
            .map(|i| i.chunk_id)
            .collect();
        let claimed = ids.len();
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), claimed);
        assert_eq!(queue.get_stats().await.unwrap().processing, claimed);
        assert!(!queue.mark_processing(&ids[0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_transitions_require_processing() {
        let (queue, _tmp) = setup_queue().await;
        queue.add_chunks(&[statute_chunk(1)], 0).await.unwrap();

        // pending items cannot jump straight to a terminal state
        assert!(!queue.mark_completed("statute_1").await.unwrap());
        assert!(!queue.mark_failed("statute_1", "x").await.unwrap());

        queue.claim_next_batch(1).await.unwrap();
        assert!(queue.mark_completed("statute_1").await.unwrap());
        assert_eq!(queue.get_stats().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn test_requeue_resets_item() {
        let (queue, _tmp) = setup_queue().await;
        queue.add_chunks(&[statute_chunk(1)], 0).await.unwrap();
        queue.claim_next_batch(1).await.unwrap();
        queue.mark_failed("statute_1", "boom").await.unwrap();

        let mut updated = statute_chunk(1);
        updated.text = "Nové znění".to_string();
        queue.add_chunks(&[updated], 0).await.unwrap();

        let items = queue.get_next_batch(10).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].chunk_text, "Nové znění");
        assert_eq!(items[0].retry_count, 0);
        assert!(items[0].error_message.is_none());
        assert_eq!(items[0].to_chunk().unwrap().id, "statute_1");
    }

    #[tokio::test]
    async fn test_requeue_leaves_in_flight_item_alone() {
        let (queue, _tmp) = setup_queue().await;
        queue.add_chunks(&[statute_chunk(1)], 0).await.unwrap();
        assert_eq!(queue.claim_next_batch(1).await.unwrap().len(), 1);

        let mut updated = statute_chunk(1);
        updated.text = "Nové znění".to_string();
        assert_eq!(queue.add_chunks(&[updated], 0).await.unwrap(), 0);

        let stats = queue.get_stats().await.unwrap();
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.pending, 0);
        assert!(queue.claim_next_batch(1).await.unwrap().is_empty());

        assert!(queue.mark_completed("statute_1").await.unwrap());
        let mut updated = statute_chunk(1);
        updated.text = "Nové znění".to_string();
        assert_eq!(queue.add_chunks(&[updated], 0).await.unwrap(), 1);
        assert_eq!(queue.get_next_batch(10).await.unwrap()[0].chunk_text, "Nové znění");
    }

    #[tokio::test]
    async fn test_clear_operations() {
        let (queue, _tmp) = setup_queue().await;
        queue
            .add_chunks(&[statute_chunk(1), statute_chunk(2)], 0)
            .await
            .unwrap();
        queue.claim_next_batch(1).await.unwrap();
        queue.mark_completed("statute_1").await.unwrap();

        assert_eq!(queue.clear_completed().await.unwrap(), 1);
        assert_eq!(queue.get_stats().await.unwrap().total, 1);
        assert_eq!(queue.clear_all().await.unwrap(), 1);
        assert_eq!(queue.get_stats().await.unwrap(), QueueStats::default());
    }
}
