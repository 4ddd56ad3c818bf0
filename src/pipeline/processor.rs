//! Queue draining: embed claimed chunks and write them to the index

use super::prompts::{preview, provider_text};
use crate::config::QueueConfig;
use crate::embed::{embed_one, Embedder};
use crate::error::{with_timeout, Result};
use crate::meta::now_timestamp;
use crate::queue::{IngestQueue, QueueItem};
use crate::store::{Payload, VectorIndex, VectorRecord};
use crate::weight::chunk_weight;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub processed: usize,
    pub failed: usize,
    /// Claimed items whose queue row changed before they could be marked
    pub superseded: usize,
    /// Pending items left after the batch
    pub remaining: usize,
}

/// Totals across a drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub batches: usize,
    pub processed: usize,
    pub failed: usize,
    pub remaining: usize,
}

/// Embeds queued chunks and upserts them into the vector index.
///
/// Items are claimed atomically, processed concurrently up to the
/// configured limit, and each failure only fails its own item.
pub struct EmbeddingProcessor<'a> {
    queue: &'a IngestQueue,
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    concurrency: usize,
    preview_chars: usize,
    timeout: Duration,
    as_of: NaiveDate,
}

impl<'a> EmbeddingProcessor<'a> {
    pub fn new(
        queue: &'a IngestQueue,
        embedder: &'a dyn Embedder,
        index: &'a dyn VectorIndex,
        config: &QueueConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            queue,
            embedder,
            index,
            concurrency: config.concurrency.max(1),
            preview_chars: config.preview_chars,
            timeout,
            as_of: chrono::Utc::now().date_naive(),
        }
    }

    /// Date used for recency decay
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub async fn process_next_batch(&self, batch_size: usize) -> Result<BatchOutcome> {
        let items = self.queue.claim_next_batch(batch_size).await?;

        if items.is_empty() {
            let stats = self.queue.get_stats().await?;
            return Ok(BatchOutcome {
                remaining: stats.pending,
                ..BatchOutcome::default()
            });
        }

        debug!("Claimed {} queue items", items.len());

        let results: Vec<(String, Result<()>)> = stream::iter(items)
            .map(|item| async move {
                let outcome = self.process_item(&item).await;
                (item.chunk_id, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for (chunk_id, result) in results {
            match result {
                Ok(()) => {
                    if self.queue.mark_completed(&chunk_id).await? {
                        outcome.processed += 1;
                    } else {
                        warn!("Queue item {} changed while processing", chunk_id);
                        outcome.superseded += 1;
                    }
                }
                Err(e) => {
                    warn!("Failed to process {}: {}", chunk_id, e);
                    if self.queue.mark_failed(&chunk_id, &e.to_string()).await? {
                        outcome.failed += 1;
                    } else {
                        outcome.superseded += 1;
                    }
                }
            }
        }

        outcome.remaining = self.queue.get_stats().await?.pending;
        Ok(outcome)
    }

    /// Process batches until nothing pending is left
    pub async fn drain<F>(&self, batch_size: usize, on_batch: F) -> Result<DrainSummary>
    where
        F: FnMut(&BatchOutcome),
    {
        self.drain_limited(batch_size, None, on_batch).await
    }

    /// Like [`drain`](Self::drain), stopping after `max_batches` when given
    pub async fn drain_limited<F>(
        &self,
        batch_size: usize,
        max_batches: Option<usize>,
        mut on_batch: F,
    ) -> Result<DrainSummary>
    where
        F: FnMut(&BatchOutcome),
    {
        let mut summary = DrainSummary::default();
        while max_batches.map_or(true, |max| summary.batches < max) {
            let outcome = self.process_next_batch(batch_size).await?;
            summary.remaining = outcome.remaining;
            if outcome.processed + outcome.failed + outcome.superseded == 0 {
                break;
            }

            summary.batches += 1;
            summary.processed += outcome.processed;
            summary.failed += outcome.failed;
            on_batch(&outcome);
        }

        info!(
            "Queue drained: {} processed, {} failed in {} batches",
            summary.processed, summary.failed, summary.batches
        );
        Ok(summary)
    }

    async fn process_item(&self, item: &QueueItem) -> Result<()> {
        let chunk = item.to_chunk()?;
        let text = provider_text(&chunk.text, &chunk.metadata);

        let vector = with_timeout(self.timeout, embed_one(self.embedder, &text)).await?;

        let mut payload = Payload::from_metadata(&chunk.metadata)?;
        payload.insert("weight", chunk_weight(&chunk.metadata, self.as_of));
        payload.insert("text", preview(&chunk.text, self.preview_chars));
        payload.insert("indexed_at", now_timestamp());
        payload.insert("embedding_model", self.embedder.model_name());

        let record = VectorRecord {
            id: chunk.id,
            vector,
            payload,
        };
        with_timeout(self.timeout, self.index.upsert(vec![record])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::testing::FakeEmbedder;
    use crate::meta::tests::setup_test_db;
    use crate::models::{Chunk, ChunkMetadata, JudicialMetadata, JudicialSubtype, StatuteMetadata};
    use crate::store::{MemoryIndex, MetadataFilter, QueryOptions, SearchResult};
    use async_trait::async_trait;

    /// Index that empties the queue while a write is in flight
    struct ClearingIndex {
        inner: MemoryIndex,
        queue: IngestQueue,
    }

    #[async_trait]
    impl VectorIndex for ClearingIndex {
        async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
            self.queue.clear_all().await?;
            self.inner.upsert(records).await
        }

        async fn query(&self, vector: &[f32], options: &QueryOptions) -> Result<Vec<SearchResult>> {
            self.inner.query(vector, options).await
        }

        async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<VectorRecord>> {
            self.inner.get_by_ids(ids).await
        }

        async fn scroll(
            &self,
            filter: Option<&MetadataFilter>,
            limit: usize,
        ) -> Result<Vec<VectorRecord>> {
            self.inner.scroll(filter, limit).await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    fn statute(section: usize, text: &str) -> Chunk {
        Chunk {
            id: format!("statute_{}", section),
            text: text.to_string(),
            metadata: ChunkMetadata::Statute(StatuteMetadata {
                section: section.to_string(),
                sub_chunk: None,
                version_date: "2024-01-01".to_string(),
                source: "89/2012 Sb.".to_string(),
                book: None,
                chapter: None,
                statute_refs: vec![],
            }),
        }
    }

    fn principle(case_id: &str) -> Chunk {
        Chunk {
            id: format!("decision_{}_principle", case_id),
            text: "Oprávněná držba je předpokladem vydržení.".to_string(),
            metadata: ChunkMetadata::Judicial(JudicialMetadata {
                subtype: JudicialSubtype::Principle,
                case_id: case_id.to_string(),
                court: "Nejvyšší soud".to_string(),
                date: "2024-06-01".to_string(),
                section: None,
                statute_refs: vec!["§1089".to_string()],
                is_binding: true,
                en_banc: false,
                citation_count: 0,
                overruled: false,
                cites: vec![],
                weight: None,
            }),
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let (db, _temp) = setup_test_db().await;
        let queue = IngestQueue::new(&db, &QueueConfig::default());
        let embedder = FakeEmbedder::new(4).failing_on("POISON");
        let index = MemoryIndex::new(4);

        queue
            .add_chunks(
                &[
                    statute(1, "První ustanovení"),
                    statute(2, "POISON"),
                    statute(3, "Třetí ustanovení"),
                ],
                0,
            )
            .await
            .unwrap();

        let processor = EmbeddingProcessor::new(
            &queue,
            &embedder,
            &index,
            &QueueConfig::default(),
            Duration::from_secs(5),
        );
        let outcome = processor.process_next_batch(10).await.unwrap();

        assert_eq!(outcome, BatchOutcome { processed: 2, failed: 1, superseded: 0, remaining: 0 });
        assert_eq!(index.count().await.unwrap(), 2);

        let stats = queue.get_stats().await.unwrap();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);

        let failed = queue.list_failed(10).await.unwrap();
        assert_eq!(failed[0].chunk_id, "statute_2");
        assert!(failed[0].error_message.as_deref().unwrap_or("").contains("POISON"));
    }

    #[tokio::test]
    async fn test_payload_contents() {
        let (db, _temp) = setup_test_db().await;
        let queue = IngestQueue::new(&db, &QueueConfig::default());
        let embedder = FakeEmbedder::new(4);
        let index = MemoryIndex::new(4);

        let long = statute(7, &"x".repeat(6000));
        queue.add_chunks(&[long, principle("22 Cdo 1/2024")], 0).await.unwrap();

        let processor = EmbeddingProcessor::new(
            &queue,
            &embedder,
            &index,
            &QueueConfig::default(),
            Duration::from_secs(5),
        )
        .with_as_of(as_of());
        processor.process_next_batch(10).await.unwrap();

        let records = index
            .get_by_ids(&[
                "statute_7".to_string(),
                "decision_22 Cdo 1/2024_principle".to_string(),
            ])
            .await
            .unwrap();

        let statute = &records[0].payload;
        assert_eq!(statute.weight(), 1.0);
        assert_eq!(statute.text().chars().count(), 5000 + "...[truncated]".len());
        assert_eq!(statute.get_str("embedding_model"), Some("fake"));
        assert!(statute.get_str("indexed_at").is_some());

        // Supreme, binding, decided today, principle bonus: 10 × 2 × 1.2
        let decision = &records[1].payload;
        assert!((decision.weight() - 24.0).abs() < 1e-9);
        assert_eq!(decision.chunk_type(), Some("judicial"));
        assert_eq!(decision.get_str_list("statute_refs"), vec!["§1089"]);
    }

    #[tokio::test]
    async fn test_drain_processes_everything() {
        let (db, _temp) = setup_test_db().await;
        let queue = IngestQueue::new(&db, &QueueConfig::default());
        let embedder = FakeEmbedder::new(4);
        let index = MemoryIndex::new(4);

        let chunks: Vec<Chunk> = (0..25).map(|i| statute(i, "text")).collect();
        queue.add_chunks(&chunks, 0).await.unwrap();

        let processor = EmbeddingProcessor::new(
            &queue,
            &embedder,
            &index,
            &QueueConfig::default(),
            Duration::from_secs(5),
        );

        let mut seen = 0;
        let summary = processor.drain(10, |_| seen += 1).await.unwrap();

        assert_eq!(summary.processed, 25);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.remaining, 0);
        assert_eq!(seen, 3);
        assert_eq!(index.count().await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_unmarked_items_are_not_counted_processed() {
        let (db, _temp) = setup_test_db().await;
        let queue = IngestQueue::new(&db, &QueueConfig::default());
        let embedder = FakeEmbedder::new(4);
        let index = ClearingIndex {
            inner: MemoryIndex::new(4),
            queue: queue.clone(),
        };

        queue.add_chunks(&[statute(1, "První ustanovení")], 0).await.unwrap();

        let processor = EmbeddingProcessor::new(
            &queue,
            &embedder,
            &index,
            &QueueConfig::default(),
            Duration::from_secs(5),
        );
        let outcome = processor.process_next_batch(10).await.unwrap();

        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.superseded, 1);
        assert_eq!(queue.get_stats().await.unwrap().completed, 0);
    }

    #[tokio::test]
    async fn test_reingest_overwrites_single_record() {
        let (db, _temp) = setup_test_db().await;
        let queue = IngestQueue::new(&db, &QueueConfig::default());
        let embedder = FakeEmbedder::new(4);
        let index = MemoryIndex::new(4);
        let processor = EmbeddingProcessor::new(
            &queue,
            &embedder,
            &index,
            &QueueConfig::default(),
            Duration::from_secs(5),
        );

        queue.add_chunks(&[statute(1, "stará verze")], 0).await.unwrap();
        processor.drain(10, |_| {}).await.unwrap();
        queue.add_chunks(&[statute(1, "nová verze")], 0).await.unwrap();
        processor.drain(10, |_| {}).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let records = index.get_by_ids(&["statute_1".to_string()]).await.unwrap();
        assert_eq!(records[0].payload.text(), "nová verze");
    }
}
