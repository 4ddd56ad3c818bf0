//! In-memory [`VectorIndex`] for tests and offline runs.
//!
//! Search is brute-force cosine similarity over every stored vector.
//! Records keep their first insertion order so scrolls are deterministic.

use super::{check_dimensions, MetadataFilter, QueryOptions, SearchResult, VectorIndex, VectorRecord};
use crate::error::{Error, Result};
use crate::vector::cosine_similarity;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Brute-force vector index held in memory
pub struct MemoryIndex {
    dimension: usize,
    records: RwLock<Vec<VectorRecord>>,
}

impl MemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        check_dimensions(&records, self.dimension, "memory")?;

        let mut stored = self.records.write().await;
        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], options: &QueryOptions) -> Result<Vec<SearchResult>> {
        if vector.len() != self.dimension {
            return Err(Error::Qdrant(format!(
                "Vector dimension mismatch for query: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }

        let stored = self.records.read().await;

        let mut hits: Vec<SearchResult> = stored
            .iter()
            .filter(|r| {
                options
                    .filter
                    .as_ref()
                    .map_or(true, |f| f.matches(&r.payload))
            })
            .map(|r| SearchResult {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.vector),
                payload: r.payload.clone(),
                vector: options.with_vectors.then(|| r.vector.clone()),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(options.top_k);
        Ok(hits)
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<VectorRecord>> {
        let stored = self.records.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| stored.iter().find(|r| &r.id == id).cloned())
            .collect())
    }

    async fn scroll(
        &self,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<VectorRecord>> {
        let stored = self.records.read().await;
        Ok(stored
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.payload)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Payload;

    fn record(id: &str, vector: Vec<f32>, kind: &str) -> VectorRecord {
        let mut payload = Payload::default();
        payload.insert("type", kind);
        VectorRecord {
            id: id.to_string(),
            vector,
            payload,
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let index = MemoryIndex::new(2);
        index
            .upsert(vec![
                record("a", vec![1.0, 0.0], "statute"),
                record("b", vec![0.7, 0.7], "judicial"),
                record("c", vec![0.0, 1.0], "judicial"),
            ])
            .await
            .unwrap();

        let hits = index
            .query(&[1.0, 0.1], &QueryOptions::top_k(2))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "b");
        assert!(hits[0].vector.is_none());
    }

    #[tokio::test]
    async fn test_query_applies_filter() {
        let index = MemoryIndex::new(2);
        index
            .upsert(vec![
                record("a", vec![1.0, 0.0], "statute"),
                record("c", vec![0.0, 1.0], "judicial"),
            ])
            .await
            .unwrap();

        let options = QueryOptions::top_k(5)
            .with_filter(MetadataFilter::chunk_type("judicial"))
            .with_vectors();
        let hits = index.query(&[1.0, 0.0], &options).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c");
        assert_eq!(hits[0].vector.as_deref(), Some(&[0.0, 1.0][..]));
    }

    #[tokio::test]
    async fn test_reupsert_keeps_single_latest_record() {
        let index = MemoryIndex::new(2);
        index
            .upsert(vec![record("a", vec![1.0, 0.0], "statute")])
            .await
            .unwrap();

        let mut updated = record("a", vec![0.0, 1.0], "statute");
        updated.payload.insert("weight", 2.5);
        index.upsert(vec![updated]).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let fetched = index.get_by_ids(&["a".to_string()]).await.unwrap();
        assert_eq!(fetched[0].payload.weight(), 2.5);
        assert_eq!(fetched[0].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_scroll_and_get_by_ids() {
        let index = MemoryIndex::new(2);
        index
            .upsert(vec![
                record("a", vec![1.0, 0.0], "statute"),
                record("b", vec![0.5, 0.5], "judicial"),
                record("c", vec![0.0, 1.0], "judicial"),
            ])
            .await
            .unwrap();

        let judicial = index
            .scroll(Some(&MetadataFilter::chunk_type("judicial")), 10)
            .await
            .unwrap();
        assert_eq!(judicial.len(), 2);
        assert_eq!(judicial[0].id, "b");

        let limited = index.scroll(None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        let fetched = index
            .get_by_ids(&["c".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, "c");
    }

    #[tokio::test]
    async fn test_rejects_wrong_dimension() {
        let index = MemoryIndex::new(3);
        let result = index
            .upsert(vec![record("a", vec![1.0, 0.0], "statute")])
            .await;
        assert!(result.is_err());
    }
}
