//! Bounded embedding memoisation

use crate::embed::{embed_one, Embedder};
use crate::error::{with_timeout, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

struct CacheInner {
    entries: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
}

/// Text → vector cache with a fixed capacity.
///
/// Eviction is FIFO: once full, the oldest inserted key is dropped. Reads do
/// not refresh an entry's position. Scope one cache to a request or worker.
pub struct EmbeddingCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let inner = self.inner.lock().ok()?;
        inner.entries.get(key).cloned()
    }

    pub fn put(&self, key: &str, value: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if inner.entries.insert(key.to_string(), value).is_some() {
            return;
        }
        inner.order.push_back(key.to_string());

        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Embedder front that consults an [`EmbeddingCache`] and applies a deadline
/// to every backend call
pub struct CachedEmbedder<'a> {
    embedder: &'a dyn Embedder,
    cache: &'a EmbeddingCache,
    timeout: Duration,
}

impl<'a> CachedEmbedder<'a> {
    pub fn new(embedder: &'a dyn Embedder, cache: &'a EmbeddingCache, timeout: Duration) -> Self {
        Self {
            embedder,
            cache,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Embed one text, reusing a cached vector when present
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit);
        }

        debug!("Embedding cache miss ({} chars)", text.chars().count());
        let vector = with_timeout(self.timeout, embed_one(self.embedder, text)).await?;

        self.cache.put(text, vector.clone());
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::testing::FakeEmbedder;

    #[test]
    fn test_fifo_eviction_ignores_reads() {
        let cache = EmbeddingCache::new(2);
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);

        // Reading "a" must not protect it from eviction
        assert_eq!(cache.get("a"), Some(vec![1.0]));
        cache.put("c", vec![3.0]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some(vec![2.0]));
        assert_eq!(cache.get("c"), Some(vec![3.0]));
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let cache = EmbeddingCache::new(2);
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        cache.put("a", vec![9.0]);
        cache.put("c", vec![3.0]);

        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = EmbeddingCache::new(0);
        cache.put("a", vec![1.0]);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cached_embedder_avoids_repeat_calls() {
        let embedder = FakeEmbedder::new(4);
        let cache = EmbeddingCache::new(10);
        let cached = CachedEmbedder::new(&embedder, &cache, Duration::from_secs(1));

        let first = cached.embed("dobrá víra").await.unwrap();
        let second = cached.embed("dobrá víra").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.calls(), 1);
    }
}
