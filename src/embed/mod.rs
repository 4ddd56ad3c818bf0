//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - An HTTP backend speaking the OpenAI embeddings protocol

mod http_backend;

pub use http_backend::*;

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &Config) -> Result<Box<dyn Embedder>> {
    let embedder = HttpEmbedder::new(config)?;
    Ok(Box::new(embedder))
}

/// Embed a single text
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let mut embeddings = embedder.embed(vec![text.to_string()]).await?;
    embeddings.pop().ok_or_else(|| {
        crate::error::Error::Embedding("Backend returned no embedding".to_string())
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic embedder for tests

    use super::Embedder;
    use crate::error::{Error, Result};
    use crate::vector::normalize;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns fixed vectors for registered texts and a blake3-derived unit
    /// vector for anything else.
    pub struct FakeEmbedder {
        dimension: usize,
        fixed: HashMap<String, Vec<f32>>,
        fail_containing: Option<String>,
        calls: AtomicUsize,
    }

    impl FakeEmbedder {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                fixed: HashMap::new(),
                fail_containing: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
            self.fixed.insert(text.to_string(), vector);
            self
        }

        /// Fail any batch containing a text with this substring
        pub fn failing_on(mut self, needle: &str) -> Self {
            self.fail_containing = Some(needle.to_string());
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hashed(&self, text: &str) -> Vec<f32> {
            let mut hasher = blake3::Hasher::new();
            hasher.update(text.as_bytes());
            let mut reader = hasher.finalize_xof();
            let mut bytes = vec![0u8; self.dimension];
            reader.fill(&mut bytes);
            let raw: Vec<f32> = bytes.iter().map(|b| *b as f32 / 127.5 - 1.0).collect();
            normalize(&raw)
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref needle) = self.fail_containing {
                if texts.iter().any(|t| t.contains(needle.as_str())) {
                    return Err(Error::Embedding(format!("refusing to embed '{}'", needle)));
                }
            }
            Ok(texts
                .iter()
                .map(|t| self.fixed.get(t).cloned().unwrap_or_else(|| self.hashed(t)))
                .collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "fake"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeEmbedder;
    use super::*;

    #[tokio::test]
    async fn test_embed_one() {
        let embedder = FakeEmbedder::new(8);
        let a = embed_one(&embedder, "držba").await.unwrap();
        let b = embed_one(&embedder, "držba").await.unwrap();
        assert_eq!(a.len(), 8);
        assert_eq!(a, b);
    }
}
