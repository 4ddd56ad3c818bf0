use super::Embedder;
use crate::config::Config;
use crate::embedding_backend::EmbeddingBackendClient;
use crate::error::{Error, Result};
use async_trait::async_trait;

pub struct HttpEmbedder {
    client: EmbeddingBackendClient,
    model_id: String,
    dimension: usize,
    batch_size: usize,
}

impl HttpEmbedder {
    pub fn new(config: &Config) -> Result<Self> {
        let embedding = &config.embedding;
        let client = EmbeddingBackendClient::new(
            &embedding.url,
            config.embedding_api_key(),
            embedding.timeout_secs,
            embedding.retries,
        )?;
        Ok(Self {
            client,
            model_id: embedding.model.clone(),
            dimension: embedding.dimension,
            batch_size: embedding.batch_size.max(1),
        })
    }

    fn validate_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<()> {
        if let Some(mismatch) = embeddings.iter().find(|vec| vec.len() != self.dimension) {
            return Err(Error::Embedding(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model_id,
                self.dimension,
                mismatch.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.client.embed_text(&self.model_id, batch.to_vec()).await?);
        }
        self.validate_dimensions(&embeddings)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(url: &str, dimension: usize) -> Config {
        let mut config = Config::default();
        config.embedding.url = url.to_string();
        config.embedding.dimension = dimension;
        config.embedding.retries = 0;
        config.embedding.api_key_env = "PRECEDENT_TEST_UNSET_KEY".to_string();
        config
    }

    #[tokio::test]
    async fn test_rejects_wrong_dimension() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"embedding": [0.1, 0.2]}]})),
            )
            .mount(&mock_server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&mock_server.uri(), 3)).unwrap();
        let err = embedder
            .embed(vec!["§ 1089".to_string()])
            .await
            .expect_err("dimension mismatch should fail");
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn test_empty_input_skips_backend() {
        let embedder = HttpEmbedder::new(&config_for("http://127.0.0.1:9", 3)).unwrap();
        assert!(embedder.embed(Vec::new()).await.unwrap().is_empty());
    }
}
