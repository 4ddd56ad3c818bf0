use crate::error::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Data { data: Vec<EmbeddingData> },
    Embeddings { embeddings: Vec<Vec<f32>> },
    Vectors { vectors: Vec<Vec<f32>> },
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl EmbeddingResponse {
    fn into_embeddings(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingResponse::Data { mut data } => {
                // OpenAI-style responses carry an index; restore input order
                if data.iter().all(|d| d.index.is_some()) {
                    data.sort_by_key(|d| d.index);
                }
                data.into_iter().map(|d| d.embedding).collect()
            }
            EmbeddingResponse::Embeddings { embeddings } => embeddings,
            EmbeddingResponse::Vectors { vectors } => vectors,
        }
    }
}

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint
pub struct EmbeddingBackendClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    retries: usize,
}

impl EmbeddingBackendClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout_secs: u64,
        retries: usize,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            retries,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid embedding backend URL: {}", e)))
    }

    async fn send_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request.try_clone().ok_or_else(|| {
                Error::Embedding("Failed to clone backend request".to_string())
            })?;
            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => {
                        return ok
                            .json::<T>()
                            .await
                            .map_err(|e| Error::Embedding(format!("Malformed response: {}", e)))
                    }
                    Err(e) => last_err = Some(Error::Embedding(e.to_string())),
                },
                Err(e) => last_err = Some(Error::Embedding(e.to_string())),
            }

            if attempt < self.retries {
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::Embedding("Embedding backend request failed".to_string())
        }))
    }

    pub async fn embed_text(&self, model: &str, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = inputs.len();
        let url = self.endpoint("/v1/embeddings")?;
        let body = EmbeddingRequest {
            model,
            input: inputs,
        };

        let mut request = self.client.post(url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let parsed: EmbeddingResponse = self.send_with_retry(request).await?;
        let embeddings = parsed.into_embeddings();
        if embeddings.len() != expected {
            return Err(Error::Embedding(format!(
                "Backend returned {} embeddings for {} inputs",
                embeddings.len(),
                expected
            )));
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_text_openai_shape_with_auth() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [0.0, 1.0], "index": 1},
                    {"embedding": [1.0, 0.0], "index": 0}
                ]
            })))
            .mount(&mock_server)
            .await;

        let client =
            EmbeddingBackendClient::new(&mock_server.uri(), Some("secret".to_string()), 5, 0)
                .expect("client should build");
        let embeddings = client
            .embed_text("test-model", vec!["a".to_string(), "b".to_string()])
            .await
            .expect("embedding should succeed");

        assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_embed_text_accepts_embeddings_shape() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.5]]})),
            )
            .mount(&mock_server)
            .await;

        let client = EmbeddingBackendClient::new(&mock_server.uri(), None, 5, 0).unwrap();
        let embeddings = client
            .embed_text("test-model", vec!["a".to_string()])
            .await
            .unwrap();
        assert_eq!(embeddings, vec![vec![0.5, 0.5]]);
    }

    #[tokio::test]
    async fn test_retries_then_fails_on_server_error() {
        let mock_server = MockServer::start().await;

        let guard = Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .mount_as_scoped(&mock_server)
            .await;

        let client = EmbeddingBackendClient::new(&mock_server.uri(), None, 5, 2).unwrap();
        let err = client
            .embed_text("test-model", vec!["a".to_string()])
            .await
            .expect_err("503 should fail");

        assert!(matches!(err, Error::Embedding(_)));
        assert!(err.is_transient());
        assert_eq!(guard.received_requests().await.len(), 3);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"vectors": [[0.5, 0.5]]})),
            )
            .mount(&mock_server)
            .await;

        let client = EmbeddingBackendClient::new(&mock_server.uri(), None, 5, 0).unwrap();
        let result = client
            .embed_text("test-model", vec!["a".to_string(), "b".to_string()])
            .await;
        assert!(result.is_err());
    }
}
