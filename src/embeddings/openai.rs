//! HTTP embedding provider for OpenAI-compatible `/v1/embeddings` endpoints.

use super::{single_vector, EmbeddingError, EmbeddingProvider, Result};
use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thread-safe and cheap to clone; the reqwest client is shared internally.
#[derive(Clone)]
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAiEmbeddingProvider {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
            api_key: api_key.into(),
            dimensions,
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            EmbeddingError::Config(
                "api key is required for the openai provider (set EMBEDDING_API_KEY or OPENAI_API_KEY)"
                    .to_string(),
            )
        })?;

        Self::new(
            config.url.clone(),
            config.model.clone(),
            api_key,
            config.dimensions,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn request(&self, text: &str) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: [text],
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .map(|d| d.message)
                .unwrap_or(body);
            return Err(EmbeddingError::Transport(format!(
                "provider returned {}: {}",
                status.as_u16(),
                message
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Contract(format!("unparseable response: {}", e)))?;

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.request(text).await?;
        single_vector(vectors, self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embedding_response(count: usize, dimensions: usize) -> Value {
        let data: Vec<Value> = (0..count)
            .map(|index| {
                let embedding: Vec<f64> = (0..dimensions)
                    .map(|i| i as f64 / dimensions as f64)
                    .collect();
                json!({ "object": "embedding", "index": index, "embedding": embedding })
            })
            .collect();
        json!({ "object": "list", "data": data, "model": "text-embedding-3-small" })
    }

    async fn provider_for(server: &MockServer, dimensions: usize) -> OpenAiEmbeddingProvider {
        OpenAiEmbeddingProvider::new(
            format!("{}/v1/embeddings", server.uri()),
            "text-embedding-3-small",
            "test-key",
            dimensions,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_embed_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "text-embedding-3-small",
                "input": ["test text"],
                "encoding_format": "float"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(1, 10)))
            .mount(&server)
            .await;

        let provider = provider_for(&server, 10).await;
        let vector = provider.embed("test text").await.unwrap();

        assert_eq!(vector.len(), 10);
        for (i, v) in vector.iter().enumerate() {
            assert!((v - i as f32 / 10.0).abs() < 1e-4);
        }
    }

    #[tokio::test]
    async fn test_auth_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {
                    "message": "Invalid API key",
                    "type": "invalid_request_error",
                    "code": "invalid_api_key"
                }
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server, 10).await;
        let err = provider.embed("test text").await.unwrap_err();

        assert!(matches!(err, EmbeddingError::Transport(_)));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[tokio::test]
    async fn test_multiple_embeddings_is_contract_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(2, 10)))
            .mount(&server)
            .await;

        let provider = provider_for(&server, 10).await;
        let err = provider.embed("test text").await.unwrap_err();

        assert!(matches!(err, EmbeddingError::Contract(_)));
        assert!(err.to_string().contains("expected 1 embedding, got 2"));
    }

    #[tokio::test]
    async fn test_empty_response_is_contract_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(0, 10)))
            .mount(&server)
            .await;

        let provider = provider_for(&server, 10).await;
        let err = provider.embed("test text").await.unwrap_err();
        assert!(err.to_string().contains("expected 1 embedding, got 0"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_wrong_dimensions_is_contract_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(1, 8)))
            .mount(&server)
            .await;

        let provider = provider_for(&server, 10).await;
        let err = provider.embed("test text").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Contract(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport() {
        let provider = OpenAiEmbeddingProvider::new(
            "http://127.0.0.1:9/v1/embeddings",
            "text-embedding-3-small",
            "test-key",
            10,
            Duration::from_secs(2),
        )
        .unwrap();

        let err = provider.embed("test text").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Transport(_)));
    }
}
