//! Embedding gateway.
//!
//! The engine only ever asks for one vector per text. Providers are shared as
//! `Arc<dyn EmbeddingProvider>` across request tasks.

pub mod onnx;
pub mod openai;

pub use onnx::OnnxEmbeddingProvider;
pub use openai::OpenAiEmbeddingProvider;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Network, timeout, or non-success HTTP status. Worth retrying.
    #[error("embedding request failed: {0}")]
    Transport(String),

    /// The provider answered, but not with exactly one vector of the
    /// expected length.
    #[error("embedding provider contract violation: {0}")]
    Contract(String),

    /// Missing credentials or an unknown provider.
    #[error("embedding provider misconfigured: {0}")]
    Config(String),

    /// Local model failure.
    #[error("embedding inference failed: {0}")]
    Inference(String),
}

impl EmbeddingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Returns exactly `dimensions()` floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Check a provider response against the one-vector, fixed-length contract.
pub(crate) fn single_vector(
    mut vectors: Vec<Vec<f32>>,
    dimensions: usize,
) -> Result<Vec<f32>> {
    if vectors.len() != 1 {
        return Err(EmbeddingError::Contract(format!(
            "expected 1 embedding, got {}",
            vectors.len()
        )));
    }

    let vector = vectors.remove(0);
    if vector.len() != dimensions {
        return Err(EmbeddingError::Contract(format!(
            "expected {} dimensions, got {}",
            dimensions,
            vector.len()
        )));
    }
    Ok(vector)
}

/// Build the configured provider. Fails on configuration errors so start-up
/// can abort before serving.
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let backend = EmbeddingBackend::parse(&config.provider).ok_or_else(|| {
        EmbeddingError::Config(format!(
            "unsupported embedding provider: {}",
            config.provider
        ))
    })?;

    let provider: Arc<dyn EmbeddingProvider> = match backend {
        EmbeddingBackend::OpenAi => Arc::new(OpenAiEmbeddingProvider::from_config(config)?),
        EmbeddingBackend::Onnx => Arc::new(OnnxEmbeddingProvider::load(
            &config.onnx_model_path,
            &config.onnx_tokenizer_path,
            config.max_sequence_length,
            config.onnx_pool_size,
            config.dimensions,
        )?),
    };

    tracing::info!(
        provider = backend.as_str(),
        model = provider.model_name(),
        dimensions = provider.dimensions(),
        "Embedding provider ready"
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(provider: &str, api_key: Option<&str>) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.to_string(),
            model: "text-embedding-3-small".to_string(),
            url: "http://localhost:1/v1/embeddings".to_string(),
            api_key: api_key.map(str::to_string),
            dimensions: 1536,
            timeout_secs: 5,
            onnx_model_path: PathBuf::from("missing.onnx"),
            onnx_tokenizer_path: PathBuf::from("missing.json"),
            onnx_pool_size: 1,
            max_sequence_length: 512,
        }
    }

    #[test]
    fn test_factory_builds_openai_provider() {
        let provider = provider_from_config(&config("openai", Some("test-key"))).unwrap();
        assert_eq!(provider.dimensions(), 1536);
        assert_eq!(provider.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn test_factory_requires_api_key() {
        let err = provider_from_config(&config("openai", None)).err().unwrap();
        assert!(matches!(err, EmbeddingError::Config(_)));
        assert!(err.to_string().contains("api key"));
    }

    #[test]
    fn test_factory_rejects_unknown_provider() {
        let err = provider_from_config(&config("anthropic", Some("k"))).err().unwrap();
        assert!(err
            .to_string()
            .contains("unsupported embedding provider: anthropic"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_single_vector_contract() {
        assert_eq!(single_vector(vec![vec![0.5, 0.5]], 2).unwrap(), vec![0.5, 0.5]);

        let err = single_vector(vec![], 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "embedding provider contract violation: expected 1 embedding, got 0"
        );

        let err = single_vector(vec![vec![0.0; 2], vec![0.0; 2]], 2).unwrap_err();
        assert!(err.to_string().contains("expected 1 embedding, got 2"));

        let err = single_vector(vec![vec![0.0; 3]], 2).unwrap_err();
        assert!(matches!(err, EmbeddingError::Contract(_)));
    }
}
