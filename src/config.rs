use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Which embedding backend turns text into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Any OpenAI-compatible `/v1/embeddings` endpoint.
    OpenAi,
    /// Local ONNX bi-encoder.
    Onnx,
}

impl EmbeddingBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" | "http" => Some(Self::OpenAi),
            "onnx" | "local" => Some(Self::Onnx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Onnx => "onnx",
        }
    }
}

/// Log output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Raw provider name as configured; resolved by the provider factory.
    pub provider: String,
    pub model: String,
    pub url: String,
    pub api_key: Option<String>,
    /// Vector length D. Must match the model output and the stored vectors.
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub onnx_model_path: PathBuf,
    pub onnx_tokenizer_path: PathBuf,
    /// Number of ONNX sessions kept for concurrent inference.
    pub onnx_pool_size: usize,
    pub max_sequence_length: usize,
}

impl EmbeddingConfig {
    /// Model name the configured provider will report, without building it.
    pub fn model_id(&self) -> String {
        match EmbeddingBackend::parse(&self.provider) {
            Some(EmbeddingBackend::Onnx) => {
                crate::embeddings::onnx::model_name_for(&self.onnx_model_path)
            }
            _ => self.model.clone(),
        }
    }
}

pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    /// Connections kept open for concurrent queries.
    pub db_pool_size: usize,
    pub embedding: EmbeddingConfig,
    /// Deadline applied to every search/execute call.
    pub request_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = env::var("EMBEDDING_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());

        let embedding = EmbeddingConfig {
            provider: env::var("EMBEDDING_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
            model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            url: env::var("EMBEDDING_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/embeddings".to_string()),
            api_key,
            dimensions: env::var("EMBEDDING_DIMENSIONS")
                .unwrap_or_else(|_| "1536".to_string())
                .parse()?,
            timeout_secs: env::var("EMBEDDING_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            onnx_model_path: PathBuf::from(
                env::var("ONNX_MODEL_PATH")
                    .unwrap_or_else(|_| "./bi-encoder-model/model_int8.onnx".to_string()),
            ),
            onnx_tokenizer_path: PathBuf::from(
                env::var("ONNX_TOKENIZER_PATH")
                    .unwrap_or_else(|_| "./bi-encoder-model/tokenizer.json".to_string()),
            ),
            onnx_pool_size: env::var("ONNX_POOL_SIZE")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,
            max_sequence_length: env::var("MAX_SEQ_LENGTH")
                .unwrap_or_else(|_| "512".to_string())
                .parse()?,
        };

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            database_path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./toolscout.db".to_string()),
            ),
            db_pool_size: env::var("DB_POOL_SIZE")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,
            embedding,
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            shutdown_timeout_secs: env::var("SHUTDOWN_TIMEOUT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            log_format,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.embedding.dimensions == 0 {
            anyhow::bail!("EMBEDDING_DIMENSIONS must be greater than zero");
        }
        if self.db_pool_size == 0 {
            anyhow::bail!("DB_POOL_SIZE must be greater than zero");
        }
        if self.embedding.onnx_pool_size == 0 {
            anyhow::bail!("ONNX_POOL_SIZE must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!(EmbeddingBackend::parse("OpenAI"), Some(EmbeddingBackend::OpenAi));
        assert_eq!(EmbeddingBackend::parse(" onnx "), Some(EmbeddingBackend::Onnx));
        assert_eq!(EmbeddingBackend::parse("anthropic"), None);
        assert_eq!(EmbeddingBackend::Onnx.as_str(), "onnx");
    }
}
