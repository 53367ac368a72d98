//! Local bi-encoder embedding provider running an ONNX model.
//!
//! Produces mean-pooled, L2-normalized sentence embeddings. A small pool of
//! sessions lets several requests embed at once; the semaphore bounds
//! concurrent inferences to the pool size so a free session always exists
//! once a permit is held.

use super::{EmbeddingError, EmbeddingProvider, Result};
use async_trait::async_trait;
use crossbeam::queue::ArrayQueue;
use ndarray::Array2;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tokio::sync::Semaphore;

struct EncoderPool {
    /// Each session is only touched by the holder of its index.
    sessions: Vec<Mutex<Session>>,
    available: ArrayQueue<usize>,
    tokenizer: Tokenizer,
    max_length: usize,
}

pub struct OnnxEmbeddingProvider {
    pool: Arc<EncoderPool>,
    permits: Arc<Semaphore>,
    dimensions: usize,
    model_name: String,
}

impl OnnxEmbeddingProvider {
    /// Load the model into `pool_size` sessions and verify its output width.
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        max_length: usize,
        pool_size: usize,
        dimensions: usize,
    ) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            EmbeddingError::Config(format!(
                "failed to load tokenizer {}: {}",
                tokenizer_path.display(),
                e
            ))
        })?;

        let model_bytes = std::fs::read(model_path).map_err(|e| {
            EmbeddingError::Config(format!(
                "failed to read model {}: {}",
                model_path.display(),
                e
            ))
        })?;

        let pool_size = pool_size.max(1);
        let available = ArrayQueue::new(pool_size);
        let mut sessions = Vec::with_capacity(pool_size);

        for i in 0..pool_size {
            let session = Session::builder()
                .map_err(|e| EmbeddingError::Config(e.to_string()))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| EmbeddingError::Config(e.to_string()))?
                .with_intra_threads(1)
                .map_err(|e| EmbeddingError::Config(e.to_string()))?
                .commit_from_memory(&model_bytes)
                .map_err(|e| EmbeddingError::Config(format!("failed to load model: {}", e)))?;

            sessions.push(Mutex::new(session));
            available
                .push(i)
                .map_err(|_| EmbeddingError::Config("failed to initialize session pool".into()))?;
        }

        let model_name = model_name_for(model_path);

        let provider = Self {
            pool: Arc::new(EncoderPool {
                sessions,
                available,
                tokenizer,
                max_length,
            }),
            permits: Arc::new(Semaphore::new(pool_size)),
            dimensions,
            model_name,
        };

        // Warmup also checks that the model width matches the configured D.
        let probe = provider.pool.encode_one("warmup query")?;
        if probe.len() != dimensions {
            return Err(EmbeddingError::Config(format!(
                "model produces {} dimensions but {} are configured",
                probe.len(),
                dimensions
            )));
        }

        tracing::info!(
            model = %model_path.display(),
            tokenizer = %tokenizer_path.display(),
            pool_size,
            dimensions,
            "ONNX bi-encoder loaded"
        );

        Ok(provider)
    }
}

/// Name reported for a model file: its stem, e.g. `model_int8`.
pub fn model_name_for(model_path: &Path) -> String {
    model_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "onnx".to_string())
}

impl EncoderPool {
    fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let index = self
            .available
            .pop()
            .ok_or_else(|| EmbeddingError::Inference("no available sessions in pool".into()))?;

        let result = self.encode_with_session(index, text);

        // Always hand the session back, even on failure.
        let _ = self.available.push(index);
        result
    }

    fn encode_with_session(&self, index: usize, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Inference(format!("tokenization failed: {}", e)))?;

        let len = encoding.get_ids().len().min(self.max_length).max(1);
        let mut input_ids = vec![0i64; len];
        let mut attention_mask = vec![0i64; len];
        let token_type_ids = vec![0i64; len];

        for (j, (&id, &mask)) in encoding
            .get_ids()
            .iter()
            .zip(encoding.get_attention_mask())
            .take(len)
            .enumerate()
        {
            input_ids[j] = id as i64;
            attention_mask[j] = mask as i64;
        }

        let shape = [1usize, len];
        let input_ids_tensor = Tensor::from_array((shape, input_ids))
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array((shape, attention_mask.clone()))
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;

        let mut session = self.sessions[index]
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;

        let hidden_state = outputs.get("last_hidden_state").ok_or_else(|| {
            EmbeddingError::Inference("no 'last_hidden_state' output found".to_string())
        })?;

        let (shape_info, data) = hidden_state
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        let hidden_size = shape_info[2] as usize;

        let hidden = Array2::from_shape_vec((len, hidden_size), data[..len * hidden_size].to_vec())
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;

        Ok(mean_pool(&hidden, &attention_mask))
    }
}

/// Mean pooling over unmasked tokens followed by L2 normalization.
fn mean_pool(hidden: &Array2<f32>, attention_mask: &[i64]) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden.ncols()];
    let mut count = 0.0f32;

    for (row, &mask) in hidden.outer_iter().zip(attention_mask) {
        if mask == 1 {
            for (acc, value) in sum.iter_mut().zip(row.iter()) {
                *acc += value;
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for value in sum.iter_mut() {
            *value /= count;
        }
    }

    let norm: f32 = sum.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in sum.iter_mut() {
            *value /= norm;
        }
    }
    sum
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EmbeddingError::Inference("session pool closed".to_string()))?;

        let pool = Arc::clone(&self.pool);
        let text = text.to_string();
        let vector = tokio::task::spawn_blocking(move || pool.encode_one(&text))
            .await
            .map_err(|e| EmbeddingError::Inference(format!("task join error: {}", e)))??;

        super::single_vector(vec![vector], self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
