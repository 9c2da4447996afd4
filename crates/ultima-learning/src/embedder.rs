// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local all-MiniLM-L6-v2 sentence embeddings via ONNX Runtime.
//!
//! Inference is CPU-bound and runs on tokio's blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;

use ultima_core::error::UltimaError;
use ultima_core::traits::{EmbeddingAdapter, PluginAdapter};
use ultima_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};

use crate::embedding::l2_normalize;

/// Output width of all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

struct Model {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

// Session is only reached through the Mutex; the tokenizer is read-only.
unsafe impl Send for Model {}
unsafe impl Sync for Model {}

/// ONNX embedding adapter. Cheap to clone.
#[derive(Clone)]
pub struct OnnxEmbedder {
    model: Arc<Model>,
}

impl OnnxEmbedder {
    /// Loads `model.onnx` and the `tokenizer.json` next to it.
    pub fn new(model_path: &Path) -> Result<Self, UltimaError> {
        let model_dir = model_path
            .parent()
            .ok_or_else(|| UltimaError::Embedding("invalid model path".to_string()))?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            UltimaError::Embedding(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let session = Session::builder()
            .map_err(|e| UltimaError::Embedding(format!("failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| UltimaError::Embedding(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(1)
            .map_err(|e| UltimaError::Embedding(format!("failed to set thread count: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                UltimaError::Embedding(format!(
                    "failed to load ONNX model from {}: {e}",
                    model_path.display()
                ))
            })?;

        Ok(Self {
            model: Arc::new(Model {
                session: Mutex::new(session),
                tokenizer,
            }),
        })
    }
}

impl Model {
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, UltimaError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| UltimaError::Embedding(format!("tokenization failed: {e}")))?;

        let widen = |xs: &[u32]| xs.iter().map(|&x| i64::from(x)).collect::<Vec<i64>>();
        let attention_mask = widen(encoding.get_attention_mask());
        let seq_len = attention_mask.len();

        let tensor = |values: Vec<i64>| {
            Array2::from_shape_vec((1, seq_len), values)
                .map_err(|e| UltimaError::Embedding(format!("bad input shape: {e}")))
        };
        let input_ids = tensor(widen(encoding.get_ids()))?;
        let mask = tensor(attention_mask.clone())?;
        let type_ids = tensor(widen(encoding.get_type_ids()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| UltimaError::Embedding(format!("ONNX session lock poisoned: {e}")))?;

        fn view(array: &Array2<i64>) -> Result<TensorRef<'_, i64>, UltimaError> {
            TensorRef::from_array_view(array)
                .map_err(|e| UltimaError::Embedding(format!("failed to build tensor: {e}")))
        }
        let outputs = session
            .run(ort::inputs![
                "input_ids" => view(&input_ids)?,
                "attention_mask" => view(&mask)?,
                "token_type_ids" => view(&type_ids)?
            ])
            .map_err(|e| UltimaError::Embedding(format!("ONNX inference failed: {e}")))?;

        // [1, seq_len, hidden]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| UltimaError::Embedding(format!("failed to read output tensor: {e}")))?;
        let hidden_size = shape[shape.len() - 1] as usize;

        Ok(l2_normalize(&mean_pool(data, &attention_mask, hidden_size)))
    }
}

/// Mean of the token vectors whose attention mask is set.
fn mean_pool(embeddings: &[f32], attention_mask: &[i64], hidden_size: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0usize;

    for (token, _) in attention_mask.iter().enumerate().filter(|(_, m)| **m > 0) {
        let row = &embeddings[token * hidden_size..(token + 1) * hidden_size];
        for (acc, v) in sum.iter_mut().zip(row) {
            *acc += v;
        }
        count += 1;
    }

    if count > 0 {
        let n = count as f32;
        sum.iter_mut().for_each(|v| *v /= n);
    }
    sum
}

#[async_trait]
impl PluginAdapter for OnnxEmbedder {
    fn name(&self) -> &str {
        "onnx-minilm"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, UltimaError> {
        match self.model.session.lock() {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("session lock poisoned: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), UltimaError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OnnxEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, UltimaError> {
        let model = Arc::clone(&self.model);
        let embeddings = tokio::task::spawn_blocking(move || {
            input
                .texts
                .iter()
                .map(|text| model.embed_text(text))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| UltimaError::Embedding(format!("embedding task failed: {e}")))??;

        Ok(EmbeddingOutput {
            embeddings,
            dimensions: EMBEDDING_DIM,
        })
    }
}
