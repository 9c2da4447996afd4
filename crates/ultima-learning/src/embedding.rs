// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding service used for rule deduplication.
//!
//! Wraps an optional [`EmbeddingAdapter`]. Encoding never fails: a missing
//! adapter or an inference error yields `None`, and callers fall back to
//! lexical matching.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use ultima_config::EmbeddingConfig;
use ultima_core::traits::EmbeddingAdapter;
use ultima_core::types::EmbeddingInput;

use crate::embedder::OnnxEmbedder;
use crate::model_manager::ModelManager;

#[derive(Clone, Default)]
pub struct EmbeddingService {
    adapter: Option<Arc<dyn EmbeddingAdapter>>,
}

impl EmbeddingService {
    pub fn new(adapter: Arc<dyn EmbeddingAdapter>) -> Self {
        Self {
            adapter: Some(adapter),
        }
    }

    /// A service with no model; every `encode` returns `None`.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Loads the local ONNX model, downloading it on first use.
    ///
    /// Any failure is logged and produces a disabled service.
    pub async fn from_config(config: &EmbeddingConfig) -> Self {
        if !config.enabled {
            info!("embeddings disabled, deduplication will be lexical");
            return Self::disabled();
        }

        let manager = ModelManager::new(PathBuf::from(&config.data_dir));
        let model_path = match manager.ensure_model().await {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "embedding model unavailable, using lexical deduplication");
                return Self::disabled();
            }
        };

        match OnnxEmbedder::new(&model_path) {
            Ok(embedder) => {
                info!(model = %model_path.display(), "embedding model loaded");
                Self::new(Arc::new(embedder))
            }
            Err(e) => {
                warn!(error = %e, "failed to load embedding model, using lexical deduplication");
                Self::disabled()
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.adapter.is_some()
    }

    /// L2-normalized embedding of `text`, or `None` if unavailable.
    pub async fn encode(&self, text: &str) -> Option<Vec<f32>> {
        let adapter = self.adapter.as_ref()?;
        let output = match adapter
            .embed(EmbeddingInput {
                texts: vec![text.to_string()],
            })
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "embedding failed");
                return None;
            }
        };

        let vector = output.embeddings.into_iter().next()?;
        if vector.is_empty() || vector.iter().any(|v| !v.is_finite()) {
            warn!("embedding adapter returned an unusable vector");
            return None;
        }
        Some(l2_normalize(&vector))
    }

    /// Dot product of two normalized vectors, clamped to `[-1, 1]`.
    ///
    /// Vectors of different length (or empty ones) score 0.0.
    pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.is_empty() || a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        dot.clamp(-1.0, 1.0)
    }
}

/// L2-normalize a vector. Zero vectors are returned unchanged.
pub fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultima_test_utils::MockEmbedder;

    #[tokio::test]
    async fn disabled_service_encodes_nothing() {
        let service = EmbeddingService::disabled();
        assert!(!service.is_ready());
        assert!(service.encode("anything").await.is_none());
    }

    #[tokio::test]
    async fn encode_normalizes() {
        let mock = MockEmbedder::new(2);
        mock.insert("rule", vec![3.0, 4.0]).await;
        let service = EmbeddingService::new(Arc::new(mock));

        let v = service.encode("rule").await.unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn adapter_errors_become_none() {
        let mock = MockEmbedder::new(2);
        let service = EmbeddingService::new(Arc::new(mock.clone()));
        assert!(service.encode("unknown text").await.is_none());

        mock.insert("known", vec![1.0, 0.0]).await;
        mock.set_failing(true);
        assert!(service.encode("known").await.is_none());
    }

    #[test]
    fn similarity_is_clamped_and_dimension_checked() {
        assert_eq!(EmbeddingService::similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(EmbeddingService::similarity(&[], &[]), 0.0);
        assert_eq!(EmbeddingService::similarity(&[1.0000001, 0.0], &[1.0, 0.0]), 1.0);
        let s = EmbeddingService::similarity(&[0.6, 0.8], &[0.8, 0.6]);
        assert!((s - 0.96).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
