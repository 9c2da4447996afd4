// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock embedding adapter backed by a fixed lookup table.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use ultima_core::UltimaError;
use ultima_core::traits::{EmbeddingAdapter, PluginAdapter};
use ultima_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};

/// Maps known texts to preset vectors. Unknown text is an embedding error,
/// and [`MockEmbedder::set_failing`] makes every call fail.
#[derive(Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    table: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    failing: Arc<AtomicBool>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            table: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers the vector returned for `text`.
    pub async fn insert(&self, text: impl Into<String>, vector: Vec<f32>) {
        self.table.lock().await.insert(text.into(), vector);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

/// Two unit vectors of `dim` dimensions whose dot product is `cosine`.
///
/// The first is the basis vector `e0`; the second lies in the `e0`/`e1` plane.
pub fn vector_with_similarity(dim: usize, cosine: f32) -> (Vec<f32>, Vec<f32>) {
    assert!(dim >= 2, "need at least two dimensions");
    let mut a = vec![0.0; dim];
    let mut b = vec![0.0; dim];
    a[0] = 1.0;
    b[0] = cosine;
    b[1] = (1.0 - cosine * cosine).max(0.0).sqrt();
    (a, b)
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, UltimaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), UltimaError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, UltimaError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(UltimaError::Embedding("mock embedder set to fail".into()));
        }

        let table = self.table.lock().await;
        let embeddings = input
            .texts
            .iter()
            .map(|text| {
                table
                    .get(text)
                    .cloned()
                    .ok_or_else(|| UltimaError::Embedding(format!("no vector for `{text}`")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructed_vectors_have_requested_cosine() {
        let (a, b) = vector_with_similarity(8, 0.9);
        let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((dot - 0.9).abs() < 1e-6);
        assert!((norm_b - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unknown_text_is_an_error() {
        let embedder = MockEmbedder::new(4);
        embedder.insert("known", vec![1.0, 0.0, 0.0, 0.0]).await;

        let ok = embedder
            .embed(EmbeddingInput {
                texts: vec!["known".into()],
            })
            .await
            .unwrap();
        assert_eq!(ok.embeddings[0][0], 1.0);

        let err = embedder
            .embed(EmbeddingInput {
                texts: vec!["unknown".into()],
            })
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn failing_switch() {
        let embedder = MockEmbedder::new(2);
        embedder.insert("a", vec![1.0, 0.0]).await;
        embedder.set_failing(true);
        assert!(
            embedder
                .embed(EmbeddingInput {
                    texts: vec!["a".into()]
                })
                .await
                .is_err()
        );
    }
}
