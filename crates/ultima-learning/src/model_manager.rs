// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-run download of the sentence-embedding model.
//!
//! Fetches all-MiniLM-L6-v2 (INT8 ONNX export plus tokenizer) from
//! HuggingFace into `<data_dir>/models/all-MiniLM-L6-v2/`.

use std::path::{Path, PathBuf};

use tracing::info;
use ultima_core::error::UltimaError;

const MODEL_URL: &str =
    "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

const MODEL_DIR_NAME: &str = "all-MiniLM-L6-v2";

/// Resolves and, when needed, downloads the embedding model files.
pub struct ModelManager {
    data_dir: PathBuf,
}

impl ModelManager {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models").join(MODEL_DIR_NAME)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join("model.onnx")
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir().join("tokenizer.json")
    }

    pub fn is_model_available(&self) -> bool {
        self.model_path().exists() && self.tokenizer_path().exists()
    }

    /// Returns the model path, downloading any missing file first.
    pub async fn ensure_model(&self) -> Result<PathBuf, UltimaError> {
        if self.is_model_available() {
            return Ok(self.model_path());
        }

        let model_dir = self.model_dir();
        info!(dir = %model_dir.display(), "embedding model not found, downloading");
        tokio::fs::create_dir_all(&model_dir)
            .await
            .map_err(|e| UltimaError::Embedding(format!("failed to create model directory: {e}")))?;

        for (dest, url) in [
            (self.model_path(), MODEL_URL),
            (self.tokenizer_path(), TOKENIZER_URL),
        ] {
            if dest.exists() {
                continue;
            }
            let size = download_file(url, &dest).await?;
            info!(file = %dest.display(), bytes = size, "downloaded");
        }

        Ok(self.model_path())
    }
}

/// Downloads `url` to `<dest>.part`, then renames it to `dest`.
async fn download_file(url: &str, dest: &Path) -> Result<usize, UltimaError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| UltimaError::Embedding(format!("failed to download {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(UltimaError::Embedding(format!(
            "download of {url} failed with status {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| UltimaError::Embedding(format!("failed to read body of {url}: {e}")))?;

    let partial = dest.with_extension("part");
    let written = async {
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, dest).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(UltimaError::Embedding(format!(
            "failed to write {}: {e}",
            dest.display()
        )));
    }
    Ok(bytes.len())
}
