// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Ollama API.
//!
//! [`OllamaClient`] sends single non-streaming generate calls. It never
//! retries; callers own the retry budget.

use std::time::Duration;

use tracing::debug;
use ultima_core::UltimaError;

use crate::types::{ErrorResponse, GenerateRequest, GenerateResponse, TagsResponse};

/// HTTP client for an Ollama-compatible server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Creates a client for `base_url` (e.g. `http://localhost:11434`).
    pub fn new(
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, UltimaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| UltimaError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends `POST /api/generate` and returns the parsed body.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, UltimaError> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        debug!(status = %status, model = %request.model, "generate response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body).map_err(|e| UltimaError::Provider {
            message: format!("failed to parse Ollama response envelope: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// Sends `GET /api/tags` and returns the names of locally available models.
    pub async fn list_models(&self) -> Result<Vec<String>, UltimaError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| UltimaError::Provider {
            message: format!("failed to parse model list: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn transport_error(&self, e: reqwest::Error) -> UltimaError {
        if e.is_timeout() {
            return UltimaError::Timeout {
                duration: self.timeout,
            };
        }
        UltimaError::Provider {
            message: format!("HTTP request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

/// Builds the error for a non-success status, preferring Ollama's `error` field.
fn status_error(status: reqwest::StatusCode, body: &str) -> UltimaError {
    let message = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => format!("Ollama returned {status}: {}", err.error),
        Err(_) => format!("Ollama returned {status}: {body}"),
    };
    UltimaError::Provider {
        message,
        source: None,
    }
}
