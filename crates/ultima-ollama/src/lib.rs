// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama completion adapter.
//!
//! Implements [`CompletionAdapter`] over `POST /api/generate` with
//! `stream: false`. Transport failures, timeouts and non-success statuses
//! are reported as provider errors; a successful call with an empty body is
//! malformed output.

pub mod client;
pub mod types;

use async_trait::async_trait;
use tracing::{debug, info};
use ultima_config::OllamaConfig;
use ultima_core::error::UltimaError;
use ultima_core::traits::{CompletionAdapter, PluginAdapter};
use ultima_core::types::{
    AdapterType, CompletionRequest, CompletionResponse, HealthStatus, ResponseFormat,
};

use crate::client::OllamaClient;
use crate::types::{GenerateOptions, GenerateRequest};

/// Completion adapter backed by an Ollama server.
pub struct OllamaCompletion {
    client: OllamaClient,
    model: String,
}

impl OllamaCompletion {
    /// Creates the adapter from the `[ollama]` config section.
    pub fn new(config: &OllamaConfig) -> Result<Self, UltimaError> {
        let client = OllamaClient::new(
            &config.base_url,
            config.timeout(),
            config.connect_timeout(),
        )?;

        info!(
            base_url = %client.base_url(),
            model = %config.model,
            "Ollama completion adapter initialized"
        );

        Ok(Self {
            client,
            model: config.model.clone(),
        })
    }

    /// Configured default model.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_generate_request(&self, request: CompletionRequest) -> GenerateRequest {
        GenerateRequest {
            model: request.model.unwrap_or_else(|| self.model.clone()),
            prompt: request.prompt,
            system: request.system,
            stream: false,
            format: match request.format {
                ResponseFormat::Json => Some("json".to_string()),
                ResponseFormat::Text => None,
            },
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl PluginAdapter for OllamaCompletion {
    fn name(&self) -> &str {
        "ollama"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Completion
    }

    async fn health_check(&self) -> Result<HealthStatus, UltimaError> {
        match self.client.list_models().await {
            Ok(models) if models.iter().any(|m| m == &self.model) => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Degraded(format!(
                "model `{}` is not pulled on the server",
                self.model
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), UltimaError> {
        debug!("Ollama completion adapter shutting down");
        Ok(())
    }
}

#[async_trait]
impl CompletionAdapter for OllamaCompletion {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, UltimaError> {
        let api_request = self.to_generate_request(request);
        let response = self.client.generate(&api_request).await?;

        if response.response.trim().is_empty() {
            return Err(UltimaError::MalformedOutput(
                "model returned an empty response".into(),
            ));
        }

        debug!(
            model = %api_request.model,
            eval_count = ?response.eval_count,
            "completion finished"
        );

        Ok(CompletionResponse {
            text: response.response,
            model: if response.model.is_empty() {
                api_request.model
            } else {
                response.model
            },
        })
    }
}
