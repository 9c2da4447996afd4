// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion adapter trait for language-model text/JSON generation.

use async_trait::async_trait;

use crate::error::UltimaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CompletionRequest, CompletionResponse};

/// Adapter for single-shot language-model completions.
///
/// Implementations report transport failures and non-success statuses as
/// [`UltimaError::Provider`] and do not retry on their own; retry policy
/// belongs to the caller.
#[async_trait]
pub trait CompletionAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, UltimaError>;
}
