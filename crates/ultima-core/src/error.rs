// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the UltimaRAG learning core.

use thiserror::Error;

/// The primary error type used across adapter traits and learning operations.
#[derive(Debug, Error)]
pub enum UltimaError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage errors (file I/O, rename failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A document failed validation before being persisted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Completion service transport errors (connection failure, non-200 status).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The model answered, but the content could not be used (bad JSON, schema mismatch).
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    /// Embedding inference errors.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The reflection queue no longer accepts work (pipeline shut down).
    #[error("reflection queue is closed")]
    QueueClosed,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl UltimaError {
    /// Wraps an I/O error as a storage error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        UltimaError::Storage {
            source: Box::new(err),
        }
    }

    /// Returns true for failures of the completion service itself rather
    /// than of the content it produced.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            UltimaError::Provider { .. } | UltimaError::Timeout { .. }
        )
    }
}
