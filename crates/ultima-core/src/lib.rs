// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the UltimaRAG learning core.
//!
//! This crate provides the error taxonomy, the adapter traits for the two
//! external services the learning pipeline consumes (language-model
//! completion and text embedding), and the request/response types they
//! exchange.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::UltimaError;
pub use types::{AdapterType, HealthStatus};

pub use traits::{CompletionAdapter, EmbeddingAdapter, PluginAdapter};
