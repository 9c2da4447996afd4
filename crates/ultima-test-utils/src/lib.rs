// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for UltimaRAG integration tests.
//!
//! Mock adapters for the two external services, so learning-pipeline tests
//! run without a model server or ONNX runtime.
//!
//! # Components
//!
//! - [`MockCompletion`] - scripted completion replies, including failures
//! - [`MockEmbedder`] - fixed text-to-vector table

pub mod mock_completion;
pub mod mock_embedder;

pub use mock_completion::{MockCompletion, MockReply};
pub use mock_embedder::{MockEmbedder, vector_with_similarity};
