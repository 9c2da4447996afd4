// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Continuous-learning core for UltimaRAG.
//!
//! Negative feedback is turned into short behavioral rules by the local
//! model, deduplicated against what was already learned, persisted in a
//! JSON rules file, and served back to prompt construction within a token
//! budget.
//!
//! ## Architecture
//!
//! - **RuleStore**: atomic whole-document persistence (temp write + rename)
//! - **SchemaMigrator**: startup upgrade of legacy guideline files
//! - **GuidelinesCache**: TTL-checked read authority with tiered selection
//! - **ReflectionPipeline**: single-writer worker that learns from feedback
//! - **RuleGenerator**: candidate rule drafting via a `CompletionAdapter`
//! - **DedupStrategy**: semantic (embedding) or lexical duplicate detection
//! - **EmbeddingService**: optional ONNX MiniLM embeddings; failures degrade
//!   to lexical deduplication

pub mod dedup;
pub mod embedder;
pub mod embedding;
pub mod feedback;
pub mod generator;
pub mod guidelines;
pub mod lifecycle;
pub mod metrics;
pub mod migration;
pub mod model_manager;
pub mod reflection;
pub mod store;
pub mod tier;
pub mod types;

pub use dedup::{DedupStrategy, LexicalDedup, SemanticDedup};
pub use embedder::OnnxEmbedder;
pub use embedding::EmbeddingService;
pub use feedback::FeedbackEvent;
pub use generator::{CandidateRule, RuleGenerator};
pub use guidelines::{GuidelinesCache, GuidelinesStats, format_guidelines};
pub use lifecycle::LifecyclePolicy;
pub use migration::{MigrationOutcome, SchemaMigrator};
pub use model_manager::ModelManager;
pub use reflection::{
    DrainReport, ReflectionHandle, ReflectionOutcome, ReflectionPipeline, ReflectionSettings,
    SkipReason,
};
pub use store::RuleStore;
pub use tier::HardwareTier;
pub use types::*;
