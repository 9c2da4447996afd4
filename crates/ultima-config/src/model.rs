// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the UltimaRAG learning core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UltimaConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Ollama completion service settings.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Local embedding model settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Continuous-learning (reflection + guidelines) settings.
    #[serde(default)]
    pub learning: LearningConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the assistant.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "ultima".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Ollama completion service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OllamaConfig {
    /// Base URL of the Ollama HTTP API.
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Primary model. Also decides the hardware tier for rule caps.
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Whole-request timeout in seconds.
    #[serde(default = "default_ollama_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds.
    #[serde(default = "default_ollama_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Upper bound on generated tokens for rule drafting.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            timeout_secs: default_ollama_timeout_secs(),
            connect_timeout_secs: default_ollama_connect_timeout_secs(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl OllamaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "qwen3:8b".to_string()
}

fn default_ollama_timeout_secs() -> u64 {
    120
}

fn default_ollama_connect_timeout_secs() -> u64 {
    5
}

fn default_max_output_tokens() -> u32 {
    512
}

/// Local embedding model configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Load the ONNX embedding model. When false, deduplication is lexical only.
    #[serde(default = "default_embedding_enabled")]
    pub enabled: bool,

    /// Directory the model files are downloaded into.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: default_embedding_enabled(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_embedding_enabled() -> bool {
    true
}

fn default_data_dir() -> String {
    "data".to_string()
}

/// Continuous-learning configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LearningConfig {
    /// Path of the rules document.
    #[serde(default = "default_guidelines_path")]
    pub guidelines_path: String,

    /// Seconds between on-disk modification checks by the guidelines cache.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Default token budget for injected guidelines.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Minimum query length (characters) for feedback to be considered.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,

    /// Minimum response length (characters) for feedback to be considered.
    #[serde(default = "default_min_response_chars")]
    pub min_response_chars: usize,

    /// Generated rules below this confidence are discarded.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Cosine similarity at or above which two rules are the same issue.
    #[serde(default = "default_embedding_similarity_threshold")]
    pub embedding_similarity_threshold: f32,

    /// Jaccard token overlap at or above which two rules are the same issue
    /// (used when embeddings are unavailable).
    #[serde(default = "default_lexical_overlap_threshold")]
    pub lexical_overlap_threshold: f32,

    /// Confidence added on each reinforcement.
    #[serde(default = "default_confidence_boost")]
    pub confidence_boost: f64,

    /// Factor applied to the generated confidence when a rule is first stored.
    #[serde(default = "default_initial_confidence_scale")]
    pub initial_confidence_scale: f64,

    /// Days without reinforcement after which a weak rule is retired.
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,

    /// Rules with at least this many triggers are never retired for staleness.
    #[serde(default = "default_stale_min_triggers")]
    pub stale_min_triggers: u32,

    /// Characters of the failed response included in the drafting prompt.
    #[serde(default = "default_response_truncate_chars")]
    pub response_truncate_chars: usize,

    /// Seconds to wait for in-flight reflections on shutdown.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            guidelines_path: default_guidelines_path(),
            cache_ttl_secs: default_cache_ttl_secs(),
            token_budget: default_token_budget(),
            min_query_chars: default_min_query_chars(),
            min_response_chars: default_min_response_chars(),
            min_confidence: default_min_confidence(),
            embedding_similarity_threshold: default_embedding_similarity_threshold(),
            lexical_overlap_threshold: default_lexical_overlap_threshold(),
            confidence_boost: default_confidence_boost(),
            initial_confidence_scale: default_initial_confidence_scale(),
            stale_after_days: default_stale_after_days(),
            stale_min_triggers: default_stale_min_triggers(),
            response_truncate_chars: default_response_truncate_chars(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl LearningConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

fn default_guidelines_path() -> String {
    "data/system_guidelines.json".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_token_budget() -> usize {
    150
}

fn default_min_query_chars() -> usize {
    10
}

fn default_min_response_chars() -> usize {
    10
}

fn default_min_confidence() -> f64 {
    0.4
}

fn default_embedding_similarity_threshold() -> f32 {
    0.82
}

fn default_lexical_overlap_threshold() -> f32 {
    0.55
}

fn default_confidence_boost() -> f64 {
    0.08
}

fn default_initial_confidence_scale() -> f64 {
    0.6
}

fn default_stale_after_days() -> i64 {
    30
}

fn default_stale_min_triggers() -> u32 {
    3
}

fn default_response_truncate_chars() -> usize {
    600
}

fn default_drain_timeout_secs() -> u64 {
    15
}
