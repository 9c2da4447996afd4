// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the constraints serde cannot express (ranges, non-empty paths,
//! parseable URLs) and collects every failure instead of stopping at the first.

use crate::diagnostic::ConfigError;
use crate::model::UltimaConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
/// A century; longer windows cannot be subtracted from a timestamp.
const MAX_STALE_AFTER_DAYS: i64 = 36_500;

pub fn validate_config(config: &UltimaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::validation(format!(
            "agent.log_level `{}` is not one of {}",
            config.agent.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    let base_url = config.ollama.base_url.trim();
    if base_url.is_empty() {
        errors.push(ConfigError::validation("ollama.base_url must not be empty"));
    } else if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(ConfigError::validation(format!(
            "ollama.base_url `{base_url}` must start with http:// or https://"
        )));
    }

    if config.ollama.model.trim().is_empty() {
        errors.push(ConfigError::validation("ollama.model must not be empty"));
    }

    positive(&mut errors, "ollama.timeout_secs", config.ollama.timeout_secs);
    positive(
        &mut errors,
        "ollama.connect_timeout_secs",
        config.ollama.connect_timeout_secs,
    );
    positive(
        &mut errors,
        "ollama.max_output_tokens",
        u64::from(config.ollama.max_output_tokens),
    );

    if config.embedding.enabled && config.embedding.data_dir.trim().is_empty() {
        errors.push(ConfigError::validation(
            "embedding.data_dir must not be empty when embeddings are enabled",
        ));
    }

    let learning = &config.learning;
    if learning.guidelines_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "learning.guidelines_path must not be empty",
        ));
    }

    positive(&mut errors, "learning.cache_ttl_secs", learning.cache_ttl_secs);
    positive(
        &mut errors,
        "learning.drain_timeout_secs",
        learning.drain_timeout_secs,
    );
    positive(
        &mut errors,
        "learning.response_truncate_chars",
        learning.response_truncate_chars as u64,
    );

    unit_interval(&mut errors, "learning.min_confidence", learning.min_confidence);
    unit_interval(
        &mut errors,
        "learning.embedding_similarity_threshold",
        f64::from(learning.embedding_similarity_threshold),
    );
    unit_interval(
        &mut errors,
        "learning.lexical_overlap_threshold",
        f64::from(learning.lexical_overlap_threshold),
    );
    unit_interval(
        &mut errors,
        "learning.confidence_boost",
        learning.confidence_boost,
    );
    unit_interval(
        &mut errors,
        "learning.initial_confidence_scale",
        learning.initial_confidence_scale,
    );

    if !(1..=MAX_STALE_AFTER_DAYS).contains(&learning.stale_after_days) {
        errors.push(ConfigError::validation(format!(
            "learning.stale_after_days must be within [1, {MAX_STALE_AFTER_DAYS}], got {}",
            learning.stale_after_days
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn positive(errors: &mut Vec<ConfigError>, key: &str, value: u64) {
    if value == 0 {
        errors.push(ConfigError::validation(format!(
            "{key} must be greater than zero"
        )));
    }
}

fn unit_interval(errors: &mut Vec<ConfigError>, key: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ConfigError::validation(format!(
            "{key} must be within [0, 1], got {value}"
        )));
    }
}
