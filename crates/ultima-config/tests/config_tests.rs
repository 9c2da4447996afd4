// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for configuration loading.

use std::io::Write;

use ultima_config::diagnostic::ConfigError;
use ultima_config::model::UltimaConfig;
use ultima_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[agent]
name = "ultima-test"
log_level = "debug"

[ollama]
base_url = "http://gpu-box:11434"
model = "gemma3:4b"
timeout_secs = 30
connect_timeout_secs = 2
max_output_tokens = 256

[embedding]
enabled = false
data_dir = "/var/lib/ultima"

[learning]
guidelines_path = "/tmp/rules.json"
cache_ttl_secs = 5
token_budget = 300
min_confidence = 0.5
embedding_similarity_threshold = 0.9
lexical_overlap_threshold = 0.6
stale_after_days = 14
stale_min_triggers = 2
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "ultima-test");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.ollama.base_url, "http://gpu-box:11434");
    assert_eq!(config.ollama.model, "gemma3:4b");
    assert_eq!(config.ollama.timeout_secs, 30);
    assert_eq!(config.ollama.connect_timeout_secs, 2);
    assert_eq!(config.ollama.max_output_tokens, 256);
    assert!(!config.embedding.enabled);
    assert_eq!(config.embedding.data_dir, "/var/lib/ultima");
    assert_eq!(config.learning.guidelines_path, "/tmp/rules.json");
    assert_eq!(config.learning.cache_ttl_secs, 5);
    assert_eq!(config.learning.token_budget, 300);
    assert_eq!(config.learning.min_confidence, 0.5);
    assert_eq!(config.learning.embedding_similarity_threshold, 0.9);
    assert_eq!(config.learning.lexical_overlap_threshold, 0.6);
    assert_eq!(config.learning.stale_after_days, 14);
    assert_eq!(config.learning.stale_min_triggers, 2);
    // untouched keys keep defaults
    assert_eq!(config.learning.confidence_boost, 0.08);
    assert_eq!(config.learning.response_truncate_chars, 600);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.agent.name, "ultima");
    assert_eq!(config.agent.log_level, "info");
    assert_eq!(config.ollama.base_url, "http://localhost:11434");
    assert_eq!(config.ollama.max_output_tokens, 512);
    assert!(config.embedding.enabled);
    assert_eq!(config.learning.guidelines_path, "data/system_guidelines.json");
    assert_eq!(config.learning.cache_ttl_secs, 60);
    assert_eq!(config.learning.token_budget, 150);
    assert_eq!(config.learning.min_confidence, 0.4);
    assert_eq!(config.learning.embedding_similarity_threshold, 0.82);
    assert_eq!(config.learning.lexical_overlap_threshold, 0.55);
    assert_eq!(config.learning.initial_confidence_scale, 0.6);
    assert_eq!(config.learning.stale_after_days, 30);
    assert_eq!(config.learning.stale_min_triggers, 3);
    assert_eq!(config.learning.drain_timeout_secs, 15);
}

#[test]
fn unknown_learning_key_gets_suggestion() {
    let toml = r#"
[learning]
cache_tll_secs = 10
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown key must be rejected");
    let found = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => Some((key.clone(), suggestion.clone())),
        _ => None,
    });
    let (key, suggestion) = found.expect("expected an UnknownKey diagnostic");
    assert_eq!(key, "cache_tll_secs");
    assert_eq!(suggestion.as_deref(), Some("cache_ttl_secs"));
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let toml = r#"
[telegram]
bot_token = "x"
"#;
    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[learning]
token_budget = "lots"
"#;
    let errors = load_and_validate_str(toml).expect_err("string budget must fail");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. } | ConfigError::Other(_))),
        "{errors:?}"
    );
}

#[test]
fn semantic_validation_runs_after_load() {
    let toml = r#"
[learning]
embedding_similarity_threshold = 2.0
"#;
    let errors = load_and_validate_str(toml).expect_err("threshold > 1 must fail");
    assert!(errors.iter().any(|e| matches!(e, ConfigError::Validation { .. })));
}

#[test]
fn dotted_override_wins_over_toml() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: UltimaConfig = Figment::new()
        .merge(Serialized::defaults(UltimaConfig::default()))
        .merge(Toml::string("[learning]\ncache_ttl_secs = 5\n"))
        .merge(("learning.cache_ttl_secs", 90))
        .extract()
        .expect("override should merge");

    assert_eq!(config.learning.cache_ttl_secs, 90);
}

#[test]
fn explicit_path_is_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[ollama]\nmodel = \"llama3.2:3b\"").unwrap();
    let config = load_and_validate_path(file.path()).expect("file config should load");
    assert_eq!(config.ollama.model, "llama3.2:3b");
}
