// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the UltimaRAG learning core.
//!
//! TOML files layered over compiled defaults, `ULTIMA_*` environment overrides,
//! strict key checking (`deny_unknown_fields`) and miette diagnostics with
//! typo suggestions.
//!
//! ```no_run
//! use ultima_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("rules file: {}", config.learning.guidelines_path);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, TomlSource, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{AgentConfig, EmbeddingConfig, LearningConfig, OllamaConfig, UltimaConfig};

/// Load from the standard hierarchy and validate.
///
/// Extraction failures are converted into diagnostics carrying source spans
/// from whichever config files exist.
pub fn load_and_validate() -> Result<UltimaConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load from an explicit file (plus env overrides) and validate.
pub fn load_and_validate_path(path: &Path) -> Result<UltimaConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Load from a TOML string and validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<UltimaConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![TomlSource::new("<inline>", toml_content)]
    })
}

fn finish(
    loaded: Result<UltimaConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<TomlSource>,
) -> Result<UltimaConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            tracing::debug!(
                guidelines_path = %config.learning.guidelines_path,
                model = %config.ollama.model,
                "configuration loaded"
            );
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

fn read_source(path: &Path) -> Option<TomlSource> {
    std::fs::read_to_string(path)
        .ok()
        .map(|content| TomlSource::new(path.display().to_string(), content))
}

fn collect_toml_sources() -> Vec<TomlSource> {
    let local = std::env::current_dir()
        .map(|d| d.join(loader::LOCAL_CONFIG_PATH))
        .unwrap_or_else(|_| loader::LOCAL_CONFIG_PATH.into());

    [
        Some(local),
        loader::user_config_path(),
        Some(loader::SYSTEM_CONFIG_PATH.into()),
    ]
    .into_iter()
    .flatten()
    .filter_map(|p| read_source(&p))
    .collect()
}
