// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order: `./ultima.toml` > `~/.config/ultima/ultima.toml` > `/etc/ultima/ultima.toml`,
//! with `ULTIMA_` environment variables overriding all files.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::UltimaConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/ultima/ultima.toml";

/// Configuration file in the working directory.
pub const LOCAL_CONFIG_PATH: &str = "ultima.toml";

/// Sections whose keys may be overridden from the environment.
const ENV_SECTIONS: &[&str] = &["agent", "ollama", "embedding", "learning"];

/// Per-user configuration file under the XDG config directory, if one can be resolved.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ultima/ultima.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/ultima/ultima.toml`
/// 3. `~/.config/ultima/ultima.toml`
/// 4. `./ultima.toml`
/// 5. `ULTIMA_*` environment variables
pub fn load_config() -> Result<UltimaConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over compiled defaults (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<UltimaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(UltimaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<UltimaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(UltimaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(UltimaConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Map a prefix-stripped, lowercased env key onto its dotted config path.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `learning_cache_ttl_secs` maps to `learning.cache_ttl_secs`.
pub fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("ULTIMA_").map(|key| map_env_key(key.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(
            map_env_key("learning_cache_ttl_secs"),
            "learning.cache_ttl_secs"
        );
        assert_eq!(map_env_key("ollama_base_url"), "ollama.base_url");
        assert_eq!(map_env_key("embedding_enabled"), "embedding.enabled");
        assert_eq!(map_env_key("agent_log_level"), "agent.log_level");
    }

    #[test]
    fn unknown_section_passes_through() {
        assert_eq!(map_env_key("something_else"), "something_else");
    }

    #[test]
    fn user_config_path_ends_with_ultima_toml() {
        if let Some(path) = user_config_path() {
            assert!(path.ends_with("ultima/ultima.toml"));
        }
    }
}
