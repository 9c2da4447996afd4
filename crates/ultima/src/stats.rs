// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ultima stats`: inspect the rules file through the guidelines cache.

use ultima_config::UltimaConfig;
use ultima_core::UltimaError;
use ultima_learning::{GuidelinesCache, HardwareTier, QueryType, RuleStore, format_guidelines};

pub async fn run_stats(config: &UltimaConfig, preview: Option<&str>) -> Result<(), UltimaError> {
    let store = RuleStore::new(&config.learning.guidelines_path);
    let tier = HardwareTier::detect(&config.ollama.model);
    let cache = GuidelinesCache::open(store, tier, config.learning.cache_ttl()).await;

    let stats = cache.get_stats().await;
    let json = serde_json::to_string_pretty(&stats)
        .map_err(|e| UltimaError::Internal(format!("failed to render stats: {e}")))?;
    println!("{json}");

    if let Some(query_type) = preview {
        let query_type = QueryType::parse_lenient(query_type);
        let rules = cache
            .get_relevant_rules(query_type, config.learning.token_budget)
            .await;
        let block = format_guidelines(&rules);
        if block.is_empty() {
            println!("\nno guidelines selected for `{query_type}`");
        } else {
            println!("\n{block}");
        }
    }
    Ok(())
}
