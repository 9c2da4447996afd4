// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read side of the rule store: a TTL-checked snapshot of the rules document.
//!
//! Callers building prompts ask for the rules relevant to a query type within
//! a token budget. The on-disk modification time is compared at most once
//! per TTL window, and the file is re-read only when it changed. The
//! reflection worker calls [`GuidelinesCache::force_reload`] after each
//! commit so new rules are visible immediately.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::store::RuleStore;
use crate::tier::HardwareTier;
use crate::types::{QueryType, RuleRecord};

/// Relevance weights applied to a rule's confidence.
const EXACT_MATCH_WEIGHT: f64 = 1.0;
const GENERAL_WEIGHT: f64 = 0.6;
const UNRELATED_WEIGHT: f64 = 0.3;

/// Characters per token for budget estimates.
const CHARS_PER_TOKEN: f64 = 4.0;

#[derive(Debug, Default)]
struct CacheState {
    rules: Arc<Vec<RuleRecord>>,
    schema_version: Option<String>,
    mtime: Option<SystemTime>,
    last_check: Option<Instant>,
}

/// Counts and identity of the currently loaded rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuidelinesStats {
    pub active_count: usize,
    pub retired_count: usize,
    pub total_count: usize,
    pub hardware_tier: HardwareTier,
    pub guidelines_path: PathBuf,
    pub schema_version: Option<String>,
}

pub struct GuidelinesCache {
    store: RuleStore,
    tier: HardwareTier,
    ttl: Duration,
    /// Held only to read or swap the snapshot, never across file I/O.
    state: Mutex<CacheState>,
    /// Serializes reloads.
    reload_gate: Mutex<()>,
}

impl GuidelinesCache {
    /// Creates the cache and performs the initial load.
    pub async fn open(store: RuleStore, tier: HardwareTier, ttl: Duration) -> Self {
        let cache = Self {
            store,
            tier,
            ttl,
            state: Mutex::new(CacheState::default()),
            reload_gate: Mutex::new(()),
        };
        cache.force_reload_with("startup").await;
        cache
    }

    pub fn tier(&self) -> HardwareTier {
        self.tier
    }

    /// Highest-scoring active rules for `query_type` that fit in `token_budget`.
    pub async fn get_relevant_rules(
        &self,
        query_type: QueryType,
        token_budget: usize,
    ) -> Vec<RuleRecord> {
        self.maybe_refresh().await;
        let rules = Arc::clone(&self.state.lock().await.rules);
        select_rules(&rules, query_type, self.tier.max_injected_rules(), token_budget)
    }

    /// Reloads from disk now, waiting for any reload already in flight.
    pub async fn force_reload(&self) {
        self.force_reload_with("forced").await;
    }

    pub async fn get_stats(&self) -> GuidelinesStats {
        let state = self.state.lock().await;
        let active_count = state.rules.iter().filter(|r| r.is_active()).count();
        GuidelinesStats {
            active_count,
            retired_count: state.rules.len() - active_count,
            total_count: state.rules.len(),
            hardware_tier: self.tier,
            guidelines_path: self.store.path().to_path_buf(),
            schema_version: state.schema_version.clone(),
        }
    }

    async fn force_reload_with(&self, trigger: &'static str) {
        let _gate = self.reload_gate.lock().await;
        self.reload(trigger).await;
        self.state.lock().await.last_check = Some(Instant::now());
    }

    /// TTL-gated reload. Skips when another reload holds the gate.
    async fn maybe_refresh(&self) {
        {
            let mut state = self.state.lock().await;
            let due = state
                .last_check
                .is_none_or(|checked| checked.elapsed() >= self.ttl);
            if !due {
                return;
            }
            // Claim this window so concurrent callers do not check again.
            state.last_check = Some(Instant::now());
        }

        let Ok(_gate) = self.reload_gate.try_lock() else {
            debug!("guidelines reload in flight, serving current snapshot");
            return;
        };

        let on_disk = self.store.modified().await;
        let cached = self.state.lock().await.mtime;
        if on_disk == cached {
            return;
        }
        self.reload("ttl").await;
    }

    /// Reads the store and swaps the snapshot. Missing or unreadable files
    /// load as zero rules.
    async fn reload(&self, trigger: &'static str) {
        let mtime = self.store.modified().await;
        let (rules, schema_version) = match self.store.read().await {
            Ok(Some(doc)) => (doc.rules, Some(doc.schema_version)),
            Ok(None) => {
                debug!(path = %self.store.path().display(), "no guidelines file yet");
                (Vec::new(), None)
            }
            Err(e) => {
                warn!(
                    path = %self.store.path().display(),
                    error = %e,
                    "guidelines file unreadable, serving no rules"
                );
                (Vec::new(), None)
            }
        };

        let active = rules.iter().filter(|r| r.is_active()).count();
        {
            let mut state = self.state.lock().await;
            state.rules = Arc::new(rules);
            state.schema_version = schema_version;
            state.mtime = mtime;
        }

        metrics::record_reload(trigger);
        metrics::set_active_rules(active);
        info!(active, trigger, "guidelines loaded");
    }
}

/// Scores, orders and budgets `rules` for one prompt.
///
/// Score is confidence weighted by relevance to `query_type`. After a stable
/// descending sort the list is cut to `max_rules`, then rules are accepted
/// greedily until the next one would overflow `token_budget`.
pub fn select_rules(
    rules: &[RuleRecord],
    query_type: QueryType,
    max_rules: usize,
    token_budget: usize,
) -> Vec<RuleRecord> {
    let mut scored: Vec<(f64, &RuleRecord)> = rules
        .iter()
        .filter(|r| r.is_active())
        .map(|r| (r.confidence * relevance_weight(r, query_type), r))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let budget = token_budget as f64;
    let mut used = 0.0;
    let mut selected = Vec::new();
    for (_, rule) in scored.into_iter().take(max_rules) {
        let cost = estimate_tokens(&rule.rule_text);
        if used + cost > budget {
            break;
        }
        used += cost;
        selected.push(rule.clone());
    }
    selected
}

fn relevance_weight(rule: &RuleRecord, query_type: QueryType) -> f64 {
    if rule.query_types.contains(&query_type) {
        EXACT_MATCH_WEIGHT
    } else if rule.query_types.contains(&QueryType::General) {
        GENERAL_WEIGHT
    } else {
        UNRELATED_WEIGHT
    }
}

/// Rough token count: characters divided by four.
pub fn estimate_tokens(text: &str) -> f64 {
    text.chars().count() as f64 / CHARS_PER_TOKEN
}

/// Renders selected rules as a prompt block. Empty input renders nothing.
pub fn format_guidelines(rules: &[RuleRecord]) -> String {
    if rules.is_empty() {
        return String::new();
    }
    let mut block = String::from("## Learned Guidelines\n");
    for rule in rules {
        block.push_str("- ");
        block.push_str(rule.rule_text.trim());
        block.push('\n');
    }
    block
}
