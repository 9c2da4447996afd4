// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Learning metrics, recorded through the `metrics` facade.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register metric descriptions. Call once at startup.
pub fn register_metrics() {
    describe_counter!(
        "ultima_reflection_outcomes_total",
        "Reflection jobs finished, by outcome"
    );
    describe_gauge!("ultima_rules_active", "Active rules in the last loaded guidelines snapshot");
    describe_counter!(
        "ultima_guidelines_reloads_total",
        "Guidelines cache reloads from disk"
    );
    describe_histogram!(
        "ultima_reflection_duration_seconds",
        "Wall time of one reflection job"
    );
}

pub fn record_outcome(outcome: &'static str) {
    metrics::counter!("ultima_reflection_outcomes_total", "outcome" => outcome).increment(1);
}

pub fn set_active_rules(count: usize) {
    metrics::gauge!("ultima_rules_active").set(count as f64);
}

pub fn record_reload(trigger: &'static str) {
    metrics::counter!("ultima_guidelines_reloads_total", "trigger" => trigger).increment(1);
}

pub fn record_reflection_duration(seconds: f64) {
    metrics::histogram!("ultima_reflection_duration_seconds").record(seconds);
}
