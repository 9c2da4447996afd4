// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retirement of stale rules and enforcement of the active-rule cap.
//!
//! Rules are never deleted, only moved from active to retired.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::types::{RuleRecord, RuleStatus};

#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    /// Rules not reinforced for longer than this are stale.
    pub stale_after: Duration,
    /// Stale rules with at least this many triggers are kept.
    pub stale_min_triggers: u32,
    /// Most rules allowed to remain active.
    pub active_cap: usize,
}

/// What one maintenance pass retired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    pub retired_stale: Vec<String>,
    pub retired_over_cap: Vec<String>,
}

impl LifecycleReport {
    pub fn total(&self) -> usize {
        self.retired_stale.len() + self.retired_over_cap.len()
    }
}

impl LifecyclePolicy {
    /// Retires stale rules, then the lowest-confidence active rules until
    /// the active count is within the cap.
    pub fn apply(&self, rules: &mut [RuleRecord], now: DateTime<Utc>) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        // A window reaching past the earliest representable time retires nothing.
        let cutoff = now.checked_sub_signed(self.stale_after);

        for rule in rules.iter_mut().filter(|r| r.is_active()) {
            let stale = cutoff.is_some_and(|cutoff| rule.last_triggered < cutoff);
            if stale && rule.trigger_count < self.stale_min_triggers {
                rule.status = RuleStatus::Retired;
                info!(
                    rule_id = %rule.id,
                    trigger_count = rule.trigger_count,
                    reason = "stale",
                    "rule retired"
                );
                report.retired_stale.push(rule.id.clone());
            }
        }

        let mut active: Vec<usize> = (0..rules.len()).filter(|&i| rules[i].is_active()).collect();
        let excess = active.len().saturating_sub(self.active_cap);
        if excess > 0 {
            // Stable: equal confidences retire in document order.
            active.sort_by(|&a, &b| rules[a].confidence.total_cmp(&rules[b].confidence));
            for &i in active.iter().take(excess) {
                let rule = &mut rules[i];
                rule.status = RuleStatus::Retired;
                info!(
                    rule_id = %rule.id,
                    confidence = rule.confidence,
                    reason = "cap_exceeded",
                    "rule retired"
                );
                report.retired_over_cap.push(rule.id.clone());
            }
            info!(cap = self.active_cap, retired = excess, "active rule cap enforced");
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(cap: usize) -> LifecyclePolicy {
        LifecyclePolicy {
            stale_after: Duration::days(30),
            stale_min_triggers: 3,
            active_cap: cap,
        }
    }

    fn aged(days: i64, triggers: u32, now: DateTime<Utc>) -> RuleRecord {
        let mut r = RuleRecord::new(format!("rule aged {days} days"), 0.5);
        r.last_triggered = now - Duration::days(days);
        r.trigger_count = triggers;
        r
    }

    #[test]
    fn stale_low_trigger_rules_retire() {
        let now = Utc::now();
        let mut rules = vec![aged(31, 2, now), aged(31, 3, now), aged(29, 1, now)];
        let report = policy(50).apply(&mut rules, now);

        assert_eq!(rules[0].status, RuleStatus::Retired);
        assert_eq!(rules[1].status, RuleStatus::Active);
        assert_eq!(rules[2].status, RuleStatus::Active);
        assert_eq!(report.retired_stale, vec![rules[0].id.clone()]);
    }

    #[test]
    fn unbounded_stale_window_retires_nothing() {
        let now = Utc::now();
        let mut rules = vec![aged(3650, 1, now), aged(31, 2, now)];
        let policy = LifecyclePolicy {
            stale_after: Duration::MAX,
            ..policy(50)
        };
        let report = policy.apply(&mut rules, now);

        assert_eq!(report.total(), 0);
        assert!(rules.iter().all(RuleRecord::is_active));
    }

    #[test]
    fn cap_retires_lowest_confidence_first() {
        let now = Utc::now();
        let mut rules: Vec<RuleRecord> = (0..6)
            .map(|i| {
                let mut r = RuleRecord::new(format!("rule {i}"), 0.5 + i as f64 * 0.05);
                r.last_triggered = now;
                r
            })
            .collect();
        rules[4].confidence = 0.1;

        let report = policy(4).apply(&mut rules, now);

        assert_eq!(report.retired_over_cap.len(), 2);
        assert_eq!(rules[4].status, RuleStatus::Retired);
        assert_eq!(rules[0].status, RuleStatus::Retired);
        assert_eq!(rules.iter().filter(|r| r.is_active()).count(), 4);
    }

    #[test]
    fn retired_rules_are_never_revived_or_counted() {
        let now = Utc::now();
        let mut rules = vec![aged(1, 1, now), aged(1, 1, now)];
        rules[0].status = RuleStatus::Retired;
        let report = policy(1).apply(&mut rules, now);
        assert_eq!(report.total(), 0);
        assert_eq!(rules[0].status, RuleStatus::Retired);
        assert_eq!(rules[1].status, RuleStatus::Active);
    }
}
