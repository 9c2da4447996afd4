// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hardware tier inferred from the primary model's parameter count.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use strum::Display;

/// Parameter-size token such as `4b`, `0.5b`, `_3b` or the effective-size
/// form `e2b`, bounded on both sides by a non-alphanumeric character or the
/// end of the name.
static SIZE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9a-z.])e?(\d+(?:\.\d+)?)b(?:$|[^0-9a-z])")
        .expect("size token pattern is valid")
});

/// Largest parameter count (in billions) still treated as the small tier.
const SMALL_TIER_MAX_PARAMS_B: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HardwareTier {
    /// Up to ~4B parameters.
    Small,
    /// Everything else, and any name without a recognizable size.
    Large,
}

impl HardwareTier {
    /// Infers the tier from a model name like `gemma3:4b` or `qwen2.5-7b-instruct`.
    pub fn detect(model_name: &str) -> Self {
        let size = SIZE_TOKEN
            .captures_iter(model_name)
            .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
            .next();

        match size {
            Some(params) if params <= SMALL_TIER_MAX_PARAMS_B => HardwareTier::Small,
            _ => HardwareTier::Large,
        }
    }

    /// Most rules injected into a single prompt.
    pub fn max_injected_rules(self) -> usize {
        match self {
            HardwareTier::Small => 5,
            HardwareTier::Large => 7,
        }
    }

    /// Most rules allowed to stay active.
    pub fn active_rule_cap(self) -> usize {
        match self {
            HardwareTier::Small => 30,
            HardwareTier::Large => 50,
        }
    }
}
