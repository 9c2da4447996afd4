// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule records and the on-disk rules document.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: &str = "2.0";

/// Owner recorded on every rule until multi-user support exists.
pub const DEFAULT_USER_ID: &str = "default";

/// Word-count bounds for rule text at creation time.
pub const MIN_RULE_WORDS: usize = 15;
pub const MAX_RULE_WORDS: usize = 150;

/// Kind of user query a rule applies to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", from = "String")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum QueryType {
    Factual,
    Reasoning,
    Multilingual,
    Technical,
    Creative,
    General,
}

impl QueryType {
    /// Parses a taxonomy label; anything unrecognized becomes `General`.
    pub fn parse_lenient(value: &str) -> Self {
        QueryType::from_str(value.trim()).unwrap_or(QueryType::General)
    }
}

impl From<String> for QueryType {
    fn from(value: String) -> Self {
        QueryType::parse_lenient(&value)
    }
}

/// Lifecycle status. Only `Active -> Retired` ever happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RuleStatus {
    Active,
    Retired,
}

/// One learned behavioral instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub id: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(rename = "rule")]
    pub rule_text: String,
    /// L2-normalized embedding of `rule_text`; empty when none was available.
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub confidence: f64,
    #[serde(default = "default_trigger_count")]
    pub trigger_count: u32,
    #[serde(default = "default_query_types")]
    pub query_types: Vec<QueryType>,
    #[serde(default = "default_language_hint")]
    pub language_hint: String,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub last_triggered: DateTime<Utc>,
    pub status: RuleStatus,
    #[serde(default)]
    pub source_summary: String,
    #[serde(rename = "model_generated_by", default = "default_generating_model")]
    pub generating_model: String,
}

impl RuleRecord {
    /// A fresh active rule with a new id, created and triggered now.
    pub fn new(rule_text: impl Into<String>, confidence: f64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: default_user_id(),
            rule_text: rule_text.into(),
            embedding: Vec::new(),
            confidence,
            trigger_count: 1,
            query_types: default_query_types(),
            language_hint: default_language_hint(),
            created_at: now,
            last_triggered: now,
            status: RuleStatus::Active,
            source_summary: String::new(),
            generating_model: default_generating_model(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }

    /// Removes duplicate query types and guarantees at least one.
    pub fn normalize_query_types(&mut self) {
        let mut seen = Vec::with_capacity(self.query_types.len());
        for qt in self.query_types.drain(..) {
            if !seen.contains(&qt) {
                seen.push(qt);
            }
        }
        if seen.is_empty() {
            seen.push(QueryType::General);
        }
        self.query_types = seen;
    }
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

fn default_trigger_count() -> u32 {
    1
}

fn default_query_types() -> Vec<QueryType> {
    vec![QueryType::General]
}

fn default_language_hint() -> String {
    "auto".to_string()
}

fn default_generating_model() -> String {
    "unknown".to_string()
}

/// The whole rules file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesDocument {
    pub schema_version: String,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub rules: Vec<RuleRecord>,
    /// Top-level keys this version does not know about, carried through commits.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RulesDocument {
    /// An empty document at the current schema version.
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            last_updated: Utc::now(),
            rules: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.rules.iter().filter(|r| r.is_active()).count()
    }

    pub fn retired_count(&self) -> usize {
        self.rules.len() - self.active_count()
    }

    /// Stamps the current schema version and update time before a commit.
    pub fn touch(&mut self) {
        self.schema_version = SCHEMA_VERSION.to_string();
        self.last_updated = Utc::now();
    }
}

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Rounds to three decimal places, the precision confidences are stored at.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// ISO-8601 timestamps. Values without an offset are read as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{raw}`")))
    }

    /// Parses RFC 3339, falling back to offset-less forms interpreted as UTC.
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_query_type_becomes_general() {
        let parsed: Vec<QueryType> =
            serde_json::from_str(r#"["technical", "Multilingual", "poetry"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                QueryType::Technical,
                QueryType::Multilingual,
                QueryType::General
            ]
        );
    }

    #[test]
    fn query_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&QueryType::Reasoning).unwrap(),
            "\"reasoning\""
        );
        assert_eq!(QueryType::Creative.to_string(), "creative");
    }

    #[test]
    fn rule_uses_persisted_field_names() {
        let mut rule = RuleRecord::new("Always answer in the language of the question.", 0.5);
        rule.generating_model = "qwen3:8b".into();
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["rule"], "Always answer in the language of the question.");
        assert_eq!(value["model_generated_by"], "qwen3:8b");
        assert_eq!(value["status"], "active");
        assert!(value.get("rule_text").is_none());
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let dt = timestamp::parse("2025-01-02T03:04:05.123456").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-02T03:04:05.123456+00:00");
        let offset = timestamp::parse("2025-01-02T05:04:05+02:00").unwrap();
        assert_eq!(offset, timestamp::parse("2025-01-02T03:04:05Z").unwrap());
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn unknown_top_level_keys_survive_round_trip() {
        let raw = r#"{
            "schema_version": "2.0",
            "last_updated": "2025-01-01T00:00:00Z",
            "rules": [],
            "owner": "ops-team"
        }"#;
        let doc: RulesDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.extra["owner"], "ops-team");
        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["owner"], "ops-team");
    }

    #[test]
    fn normalize_dedupes_and_fills_query_types() {
        let mut rule = RuleRecord::new("x", 0.5);
        rule.query_types = vec![];
        rule.normalize_query_types();
        assert_eq!(rule.query_types, vec![QueryType::General]);

        rule.query_types = vec![QueryType::Factual, QueryType::Factual, QueryType::General];
        rule.normalize_query_types();
        assert_eq!(rule.query_types, vec![QueryType::Factual, QueryType::General]);
    }

    #[test]
    fn round3_matches_stored_precision() {
        assert_eq!(round3(0.9 * 0.6), 0.54);
        assert_eq!(round3(0.54 + 0.08), 0.62);
        assert_eq!(round3(0.12345), 0.123);
    }
}
