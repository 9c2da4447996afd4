// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot upgrade of legacy guideline files to the current schema.
//!
//! Runs at startup before anything reads the store. Legacy files are either a
//! bare JSON array or an object holding a `guidelines`/`rules` array; entries
//! are plain strings or objects with `rule`/`guideline` text and whatever
//! subset of current fields they happened to carry. Migration never fails
//! startup: errors restore the backup, or fall back to an empty document.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use ultima_core::UltimaError;

use crate::embedding::EmbeddingService;
use crate::store::RuleStore;
use crate::types::{QueryType, RuleRecord, RuleStatus, RulesDocument, SCHEMA_VERSION, timestamp};

const MIGRATED_SUMMARY: &str = "Migrated from previous version";
const DEFAULT_MIGRATED_CONFIDENCE: f64 = 0.5;

/// Keys every committed rule must carry.
const MANDATORY_RULE_KEYS: &[&str] = &["id", "user_id", "rule", "confidence", "status"];

/// Top-level legacy keys that are consumed rather than carried over.
const CONSUMED_KEYS: &[&str] = &["guidelines", "rules", "schema_version", "last_updated"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// No file existed; an empty document was written.
    Created,
    /// The file is already at the current schema and was left untouched.
    AlreadyCurrent,
    Migrated {
        migrated: usize,
        dropped: usize,
        embedded: usize,
        backup: Option<PathBuf>,
    },
    /// Migration failed and the backup was put back.
    Restored { reason: String },
    /// Migration failed without a usable backup; an empty document was written.
    ResetToEmpty { reason: String },
    /// Nothing could be written at all.
    Failed { reason: String },
}

impl MigrationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyCurrent => "already_current",
            Self::Migrated { .. } => "migrated",
            Self::Restored { .. } => "restored",
            Self::ResetToEmpty { .. } => "reset_to_empty",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Default)]
struct MigrationCounts {
    migrated: usize,
    dropped: usize,
    embedded: usize,
}

pub struct SchemaMigrator {
    store: RuleStore,
    embeddings: EmbeddingService,
}

impl SchemaMigrator {
    pub fn new(store: RuleStore, embeddings: EmbeddingService) -> Self {
        Self { store, embeddings }
    }

    /// Brings the store to the current schema. Never returns an error.
    pub async fn run(&self) -> MigrationOutcome {
        let path = self.store.path().display().to_string();
        let raw = match self.store.read_raw().await {
            Ok(Some(raw)) => raw,
            Ok(None) => return self.create_empty().await,
            Err(e) => {
                warn!(path = %path, error = %e, "guidelines file unreadable, skipping migration");
                return MigrationOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if is_current(&raw) {
            info!(path = %path, "guidelines already at schema {SCHEMA_VERSION}");
            return MigrationOutcome::AlreadyCurrent;
        }

        let backup = match self.store.backup().await {
            Ok(backup) => {
                info!(backup = %backup.display(), "legacy guidelines backed up");
                Some(backup)
            }
            Err(e) => {
                warn!(path = %path, error = %e, "backup failed, migrating anyway");
                None
            }
        };

        match self.migrate(&raw).await {
            Ok(counts) => {
                info!(
                    path = %path,
                    migrated = counts.migrated,
                    dropped = counts.dropped,
                    embedded = counts.embedded,
                    "guidelines migrated to schema {SCHEMA_VERSION}"
                );
                MigrationOutcome::Migrated {
                    migrated: counts.migrated,
                    dropped: counts.dropped,
                    embedded: counts.embedded,
                    backup,
                }
            }
            Err(e) => self.recover(backup, e.to_string()).await,
        }
    }

    async fn create_empty(&self) -> MigrationOutcome {
        match self.store.atomic_replace(&RulesDocument::empty()).await {
            Ok(()) => {
                info!(path = %self.store.path().display(), "created empty guidelines file");
                MigrationOutcome::Created
            }
            Err(e) => {
                warn!(error = %e, "failed to create guidelines file");
                MigrationOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn migrate(&self, raw: &str) -> Result<MigrationCounts, UltimaError> {
        let (entries, extra) = split_legacy(raw);
        let mut doc = RulesDocument::empty();
        doc.extra = extra;

        let mut counts = MigrationCounts::default();
        for entry in &entries {
            let Some(mut record) = legacy_record(entry) else {
                counts.dropped += 1;
                continue;
            };
            if record.embedding.is_empty() {
                if let Some(vector) = self.embeddings.encode(&record.rule_text).await {
                    record.embedding = vector;
                    counts.embedded += 1;
                }
            }
            doc.rules.push(record);
            counts.migrated += 1;
        }

        validate_document(&doc)?;
        self.store.atomic_replace(&doc).await?;
        Ok(counts)
    }

    async fn recover(&self, backup: Option<PathBuf>, reason: String) -> MigrationOutcome {
        warn!(reason = %reason, "guidelines migration failed");

        if let Some(backup) = backup {
            match self.store.restore_from(&backup).await {
                Ok(()) => {
                    warn!(backup = %backup.display(), "restored guidelines from backup");
                    return MigrationOutcome::Restored { reason };
                }
                Err(e) => warn!(error = %e, "restoring backup failed"),
            }
        }

        match self.store.atomic_replace(&RulesDocument::empty()).await {
            Ok(()) => {
                warn!("guidelines reset to an empty document");
                MigrationOutcome::ResetToEmpty { reason }
            }
            Err(e) => MigrationOutcome::Failed {
                reason: format!("{reason}; writing empty document failed: {e}"),
            },
        }
    }
}

fn is_current(raw: &str) -> bool {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.get("schema_version")?.as_str().map(|s| s == SCHEMA_VERSION))
        .unwrap_or(false)
}

/// Legacy entries plus the top-level keys to carry over.
/// Anything that is not valid JSON counts as zero entries.
fn split_legacy(raw: &str) -> (Vec<Value>, Map<String, Value>) {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "legacy guidelines file is not valid JSON, treating as empty");
            return (Vec::new(), Map::new());
        }
    };

    match value {
        Value::Array(entries) => (entries, Map::new()),
        Value::Object(mut map) => {
            let entries = ["guidelines", "rules"]
                .iter()
                .find_map(|key| match map.get(*key) {
                    Some(Value::Array(entries)) => Some(entries.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            map.retain(|key, _| !CONSUMED_KEYS.contains(&key.as_str()));
            (entries, map)
        }
        _ => (Vec::new(), Map::new()),
    }
}

/// Builds a current record from one legacy entry; `None` when it has no text.
fn legacy_record(entry: &Value) -> Option<RuleRecord> {
    let (text, fields) = match entry {
        Value::String(text) => (text.as_str(), None),
        Value::Object(fields) => {
            let text = ["rule", "guideline"]
                .iter()
                .find_map(|key| fields.get(*key)?.as_str())?;
            (text, Some(fields))
        }
        _ => return None,
    };

    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut record = RuleRecord::new(text, DEFAULT_MIGRATED_CONFIDENCE);
    record.source_summary = MIGRATED_SUMMARY.to_string();

    let Some(fields) = fields else {
        return Some(record);
    };

    let str_field = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    if let Some(confidence) = fields.get("confidence").and_then(Value::as_f64) {
        if (0.0..=1.0).contains(&confidence) {
            record.confidence = confidence;
        }
    }
    if let Some(count) = fields.get("trigger_count").and_then(Value::as_u64) {
        record.trigger_count = u32::try_from(count).unwrap_or(u32::MAX).max(1);
    }
    match fields.get("query_types") {
        Some(Value::Array(types)) => {
            record.query_types = types
                .iter()
                .filter_map(Value::as_str)
                .map(QueryType::parse_lenient)
                .collect();
        }
        Some(Value::String(single)) => record.query_types = vec![QueryType::parse_lenient(single)],
        _ => {}
    }
    record.normalize_query_types();

    if let Some(Value::Array(values)) = fields.get("embedding") {
        let vector: Option<Vec<f32>> = values
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32).filter(|f| f.is_finite()))
            .collect();
        record.embedding = vector.unwrap_or_default();
    }
    if let Some(created) = str_field("created_at").and_then(timestamp::parse) {
        record.created_at = created;
    }
    if let Some(triggered) = str_field("last_triggered").and_then(timestamp::parse) {
        record.last_triggered = triggered;
    }
    match str_field("status") {
        Some(s) if s.eq_ignore_ascii_case("retired") => record.status = RuleStatus::Retired,
        _ => {}
    }
    if let Some(user) = str_field("user_id") {
        record.user_id = user.to_string();
    }
    if let Some(hint) = str_field("language_hint") {
        record.language_hint = hint.to_string();
    }
    if let Some(summary) = str_field("source_summary") {
        record.source_summary = summary.to_string();
    }
    if let Some(model) = str_field("model_generated_by") {
        record.generating_model = model.to_string();
    }

    Some(record)
}

/// Checks every serialized rule carries the mandatory keys.
fn validate_document(doc: &RulesDocument) -> Result<(), UltimaError> {
    let value = serde_json::to_value(doc).map_err(UltimaError::storage)?;
    let rules = value
        .get("rules")
        .and_then(Value::as_array)
        .ok_or_else(|| UltimaError::Validation("migrated document has no rules array".into()))?;

    for (index, rule) in rules.iter().enumerate() {
        for key in MANDATORY_RULE_KEYS {
            if rule.get(*key).is_none_or(Value::is_null) {
                return Err(UltimaError::Validation(format!(
                    "migrated rule {index} is missing `{key}`"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use ultima_test_utils::MockEmbedder;

    #[test]
    fn bare_strings_get_defaults() {
        let record = legacy_record(&Value::from("  Always cite sources.  ")).unwrap();
        assert_eq!(record.rule_text, "Always cite sources.");
        assert_eq!(record.confidence, 0.5);
        assert_eq!(record.trigger_count, 1);
        assert_eq!(record.query_types, vec![QueryType::General]);
        assert_eq!(record.status, RuleStatus::Active);
        assert_eq!(record.language_hint, "auto");
        assert_eq!(record.source_summary, MIGRATED_SUMMARY);
        assert_eq!(record.generating_model, "unknown");
    }

    #[test]
    fn well_typed_fields_survive_and_bad_ones_default() {
        let entry = serde_json::json!({
            "id": "old-id",
            "guideline": "Answer in the language of the question.",
            "confidence": 0.8,
            "trigger_count": "many",
            "query_types": ["multilingual", "nonsense"],
            "status": "retired",
            "language_hint": "hi",
            "created_at": "2025-01-02T03:04:05",
        });
        let record = legacy_record(&entry).unwrap();
        assert_ne!(record.id, "old-id");
        assert_eq!(record.confidence, 0.8);
        assert_eq!(record.trigger_count, 1);
        assert_eq!(
            record.query_types,
            vec![QueryType::Multilingual, QueryType::General]
        );
        assert_eq!(record.status, RuleStatus::Retired);
        assert_eq!(record.language_hint, "hi");
        assert_eq!(record.created_at.to_rfc3339(), "2025-01-02T03:04:05+00:00");

        let out_of_range = serde_json::json!({"rule": "x", "confidence": 7.0});
        assert_eq!(legacy_record(&out_of_range).unwrap().confidence, 0.5);
    }

    #[test]
    fn textless_entries_are_dropped() {
        assert!(legacy_record(&Value::from("   ")).is_none());
        assert!(legacy_record(&serde_json::json!({"confidence": 0.9})).is_none());
        assert!(legacy_record(&serde_json::json!(42)).is_none());
    }

    #[test]
    fn legacy_container_shapes() {
        let (entries, extra) = split_legacy(r#"["a", "b"]"#);
        assert_eq!(entries.len(), 2);
        assert!(extra.is_empty());

        let (entries, extra) =
            split_legacy(r#"{"guidelines": ["a"], "schema_version": "1.0", "owner": "ops"}"#);
        assert_eq!(entries.len(), 1);
        assert_eq!(extra.len(), 1);
        assert_eq!(extra["owner"], "ops");

        let (entries, _) = split_legacy("not json at all");
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn missing_file_creates_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("nested/rules.json"));
        let outcome = SchemaMigrator::new(store.clone(), EmbeddingService::disabled())
            .run()
            .await;

        assert_eq!(outcome, MigrationOutcome::Created);
        let doc = store.read().await.unwrap().unwrap();
        assert_eq!(doc.schema_version, SCHEMA_VERSION);
        assert!(doc.rules.is_empty());
    }

    #[tokio::test]
    async fn legacy_file_is_backed_up_and_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));
        std::fs::write(
            store.path(),
            r#"{"guidelines": ["Keep answers short.", {"rule": ""}], "owner": "ops"}"#,
        )
        .unwrap();

        let embedder = MockEmbedder::new(3);
        embedder.insert("Keep answers short.", vec![3.0, 0.0, 4.0]).await;
        let migrator = SchemaMigrator::new(store.clone(), EmbeddingService::new(Arc::new(embedder)));

        let MigrationOutcome::Migrated {
            migrated,
            dropped,
            embedded,
            backup,
        } = migrator.run().await
        else {
            panic!("expected migration");
        };
        assert_eq!((migrated, dropped, embedded), (1, 1, 1));
        let backup = backup.unwrap();
        assert!(backup.exists());
        assert!(std::fs::read_to_string(&backup).unwrap().contains("guidelines"));

        let doc = store.read().await.unwrap().unwrap();
        assert_eq!(doc.rules.len(), 1);
        assert_eq!(doc.rules[0].embedding, vec![0.6, 0.0, 0.8]);
        assert_eq!(doc.extra["owner"], "ops");
    }

    #[tokio::test]
    async fn invalid_json_migrates_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));
        std::fs::write(store.path(), "{{{ definitely not json").unwrap();

        let outcome = SchemaMigrator::new(store.clone(), EmbeddingService::disabled())
            .run()
            .await;
        assert!(matches!(outcome, MigrationOutcome::Migrated { migrated: 0, .. }));
        assert!(store.read().await.unwrap().unwrap().rules.is_empty());
    }

    #[tokio::test]
    async fn failed_migration_restores_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));
        let legacy = r#"["Keep answers short."]"#;
        std::fs::write(store.path(), legacy).unwrap();
        let backup = store.backup().await.unwrap();
        std::fs::write(store.path(), "half-written").unwrap();

        let migrator = SchemaMigrator::new(store.clone(), EmbeddingService::disabled());
        let outcome = migrator.recover(Some(backup), "commit failed".into()).await;

        assert_eq!(
            outcome,
            MigrationOutcome::Restored {
                reason: "commit failed".into()
            }
        );
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), legacy);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn unusable_backup_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));
        std::fs::write(store.path(), "half-written").unwrap();
        let migrator = SchemaMigrator::new(store.clone(), EmbeddingService::disabled());

        let missing = dir.path().join("rules.json.gone");
        let outcome = migrator.recover(Some(missing), "commit failed".into()).await;
        assert_eq!(outcome.label(), "reset_to_empty");

        std::fs::write(store.path(), "half-written").unwrap();
        let outcome = migrator.recover(None, "commit failed".into()).await;
        assert_eq!(outcome.label(), "reset_to_empty");

        let doc = store.read().await.unwrap().unwrap();
        assert_eq!(doc.schema_version, SCHEMA_VERSION);
        assert!(doc.rules.is_empty());
    }

    #[test]
    fn missing_mandatory_key_fails_validation() {
        let mut doc = RulesDocument::empty();
        doc.rules.push(RuleRecord::new("rule", 0.5));
        assert!(validate_document(&doc).is_ok());

        let err = validate_document(&RulesDocument {
            rules: vec![RuleRecord {
                confidence: f64::NAN,
                ..RuleRecord::new("rule", 0.5)
            }],
            ..RulesDocument::empty()
        })
        .unwrap_err();
        assert!(err.to_string().contains("confidence"));
    }
}
