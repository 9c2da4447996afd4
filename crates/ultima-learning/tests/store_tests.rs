// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rules file durability: interrupted commits and migration idempotence.

use ultima_learning::{
    EmbeddingService, MigrationOutcome, RuleRecord, RuleStore, RulesDocument, SchemaMigrator,
};

fn document(texts: &[&str]) -> RulesDocument {
    let mut doc = RulesDocument::empty();
    doc.rules = texts.iter().map(|t| RuleRecord::new(*t, 0.5)).collect();
    doc
}

#[tokio::test]
async fn interrupted_commit_leaves_original_intact() {
    let dir = tempfile::tempdir().unwrap();
    let store = RuleStore::new(dir.path().join("rules.json"));
    store.atomic_replace(&document(&["original rule"])).await.unwrap();
    let before = std::fs::read(store.path()).unwrap();

    // Crash after the temp write, before the rename.
    let staged = store.stage_blocking(&document(&["replacement", "rules"])).unwrap();
    assert!(staged.temp_path().exists());
    std::mem::forget(staged);

    assert_eq!(std::fs::read(store.path()).unwrap(), before);
    let doc = store.read().await.unwrap().unwrap();
    assert_eq!(doc.rules.len(), 1);

    // A leftover temp file does not block the next commit.
    store.atomic_replace(&document(&["next"])).await.unwrap();
    assert!(!store.temp_path().exists());
    assert_eq!(store.read().await.unwrap().unwrap().rules[0].rule_text, "next");
}

#[tokio::test]
async fn aborted_commit_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let store = RuleStore::new(dir.path().join("rules.json"));
    store.atomic_replace(&document(&["original rule"])).await.unwrap();
    let before = std::fs::read(store.path()).unwrap();

    let staged = store.stage_blocking(&document(&["replacement"])).unwrap();
    staged.abort();

    assert!(!store.temp_path().exists());
    assert_eq!(std::fs::read(store.path()).unwrap(), before);
}

#[tokio::test]
async fn staged_commit_publishes_whole_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = RuleStore::new(dir.path().join("rules.json"));
    store.atomic_replace(&document(&["original rule"])).await.unwrap();

    let staged = store.stage_blocking(&document(&["a", "b", "c"])).unwrap();
    assert_eq!(store.read().await.unwrap().unwrap().rules.len(), 1);
    staged.commit().unwrap();
    assert_eq!(store.read().await.unwrap().unwrap().rules.len(), 3);
}

#[tokio::test]
async fn unknown_top_level_keys_survive_commits() {
    let dir = tempfile::tempdir().unwrap();
    let store = RuleStore::new(dir.path().join("rules.json"));
    std::fs::write(
        store.path(),
        r#"{"schema_version": "2.0", "last_updated": "2026-01-01T00:00:00", "rules": [], "owner": {"team": "search"}}"#,
    )
    .unwrap();

    let mut doc = store.read().await.unwrap().unwrap();
    doc.rules.push(RuleRecord::new("new rule", 0.5));
    doc.touch();
    store.atomic_replace(&doc).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(raw["owner"]["team"], "search");
    assert_eq!(raw["rules"][0]["rule"], "new rule");
    assert_eq!(raw["rules"][0]["model_generated_by"], "unknown");
}

#[tokio::test]
async fn migration_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = RuleStore::new(dir.path().join("rules.json"));
    std::fs::write(
        store.path(),
        r#"[
            "Always cite the retrieved document when quoting facts.",
            {"rule": "Prefer concise answers for factual lookups.", "confidence": 0.7, "query_types": ["factual"]},
            {"guideline": "Answer in the user's language.", "status": "retired"},
            {"rule": "   "}
        ]"#,
    )
    .unwrap();

    let migrator = SchemaMigrator::new(store.clone(), EmbeddingService::disabled());
    let first = migrator.run().await;
    assert!(matches!(
        first,
        MigrationOutcome::Migrated {
            migrated: 3,
            dropped: 1,
            embedded: 0,
            backup: Some(_),
        }
    ));
    let after_first = std::fs::read(store.path()).unwrap();

    assert_eq!(migrator.run().await, MigrationOutcome::AlreadyCurrent);
    assert_eq!(std::fs::read(store.path()).unwrap(), after_first);

    let doc = store.read().await.unwrap().unwrap();
    assert_eq!(doc.rules.len(), 3);
    assert_eq!(doc.active_count(), 2);
    assert_eq!(doc.rules[1].confidence, 0.7);
}

#[tokio::test]
async fn unwritable_store_fails_migration_without_losing_data() {
    let dir = tempfile::tempdir().unwrap();
    let store = RuleStore::new(dir.path().join("rules.json"));
    let legacy = r#"{"guidelines": ["Keep answers short.", "Cite the source document."]}"#;
    std::fs::write(store.path(), legacy).unwrap();
    // Every commit stages through the temp path; a directory there blocks them all.
    std::fs::create_dir(store.temp_path()).unwrap();

    let outcome = SchemaMigrator::new(store.clone(), EmbeddingService::disabled())
        .run()
        .await;

    let MigrationOutcome::Failed { reason } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(reason.contains("writing empty document failed"), "{reason}");
    assert_eq!(std::fs::read_to_string(store.path()).unwrap(), legacy);
    let backups: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("rules.json.backup."))
        .collect();
    assert_eq!(backups.len(), 1, "{backups:?}");
    assert_eq!(
        std::fs::read_to_string(dir.path().join(&backups[0])).unwrap(),
        legacy
    );
}
