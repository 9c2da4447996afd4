// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed rule store with atomic replacement.
//!
//! Every commit serializes the whole document, re-parses it, writes it to
//! `<path>.temp` and renames that over `<path>`. Readers see the previous or
//! the next complete document, never a partial one. The store does no
//! locking of its own; the reflection worker is its only writer.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use tracing::{debug, warn};
use ultima_core::UltimaError;

use crate::types::RulesDocument;

/// Durable holder of the rules document.
#[derive(Debug, Clone)]
pub struct RuleStore {
    path: PathBuf,
}

impl RuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<path>.temp`, the staging file for commits.
    pub fn temp_path(&self) -> PathBuf {
        suffixed(&self.path, ".temp")
    }

    /// `<path>.backup.<YYYYMMDD_HHMMSS>.json` for the current local time.
    pub fn backup_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        suffixed(&self.path, &format!(".backup.{stamp}.json"))
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Modification time of the store file, or `None` if it cannot be read.
    pub async fn modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
    }

    /// Raw file contents, `None` if the file does not exist.
    pub async fn read_raw(&self) -> Result<Option<String>, UltimaError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(UltimaError::storage(e)),
        }
    }

    /// Parsed document, `None` if the file does not exist.
    ///
    /// A file that exists but does not parse as a current-schema document is
    /// an error, never an empty document.
    pub async fn read(&self) -> Result<Option<RulesDocument>, UltimaError> {
        let Some(raw) = self.read_raw().await? else {
            return Ok(None);
        };
        let mut doc: RulesDocument = serde_json::from_str(&raw).map_err(|e| {
            UltimaError::Validation(format!(
                "rules file {} is not a valid document: {e}",
                self.path.display()
            ))
        })?;
        for rule in &mut doc.rules {
            rule.normalize_query_types();
        }
        Ok(Some(doc))
    }

    /// Like [`read`](Self::read), but a missing file yields an empty document.
    pub async fn read_or_empty(&self) -> Result<RulesDocument, UltimaError> {
        Ok(self.read().await?.unwrap_or_else(RulesDocument::empty))
    }

    /// Atomically replaces the store with `doc`.
    ///
    /// The temp write and the rename run in one blocking job, so dropping the
    /// returned future cannot leave the store half-committed.
    pub async fn atomic_replace(&self, doc: &RulesDocument) -> Result<(), UltimaError> {
        let bytes = serialize_document(doc)?;
        let target = self.path.clone();
        let temp = self.temp_path();

        tokio::task::spawn_blocking(move || {
            let staged = StagedCommit::write(temp, target, &bytes)?;
            staged.commit()
        })
        .await
        .map_err(|e| UltimaError::Internal(format!("commit task failed: {e}")))??;

        debug!(
            path = %self.path.display(),
            rules = doc.rules.len(),
            "rules document committed"
        );
        Ok(())
    }

    /// Writes `doc` to the temp path without renaming it into place.
    ///
    /// Blocking. The returned handle either commits (rename) or aborts
    /// (removes the temp file); dropping it aborts.
    pub fn stage_blocking(&self, doc: &RulesDocument) -> Result<StagedCommit, UltimaError> {
        let bytes = serialize_document(doc)?;
        StagedCommit::write(self.temp_path(), self.path.clone(), &bytes)
    }

    /// Copies the current file to a timestamped backup and returns its path.
    pub async fn backup(&self) -> Result<PathBuf, UltimaError> {
        let backup = self.backup_path();
        tokio::fs::copy(&self.path, &backup)
            .await
            .map_err(UltimaError::storage)?;
        Ok(backup)
    }

    /// Atomically puts the bytes of `backup` back in place.
    pub async fn restore_from(&self, backup: &Path) -> Result<(), UltimaError> {
        let bytes = tokio::fs::read(backup).await.map_err(UltimaError::storage)?;
        let target = self.path.clone();
        let temp = self.temp_path();
        tokio::task::spawn_blocking(move || StagedCommit::write(temp, target, &bytes)?.commit())
            .await
            .map_err(|e| UltimaError::Internal(format!("restore task failed: {e}")))?
    }
}

/// A document written to the temp path, not yet renamed into place.
#[derive(Debug)]
pub struct StagedCommit {
    temp: PathBuf,
    target: PathBuf,
    done: bool,
}

impl StagedCommit {
    fn write(temp: PathBuf, target: PathBuf, bytes: &[u8]) -> Result<Self, UltimaError> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(UltimaError::storage)?;
        }

        let staged = Self {
            temp,
            target,
            done: false,
        };
        // On error `staged` drops here and removes the partial temp file.
        write_synced(&staged.temp, bytes)?;
        Ok(staged)
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Renames the temp file over the target.
    pub fn commit(mut self) -> Result<(), UltimaError> {
        fs::rename(&self.temp, &self.target).map_err(UltimaError::storage)?;
        self.done = true;
        Ok(())
    }

    /// Discards the staged write, leaving the target untouched.
    pub fn abort(self) {}
}

impl Drop for StagedCommit {
    fn drop(&mut self) {
        if !self.done {
            if let Err(e) = fs::remove_file(&self.temp) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.temp.display(), error = %e, "failed to remove temp file");
                }
            }
        }
    }
}

/// Serializes `doc` and checks the bytes parse back into a document.
pub fn serialize_document(doc: &RulesDocument) -> Result<Vec<u8>, UltimaError> {
    let bytes = serde_json::to_vec_pretty(doc).map_err(UltimaError::storage)?;
    serde_json::from_slice::<RulesDocument>(&bytes).map_err(|e| {
        UltimaError::Validation(format!("round-trip validation failed: {e}"))
    })?;
    Ok(bytes)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), UltimaError> {
    let mut file = File::create(path).map_err(UltimaError::storage)?;
    file.write_all(bytes).map_err(UltimaError::storage)?;
    file.sync_all().map_err(UltimaError::storage)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}
