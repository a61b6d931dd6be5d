//! Durable record of completed entities; the only resume mechanism.
//!
//! The file is pretty-printed JSON and replaced atomically on every change,
//! so a crash mid-write leaves the previous state visible.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dpreview_common::{DpreviewError, Result};

use crate::util::write_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureMarker {
    pub last_attempt: DateTime<Utc>,
    pub reason: String,
}

/// On-disk shape of the progress file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(default)]
    pub completed: BTreeMap<String, CompletionMarker>,
    /// Last failure per entity. Informational only; never consulted for resume.
    #[serde(default)]
    pub failed: BTreeMap<String, FailureMarker>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub remaining: usize,
    pub percent: f64,
}

impl std::fmt::Display for ProgressStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Progress:")?;
        writeln!(f, "  Total:     {}", self.total)?;
        writeln!(f, "  Completed: {} ({:.1}%)", self.completed, self.percent)?;
        writeln!(f, "  Failed:    {}", self.failed)?;
        write!(f, "  Remaining: {}", self.remaining)
    }
}

pub struct ProgressStore {
    path: PathBuf,
    record: ProgressRecord,
}

impl ProgressStore {
    /// Load the store at `path`. A missing file is an empty store; an
    /// unreadable or corrupt one is an error, since resuming from a guess
    /// could re-mark or lose work.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let record = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                DpreviewError::Progress(format!("corrupt progress file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProgressRecord::default(),
            Err(e) => {
                return Err(DpreviewError::Progress(format!(
                    "cannot read progress file {}: {e}",
                    path.display()
                )))
            }
        };

        info!(
            path = %path.display(),
            completed = record.completed.len(),
            failed = record.failed.len(),
            "Progress loaded"
        );
        Ok(Self { path, record })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_complete(&self, id: &str) -> bool {
        self.record.completed.contains_key(id)
    }

    /// Record `id` as fully processed and persist. Only call after the output
    /// write for `id` has succeeded.
    pub fn mark_complete(&mut self, id: &str) -> Result<()> {
        let now = Utc::now();
        self.record
            .completed
            .insert(id.to_string(), CompletionMarker { completed_at: now });
        self.record.failed.remove(id);
        self.touch(now);
        self.persist()?;
        debug!(product_code = id, "Marked complete");
        Ok(())
    }

    /// Record the latest failure for `id`. Does not affect resume eligibility.
    pub fn mark_failed(&mut self, id: &str, reason: &str) -> Result<()> {
        let now = Utc::now();
        self.record.failed.insert(
            id.to_string(),
            FailureMarker {
                last_attempt: now,
                reason: reason.to_string(),
            },
        );
        self.touch(now);
        self.persist()
    }

    /// Note the start of a run. Keeps the original start time when resuming.
    pub fn begin_run(&mut self) -> Result<()> {
        let now = Utc::now();
        if self.record.started_at.is_none() {
            self.record.started_at = Some(now);
        }
        self.touch(now);
        self.persist()
    }

    /// Record how many entities the run has seen so far.
    pub fn set_total(&mut self, total: usize) -> Result<()> {
        if self.record.total == total {
            return Ok(());
        }
        self.record.total = total;
        self.touch(Utc::now());
        self.persist()
    }

    /// Reset to empty and remove the file.
    pub fn clear(&mut self) -> Result<()> {
        self.record = ProgressRecord::default();
        Self::clear_path(&self.path)
    }

    /// Remove the progress file at `path` without reading it, so a corrupt
    /// file can still be reset.
    pub fn clear_path(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DpreviewError::Progress(format!(
                    "cannot remove progress file {}: {e}",
                    path.display()
                )))
            }
        }
        info!(path = %path.display(), "Progress cleared");
        Ok(())
    }

    /// Write the current state atomically.
    pub fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.record)
            .map_err(|e| DpreviewError::Progress(e.to_string()))?;
        write_atomic(&self.path, json.as_bytes()).map_err(|e| {
            DpreviewError::Progress(format!("cannot write progress file {}: {e}", self.path.display()))
        })
    }

    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    /// Identifiers from `ids` that are not yet complete, in input order.
    pub fn remaining<'a>(&self, ids: &'a [String]) -> Vec<&'a str> {
        ids.iter()
            .map(String::as_str)
            .filter(|id| !self.is_complete(id))
            .collect()
    }

    pub fn stats(&self) -> ProgressStats {
        let completed = self.record.completed.len();
        let total = self.record.total.max(completed);
        let percent = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        ProgressStats {
            total,
            completed,
            failed: self.record.failed.len(),
            remaining: total - completed,
            percent,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.record.last_updated = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> ProgressStore {
        ProgressStore::load(dir.path().join("progress.json")).unwrap()
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(!store.is_complete("canon_eosr5"));
        assert_eq!(store.stats().completed, 0);
    }

    #[test]
    fn completion_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.mark_complete("canon_eosr5").unwrap();
        drop(store);

        let reloaded = store_in(&dir);
        assert!(reloaded.is_complete("canon_eosr5"));
        assert!(!reloaded.is_complete("nikon_z8"));
    }

    #[test]
    fn completing_clears_previous_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.mark_failed("nikon_z8", "timeout").unwrap();
        assert_eq!(store.stats().failed, 1);
        assert!(!store.is_complete("nikon_z8"));

        store.mark_complete("nikon_z8").unwrap();
        assert_eq!(store.stats().failed, 0);
        assert!(store.record().failed.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ProgressStore::load(&path),
            Err(DpreviewError::Progress(_))
        ));
    }

    #[test]
    fn corrupt_file_can_be_cleared_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{ not json").unwrap();

        ProgressStore::clear_path(&path).unwrap();
        assert!(!path.exists());
        let store = ProgressStore::load(&path).unwrap();
        assert_eq!(store.stats().completed, 0);
        // Nothing to remove is fine too.
        ProgressStore::clear_path(&path).unwrap();
    }

    #[test]
    fn clear_resets_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.mark_complete("a").unwrap();
        assert!(store.path().exists());

        store.clear().unwrap();
        assert!(!store.is_complete("a"));
        assert!(!store.path().exists());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn file_is_human_readable_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.begin_run().unwrap();
        store.mark_complete("sony_a7iv").unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["completed"]["sony_a7iv"]["completed_at"].is_string());
        assert!(value["started_at"].is_string());
        assert!(raw.contains('\n'));
    }

    #[test]
    fn stats_and_remaining() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set_total(4).unwrap();
        store.mark_complete("a").unwrap();
        store.mark_failed("b", "boom").unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.remaining, 3);
        assert!((stats.percent - 25.0).abs() < f64::EPSILON);

        let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(store.remaining(&ids), vec!["b", "c"]);
    }

    #[test]
    fn restart_keeps_original_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.begin_run().unwrap();
        let started = store.record().started_at;
        drop(store);

        let mut store = store_in(&dir);
        store.begin_run().unwrap();
        assert_eq!(store.record().started_at, started);
    }
}
