//! Archive backfill over an existing output directory.
//!
//! Each record is edited as a generic YAML tree: only `DPRReviewArchiveURL`
//! is replaced, every other key and value is written back as it was read.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_yaml::Value;
use tracing::{info, warn};

use dpreview_common::ARCHIVE_KEY;

use crate::archive::ArchiveResolver;
use crate::util::write_atomic;

#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillOptions {
    /// Request a capture when no snapshot exists.
    pub create: bool,
    /// Re-resolve records that already carry an archive reference.
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Updated(String),
    AlreadyArchived,
    NotFound,
}

#[derive(Debug, Default)]
pub struct BackfillReport {
    pub scanned: usize,
    pub updated: usize,
    pub already_archived: usize,
    pub not_found: usize,
    pub errors: Vec<(PathBuf, String)>,
}

impl fmt::Display for BackfillReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Archive Backfill Complete ===")?;
        writeln!(f, "Scanned:          {}", self.scanned)?;
        writeln!(f, "Updated:          {}", self.updated)?;
        writeln!(f, "Already archived: {}", self.already_archived)?;
        writeln!(f, "No snapshot:      {}", self.not_found)?;
        write!(f, "Errors:           {}", self.errors.len())?;
        for (path, reason) in &self.errors {
            write!(f, "\n  {}: {reason}", path.display())?;
        }
        Ok(())
    }
}

/// YAML record files in `dir`, sorted by name.
pub fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "yaml" || e == "yml")
        })
        .collect();
    files.sort();
    Ok(files)
}

pub async fn backfill_directory(
    dir: &Path,
    resolver: &ArchiveResolver,
    options: BackfillOptions,
) -> Result<BackfillReport> {
    let files = record_files(dir)?;
    info!(dir = %dir.display(), files = files.len(), strategy = %resolver.strategy(), "Starting archive backfill");

    let mut report = BackfillReport::default();
    for path in files {
        report.scanned += 1;
        match backfill_file(&path, resolver, options).await {
            Ok(FileOutcome::Updated(_)) => report.updated += 1,
            Ok(FileOutcome::AlreadyArchived) => report.already_archived += 1,
            Ok(FileOutcome::NotFound) => report.not_found += 1,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Backfill failed for file");
                report.errors.push((path, format!("{e:#}")));
            }
        }
    }
    Ok(report)
}

pub async fn backfill_file(
    path: &Path,
    resolver: &ArchiveResolver,
    options: BackfillOptions,
) -> Result<FileOutcome> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut doc: Value = serde_yaml::from_str(&text).context("Invalid YAML")?;

    let mapping = doc.as_mapping_mut().context("Record is not a mapping")?;
    let has_archive = mapping
        .get(ARCHIVE_KEY)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    if has_archive && !options.overwrite {
        return Ok(FileOutcome::AlreadyArchived);
    }

    let url = mapping
        .get("URL")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .context("Record has no URL")?
        .to_string();

    let Some(snapshot) = resolver.resolve(&url, options.create).await else {
        return Ok(FileOutcome::NotFound);
    };

    set_archive(mapping, &snapshot);
    let yaml = serde_yaml::to_string(&doc).context("Failed to render record YAML")?;
    write_atomic(path, yaml.as_bytes()).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), snapshot = %snapshot, "Archive reference added");
    Ok(FileOutcome::Updated(snapshot))
}

/// Replace the archive value in place, or insert it first when the key is missing.
fn set_archive(mapping: &mut serde_yaml::Mapping, snapshot: &str) {
    let value = Value::String(snapshot.to_string());
    if let Some(slot) = mapping.get_mut(ARCHIVE_KEY) {
        *slot = value;
        return;
    }
    let mut rebuilt = serde_yaml::Mapping::with_capacity(mapping.len() + 1);
    rebuilt.insert(Value::String(ARCHIVE_KEY.to_string()), value);
    for (k, v) in std::mem::take(mapping) {
        rebuilt.insert(k, v);
    }
    *mapping = rebuilt;
}
