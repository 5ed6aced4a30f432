//! Pre-mutation backups.
//!
//! Each run owns one directory `<base>/<YYYYmmdd-HHMMSS>` created on first
//! use; a run started in the same second as an earlier one gets a `-NN`
//! suffix. Artifacts are copied once per run, before their first mutation,
//! under their path relative to the application root. Nothing here ever
//! deletes or prunes. A failed copy is logged and the run carries on without
//! a safety copy for that artifact.
//!
//! `backup-index.json` lists the copies and, when one was taken, the database
//! dump together with whether it predates the feature's migration.

use crate::domain::models::{BackupRecord, TargetArtifact};
use crate::error::{GraftError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

pub const BACKUP_INDEX_FILE: &str = "backup-index.json";
pub const DUMP_FILE: &str = "database.sql";

pub fn run_dir_name(started_at: &DateTime<Local>) -> String {
    started_at.format("%Y%m%d-%H%M%S").to_string()
}

/// Contents of `backup-index.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupIndex {
    pub records: Vec<BackupRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump: Option<DumpRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpRecord {
    pub path: PathBuf,
    /// Taken while the feature's migration was not yet on disk.
    pub pre_migration: bool,
}

pub struct BackupStore {
    app_root: PathBuf,
    run_dir: PathBuf,
    records: BTreeMap<PathBuf, BackupRecord>,
    failed: BTreeSet<PathBuf>,
    dump: Option<DumpRecord>,
}

impl BackupStore {
    pub fn new(base_dir: &Path, app_root: &Path, started_at: &DateTime<Local>) -> Self {
        Self {
            app_root: app_root.to_path_buf(),
            run_dir: unique_run_dir(base_dir, &run_dir_name(started_at)),
            records: BTreeMap::new(),
            failed: BTreeSet::new(),
            dump: None,
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// True once anything (a copy or a dump) has been written for this run.
    pub fn is_materialized(&self) -> bool {
        self.run_dir.is_dir()
    }

    pub fn records(&self) -> Vec<BackupRecord> {
        self.records.values().cloned().collect()
    }

    /// Copies `artifact` into the run directory unless this run already did.
    ///
    /// Returns `None` when the copy failed; the failure is only logged.
    pub fn backup(&mut self, artifact: &TargetArtifact) -> Option<BackupRecord> {
        if let Some(existing) = self.records.get(&artifact.path) {
            debug!(artifact = %artifact.path.display(), "already backed up this run");
            return Some(existing.clone());
        }
        if self.failed.contains(&artifact.path) {
            return None;
        }

        let dest = self.run_dir.join(self.relative_name(&artifact.path));
        match copy_into(&artifact.path, &dest) {
            Ok(()) => {
                let record = BackupRecord {
                    original_path: artifact.path.clone(),
                    backup_path: dest,
                    timestamp: Local::now().to_rfc3339(),
                };
                info!(
                    artifact = %record.original_path.display(),
                    backup = %record.backup_path.display(),
                    "backed up"
                );
                self.records.insert(artifact.path.clone(), record.clone());
                Some(record)
            }
            Err(e) => {
                warn!(
                    artifact = %artifact.path.display(),
                    error = %e,
                    "backup failed; continuing without a safety copy"
                );
                self.failed.insert(artifact.path.clone());
                None
            }
        }
    }

    /// Path for the optional database dump, creating the run directory.
    pub fn dump_path(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.run_dir)
            .map_err(|e| GraftError::io(format!("create {}", self.run_dir.display()), e))?;
        Ok(self.run_dir.join(DUMP_FILE))
    }

    /// Notes a completed dump so the index can point at it.
    pub fn record_dump(&mut self, path: &Path, pre_migration: bool) {
        self.dump = Some(DumpRecord {
            path: path.to_path_buf(),
            pre_migration,
        });
    }

    /// Writes `backup-index.json` when this run copied a file or took a dump.
    pub fn write_index(&self) -> Result<Option<PathBuf>> {
        if self.records.is_empty() && self.dump.is_none() {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.run_dir)
            .map_err(|e| GraftError::io(format!("create {}", self.run_dir.display()), e))?;
        let path = self.run_dir.join(BACKUP_INDEX_FILE);
        let index = BackupIndex {
            records: self.records(),
            dump: self.dump.clone(),
        };
        let raw =
            serde_json::to_string_pretty(&index).map_err(|e| GraftError::Config(e.to_string()))?;
        std::fs::write(&path, raw).map_err(|e| GraftError::io(format!("write {}", path.display()), e))?;
        Ok(Some(path))
    }

    fn relative_name(&self, path: &Path) -> PathBuf {
        let rel = path.strip_prefix(&self.app_root).unwrap_or(path);
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect()
    }
}

fn unique_run_dir(base_dir: &Path, name: &str) -> PathBuf {
    let first = base_dir.join(name);
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| base_dir.join(format!("{name}-{n:02}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

fn copy_into(src: &Path, dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dest)?;
    Ok(())
}

/// Previous run directories under `base_dir`, oldest first.
pub fn list_runs(base_dir: &Path) -> Result<Vec<PathBuf>> {
    if !base_dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(base_dir)
        .map_err(|e| GraftError::io(format!("read {}", base_dir.display()), e))?;
    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| GraftError::io(format!("read {}", base_dir.display()), e))?;
        if entry.path().is_dir() {
            runs.push(entry.path());
        }
    }
    // timestamp names (plus `-NN` for same-second runs) sort chronologically
    runs.sort();
    Ok(runs)
}

/// Index of one run; empty when the run never wrote one. Indexes written as
/// a bare record list are still accepted.
pub fn read_index(run_dir: &Path) -> Result<BackupIndex> {
    let path = run_dir.join(BACKUP_INDEX_FILE);
    if !path.is_file() {
        return Ok(BackupIndex::default());
    }
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| GraftError::io(format!("read {}", path.display()), e))?;
    let bad = |e: serde_json::Error| GraftError::Config(format!("{}: {e}", path.display()));
    match serde_json::from_str::<BackupIndex>(&raw) {
        Ok(index) => Ok(index),
        Err(e) => serde_json::from_str::<Vec<BackupRecord>>(&raw)
            .map(|records| BackupIndex {
                records,
                dump: None,
            })
            .map_err(|_| bad(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn started() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 19, 9, 30, 5).unwrap()
    }

    #[test]
    fn copies_once_per_run_under_relative_path() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("app");
        std::fs::create_dir_all(root.join("routes")).unwrap();
        let file = root.join("routes/admin.php");
        std::fs::write(&file, "original").unwrap();

        let mut store = BackupStore::new(&tmp.path().join("backups"), &root, &started());
        let artifact = TargetArtifact::optional(&file);
        let first = store.backup(&artifact).expect("first copy");

        assert_eq!(
            first.backup_path,
            tmp.path().join("backups/20261019-093005/routes/admin.php")
        );
        assert_eq!(std::fs::read_to_string(&first.backup_path).unwrap(), "original");

        // a later mutation must not refresh the pre-run copy
        std::fs::write(&file, "mutated").unwrap();
        let second = store.backup(&artifact).expect("cached record");
        assert_eq!(second, first);
        assert_eq!(std::fs::read_to_string(&first.backup_path).unwrap(), "original");
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn missing_source_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let mut store = BackupStore::new(tmp.path(), tmp.path(), &started());
        let artifact = TargetArtifact::optional(tmp.path().join("absent.php"));

        assert!(store.backup(&artifact).is_none());
        assert!(store.backup(&artifact).is_none());
        assert!(store.records().is_empty());
    }

    #[test]
    fn index_round_trips_and_runs_are_listed() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("backups");
        let file = tmp.path().join("Kernel.php");
        std::fs::write(&file, "<?php").unwrap();

        let mut store = BackupStore::new(&base, tmp.path(), &started());
        assert_eq!(store.write_index().unwrap(), None);
        store.backup(&TargetArtifact::optional(&file)).unwrap();
        let index = store.write_index().unwrap().expect("index written");

        assert!(index.ends_with(BACKUP_INDEX_FILE));
        let runs = list_runs(&base).unwrap();
        assert_eq!(runs, vec![base.join("20261019-093005")]);
        let index = read_index(&runs[0]).unwrap();
        assert_eq!(index.records.len(), 1);
        assert_eq!(index.records[0].original_path, file);
        assert_eq!(index.dump, None);
    }

    #[test]
    fn same_second_runs_get_their_own_directories() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("backups");
        let file = tmp.path().join("Kernel.php");
        std::fs::write(&file, "<?php").unwrap();

        let mut first = BackupStore::new(&base, tmp.path(), &started());
        first.backup(&TargetArtifact::optional(&file)).unwrap();
        first.write_index().unwrap();
        let mut second = BackupStore::new(&base, tmp.path(), &started());
        let dump = second.dump_path().unwrap();
        second.record_dump(&dump, false);
        second.write_index().unwrap();

        assert_eq!(second.run_dir(), base.join("20261019-093005-02"));
        assert_eq!(
            list_runs(&base).unwrap(),
            vec![base.join("20261019-093005"), base.join("20261019-093005-02")]
        );
        // the first run's index survives the second
        assert_eq!(read_index(first.run_dir()).unwrap().records.len(), 1);
        let later = read_index(second.run_dir()).unwrap();
        assert!(later.records.is_empty());
        assert_eq!(
            later.dump,
            Some(DumpRecord {
                path: base.join("20261019-093005-02").join(DUMP_FILE),
                pre_migration: false,
            })
        );
    }

    #[test]
    fn nothing_copied_means_no_index() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("backups");
        let store = BackupStore::new(&base, tmp.path(), &started());

        // a dump that never completed does not count
        store.dump_path().unwrap();
        assert_eq!(store.write_index().unwrap(), None);
        assert!(!store.run_dir().join(BACKUP_INDEX_FILE).exists());
    }
}
