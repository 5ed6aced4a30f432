//! Manual restoration guidance. Reads every backup run and the patch
//! manifest; never touches the application.
//!
//! A file copy only exists when a run was about to change that file, so the
//! newest copy of each artifact is its last unpatched state. Runs that
//! changed nothing contribute nothing. Only a dump taken before the feature's
//! migration is offered for a full schema rollback.

use crate::domain::models::{BackupRecord, RestorationGuide};
use crate::error::Result;
use crate::feature;
use crate::services::backup::{list_runs, read_index};
use crate::services::config::GraftConfig;
use crate::services::external::ExternalCommand;
use crate::services::storage::load_manifest;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub fn restoration_guide(config: &GraftConfig) -> Result<RestorationGuide> {
    let mut copies: BTreeMap<PathBuf, BackupRecord> = BTreeMap::new();
    let mut dump = None;
    let mut backup_dir = None;
    for run_dir in list_runs(&config.backup.dir)? {
        let index = read_index(&run_dir)?;
        let pre_migration_dump = index
            .dump
            .filter(|d| d.pre_migration && d.path.is_file())
            .map(|d| d.path);
        if index.records.is_empty() && pre_migration_dump.is_none() {
            continue;
        }
        // oldest first, so later runs overwrite
        for record in index.records {
            copies.insert(record.original_path.clone(), record);
        }
        if pre_migration_dump.is_some() {
            dump = pre_migration_dump;
        }
        backup_dir = Some(run_dir);
    }

    let manifest = load_manifest(&config.state.dir)?;
    let root = &config.paths.app_root;
    let mut steps = Vec::new();

    if backup_dir.is_none() {
        steps.push(format!(
            "No backups found under {}; nothing to copy back",
            config.backup.dir.display()
        ));
    }
    for r in copies.values() {
        steps.push(format!(
            "cp -p '{}' '{}'",
            r.backup_path.display(),
            r.original_path.display()
        ));
    }
    for entry in manifest
        .entries
        .iter()
        .filter(|e| e.patch_id == feature::MIGRATION_PATCH_ID)
    {
        let rel = entry.artifact.strip_prefix(root).unwrap_or(&entry.artifact);
        steps.push(format!(
            "cd '{}' && php artisan migrate:rollback --path='{}'",
            root.display(),
            rel.display()
        ));
        steps.push(format!("rm '{}'", entry.artifact.display()));
    }
    for entry in manifest
        .entries
        .iter()
        .filter(|e| e.patch_id == feature::HOOK_CLASS_PATCH_ID)
    {
        steps.push(format!("rm '{}'", entry.artifact.display()));
    }
    if backup_dir.is_none() && manifest.entries.is_empty() {
        return Ok(RestorationGuide {
            backup_dir: None,
            automated: false,
            instructions: steps,
        });
    }

    if let Some(dump) = &dump {
        steps.push(format!(
            "If the schema must be rolled back completely: mysql -u root -p {} < '{}'",
            config.dump.database,
            dump.display()
        ));
    }

    let timeout = config.timeouts.command();
    let refresh = config
        .commands
        .cache_clear
        .iter()
        .chain([&config.commands.worker_restart, &config.commands.web_reload])
        .filter_map(|argv| ExternalCommand::from_argv(argv, timeout))
        .map(|c| c.display())
        .collect::<Vec<_>>();
    if !refresh.is_empty() {
        steps.push(format!("cd '{}' && {}", root.display(), refresh.join(" && ")));
    }

    Ok(RestorationGuide {
        backup_dir,
        automated: false,
        instructions: steps,
    })
}
