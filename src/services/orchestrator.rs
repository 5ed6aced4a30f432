//! Staged installation.
//!
//! The step table fixes order, stage and failure policy; `Orchestrator::run`
//! walks it once, moving the state machine forward, and turns every step
//! result into a `StepRecord`. A fatal failure stops the run in `Failed` with
//! the partial log; nothing is resumed automatically.
//!
//! Each step is idempotent on its own, so a second run over an installed
//! application reports no-ops and leaves every artifact byte-identical.

use crate::cli::VariantChoice;
use crate::domain::models::{
    FailurePolicy, InstallState, RunOutcome, RunReport, StepRecord, StepStatus, TargetVariant,
};
use crate::error::{GraftError, Result};
use crate::feature;
use crate::patch::artifact::{apply_to_artifact, create_artifact, PatchContext, PatchOutcome};
use crate::patch::{registry, template};
use crate::services::backup::BackupStore;
use crate::services::config::{GraftConfig, MigrationFailure};
use crate::services::external::{CommandRunner, ExternalCommand, PrivilegeProbe};
use crate::services::migration::{self, Materialized};
use crate::services::storage::{self, content_digest, ManifestEntry, PatchManifest};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepAction {
    PrivilegeCheck,
    ApplicationRoot,
    DetectVariant,
    DatabaseDump,
    WriteMigration,
    RunMigrations,
    RegisterRoute,
    AddControllerMethod,
    WriteHookClass,
    RegisterHook,
    InjectTemplate,
    ClearCaches,
    RestartWorker,
    ReloadWeb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstallationStep {
    pub name: &'static str,
    pub stage: InstallState,
    pub policy: FailurePolicy,
    pub action: StepAction,
}

const fn step(
    name: &'static str,
    stage: InstallState,
    policy: FailurePolicy,
    action: StepAction,
) -> InstallationStep {
    InstallationStep {
        name,
        stage,
        policy,
        action,
    }
}

/// The install sequence. Stages never go backwards.
pub fn install_steps(on_migration_failure: MigrationFailure) -> Vec<InstallationStep> {
    use FailurePolicy::*;
    use InstallState::*;

    let migration_policy = match on_migration_failure {
        MigrationFailure::Fatal => Fatal,
        MigrationFailure::Warn => WarnContinue,
    };
    vec![
        step("privilege-check", Validating, Fatal, StepAction::PrivilegeCheck),
        step("application-root", Validating, Fatal, StepAction::ApplicationRoot),
        step("detect-variant", Validating, WarnContinue, StepAction::DetectVariant),
        step("database-dump", BackingUp, WarnContinue, StepAction::DatabaseDump),
        step("write-migration", Migrating, SkipIfMissing, StepAction::WriteMigration),
        step("run-migrations", Migrating, migration_policy, StepAction::RunMigrations),
        step("register-route", PatchingRegistries, SkipIfMissing, StepAction::RegisterRoute),
        step(
            "add-controller-method",
            PatchingRegistries,
            SkipIfMissing,
            StepAction::AddControllerMethod,
        ),
        step("write-hook-class", PatchingRegistries, SkipIfMissing, StepAction::WriteHookClass),
        step("register-hook", PatchingRegistries, SkipIfMissing, StepAction::RegisterHook),
        step("inject-template", PatchingTemplate, SkipIfMissing, StepAction::InjectTemplate),
        step("clear-caches", Refreshing, WarnContinue, StepAction::ClearCaches),
        step("restart-worker", RestartingServices, WarnContinue, StepAction::RestartWorker),
        step("reload-web", RestartingServices, WarnContinue, StepAction::ReloadWeb),
    ]
}

/// Layout from what exists on disk: both the settings controller and the
/// route table are needed to host a dedicated endpoint.
pub fn detect_variant(config: &GraftConfig) -> TargetVariant {
    let controller = config.paths.controller();
    let routes = config.paths.route_registry();
    if controller.path.is_file() && routes.path.is_file() {
        TargetVariant::DedicatedEndpoint
    } else {
        TargetVariant::SettingsView
    }
}

pub struct Collaborators<'a> {
    pub runner: &'a dyn CommandRunner,
    pub privilege: &'a dyn PrivilegeProbe,
}

/// What a step did, before its policy is applied.
enum Effect {
    Done(String),
    NoOp(String),
    Skipped(String),
    /// An optional target is absent.
    Missing(String),
    /// Left unchanged on purpose (anchor miss, drift); never fatal.
    Warn(String),
}

pub struct Orchestrator<'a> {
    config: &'a GraftConfig,
    collab: Collaborators<'a>,
    started_at: DateTime<Local>,
    state: InstallState,
    variant: Option<TargetVariant>,
    backups: BackupStore,
    manifest: PatchManifest,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a GraftConfig, collab: Collaborators<'a>, started_at: DateTime<Local>) -> Self {
        let manifest = storage::load_manifest(&config.state.dir).unwrap_or_else(|e| {
            warn!(error = %e, "patch manifest unreadable; relying on content scan only");
            PatchManifest::default()
        });
        Self {
            backups: BackupStore::new(&config.backup.dir, &config.paths.app_root, &started_at),
            config,
            collab,
            started_at,
            state: InstallState::Idle,
            variant: None,
            manifest,
        }
    }

    pub fn run(mut self) -> RunReport {
        let steps = install_steps(self.config.migrations.on_failure);
        let mut records = Vec::with_capacity(steps.len());

        for step in &steps {
            if let Err(e) = self.advance(step.stage) {
                records.push(record(step, StepStatus::Failed, e.to_string()));
                self.state = InstallState::Failed;
                break;
            }
            let rec = self.run_step(step);
            let fatal = rec.status == StepStatus::Failed;
            records.push(rec);
            if fatal {
                self.state = InstallState::Failed;
                break;
            }
        }
        if self.state != InstallState::Failed {
            self.state = InstallState::Done;
        }

        self.finish(records)
    }

    fn advance(&mut self, stage: InstallState) -> Result<()> {
        if stage == self.state {
            return Ok(());
        }
        if !self.state.can_advance_to(stage) {
            return Err(GraftError::PreconditionFailure(format!(
                "cannot move from {:?} to {:?}",
                self.state, stage
            )));
        }
        info!(stage = ?stage, "entering stage");
        self.state = stage;
        Ok(())
    }

    fn run_step(&mut self, step: &InstallationStep) -> StepRecord {
        let (status, message) = match self.execute(step.action) {
            Ok(Effect::Done(msg)) => (StepStatus::Done, msg),
            Ok(Effect::NoOp(msg)) => (StepStatus::NoOp, msg),
            Ok(Effect::Skipped(msg)) => (StepStatus::Skipped, msg),
            Ok(Effect::Warn(msg)) => (StepStatus::Warned, msg),
            Ok(Effect::Missing(msg)) => match step.policy {
                FailurePolicy::SkipIfMissing => (StepStatus::Skipped, msg),
                FailurePolicy::WarnContinue => (StepStatus::Warned, msg),
                FailurePolicy::Fatal => (StepStatus::Failed, msg),
            },
            Err(e) => match (step.policy, &e) {
                (FailurePolicy::WarnContinue, _) => (StepStatus::Warned, e.to_string()),
                (FailurePolicy::SkipIfMissing, GraftError::ArtifactMissing(_)) => {
                    (StepStatus::Skipped, e.to_string())
                }
                _ => (StepStatus::Failed, e.to_string()),
            },
        };

        match status {
            StepStatus::Failed => error!(step = step.name, "{message}"),
            StepStatus::Warned => warn!(step = step.name, "{message}"),
            _ => info!(step = step.name, status = status.label(), "{message}"),
        }
        record(step, status, message)
    }

    fn execute(&mut self, action: StepAction) -> Result<Effect> {
        let config = self.config;
        let paths = &config.paths;
        match action {
            StepAction::PrivilegeCheck => {
                if self.collab.privilege.is_privileged() {
                    Ok(Effect::Done("running with root privileges".to_string()))
                } else {
                    Err(GraftError::PreconditionFailure(
                        "install must run as root (effective uid 0)".to_string(),
                    ))
                }
            }
            StepAction::ApplicationRoot => {
                let root = paths.app_root();
                if root.path.is_dir() {
                    Ok(Effect::Done(format!("application found at {}", root.path.display())))
                } else {
                    Err(GraftError::ArtifactMissing(root.path))
                }
            }
            StepAction::DetectVariant => {
                let (variant, how) = match config.variant {
                    VariantChoice::Auto => (detect_variant(config), "detected"),
                    VariantChoice::SettingsView => (TargetVariant::SettingsView, "configured"),
                    VariantChoice::DedicatedEndpoint => {
                        (TargetVariant::DedicatedEndpoint, "configured")
                    }
                };
                self.variant = Some(variant);
                Ok(Effect::Done(format!("{variant} layout ({how})")))
            }
            StepAction::DatabaseDump => self.dump_database(),
            StepAction::WriteMigration => self.write_migration(),
            StepAction::RunMigrations => {
                self.run_command("migrations", &config.migrations.run, &config.timeouts.command())
            }
            StepAction::RegisterRoute => {
                if self.variant() == TargetVariant::SettingsView {
                    return Ok(Effect::Skipped(
                        "settings-view layout posts to its existing endpoint".to_string(),
                    ));
                }
                let artifact = paths.route_registry();
                let outcome = registry::register(
                    &artifact,
                    &feature::route_entry(),
                    &feature::route_anchor(),
                    &mut self.ctx(),
                )?;
                Ok(describe(outcome, &artifact.path, feature::ROUTE_NAME))
            }
            StepAction::AddControllerMethod => {
                if self.variant() == TargetVariant::SettingsView {
                    return Ok(Effect::Skipped(
                        "settings-view layout has no dedicated controller method".to_string(),
                    ));
                }
                let artifact = paths.controller();
                let patch = feature::controller_patch()?;
                let outcome = apply_to_artifact(&artifact, &patch, &mut self.ctx())?;
                Ok(describe(outcome, &artifact.path, feature::CONTROLLER_MARKER))
            }
            StepAction::WriteHookClass => {
                let artifact = paths.hook_class();
                let outcome = create_artifact(
                    &artifact,
                    feature::HOOK_CLASS_PATCH_ID,
                    feature::HOOK_CLASS_MARKER,
                    feature::hook_class_source(),
                    &mut self.ctx(),
                )?;
                Ok(describe(outcome, &artifact.path, feature::HOOK_CLASS_MARKER))
            }
            StepAction::RegisterHook => {
                let artifact = paths.hook_registry();
                let anchor = feature::hook_anchor(self.variant());
                let outcome = registry::register(
                    &artifact,
                    &feature::hook_entry(),
                    &anchor,
                    &mut self.ctx(),
                )?;
                Ok(describe(outcome, &artifact.path, feature::HOOK_KEY))
            }
            StepAction::InjectTemplate => {
                let artifact = paths.template();
                let fragment = feature::template_fragment(self.variant());
                let outcome = template::inject(
                    &artifact,
                    &fragment,
                    &feature::template_anchor(),
                    &mut self.ctx(),
                )?;
                Ok(describe(outcome, &artifact.path, feature::SECTION_TITLE))
            }
            StepAction::ClearCaches => self.clear_caches(),
            StepAction::RestartWorker => self.run_command(
                "worker restart",
                &config.commands.worker_restart,
                &config.timeouts.command(),
            ),
            StepAction::ReloadWeb => self.run_command(
                "web server reload",
                &config.commands.web_reload,
                &config.timeouts.command(),
            ),
        }
    }

    fn variant(&self) -> TargetVariant {
        self.variant.unwrap_or(TargetVariant::SettingsView)
    }

    fn ctx(&mut self) -> PatchContext<'_> {
        PatchContext {
            backups: &mut self.backups,
            manifest: &mut self.manifest,
        }
    }

    fn command(&self, argv: &[String], timeout: &std::time::Duration) -> Option<ExternalCommand> {
        ExternalCommand::from_argv(argv, *timeout).map(|c| c.in_dir(&self.config.paths.app_root))
    }

    fn run_command(
        &self,
        what: &str,
        argv: &[String],
        timeout: &std::time::Duration,
    ) -> Result<Effect> {
        let Some(cmd) = self.command(argv, timeout) else {
            return Ok(Effect::Skipped(format!("{what} disabled in config")));
        };
        self.collab.runner.run(&cmd)?;
        Ok(Effect::Done(format!("ran `{}`", cmd.display())))
    }

    fn dump_database(&mut self) -> Result<Effect> {
        let dump = &self.config.dump;
        if !dump.enabled {
            return Ok(Effect::Skipped("database dump disabled".to_string()));
        }
        let Some(cmd) = self.command(&dump.argv(), &self.config.timeouts.dump()) else {
            return Ok(Effect::Skipped("no dump command configured".to_string()));
        };
        let migrations = self.config.paths.migrations_dir();
        let pre_migration = !migrations.is_dir()
            || migration::find_existing(&migrations, feature::MIGRATION_SLUG)?.is_none();
        let path = self.backups.dump_path()?;
        let cmd = cmd.stdout_to(&path);
        info!(command = %cmd.display(), dump = %path.display(), "dumping database; the client may prompt for a password");
        self.collab.runner.run(&cmd)?;
        self.backups.record_dump(&path, pre_migration);
        Ok(Effect::Done(format!("database dumped to {}", path.display())))
    }

    fn write_migration(&mut self) -> Result<Effect> {
        let dir = self.config.paths.migrations_dir();
        if !dir.is_dir() {
            return Ok(Effect::Missing(format!(
                "migrations directory {} not found",
                dir.display()
            )));
        }
        let unit = migration::generate(
            &self.config.migrations.table,
            feature::MIGRATION_SLUG,
            &feature::migration_fields(),
            self.started_at.naive_local(),
        );
        match migration::materialize(&unit, &dir)? {
            Materialized::Written(path) => {
                let rendered = std::fs::read_to_string(&path).unwrap_or_default();
                self.manifest.upsert(ManifestEntry {
                    patch_id: feature::MIGRATION_PATCH_ID.to_string(),
                    artifact: path.clone(),
                    marker: feature::MIGRATION_SLUG.to_string(),
                    pre_digest: content_digest(""),
                    post_digest: content_digest(&rendered),
                    applied_at: Utc::now().to_rfc3339(),
                });
                Ok(Effect::Done(format!("wrote {}", path.display())))
            }
            Materialized::AlreadyPresent(path) => Ok(Effect::NoOp(format!(
                "migration already present at {}",
                path.display()
            ))),
        }
    }

    /// Every cache command runs even when an earlier one fails; the first
    /// failure is what the step reports.
    fn clear_caches(&self) -> Result<Effect> {
        let timeout = self.config.timeouts.command();
        let commands: Vec<ExternalCommand> = self
            .config
            .commands
            .cache_clear
            .iter()
            .filter_map(|argv| self.command(argv, &timeout))
            .collect();
        if commands.is_empty() {
            return Ok(Effect::Skipped("no cache commands configured".to_string()));
        }

        let mut first_error = None;
        for cmd in &commands {
            if let Err(e) = self.collab.runner.run(cmd) {
                warn!(command = %cmd.display(), error = %e, "cache clear failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(Effect::Done(format!("ran {} cache command(s)", commands.len()))),
        }
    }

    fn finish(self, steps: Vec<StepRecord>) -> RunReport {
        let state_dir = &self.config.state.dir;
        // state is only written once validation let the run touch the system
        let validated = steps.iter().any(|s| s.stage > InstallState::Validating);
        if validated {
            if let Err(e) = storage::save_manifest(state_dir, &self.manifest) {
                warn!(error = %e, "could not save patch manifest");
            }
        }
        if let Err(e) = self.backups.write_index() {
            warn!(error = %e, "could not write backup index");
        }

        let outcome = if self.state == InstallState::Done {
            RunOutcome::Done
        } else {
            RunOutcome::Failed
        };
        let backup_dir = self
            .backups
            .is_materialized()
            .then(|| self.backups.run_dir().to_path_buf());
        let next_steps = next_steps(outcome, &steps, backup_dir.as_deref());

        if validated {
            storage::audit(
                state_dir,
                "install",
                json!({
                    "outcome": outcome,
                    "variant": self.variant,
                    "backup_dir": backup_dir,
                    "steps": steps.iter().map(|s| json!({"name": s.name, "status": s.status})).collect::<Vec<_>>(),
                }),
            );
        }

        RunReport {
            outcome,
            final_state: self.state,
            variant: self.variant,
            backup_dir,
            backups: self.backups.records(),
            steps,
            next_steps,
        }
    }
}

fn record(step: &InstallationStep, status: StepStatus, message: String) -> StepRecord {
    StepRecord {
        name: step.name.to_string(),
        stage: step.stage,
        policy: step.policy,
        status,
        message,
    }
}

fn describe(outcome: PatchOutcome, path: &Path, marker: &str) -> Effect {
    let shown = path.display();
    match outcome {
        PatchOutcome::Applied => Effect::Done(format!("patched {shown}")),
        PatchOutcome::AlreadyApplied => Effect::NoOp(format!("{shown} already contains {marker}")),
        PatchOutcome::AnchorNotFound => {
            Effect::Warn(format!("anchor not found in {shown}; left unchanged"))
        }
        PatchOutcome::ArtifactMissing => Effect::Missing(format!("{shown} not found")),
        PatchOutcome::Drifted => Effect::Warn(format!(
            "{shown} was patched before but {marker} is gone; left unchanged"
        )),
    }
}

fn next_steps(outcome: RunOutcome, steps: &[StepRecord], backup_dir: Option<&Path>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(dir) = backup_dir {
        out.push(format!("Backups of modified files are in {}", dir.display()));
    }
    for s in steps.iter().filter(|s| s.status == StepStatus::Warned) {
        out.push(format!("Check `{}` by hand: {}", s.name, s.message));
    }
    match outcome {
        RunOutcome::Done => {
            out.push(format!(
                "Open the admin settings page and configure \"{}\"",
                feature::SECTION_TITLE
            ));
            out.push("Run `graft uninstall` to print restoration steps".to_string());
        }
        RunOutcome::Failed => {
            if let Some(failed) = steps.iter().find(|s| s.status == StepStatus::Failed) {
                out.push(format!(
                    "Fix `{}` and run `graft install` again; finished steps are detected and skipped",
                    failed.name
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_table_moves_forward_only() {
        let steps = install_steps(MigrationFailure::Fatal);
        assert_eq!(steps.len(), 14);
        let mut state = InstallState::Idle;
        for s in &steps {
            assert!(s.stage == state || state.can_advance_to(s.stage), "{}", s.name);
            state = s.stage;
        }
        assert!(state.can_advance_to(InstallState::Done));
    }

    #[test]
    fn migration_policy_follows_config() {
        let policy = |mode| {
            install_steps(mode)
                .into_iter()
                .find(|s| s.action == StepAction::RunMigrations)
                .map(|s| s.policy)
        };
        assert_eq!(policy(MigrationFailure::Fatal), Some(FailurePolicy::Fatal));
        assert_eq!(policy(MigrationFailure::Warn), Some(FailurePolicy::WarnContinue));
    }

    #[test]
    fn failed_is_terminal() {
        assert!(InstallState::Migrating.can_advance_to(InstallState::Failed));
        assert!(!InstallState::Failed.can_advance_to(InstallState::Done));
        assert!(!InstallState::Refreshing.can_advance_to(InstallState::Migrating));
    }

    #[test]
    fn next_steps_name_the_failed_step() {
        let steps = vec![StepRecord {
            name: "run-migrations".to_string(),
            stage: InstallState::Migrating,
            policy: FailurePolicy::Fatal,
            status: StepStatus::Failed,
            message: "exit 1".to_string(),
        }];
        let out = next_steps(RunOutcome::Failed, &steps, None);
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("`run-migrations`"));
    }
}
