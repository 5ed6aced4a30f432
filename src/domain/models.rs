use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Serialize)]
pub struct JsonOut<T: Serialize> {
    pub ok: bool,
    pub data: T,
}

#[derive(Serialize)]
pub struct JsonErr {
    pub ok: bool,
    pub error: ErrorBody,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// A file graft may read or mutate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetArtifact {
    pub path: PathBuf,
    /// Missing required artifacts are fatal; missing optional ones are skipped.
    pub required: bool,
}

impl TargetArtifact {
    pub fn required(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: true,
        }
    }

    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub timestamp: String,
}

/// Layout of the target application, decided during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetVariant {
    /// Older layout: the settings view posts to its existing endpoint.
    SettingsView,
    /// Newer layout: a dedicated route and controller method are added.
    DedicatedEndpoint,
}

impl fmt::Display for TargetVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetVariant::SettingsView => f.write_str("settings-view"),
            TargetVariant::DedicatedEndpoint => f.write_str("dedicated-endpoint"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    Fatal,
    WarnContinue,
    SkipIfMissing,
}

/// Install state machine. `Failed` is terminal and reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallState {
    Idle,
    Validating,
    BackingUp,
    Migrating,
    PatchingRegistries,
    PatchingTemplate,
    Refreshing,
    RestartingServices,
    Done,
    Failed,
}

impl InstallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstallState::Done | InstallState::Failed)
    }

    /// Forward-only: a stage may be entered once, in declaration order.
    pub fn can_advance_to(self, next: InstallState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == InstallState::Failed || next > self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Done,
    /// Effect already present; nothing written.
    NoOp,
    Skipped,
    Warned,
    Failed,
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Done => "done",
            StepStatus::NoOp => "no-op",
            StepStatus::Skipped => "skipped",
            StepStatus::Warned => "warned",
            StepStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub stage: InstallState,
    pub policy: FailurePolicy,
    pub status: StepStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub final_state: InstallState,
    pub variant: Option<TargetVariant>,
    pub backup_dir: Option<PathBuf>,
    pub backups: Vec<BackupRecord>,
    pub steps: Vec<StepRecord>,
    pub next_steps: Vec<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Done
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RestorationGuide {
    pub backup_dir: Option<PathBuf>,
    pub automated: bool,
    pub instructions: Vec<String>,
}
