use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum GraftError {
    #[error("precondition failed: {0}")]
    PreconditionFailure(String),
    #[error("artifact missing: {}", .0.display())]
    ArtifactMissing(PathBuf),
    #[error("`{command}` exited with status {code:?}")]
    ExternalCommandFailure { command: String, code: Option<i32> },
    #[error("`{command}` did not finish within {timeout_secs}s")]
    ExternalCommandTimeout { command: String, timeout_secs: u64 },
    #[error("invalid patch {id}: {reason}")]
    InvalidPatch { id: String, reason: String },
    #[error("config error: {0}")]
    Config(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl GraftError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        GraftError::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable code used in the `--json` error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GraftError::PreconditionFailure(_) => "PRECONDITION_FAILED",
            GraftError::ArtifactMissing(_) => "ARTIFACT_MISSING",
            GraftError::ExternalCommandFailure { .. } => "EXTERNAL_COMMAND_FAILED",
            GraftError::ExternalCommandTimeout { .. } => "EXTERNAL_COMMAND_TIMEOUT",
            GraftError::InvalidPatch { .. } => "INVALID_PATCH",
            GraftError::Config(_) => "CONFIG_ERROR",
            GraftError::Io { .. } => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, GraftError>;
