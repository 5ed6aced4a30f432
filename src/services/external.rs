//! External collaborators: processes graft shells out to and the privilege
//! probe. Both sit behind traits so the orchestrator can be driven by fakes.

use crate::error::{GraftError, Result};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, error, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Redirect stdout into this file (the database dump).
    pub stdout_to: Option<PathBuf>,
    pub timeout: Duration,
}

impl ExternalCommand {
    /// `None` for an empty argv, which is how config disables a command.
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            cwd: None,
            stdout_to: None,
            timeout,
        })
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_to = Some(path.into());
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub trait CommandRunner {
    /// Runs to completion. Non-zero exit and timeout are errors.
    fn run(&self, cmd: &ExternalCommand) -> Result<()>;
}

pub trait PrivilegeProbe {
    fn is_privileged(&self) -> bool;
}

/// Real processes; stdin/stderr are inherited so prompts reach the operator.
///
/// When a command with redirected stdout fails or times out, whatever it
/// wrote is renamed to `<file>.failed` so it can never pass for a complete
/// dump.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ExternalCommand) -> Result<()> {
        let result = execute(cmd);
        if result.is_err() {
            if let Some(path) = &cmd.stdout_to {
                set_aside(path);
            }
        }
        result
    }
}

fn execute(cmd: &ExternalCommand) -> Result<()> {
    let shown = cmd.display();
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(cwd) = &cmd.cwd {
        command.current_dir(cwd);
    }
    match &cmd.stdout_to {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| GraftError::io(format!("create {}", path.display()), e))?;
            command.stdout(Stdio::from(file));
        }
        None => {
            command.stdout(Stdio::inherit());
        }
    }

    debug!(command = %shown, "spawning");
    let mut child = command
        .spawn()
        .map_err(|e| GraftError::io(format!("spawn `{shown}`"), e))?;

    let status = child
        .wait_timeout(cmd.timeout)
        .map_err(|e| GraftError::io(format!("wait for `{shown}`"), e))?;
    let Some(status) = status else {
        let _ = child.kill();
        let _ = child.wait();
        error!(command = %shown, timeout_secs = cmd.timeout.as_secs(), "command timed out; killed");
        return Err(GraftError::ExternalCommandTimeout {
            command: shown,
            timeout_secs: cmd.timeout.as_secs(),
        });
    };

    if status.success() {
        Ok(())
    } else {
        Err(GraftError::ExternalCommandFailure {
            command: shown,
            code: status.code(),
        })
    }
}

fn set_aside(path: &Path) {
    if !path.exists() {
        return;
    }
    let mut failed = path.as_os_str().to_owned();
    failed.push(".failed");
    let failed = PathBuf::from(failed);
    match std::fs::rename(path, &failed) {
        Ok(()) => warn!(output = %failed.display(), "incomplete command output set aside"),
        Err(e) => warn!(output = %path.display(), error = %e, "could not set aside incomplete command output"),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EffectiveUid;

impl PrivilegeProbe for EffectiveUid {
    fn is_privileged(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }
}
