use crate::services::config::GraftConfig;
use crate::services::external::{CommandRunner, PrivilegeProbe};
use crate::services::orchestrator::{Collaborators, Orchestrator};
use crate::services::output::{print_one, report_text};
use chrono::Local;
use std::process::ExitCode;

pub fn handle(
    json: bool,
    config: &GraftConfig,
    runner: &dyn CommandRunner,
    privilege: &dyn PrivilegeProbe,
) -> anyhow::Result<ExitCode> {
    let orchestrator = Orchestrator::new(config, Collaborators { runner, privilege }, Local::now());
    let report = orchestrator.run();
    let ok = report.succeeded();
    print_one(json, ok, report, report_text)?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
