use crate::error::GraftError;
use crate::services::config::GraftConfig;
use crate::services::external::PrivilegeProbe;
use crate::services::output::{guide_text, print_one};
use crate::services::restore::restoration_guide;
use std::process::ExitCode;

/// Guidance only: nothing is restored automatically.
pub fn handle(
    json: bool,
    config: &GraftConfig,
    privilege: &dyn PrivilegeProbe,
) -> anyhow::Result<ExitCode> {
    if !privilege.is_privileged() {
        return Err(GraftError::PreconditionFailure(
            "uninstall must run as root (effective uid 0)".to_string(),
        )
        .into());
    }
    let guide = restoration_guide(config)?;
    print_one(json, true, guide, guide_text)?;
    Ok(ExitCode::SUCCESS)
}
