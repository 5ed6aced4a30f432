//! Command handler layer.
//!
//! ## Files
//! - `install.rs`: runs the orchestrator and prints its report.
//! - `uninstall.rs`: prints restoration guidance.
//!
//! ## Principles
//! - Resolve config and CLI overrides here.
//! - Delegate business logic to `services/*`.
//! - Keep behavior and output schema stable.

pub mod install;
pub mod uninstall;

use crate::cli::{Cli, Commands};
use crate::services::config::{load_config, GraftConfig};
use crate::services::external::{EffectiveUid, SystemRunner};
use anyhow::Context;
use std::process::ExitCode;

pub fn dispatch(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = resolve_config(cli)?;
    match cli.command {
        Commands::Install => install::handle(cli.json, &config, &SystemRunner, &EffectiveUid),
        Commands::Uninstall => uninstall::handle(cli.json, &config, &EffectiveUid),
    }
}

/// Config file first, then flags on top.
pub fn resolve_config(cli: &Cli) -> anyhow::Result<GraftConfig> {
    let mut config = load_config(cli.config.as_deref()).context("loading configuration")?;
    if let Some(root) = &cli.root {
        config.paths.app_root = root.clone();
    }
    if let Some(variant) = cli.variant {
        config.variant = variant;
    }
    if cli.skip_dump {
        config.dump.enabled = false;
    }
    Ok(config)
}
