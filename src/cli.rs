use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/graft/config.toml";

#[derive(Parser, Debug)]
#[command(
    name = "graft",
    version,
    about = "Install the menu protection add-on into a running panel application"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(
        long,
        global = true,
        env = "GRAFT_CONFIG",
        help = "Config file (defaults to /etc/graft/config.toml when present)"
    )]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Application root, overrides the config file")]
    pub root: Option<PathBuf>,
    #[arg(long, global = true, value_enum, help = "Target layout, overrides detection")]
    pub variant: Option<VariantChoice>,
    #[arg(long, global = true, help = "Do not take a database dump before patching")]
    pub skip_dump: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up, migrate, patch and refresh the application
    Install,
    /// Print manual restoration steps from the latest backup (changes nothing)
    Uninstall,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum VariantChoice {
    #[default]
    Auto,
    SettingsView,
    DedicatedEndpoint,
}
