//! TOML configuration. Every field has a default, so an absent file or a
//! partial one is valid; CLI flags are layered on top by the command layer.

use crate::cli::{VariantChoice, DEFAULT_CONFIG_PATH};
use crate::domain::models::TargetArtifact;
use crate::error::{GraftError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GraftConfig {
    pub variant: VariantChoice,
    pub paths: PathsConfig,
    pub backup: BackupConfig,
    pub state: StateConfig,
    pub dump: DumpConfig,
    pub migrations: MigrationsConfig,
    pub commands: CommandsConfig,
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub app_root: PathBuf,
    pub hook_registry: PathBuf,
    pub route_registry: PathBuf,
    pub controller: PathBuf,
    pub template: PathBuf,
    pub hook_class: PathBuf,
    pub migrations_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            app_root: PathBuf::from("/var/www/pterodactyl"),
            hook_registry: PathBuf::from("app/Http/Kernel.php"),
            route_registry: PathBuf::from("routes/admin.php"),
            controller: PathBuf::from("app/Http/Controllers/Admin/Settings/IndexController.php"),
            template: PathBuf::from("resources/views/admin/settings/index.blade.php"),
            hook_class: PathBuf::from("app/Http/Middleware/ServerOwnership.php"),
            migrations_dir: PathBuf::from("database/migrations"),
        }
    }
}

impl PathsConfig {
    /// Relative paths live under `app_root`; absolute ones are kept as is.
    pub fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.app_root.join(p)
        }
    }

    pub fn app_root(&self) -> TargetArtifact {
        TargetArtifact::required(&self.app_root)
    }

    pub fn hook_registry(&self) -> TargetArtifact {
        TargetArtifact::optional(self.resolve(&self.hook_registry))
    }

    pub fn route_registry(&self) -> TargetArtifact {
        TargetArtifact::optional(self.resolve(&self.route_registry))
    }

    pub fn controller(&self) -> TargetArtifact {
        TargetArtifact::optional(self.resolve(&self.controller))
    }

    pub fn template(&self) -> TargetArtifact {
        TargetArtifact::optional(self.resolve(&self.template))
    }

    pub fn hook_class(&self) -> TargetArtifact {
        TargetArtifact::optional(self.resolve(&self.hook_class))
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.resolve(&self.migrations_dir)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    pub dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/backups/graft"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/lib/graft"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DumpConfig {
    pub enabled: bool,
    pub database: String,
    /// argv; `{database}` is replaced with `database`. Stdout goes to the dump file.
    pub command: Vec<String>,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: "panel".to_string(),
            command: argv(&["mysqldump", "-u", "root", "-p", "{database}"]),
        }
    }
}

impl DumpConfig {
    pub fn argv(&self) -> Vec<String> {
        self.command
            .iter()
            .map(|a| a.replace("{database}", &self.database))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationFailure {
    #[default]
    Fatal,
    Warn,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MigrationsConfig {
    pub table: String,
    pub on_failure: MigrationFailure,
    pub run: Vec<String>,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            table: "users".to_string(),
            on_failure: MigrationFailure::Fatal,
            run: argv(&["php", "artisan", "migrate", "--force"]),
        }
    }
}

/// External commands, each an argv list run inside `app_root`. An empty
/// list disables the command.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub cache_clear: Vec<Vec<String>>,
    pub worker_restart: Vec<String>,
    pub web_reload: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            cache_clear: vec![
                argv(&["php", "artisan", "view:clear"]),
                argv(&["php", "artisan", "config:clear"]),
                argv(&["php", "artisan", "route:clear"]),
            ],
            worker_restart: argv(&["systemctl", "restart", "pteroq.service"]),
            web_reload: argv(&["systemctl", "reload", "nginx"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub command_secs: u64,
    /// The dump waits on an interactive password prompt, so it gets longer.
    pub dump_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            command_secs: 300,
            dump_secs: 3600,
        }
    }
}

impl TimeoutsConfig {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn dump(&self) -> Duration {
        Duration::from_secs(self.dump_secs)
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Loads `path` if given (it must exist), else the default location if
/// present, else built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<GraftConfig> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(GraftError::Config(format!(
                "config file not found: {}",
                p.display()
            )))
        }
        Some(p) => p.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !default.exists() {
                return Ok(GraftConfig::default());
            }
            default
        }
    };
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| GraftError::io(format!("read {}", path.display()), e))?;
    parse_config(&raw).map_err(|e| GraftError::Config(format!("{}: {e}", path.display())))
}

pub fn parse_config(raw: &str) -> std::result::Result<GraftConfig, toml::de::Error> {
    toml::from_str(raw)
}
