//! Registration into structured registries: the request-hook alias list
//! (anchor: the list's opening bracket, insert after) and the route table
//! (anchor: the table's closing marker, insert before).

use super::anchor::Anchor;
use super::artifact::{apply_to_artifact, PatchContext, PatchOutcome};
use super::Patch;
use crate::domain::models::TargetArtifact;
use crate::error::Result;

/// One line (or a few) added to a registry, recognised by `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub key: String,
    pub text: String,
}

impl RegistryEntry {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }

    pub fn patch_id(&self) -> String {
        format!("registry:{}", self.key.trim_matches(|c| c == '\'' || c == '"'))
    }
}

pub fn register(
    registry: &TargetArtifact,
    entry: &RegistryEntry,
    anchor: &Anchor,
    ctx: &mut PatchContext<'_>,
) -> Result<PatchOutcome> {
    let patch = Patch::new(entry.patch_id(), entry.key.clone(), anchor.clone(), entry.text.clone())?;
    apply_to_artifact(registry, &patch, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backup::BackupStore;
    use crate::services::storage::PatchManifest;
    use chrono::Local;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const KERNEL: &str = "<?php\n\nclass Kernel\n{\n    protected $middlewareAliases = [\n        'auth' => Authenticate::class,\n    ];\n}\n";

    fn hook_entry() -> RegistryEntry {
        RegistryEntry::new(
            "'server.ownership'",
            "        'server.ownership' => \\App\\Http\\Middleware\\ServerOwnership::class,",
        )
    }

    #[test]
    fn hook_is_registered_right_after_the_opening_bracket_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Kernel.php");
        std::fs::write(&path, KERNEL).unwrap();
        let artifact = TargetArtifact::optional(&path);
        let mut backups = BackupStore::new(&tmp.path().join("b"), tmp.path(), &Local::now());
        let mut manifest = PatchManifest::default();
        let mut ctx = PatchContext {
            backups: &mut backups,
            manifest: &mut manifest,
        };
        let anchor = Anchor::after_first("protected $middlewareAliases = [");

        let first = register(&artifact, &hook_entry(), &anchor, &mut ctx).unwrap();
        let after_first = std::fs::read_to_string(&path).unwrap();
        let second = register(&artifact, &hook_entry(), &anchor, &mut ctx).unwrap();

        assert_eq!(first, PatchOutcome::Applied);
        assert_eq!(second, PatchOutcome::AlreadyApplied);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), after_first);
        let lines: Vec<&str> = after_first.lines().collect();
        assert_eq!(lines[4], "    protected $middlewareAliases = [");
        assert_eq!(
            lines[5],
            "        'server.ownership' => \\App\\Http\\Middleware\\ServerOwnership::class,"
        );
        assert_eq!(lines[6], "        'auth' => Authenticate::class,");
    }

    #[test]
    fn route_is_inserted_before_the_last_closing_marker() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("admin.php");
        let routes = "Route::group(['prefix' => 'a'], function () {\n    Route::get('/', 'A');\n});\n\nRoute::group(['prefix' => 'settings'], function () {\n    Route::get('/', 'S');\n});\n";
        std::fs::write(&path, routes).unwrap();
        let artifact = TargetArtifact::optional(&path);
        let mut backups = BackupStore::new(&tmp.path().join("b"), tmp.path(), &Local::now());
        let mut manifest = PatchManifest::default();
        let mut ctx = PatchContext {
            backups: &mut backups,
            manifest: &mut manifest,
        };
        let entry = RegistryEntry::new(
            "admin.settings.protection",
            "    Route::post('/protection', 'P')->name('admin.settings.protection');",
        );

        let outcome = register(&artifact, &entry, &Anchor::before_last("});"), &mut ctx).unwrap();

        assert!(outcome.applied());
        let out = std::fs::read_to_string(&path).unwrap();
        assert!(out.ends_with(
            "    Route::get('/', 'S');\n    Route::post('/protection', 'P')->name('admin.settings.protection');\n});\n"
        ));
        assert_eq!(entry.patch_id(), "registry:admin.settings.protection");
    }
}
