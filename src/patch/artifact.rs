use super::ArtifactPatch;
use crate::domain::models::TargetArtifact;
use crate::error::{GraftError, Result};
use crate::services::backup::BackupStore;
use crate::services::storage::{content_digest, ManifestEntry, PatchManifest};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchOutcome {
    Applied,
    AlreadyApplied,
    AnchorNotFound,
    ArtifactMissing,
    /// Recorded as applied, marker gone, content not the recorded original.
    Drifted,
}

impl PatchOutcome {
    pub fn applied(self) -> bool {
        self == PatchOutcome::Applied
    }
}

/// Run-scoped state every file mutation goes through.
pub struct PatchContext<'a> {
    pub backups: &'a mut BackupStore,
    pub manifest: &'a mut PatchManifest,
}

/// Applies `patch` to the file behind `artifact`.
///
/// Order is fixed: read, detect, consult the manifest, insert, back up, write,
/// record. Nothing is written unless the anchor matched.
pub fn apply_to_artifact(
    artifact: &TargetArtifact,
    patch: &dyn ArtifactPatch,
    ctx: &mut PatchContext<'_>,
) -> Result<PatchOutcome> {
    let path = artifact.path.as_path();
    let Some(content) = read_artifact(artifact)? else {
        return Ok(PatchOutcome::ArtifactMissing);
    };

    if patch.detect(&content) {
        info!(patch = patch.id(), artifact = %path.display(), "already applied");
        return Ok(PatchOutcome::AlreadyApplied);
    }

    let pre_digest = content_digest(&content);
    if let Some(drift) = check_drift(patch, path, &content, &pre_digest, ctx.manifest) {
        return Ok(drift);
    }

    let insertion = patch.apply(&content);
    if !insertion.applied {
        warn!(
            patch = patch.id(),
            artifact = %path.display(),
            anchor = patch.anchor_pattern(),
            "anchor not found; artifact left unchanged"
        );
        return Ok(PatchOutcome::AnchorNotFound);
    }

    ctx.backups.backup(artifact);
    write_artifact(path, &insertion.content)?;
    record(ctx.manifest, patch, path, pre_digest, &insertion.content);
    info!(
        patch = patch.id(),
        artifact = %path.display(),
        lines = ?insertion.matched_lines,
        "applied"
    );
    Ok(PatchOutcome::Applied)
}

/// Creates a whole new file holding `contents`, which must carry `marker`.
///
/// An existing file with the marker is left alone; one without it is never
/// overwritten. A missing parent directory counts as a missing artifact.
pub fn create_artifact(
    artifact: &TargetArtifact,
    patch_id: &str,
    marker: &str,
    contents: &str,
    ctx: &mut PatchContext<'_>,
) -> Result<PatchOutcome> {
    let path = artifact.path.as_path();
    if !contents.contains(marker) || marker.is_empty() {
        return Err(GraftError::InvalidPatch {
            id: patch_id.to_string(),
            reason: "file contents do not contain the marker".to_string(),
        });
    }

    if path.exists() {
        let existing = std::fs::read_to_string(path)
            .map_err(|e| GraftError::io(format!("read {}", path.display()), e))?;
        if existing.contains(marker) {
            info!(patch = patch_id, artifact = %path.display(), "already applied");
            return Ok(PatchOutcome::AlreadyApplied);
        }
        warn!(
            patch = patch_id,
            artifact = %path.display(),
            "file exists without marker; not overwriting"
        );
        return Ok(PatchOutcome::Drifted);
    }

    let parent_missing = path.parent().map(|p| !p.is_dir()).unwrap_or(true);
    if parent_missing {
        if artifact.required {
            return Err(GraftError::ArtifactMissing(artifact.path.clone()));
        }
        warn!(patch = patch_id, artifact = %path.display(), "target directory missing; skipped");
        return Ok(PatchOutcome::ArtifactMissing);
    }

    write_artifact(path, contents)?;
    ctx.manifest.upsert(ManifestEntry {
        patch_id: patch_id.to_string(),
        artifact: path.to_path_buf(),
        marker: marker.to_string(),
        pre_digest: content_digest(""),
        post_digest: content_digest(contents),
        applied_at: Utc::now().to_rfc3339(),
    });
    info!(patch = patch_id, artifact = %path.display(), "created");
    Ok(PatchOutcome::Applied)
}

fn read_artifact(artifact: &TargetArtifact) -> Result<Option<String>> {
    let path = artifact.path.as_path();
    if !path.is_file() {
        if artifact.required {
            return Err(GraftError::ArtifactMissing(artifact.path.clone()));
        }
        warn!(artifact = %path.display(), "artifact missing; skipped");
        return Ok(None);
    }
    std::fs::read_to_string(path)
        .map(Some)
        .map_err(|e| GraftError::io(format!("read {}", path.display()), e))
}

fn write_artifact(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|e| GraftError::io(format!("write {}", path.display()), e))
}

/// A recorded patch whose marker is gone is re-applied when the file is back
/// to its pre-patch bytes or was replaced wholesale (an upstream upgrade).
/// Only a block that survives with its marker edited counts as drift.
fn check_drift(
    patch: &dyn ArtifactPatch,
    path: &Path,
    content: &str,
    current_digest: &str,
    manifest: &PatchManifest,
) -> Option<PatchOutcome> {
    let entry = manifest.find(patch.id(), path)?;
    if entry.pre_digest == current_digest {
        info!(
            patch = patch.id(),
            artifact = %path.display(),
            "artifact matches its pre-patch copy; re-applying"
        );
        return None;
    }
    if !patch.remnant_in(content) {
        info!(
            patch = patch.id(),
            artifact = %path.display(),
            "artifact replaced since it was patched; re-applying"
        );
        return None;
    }
    warn!(
        patch = patch.id(),
        artifact = %path.display(),
        marker = patch.marker(),
        "patched block edited by hand; not inserting again"
    );
    Some(PatchOutcome::Drifted)
}

fn record(
    manifest: &mut PatchManifest,
    patch: &dyn ArtifactPatch,
    path: &Path,
    pre_digest: String,
    new_content: &str,
) {
    manifest.upsert(ManifestEntry {
        patch_id: patch.id().to_string(),
        artifact: path.to_path_buf(),
        marker: patch.marker().to_string(),
        pre_digest,
        post_digest: content_digest(new_content),
        applied_at: Utc::now().to_rfc3339(),
    });
}
