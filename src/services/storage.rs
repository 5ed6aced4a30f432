use crate::error::{GraftError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "manifest.json";
const AUDIT_FILE: &str = "audit.jsonl";
const MANIFEST_VERSION: u32 = 1;

/// Record of one applied patch. Content scanning stays authoritative; this
/// only tells a restored artifact apart from one whose marker was edited away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub patch_id: String,
    pub artifact: PathBuf,
    pub marker: String,
    pub pre_digest: String,
    pub post_digest: String,
    pub applied_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchManifest {
    pub version: u32,
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

impl Default for PatchManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: Vec::new(),
        }
    }
}

impl PatchManifest {
    pub fn find(&self, patch_id: &str, artifact: &Path) -> Option<&ManifestEntry> {
        self.entries
            .iter()
            .find(|e| e.patch_id == patch_id && e.artifact == artifact)
    }

    pub fn upsert(&mut self, entry: ManifestEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.patch_id == entry.patch_id && e.artifact == entry.artifact)
        {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }
}

pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn manifest_path(state_dir: &Path) -> PathBuf {
    state_dir.join(MANIFEST_FILE)
}

pub fn load_manifest(state_dir: &Path) -> Result<PatchManifest> {
    let p = manifest_path(state_dir);
    if !p.exists() {
        return Ok(PatchManifest::default());
    }
    let raw = std::fs::read_to_string(&p)
        .map_err(|e| GraftError::io(format!("read {}", p.display()), e))?;
    serde_json::from_str(&raw).map_err(|e| GraftError::Config(format!("{}: {e}", p.display())))
}

pub fn save_manifest(state_dir: &Path, manifest: &PatchManifest) -> Result<()> {
    let p = manifest_path(state_dir);
    if let Some(parent) = p.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| GraftError::io(format!("create {}", parent.display()), e))?;
    }
    let raw = serde_json::to_string_pretty(manifest)
        .map_err(|e| GraftError::Config(e.to_string()))?;
    std::fs::write(&p, raw).map_err(|e| GraftError::io(format!("write {}", p.display()), e))
}

/// Appends one event to `audit.jsonl`. Best effort: failures are ignored.
pub fn audit(state_dir: &Path, action: &str, data: serde_json::Value) {
    let path = state_dir.join(AUDIT_FILE);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let event = serde_json::json!({
        "ts": Utc::now().to_rfc3339(),
        "action": action,
        "data": data
    });
    let line = format!("{}\n", event);
    let _ = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| std::io::Write::write_all(&mut f, line.as_bytes()));
}
