//! Idempotent patch engine.
//!
//! ## Files
//! - `detector.rs`: marker detection (`already_applied`).
//! - `anchor.rs`: anchor-based block insertion.
//! - `artifact.rs`: file-level apply path: detect, insert, back up, write, record.
//! - `registry.rs`: route table / middleware list registration.
//! - `template.rs`: rendered fragment injection into a view template.
//!
//! ## Rules
//! - Detection always runs before any mutation.
//! - A missed anchor never writes; the artifact stays byte-for-byte unchanged.
//! - The orchestrator only sees [`artifact::PatchOutcome`], so a structural
//!   patcher can implement [`ArtifactPatch`] without touching it.

pub mod anchor;
pub mod artifact;
pub mod detector;
pub mod registry;
pub mod template;

use crate::error::{GraftError, Result};
use anchor::{Anchor, Insertion};

/// Anything that can recognise and apply itself to an artifact's content.
pub trait ArtifactPatch {
    fn id(&self) -> &str;
    fn marker(&self) -> &str;
    fn anchor_pattern(&self) -> &str;
    fn detect(&self, content: &str) -> bool;
    /// True when the inserted block is still there with its marker edited out.
    fn remnant_in(&self, content: &str) -> bool;
    fn apply(&self, content: &str) -> Insertion;
}

/// An inserted block plus its marker and anchor rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub id: String,
    pub marker: String,
    pub anchor: Anchor,
    pub block: String,
}

impl Patch {
    pub fn new(
        id: impl Into<String>,
        marker: impl Into<String>,
        anchor: Anchor,
        block: impl Into<String>,
    ) -> Result<Self> {
        let patch = Self {
            id: id.into(),
            marker: marker.into(),
            anchor,
            block: block.into(),
        };
        let invalid = |reason: &str| GraftError::InvalidPatch {
            id: patch.id.clone(),
            reason: reason.to_string(),
        };
        if patch.marker.trim().is_empty() {
            return Err(invalid("marker is empty"));
        }
        if patch.anchor.pattern.is_empty() {
            return Err(invalid("anchor pattern is empty"));
        }
        if patch.block.trim().is_empty() {
            return Err(invalid("block is empty"));
        }
        // otherwise a second run could not see the first one
        if !patch.block.contains(&patch.marker) {
            return Err(invalid("block does not contain its marker"));
        }
        Ok(patch)
    }
}

impl ArtifactPatch for Patch {
    fn id(&self) -> &str {
        &self.id
    }

    fn marker(&self) -> &str {
        &self.marker
    }

    fn anchor_pattern(&self) -> &str {
        &self.anchor.pattern
    }

    fn detect(&self, content: &str) -> bool {
        detector::already_applied(content, &self.marker)
    }

    fn remnant_in(&self, content: &str) -> bool {
        detector::remnant_present(content, &self.block, &self.marker)
    }

    fn apply(&self, content: &str) -> Insertion {
        anchor::insert(content, &self.anchor, &self.block)
    }
}
