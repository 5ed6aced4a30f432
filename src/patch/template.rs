use super::anchor::Anchor;
use super::artifact::{apply_to_artifact, PatchContext, PatchOutcome};
use super::Patch;
use crate::domain::models::TargetArtifact;
use crate::error::Result;

/// A rendered fragment and the section title that identifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFragment {
    pub title: String,
    pub body: String,
}

/// Injects `fragment` into the template next to `anchor`, usually the last
/// closing form tag. Guarded by the fragment's section title.
pub fn inject(
    template: &TargetArtifact,
    fragment: &TemplateFragment,
    anchor: &Anchor,
    ctx: &mut PatchContext<'_>,
) -> Result<PatchOutcome> {
    let patch = Patch::new(
        "template-fragment",
        fragment.title.clone(),
        anchor.clone(),
        fragment.body.clone(),
    )?;
    apply_to_artifact(template, &patch, ctx)
}
