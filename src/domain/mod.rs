//! Shared data model layer (structs/constants only).
//!
//! ## Purpose
//! - Keep report/record structs in one place.
//! - Avoid cyclic imports between the patch engine and the orchestrator.
//! - Make JSON output schema changes explicit and reviewable.
//!
//! ## Files
//! - `models.rs`: artifacts, backup records, step records, run report.
//!
//! ## Rule of thumb
//! Domain types should be data-only: no filesystem/process side effects.
//!
//! ## Compatibility note
//! Changes in these structs affect `--json` output and the persisted backup index.

pub mod models;
