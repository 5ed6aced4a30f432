//! Service layer: install workflow and its side-effect helpers.
//!
//! ## Service map
//! - `orchestrator.rs`: step table, state machine, failure policy, run report.
//! - `backup.rs`: per-run pre-mutation copies and backup index.
//! - `migration.rs`: guarded schema migration units and their files.
//! - `storage.rs`: patch manifest persistence + audit log.
//! - `restore.rs`: manual restoration guidance for `uninstall`.
//! - `external.rs`: command runner and privilege probe seams.
//! - `config.rs`: TOML config with defaults.
//! - `output.rs`: JSON/text output helpers.
//!
//! ## Conventions
//! - Side effects stay explicit and localized.
//! - Keep command handlers thin; delegate to services.

pub mod backup;
pub mod config;
pub mod external;
pub mod migration;
pub mod orchestrator;
pub mod output;
pub mod restore;
pub mod storage;
