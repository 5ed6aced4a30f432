//! graft: installs the menu protection add-on into a panel application by
//! patching its source files in place, safely re-runnable.
//!
//! The binary in `main.rs` is a thin shell over [`commands::dispatch`].

pub mod cli;
pub mod commands;
pub mod domain;
pub mod error;
pub mod feature;
pub mod patch;
pub mod services;
