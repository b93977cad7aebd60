//! simmer library crate.
//!
//! simmer applies and reverts *recipes* — declarative, versioned sets of
//! file edits — when packages enter or leave a project, and re-applies
//! updated recipe versions as three-way merges against locally modified
//! files.
//!
//! The primary interface is the `simmer` binary; this lib.rs exposes the
//! engine so integration tests (and embedding package managers) can drive
//! the patch machinery, configurators, and orchestration directly.

pub mod blob;
pub mod config;
pub mod configurator;
pub mod install;
pub mod model;
pub mod patch;
pub mod telemetry;
pub mod update;
pub mod vcs;
