//! Mod package model
//!
//! This module provides the parsed manifest, the per-mod record with its
//! lifecycle state, the registry of downloaded mods and version matching.

pub mod manifest;
mod record;
mod registry;
mod state;
mod version;

pub use manifest::{Dependency, FileCopy, MANIFEST_ENTRY, Manifest};
pub use record::ModRecord;
pub use registry::ModRegistry;
pub use state::{InstallState, StateCell};
pub use version::{VersionMatcher, parse_version};
