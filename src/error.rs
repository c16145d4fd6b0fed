//! Error types for mod lifecycle operations.

use std::path::PathBuf;
use std::time::Duration;

/// Result type for mod lifecycle operations.
pub type ModResult<T> = Result<T, ModError>;

/// Errors reported by install, uninstall and dependency resolution.
///
/// Every variant is recovered at the level of the install/uninstall call that
/// produced it; none of them is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum ModError {
    /// The manifest inside the archive could not be parsed at all.
    #[error("failed to parse manifest in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// The record was marked invalid when it was loaded.
    #[error("mod \"{id}\" is invalid")]
    Invalid { id: String },

    /// The mod targets a different host application.
    #[error("mod \"{id}\" is built for \"{target}\", not for the running host \"{host}\"")]
    TargetMismatch {
        id: String,
        target: String,
        host: String,
    },

    /// A dependency points back to a mod that is already being installed in
    /// the same call chain.
    #[error("recursive dependency detected: {}", format_chain(.chain))]
    Cycle { chain: Vec<String> },

    /// The dependency is unknown and no download link was given.
    #[error("dependency \"{id}\" is not downloaded and no download link was provided")]
    MissingDependency { id: String },

    /// The dependency is known but its version is out of range and no
    /// download link was given to upgrade it.
    #[error(
        "dependency \"{id}\" is present at version \"{found}\" which does not satisfy \"{range}\" and no download link was provided"
    )]
    VersionMismatch {
        id: String,
        found: String,
        range: String,
    },

    /// A fetched archive is not the mod (or version) the dependency asked for.
    #[error("downloaded dependency does not match \"{expected_id}\" {range}: {reason}")]
    Integrity {
        expected_id: String,
        range: String,
        reason: String,
    },

    /// Downloading a package failed.
    #[error("failed to download {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// An archive or filesystem operation failed.
    #[error("I/O error while {action}: {source:#}")]
    Io {
        action: String,
        #[source]
        source: anyhow::Error,
    },

    /// The mod is protected from removal and no force flag was given.
    #[error("mod \"{id}\" is protected from removal{}", blocked_by_suffix(.dependents))]
    Protected { id: String, dependents: Vec<String> },

    /// Another task is mid-transition on the same mod.
    #[error("mod \"{id}\" is busy with another operation")]
    Busy { id: String },

    /// A collaborator did not finish in time.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout { operation: String, elapsed: Duration },

    /// No record with this id is registered.
    #[error("mod \"{id}\" not found")]
    NotFound { id: String },

    /// A top-level install failed after some of its dependencies had already
    /// been installed. Those stay installed.
    #[error("{source} (partial install possible: {} already installed)", .installed.join(", "))]
    PartialInstall {
        installed: Vec<String>,
        #[source]
        source: Box<ModError>,
    },
}

impl ModError {
    pub(crate) fn io(action: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Io {
            action: action.into(),
            source,
        }
    }

    /// The underlying failure, looking through [`ModError::PartialInstall`].
    pub fn root(&self) -> &ModError {
        match self {
            Self::PartialInstall { source, .. } => source.root(),
            other => other,
        }
    }

    /// Ids of dependencies that stayed installed although the install failed.
    pub fn partially_installed(&self) -> &[String] {
        match self {
            Self::PartialInstall { installed, .. } => installed,
            _ => &[],
        }
    }
}

fn format_chain(chain: &[String]) -> String {
    chain
        .iter()
        .map(|id| format!("\"{}\"", id))
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn blocked_by_suffix(dependents: &[String]) -> String {
    if dependents.is_empty() {
        String::new()
    } else {
        format!(" (required by {})", dependents.join(", "))
    }
}
