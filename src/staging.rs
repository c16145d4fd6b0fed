use log::debug;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// Temporary paths created while loading or installing a mod.
///
/// Every tracked path is removed when the area is dropped, unless it was
/// released first with [`StagingArea::release`].
pub struct StagingArea<'a> {
    runtime: &'a dyn Runtime,
    paths: Vec<PathBuf>,
}

impl<'a> StagingArea<'a> {
    pub fn new(runtime: &'a dyn Runtime) -> Self {
        Self {
            runtime,
            paths: Vec::new(),
        }
    }

    /// Track a path for removal.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Stop tracking a path, e.g. once the file has been moved to its final place.
    pub fn release(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Remove every tracked path now. Failures are logged and ignored.
    pub fn cleanup(&mut self) {
        for path in self.paths.drain(..).rev() {
            if !self.runtime.exists(&path) {
                continue;
            }
            debug!("Cleaning up: {:?}", path);
            let result = if self.runtime.is_dir(&path) {
                self.runtime.remove_dir_all(&path)
            } else {
                self.runtime.remove_file(&path)
            };
            if let Err(e) = result {
                debug!("Failed to clean up {:?}: {:#}", path, e);
            }
        }
    }
}

impl Drop for StagingArea<'_> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
