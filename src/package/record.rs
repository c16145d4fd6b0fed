//! In-memory representation of one downloaded mod archive.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use super::manifest::{Dependency, FileCopy, Manifest};
use super::state::{InstallState, StateCell};

/// A parsed mod archive plus its lifecycle flags.
///
/// Manifest data is immutable after construction; the archive path, the
/// cover image filename, the install state and the protection flag change
/// over the record's life and are individually synchronised.
#[derive(Debug)]
pub struct ModRecord {
    manifest: Manifest,
    invalid_reason: Option<String>,
    path: RwLock<PathBuf>,
    cover_image_filename: RwLock<String>,
    state: StateCell,
    uninstallable: AtomicBool,
    /// Guards the filesystem-mutation section of install and uninstall.
    install_lock: tokio::sync::Mutex<()>,
}

impl ModRecord {
    /// A valid record for a successfully parsed manifest, not yet installed.
    pub fn new(manifest: Manifest, path: PathBuf) -> Self {
        Self {
            manifest,
            invalid_reason: None,
            path: RwLock::new(path),
            cover_image_filename: RwLock::new(String::new()),
            state: StateCell::new(InstallState::Uninstalled),
            uninstallable: AtomicBool::new(true),
            install_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// A record whose manifest could not be parsed.
    pub fn invalid(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            manifest: Manifest::default(),
            invalid_reason: Some(reason.into()),
            path: RwLock::new(path),
            cover_image_filename: RwLock::new(String::new()),
            state: StateCell::new(InstallState::Invalid),
            uninstallable: AtomicBool::new(true),
            install_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    pub fn target_package_id(&self) -> &str {
        &self.manifest.package_id
    }

    pub fn mod_files(&self) -> &[String] {
        &self.manifest.mod_files
    }

    pub fn library_files(&self) -> &[String] {
        &self.manifest.library_files
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.manifest.dependencies
    }

    pub fn file_copies(&self) -> &[FileCopy] {
        &self.manifest.file_copies
    }

    pub fn is_library(&self) -> bool {
        self.manifest.is_library
    }

    pub fn is_valid(&self) -> bool {
        self.invalid_reason.is_none()
    }

    pub fn invalid_reason(&self) -> Option<&str> {
        self.invalid_reason.as_deref()
    }

    pub fn path(&self) -> PathBuf {
        self.path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_path(&self, path: &Path) {
        *self.path.write().unwrap_or_else(PoisonError::into_inner) = path.to_path_buf();
    }

    pub fn cover_image_filename(&self) -> String {
        self.cover_image_filename
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_cover_image_filename(&self, name: &str) {
        *self
            .cover_image_filename
            .write()
            .unwrap_or_else(PoisonError::into_inner) = name.to_string();
    }

    pub fn state(&self) -> InstallState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> &StateCell {
        &self.state
    }

    pub fn is_installed(&self) -> bool {
        self.state.get() == InstallState::Installed
    }

    /// `false` marks the record as protected from removal.
    pub fn uninstallable(&self) -> bool {
        self.uninstallable.load(Ordering::SeqCst)
    }

    pub fn set_uninstallable(&self, value: bool) {
        self.uninstallable.store(value, Ordering::SeqCst);
    }

    pub(crate) fn install_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.install_lock
    }

    /// Whether this record declares a dependency on `id`.
    pub fn depends_on(&self, id: &str) -> bool {
        self.manifest.dependencies.iter().any(|dep| dep.id == id)
    }

    /// Archive file name without extension, spaces replaced by underscores.
    pub fn display_stem(&self) -> String {
        let path = self.path();
        path.file_stem()
            .map(|s| s.to_string_lossy().replace(' ', "_"))
            .unwrap_or_default()
    }
}
