use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::ModManager;
use crate::error::ModResult;
use crate::package::{InstallState, MANIFEST_ENTRY, Manifest, ModRecord};

const ARCHIVE_EXTENSIONS: &[&str] = &["qmod", "zip"];

/// Outcome of a directory scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub loaded: Vec<Arc<ModRecord>>,
    /// Archives whose manifest could not be read, with the reason.
    pub invalid: Vec<(PathBuf, String)>,
}

impl ModManager {
    /// Load every archive in the archives directory, then drop the temp dir.
    #[tracing::instrument(skip(self))]
    pub async fn scan(&self) -> ModResult<ScanReport> {
        let layout = &self.inner.layout;
        let runtime = &self.inner.runtime;
        let mut report = ScanReport::default();

        if runtime.exists(&layout.archives_dir) {
            let mut entries = runtime
                .read_dir(&layout.archives_dir)
                .map_err(|e| crate::error::ModError::io("scanning the archives directory", e))?;
            entries.sort();

            for path in entries {
                if runtime.is_dir(&path) || !is_archive(&path) {
                    continue;
                }
                let record = self.load_archive(&path).await;
                match record.invalid_reason() {
                    Some(reason) => report.invalid.push((path, reason.to_string())),
                    None => report.loaded.push(record),
                }
            }
        } else {
            debug!("Archives directory {:?} does not exist yet", layout.archives_dir);
        }

        if runtime.exists(&layout.temp_dir) {
            if let Err(e) = runtime.remove_dir_all(&layout.temp_dir) {
                warn!("Failed to remove temp directory {:?}: {:#}", layout.temp_dir, e);
            }
        }

        info!(
            "Loaded {} mod(s), {} invalid",
            report.loaded.len(),
            report.invalid.len()
        );
        Ok(report)
    }

    /// Parse an archive, register it and hydrate it from the activation store.
    ///
    /// Always returns a record; check [`ModRecord::is_valid`]. Invalid records
    /// are not registered.
    #[tracing::instrument(skip(self))]
    pub async fn load_archive(&self, path: &Path) -> Arc<ModRecord> {
        let record = self.parse_archive(path).await;
        if record.is_valid() {
            self.register(&record).await;
        }
        record
    }

    /// Parse an archive without registering it.
    pub(crate) async fn parse_archive(&self, path: &Path) -> Arc<ModRecord> {
        let archive = path.to_path_buf();
        let manifest = self
            .run_blocking("reading the manifest", move |runtime, extractor| {
                extractor.read_entry(runtime, &archive, MANIFEST_ENTRY)
            })
            .await;

        let record = match manifest {
            Ok(Some(bytes)) => match Manifest::parse(&bytes) {
                Ok(manifest) => ModRecord::new(manifest, path.to_path_buf()),
                Err(e) => ModRecord::invalid(path.to_path_buf(), e.to_string()),
            },
            Ok(None) => ModRecord::invalid(
                path.to_path_buf(),
                format!("archive has no {} entry", MANIFEST_ENTRY),
            ),
            Err(e) => ModRecord::invalid(path.to_path_buf(), e.to_string()),
        };

        match record.invalid_reason() {
            Some(reason) => warn!("Invalid mod archive {:?}: {}", path, reason),
            None => debug!(
                "Parsed mod {:?} version {} from {:?}",
                record.id(),
                record.version(),
                path
            ),
        }
        Arc::new(record)
    }

    /// Insert into the registry first, then restore persisted activation state.
    pub(crate) async fn register(&self, record: &Arc<ModRecord>) {
        self.inner.registry.insert(Arc::clone(record));
        if self.targets_host(record) {
            self.hydrate(record).await;
        }
    }

    /// Register a freshly downloaded record.
    ///
    /// Its files are not placed yet, so it enters the registry `Uninstalled`
    /// whatever the activation store says about an earlier copy.
    pub(crate) async fn register_download(&self, record: &Arc<ModRecord>) {
        if self.targets_host(record) {
            self.hydrate(record).await;
        }
        record.state_cell().set(InstallState::Uninstalled);
        self.inner.registry.insert(Arc::clone(record));
    }

    async fn hydrate(&self, record: &ModRecord) {
        match self.inner.activation.lookup(record.id()).await {
            Ok(Some(entry)) => {
                if entry.installed {
                    record.state_cell().set(InstallState::Installed);
                }
                record.set_uninstallable(entry.uninstallable);
                record.set_cover_image_filename(&entry.cover_image_filename);
            }
            Ok(None) => debug!("No activation record for {:?}", record.id()),
            Err(e) => warn!(
                "Failed to read activation record for {:?}: {:#}",
                record.id(),
                e
            ),
        }
    }

    pub(crate) fn targets_host(&self, record: &ModRecord) -> bool {
        record.target_package_id() == self.inner.host.package_id()
    }
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ARCHIVE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
