use anyhow::Result;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use super::{ModManager, destination_in};
use crate::activation::ActivationEntry;
use crate::error::{ModError, ModResult};
use crate::package::{InstallState, ModRecord};
use crate::runtime::Runtime;

/// How far an uninstall goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UninstallOptions {
    /// Keep the archive and registry entry, only remove installed files.
    pub only_disable: bool,
    /// Ignore the record's protection flag.
    pub force: bool,
    /// Disable dependents and sweep unused libraries afterwards.
    pub cascade: bool,
}

impl Default for UninstallOptions {
    fn default() -> Self {
        Self::disable()
    }
}

impl UninstallOptions {
    pub fn disable() -> Self {
        Self {
            only_disable: true,
            force: false,
            cascade: true,
        }
    }

    /// Full removal: the archive is deleted and the record unregistered.
    pub fn delete() -> Self {
        Self {
            only_disable: false,
            ..Self::disable()
        }
    }

    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn without_cascade(mut self) -> Self {
        self.cascade = false;
        self
    }
}

impl ModManager {
    /// Disable or delete a registered mod.
    #[tracing::instrument(skip(self))]
    pub async fn uninstall(&self, id: &str, options: UninstallOptions) -> ModResult<()> {
        let record = self.require(id)?;
        self.uninstall_record(record, options).await
    }

    pub(crate) fn uninstall_record(
        &self,
        record: Arc<ModRecord>,
        options: UninstallOptions,
    ) -> BoxFuture<'_, ModResult<()>> {
        async move {
            let id = record.id().to_string();
            if !record.is_valid() {
                return Err(ModError::Invalid {
                    id: record.path().display().to_string(),
                });
            }
            if !record.uninstallable() && !options.force {
                let dependents = self
                    .inner
                    .registry
                    .dependents_of(&id, true)
                    .iter()
                    .map(|r| r.id().to_string())
                    .collect();
                let err = ModError::Protected { id, dependents };
                warn!("{}", err);
                return Err(err);
            }

            let guard = record.install_lock().lock().await;
            let previous = record.state();
            match previous {
                InstallState::Uninstalled if options.only_disable => {
                    debug!("Mod {:?} is already disabled", id);
                    return Ok(());
                }
                InstallState::Installing | InstallState::Uninstalling => {
                    return Err(ModError::Busy { id });
                }
                InstallState::Installed => {
                    record
                        .state_cell()
                        .transition(InstallState::Installed, InstallState::Uninstalling)
                        .map_err(|_| ModError::Busy { id: id.clone() })?;
                }
                _ => {}
            }
            info!(
                "{} mod {:?}",
                if options.only_disable { "Disabling" } else { "Deleting" },
                id
            );

            if let Err(e) = self.remove_files(&record).await {
                record.state_cell().set(previous);
                warn!("Failed to remove files of {:?}: {}", id, e);
                return Err(e);
            }
            record.state_cell().set(InstallState::Uninstalled);

            if self.targets_host(&record) {
                let synced = if options.only_disable {
                    self.inner
                        .activation
                        .upsert(ActivationEntry::for_record(&record))
                        .await
                } else {
                    self.inner.activation.remove(&id).await.map(|_| ())
                };
                if let Err(e) = synced {
                    warn!("Failed to update activation record for {:?}: {:#}", id, e);
                }
            }

            if !options.only_disable {
                self.inner.registry.remove_if_same(&record);
                self.delete_archive(&record)?;
            }
            drop(guard);

            if options.cascade {
                self.clean_dependents(&id).await;
                if !record.is_library() {
                    self.clean_unused_libraries().await;
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Remove mod files, unshared libraries and file copies of `record`.
    pub(super) async fn remove_files(&self, record: &ModRecord) -> ModResult<()> {
        let layout = &self.inner.layout;
        let mut targets: Vec<PathBuf> = record
            .mod_files()
            .iter()
            .map(|name| destination_in(&layout.mods_dir, name))
            .collect();

        for library in record.library_files() {
            let name = super::entry_file_name(library);
            match self.inner.registry.library_in_use(library, record.id()) {
                Some(user) => info!("Keeping library {:?}, still used by {:?}", name, user),
                None => {
                    debug!("Library {:?} is no longer used", name);
                    targets.push(destination_in(&layout.libs_dir, library));
                }
            }
        }
        targets.extend(record.file_copies().iter().map(|c| c.destination.clone()));

        self.run_blocking("removing files", move |runtime, _| {
            for path in &targets {
                remove_if_exists(runtime, path)?;
            }
            Ok(())
        })
        .await
    }

    fn delete_archive(&self, record: &ModRecord) -> ModResult<()> {
        let runtime = self.inner.runtime.as_ref();
        let cover = record.cover_image_filename();
        if !cover.is_empty() {
            let path = self.inner.layout.archives_dir.join(&cover);
            if let Err(e) = remove_if_exists(runtime, &path) {
                warn!("Failed to remove cover image {:?}: {:#}", path, e);
            }
        }
        let archive = record.path();
        remove_if_exists(runtime, &archive)
            .map_err(|e| ModError::io(format!("deleting {}", archive.display()), e))?;
        info!("Deleted archive {:?}", archive);
        Ok(())
    }
}

fn remove_if_exists(runtime: &dyn Runtime, path: &std::path::Path) -> Result<()> {
    if runtime.exists(path) {
        runtime.remove_file(path)?;
        debug!("Removed {:?}", path);
    }
    Ok(())
}
