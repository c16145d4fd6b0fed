use anyhow::{Context, Result};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::resolve::Branch;
use super::{ModManager, destination_in};
use crate::activation::ActivationEntry;
use crate::archive::ArchiveExtractor;
use crate::error::{ModError, ModResult};
use crate::package::{FileCopy, InstallState, ModRecord};
use crate::runtime::Runtime;
use crate::staging::StagingArea;

impl ModManager {
    /// Install a registered mod and everything it depends on.
    #[tracing::instrument(skip(self))]
    pub async fn install(&self, id: &str) -> ModResult<()> {
        let record = self.require(id)?;
        self.install_record(record).await
    }

    /// Install `record` as a top-level call.
    ///
    /// When the install fails after some dependencies were already installed,
    /// the error is wrapped in [`ModError::PartialInstall`]; those
    /// dependencies stay installed.
    pub async fn install_record(&self, record: Arc<ModRecord>) -> ModResult<()> {
        let mut branch = Branch::default();
        match self.install_with_branch(record, &mut branch).await {
            Err(source) if !branch.completed.is_empty() => {
                warn!(
                    "Install failed, partial install possible: {} stay installed",
                    branch.completed.join(", ")
                );
                Err(ModError::PartialInstall {
                    installed: branch.completed,
                    source: Box::new(source),
                })
            }
            result => result,
        }
    }

    /// Download an archive, register it and install it.
    #[tracing::instrument(skip(self))]
    pub async fn install_from_url(&self, file_name: &str, url: &str) -> ModResult<Arc<ModRecord>> {
        let slot = self.download_slot();
        let dest = slot.join(file_name);
        let mut staging = StagingArea::new(self.inner.runtime.as_ref());
        staging.track(&slot);

        self.fetch_archive(url, &dest).await?;

        let record = self.parse_archive(&dest).await;
        if let Some(reason) = record.invalid_reason() {
            return Err(ModError::Parse {
                path: dest,
                reason: reason.to_string(),
            });
        }
        staging.release(&slot);
        drop(staging);

        self.register_download(&record).await;
        self.install_record(Arc::clone(&record)).await?;
        Ok(record)
    }

    pub(crate) fn install_with_branch<'a>(
        &'a self,
        record: Arc<ModRecord>,
        branch: &'a mut Branch,
    ) -> BoxFuture<'a, ModResult<()>> {
        async move {
            let id = record.id().to_string();
            if !record.is_valid() {
                return Err(ModError::Invalid {
                    id: record.path().display().to_string(),
                });
            }
            let host = self.inner.host.package_id();
            if record.target_package_id() != host {
                let err = ModError::TargetMismatch {
                    id,
                    target: record.target_package_id().to_string(),
                    host,
                };
                warn!("{}", err);
                return Err(err);
            }

            if !self.begin_install(&record).await? {
                debug!("Mod {:?} is already installed", id);
                return Ok(());
            }
            info!("Installing mod {:?} version {}", id, record.version());

            branch.push(&id);
            for dependency in record.dependencies().to_vec() {
                if let Err(e) = self.resolve_dependency(dependency, branch).await {
                    branch.pop();
                    record.state_cell().set(InstallState::Uninstalled);
                    error!("Failed to install {:?}: {}", id, e);
                    return Err(e);
                }
            }

            let guard = record.install_lock().lock().await;
            let placed = self.place_files(&record).await;
            branch.pop();
            if let Err(e) = placed {
                self.discard_placed_files(&record).await;
                record.state_cell().set(InstallState::Uninstalled);
                error!("Failed to install {:?}: {}", id, e);
                return Err(e);
            }
            record.state_cell().set(InstallState::Installed);

            if self.targets_host(&record) {
                if let Err(e) = self.sync_activation(&record).await {
                    warn!("Failed to update activation record for {:?}: {:#}", id, e);
                }
            }
            drop(guard);

            info!("Installed mod {:?} version {}", id, record.version());
            branch.completed.push(id);
            Ok(())
        }
        .boxed()
    }

    /// Move `record` from `Uninstalled` to `Installing`.
    ///
    /// Returns `false` when the record is (or concurrently became) installed.
    async fn begin_install(&self, record: &ModRecord) -> ModResult<bool> {
        let cell = record.state_cell();
        loop {
            let observed = match cell.transition(InstallState::Uninstalled, InstallState::Installing)
            {
                Ok(()) => return Ok(true),
                Err(InstallState::Installed) => return Ok(false),
                Err(InstallState::Invalid) => {
                    return Err(ModError::Invalid {
                        id: record.id().to_string(),
                    });
                }
                Err(observed) => observed,
            };

            debug!("Mod {:?} is {}, waiting for it to settle", record.id(), observed);
            match cell.settled(self.inner.operation_timeout).await {
                None => {
                    return Err(ModError::Timeout {
                        operation: format!("waiting for {:?} to finish {}", record.id(), observed),
                        elapsed: self.inner.operation_timeout,
                    });
                }
                Some(_) if observed == InstallState::Uninstalling => continue,
                Some(InstallState::Installed) => return Ok(false),
                Some(_) => {
                    return Err(ModError::Busy {
                        id: record.id().to_string(),
                    });
                }
            }
        }
    }

    /// Extract the record's files and move them to their destinations.
    async fn place_files(&self, record: &ModRecord) -> ModResult<()> {
        let layout = &self.inner.layout;
        let plan = PlacementPlan {
            archive: record.path(),
            staging_root: layout.staging_dir(&record.display_stem()),
            mods_dir: layout.mods_dir.clone(),
            libs_dir: layout.libs_dir.clone(),
            mod_files: record.mod_files().to_vec(),
            library_files: record.library_files().to_vec(),
            file_copies: record.file_copies().to_vec(),
        };
        self.run_blocking("installing files", move |runtime, extractor| {
            plan.execute(runtime, extractor)
        })
        .await
    }

    /// Remove whatever a failed placement already put in place, so an
    /// uninstalled record leaves no files behind.
    async fn discard_placed_files(&self, record: &ModRecord) {
        if let Err(e) = self.remove_files(record).await {
            warn!(
                "Failed to clean up files of {:?} after a failed install: {}",
                record.id(),
                e
            );
        }
    }

    /// Relocate the archive, extract the cover image and write the
    /// activation record.
    pub(crate) async fn sync_activation(&self, record: &ModRecord) -> Result<()> {
        let layout = &self.inner.layout;
        let runtime = &self.inner.runtime;
        let stem = record.display_stem();

        let target = layout.archive_path(&stem);
        let current = record.path();
        if current != target {
            runtime.create_dir_all(&layout.archives_dir)?;
            if runtime.exists(&target) {
                runtime.remove_file(&target)?;
            }
            runtime
                .move_file(&current, &target)
                .with_context(|| format!("Failed to move archive to {:?}", target))?;
            record.set_path(&target);
            debug!("Moved archive of {:?} to {:?}", record.id(), target);
        }

        let cover = record.manifest().cover_image.clone();
        if !cover.is_empty() {
            let file_name = format!("{}_{}", stem, cover.replace(['/', '\\'], "_"));
            let dest = layout.archives_dir.join(&file_name);
            let archive = target.clone();
            let extracted = self
                .run_blocking("extracting the cover image", move |runtime, extractor| {
                    extract_cover(runtime, extractor, &archive, &cover, &dest)
                })
                .await?;
            if extracted {
                record.set_cover_image_filename(&file_name);
            }
        }

        self.inner
            .activation
            .upsert(ActivationEntry::for_record(record))
            .await
    }
}

/// Everything the blocking file-placement step needs, owned.
struct PlacementPlan {
    archive: PathBuf,
    staging_root: PathBuf,
    mods_dir: PathBuf,
    libs_dir: PathBuf,
    mod_files: Vec<String>,
    library_files: Vec<String>,
    file_copies: Vec<FileCopy>,
}

impl PlacementPlan {
    fn execute(&self, runtime: &dyn Runtime, extractor: &dyn ArchiveExtractor) -> Result<()> {
        let mut staging = StagingArea::new(runtime);
        staging.track(&self.staging_root);

        self.place_into(
            runtime,
            extractor,
            &self.mod_files,
            &self.staging_root.join("Mods"),
            &self.mods_dir,
        )?;
        self.place_into(
            runtime,
            extractor,
            &self.library_files,
            &self.staging_root.join("Libs"),
            &self.libs_dir,
        )?;
        self.copy_files(runtime, extractor, &self.staging_root.join("FileCopies"))
    }

    fn place_into(
        &self,
        runtime: &dyn Runtime,
        extractor: &dyn ArchiveExtractor,
        names: &[String],
        staging: &Path,
        target_dir: &Path,
    ) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let extracted = extractor.extract_entries(runtime, &self.archive, names, staging)?;
        for (name, path) in names.iter().zip(extracted) {
            let dest = destination_in(target_dir, name);
            replace_file(runtime, &path, &dest, true)?;
        }
        Ok(())
    }

    fn copy_files(
        &self,
        runtime: &dyn Runtime,
        extractor: &dyn ArchiveExtractor,
        staging: &Path,
    ) -> Result<()> {
        if self.file_copies.is_empty() {
            return Ok(());
        }
        let mut names: Vec<String> = self
            .file_copies
            .iter()
            .map(|copy| copy.source_name.clone())
            .collect();
        names.sort();
        names.dedup();

        let extracted = extractor.extract_entries(runtime, &self.archive, &names, staging)?;
        for copy in &self.file_copies {
            let Some(index) = names.iter().position(|n| *n == copy.source_name) else {
                continue;
            };
            replace_file(runtime, &extracted[index], &copy.destination, false)?;
        }
        Ok(())
    }
}

/// Put `from` at `to`, replacing whatever is there and creating parents.
fn replace_file(runtime: &dyn Runtime, from: &Path, to: &Path, move_source: bool) -> Result<()> {
    if let Some(parent) = to.parent() {
        runtime.create_dir_all(parent)?;
    }
    if runtime.exists(to) {
        runtime
            .remove_file(to)
            .with_context(|| format!("Failed to replace {:?}", to))?;
    }
    if move_source {
        runtime
            .move_file(from, to)
            .with_context(|| format!("Failed to place {:?}", to))?;
    } else {
        runtime
            .copy(from, to)
            .with_context(|| format!("Failed to copy to {:?}", to))?;
    }
    debug!("Placed {:?}", to);
    Ok(())
}

/// Returns whether the archive contained the cover.
fn extract_cover(
    runtime: &dyn Runtime,
    extractor: &dyn ArchiveExtractor,
    archive: &Path,
    cover: &str,
    dest: &Path,
) -> Result<bool> {
    match extractor.read_entry(runtime, archive, cover)? {
        Some(bytes) => {
            runtime.write(dest, &bytes)?;
            Ok(true)
        }
        None => {
            debug!("Cover image {:?} is not in {:?}", cover, archive);
            Ok(false)
        }
    }
}
