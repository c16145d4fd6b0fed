//! Dependency resolution.
//!
//! Dependencies of one mod are resolved strictly in declaration order, each
//! one completing (including any recursive install) before the next starts.
//! The [`Branch`] threaded through the recursion holds the ids currently
//! being installed in this call chain, which is all cycle detection needs.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::ModManager;
use super::uninstall::UninstallOptions;
use crate::error::{ModError, ModResult};
use crate::package::{Dependency, InstallState, ModRecord, VersionMatcher};
use crate::staging::StagingArea;

/// Install chain of one top-level call.
#[derive(Debug, Default)]
pub(crate) struct Branch {
    stack: Vec<String>,
    /// Dependencies whose install completed during this call.
    pub(crate) completed: Vec<String>,
}

impl Branch {
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.stack.iter().any(|entry| entry == id)
    }

    pub(crate) fn push(&mut self, id: &str) {
        self.stack.push(id.to_string());
    }

    pub(crate) fn pop(&mut self) {
        self.stack.pop();
    }

    fn chain_to(&self, id: &str) -> Vec<String> {
        let mut chain = self.stack.clone();
        chain.push(id.to_string());
        chain
    }
}

/// Per-id locks serialising dependency downloads.
#[derive(Default)]
pub(super) struct FetchLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FetchLocks {
    pub(super) fn for_id(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id.to_string()).or_default())
    }
}

impl ModManager {
    /// Make `dependency` available and installed, fetching it when needed.
    pub(crate) fn resolve_dependency<'a>(
        &'a self,
        dependency: Dependency,
        branch: &'a mut Branch,
    ) -> BoxFuture<'a, ModResult<()>> {
        async move {
            let id = dependency.id.as_str();
            let range = dependency.version_range.as_str();

            if branch.contains(id) {
                let chain = branch.chain_to(id);
                let err = ModError::Cycle { chain };
                error!("{}", err);
                return Err(err);
            }

            debug!("Preparing dependency {:?} {}", id, range);
            match self.inner.registry.get(id) {
                Some(existing) if VersionMatcher::satisfies(existing.version(), range) => {
                    if existing.is_installed() {
                        debug!("Dependency {:?} {} is already installed", id, existing.version());
                        return Ok(());
                    }
                    info!("Installing dependency {:?} {}", id, existing.version());
                    self.install_with_branch(existing, branch).await
                }
                Some(existing) => {
                    let Some(url) = dependency.download_url() else {
                        let err = ModError::VersionMismatch {
                            id: id.to_string(),
                            found: existing.version().to_string(),
                            range: range.to_string(),
                        };
                        error!("{}", err);
                        return Err(err);
                    };

                    info!(
                        "Dependency {:?} is at {} which does not satisfy {}, replacing it",
                        id,
                        existing.version(),
                        range
                    );
                    let options = UninstallOptions::disable().with_force().without_cascade();
                    self.uninstall_record(existing, options).await?;
                    self.fetch_dependency(&dependency, url, branch).await
                }
                None => {
                    let Some(url) = dependency.download_url() else {
                        let err = ModError::MissingDependency { id: id.to_string() };
                        error!("{}", err);
                        return Err(err);
                    };
                    info!("Dependency {:?} is not downloaded, fetching it", id);
                    self.fetch_dependency(&dependency, url, branch).await
                }
            }
        }
        .boxed()
    }

    /// Download a dependency, verify it is what was asked for, then install it.
    ///
    /// Fetches of one id are serialised. A call that waited for another fetch
    /// of the same id reuses what that fetch registered when it satisfies the
    /// range. Nothing is registered until the downloaded archive passes
    /// verification; the download is removed on any failure.
    async fn fetch_dependency(
        &self,
        dependency: &Dependency,
        url: &str,
        branch: &mut Branch,
    ) -> ModResult<()> {
        let id = dependency.id.as_str();
        let lock = self.inner.fetch_locks.for_id(id);
        let fetching = lock.lock().await;

        if let Some(existing) = self.inner.registry.get(id) {
            if VersionMatcher::satisfies(existing.version(), &dependency.version_range) {
                drop(fetching);
                debug!("Dependency {:?} {} was fetched meanwhile", id, existing.version());
                return self.install_with_branch(existing, branch).await;
            }
            if existing.state() != InstallState::Uninstalled {
                let err = ModError::Busy { id: id.to_string() };
                warn!("Not replacing {:?}, it is {}", id, existing.state());
                return Err(err);
            }
        }

        let slot = self.download_slot();
        let dest = slot.join(format!("{}.qmod", id));
        let mut staging = StagingArea::new(self.inner.runtime.as_ref());
        staging.track(&slot);

        self.fetch_archive(url, &dest).await?;

        let record = self.parse_archive(&dest).await;
        verify_download(&record, dependency)?;
        staging.release(&slot);
        drop(staging);

        self.register_download(&record).await;
        drop(fetching);
        self.install_with_branch(record, branch).await
    }

    /// Download `url` to `dest`, bounded by the fetch timeout.
    pub(crate) async fn fetch_archive(&self, url: &str, dest: &std::path::Path) -> ModResult<()> {
        let fetch = self.inner.fetcher.fetch(url, dest);
        match tokio::time::timeout(self.inner.fetch_timeout, fetch).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ModError::Fetch {
                url: url.to_string(),
                reason: format!("{:#}", e),
            }),
            Err(_) => Err(ModError::Timeout {
                operation: format!("download of {}", url),
                elapsed: self.inner.fetch_timeout,
            }),
        }
    }
}

fn verify_download(record: &ModRecord, dependency: &Dependency) -> ModResult<()> {
    let integrity = |reason: String| {
        let err = ModError::Integrity {
            expected_id: dependency.id.clone(),
            range: dependency.version_range.clone(),
            reason,
        };
        error!("{}", err);
        Err(err)
    };

    if let Some(reason) = record.invalid_reason() {
        return integrity(format!("the archive could not be read: {}", reason));
    }
    if record.id() != dependency.id {
        return integrity(format!("the archive contains mod \"{}\"", record.id()));
    }
    if !VersionMatcher::satisfies(record.version(), &dependency.version_range) {
        return integrity(format!("the archive contains version {}", record.version()));
    }
    Ok(())
}
