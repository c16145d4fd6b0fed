//! Mod lifecycle orchestration.
//!
//! [`ModManager`] owns the registry of downloaded mods and drives every
//! lifecycle operation against it:
//!
//! - `load` - parse archives and register them (`load_archive`, `scan`)
//! - `resolve` - dependency resolution with cycle detection
//! - `install` - state transition, file placement, activation sync
//! - `uninstall` - file removal, library reference counting, cascade
//! - `cleanup` - dependent and unused-library sweeps
//! - `core_mods` - core mod index, missing/outdated detection and repair
//!
//! The manager is cheap to clone; clones share the same registry and
//! collaborators, so lifecycle operations can be spawned as detached tasks.

mod cleanup;
mod core_mods;
mod install;
mod load;
mod resolve;
mod uninstall;

use anyhow::anyhow;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::activation::ActivationStore;
use crate::archive::{ArchiveExtractor, ZipExtractor};
use crate::config::{Config, Layout};
use crate::download::{Fetcher, HttpFetcher};
use crate::error::{ModError, ModResult};
use crate::host::{ConfiguredHost, HostBridge};
use crate::package::{ModRecord, ModRegistry};
use crate::runtime::Runtime;
use resolve::FetchLocks;

pub use core_mods::{CoreModInfo, CoreModReport};
pub use load::ScanReport;
pub use uninstall::UninstallOptions;

/// The external services the manager depends on.
pub struct Collaborators {
    pub runtime: Arc<dyn Runtime>,
    pub extractor: Arc<dyn ArchiveExtractor>,
    pub fetcher: Arc<dyn Fetcher>,
    pub host: Arc<dyn HostBridge>,
}

impl Collaborators {
    /// The production set: zip archives, HTTP downloads, configured host.
    pub fn from_config(config: &Config, runtime: Arc<dyn Runtime>) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(
            Arc::clone(&runtime),
            config.http_client()?,
            config.fetch_timeout,
        );
        let host = ConfiguredHost::new(
            config.host_package_id.clone(),
            config.host_version.clone(),
            config.restart_command.clone(),
        );
        Ok(Self {
            runtime,
            extractor: Arc::new(ZipExtractor),
            fetcher: Arc::new(fetcher),
            host: Arc::new(host),
        })
    }
}

struct Inner {
    runtime: Arc<dyn Runtime>,
    extractor: Arc<dyn ArchiveExtractor>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn HostBridge>,
    layout: Layout,
    registry: ModRegistry,
    activation: ActivationStore,
    core_index_url: String,
    fetch_timeout: Duration,
    operation_timeout: Duration,
    fetch_locks: FetchLocks,
    download_seq: AtomicU64,
}

#[derive(Clone)]
pub struct ModManager {
    inner: Arc<Inner>,
}

impl ModManager {
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        let activation = ActivationStore::new(
            Arc::clone(&collaborators.runtime),
            config.layout.activation_file.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                runtime: collaborators.runtime,
                extractor: collaborators.extractor,
                fetcher: collaborators.fetcher,
                host: collaborators.host,
                layout: config.layout.clone(),
                registry: ModRegistry::new(),
                activation,
                core_index_url: config.core_index_url.clone(),
                fetch_timeout: config.fetch_timeout,
                operation_timeout: config.operation_timeout,
                fetch_locks: FetchLocks::default(),
                download_seq: AtomicU64::new(0),
            }),
        }
    }

    /// A manager wired to the real archive, network and host implementations.
    pub fn from_config(config: &Config, runtime: Arc<dyn Runtime>) -> anyhow::Result<Self> {
        let collaborators = Collaborators::from_config(config, runtime)?;
        Ok(Self::new(config, collaborators))
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn registry(&self) -> &ModRegistry {
        &self.inner.registry
    }

    pub fn activation(&self) -> &ActivationStore {
        &self.inner.activation
    }

    pub fn get(&self, id: &str) -> Option<Arc<ModRecord>> {
        self.inner.registry.get(id)
    }

    pub fn installed(&self) -> Vec<Arc<ModRecord>> {
        self.inner.registry.installed()
    }

    pub fn uninstalled(&self) -> Vec<Arc<ModRecord>> {
        self.inner.registry.uninstalled()
    }

    pub fn is_core(&self, id: &str) -> bool {
        self.inner.registry.is_core(id)
    }

    pub fn dependents_of(&self, id: &str, only_installed: bool) -> Vec<Arc<ModRecord>> {
        self.inner.registry.dependents_of(id, only_installed)
    }

    fn require(&self, id: &str) -> ModResult<Arc<ModRecord>> {
        self.get(id)
            .ok_or_else(|| ModError::NotFound { id: id.to_string() })
    }

    /// Enable or disable a mod.
    #[tracing::instrument(skip(self))]
    pub async fn set_active(&self, id: &str, active: bool) -> ModResult<()> {
        info!("{} mod {:?}", if active { "Enabling" } else { "Disabling" }, id);
        if active {
            self.install(id).await
        } else {
            self.uninstall(id, UninstallOptions::disable()).await
        }
    }

    /// Flip a mod between enabled and disabled.
    pub async fn toggle(&self, id: &str) -> ModResult<()> {
        let record = self.require(id)?;
        self.set_active(id, !record.is_installed()).await
    }

    /// Disable then re-enable a mod.
    #[tracing::instrument(skip(self))]
    pub async fn reload(&self, id: &str) -> ModResult<()> {
        info!("Reloading mod {:?}", id);
        self.uninstall(id, UninstallOptions::disable()).await?;
        self.install(id).await
    }

    /// Apply a batch of activity changes, deactivations first, one at a time.
    pub async fn set_many_active(&self, changes: &[(String, bool)]) -> Vec<(String, ModResult<()>)> {
        let mut ordered: Vec<&(String, bool)> = changes.iter().collect();
        ordered.sort_by_key(|(_, active)| *active);

        let mut results = Vec::with_capacity(ordered.len());
        for (id, active) in ordered {
            let result = self.set_active(id, *active).await;
            results.push((id.clone(), result));
        }
        results
    }

    /// Start an install on its own task. The handle may be awaited or dropped.
    pub fn spawn_install(&self, id: &str) -> JoinHandle<ModResult<()>> {
        let manager = self.clone();
        let id = id.to_string();
        tokio::spawn(async move { manager.install(&id).await })
    }

    /// Start an uninstall on its own task. The handle may be awaited or dropped.
    pub fn spawn_uninstall(&self, id: &str, options: UninstallOptions) -> JoinHandle<ModResult<()>> {
        let manager = self.clone();
        let id = id.to_string();
        tokio::spawn(async move { manager.uninstall(&id, options).await })
    }

    /// A directory of its own under the downloads dir, for one fetch.
    fn download_slot(&self) -> PathBuf {
        let seq = self.inner.download_seq.fetch_add(1, Ordering::Relaxed);
        self.inner
            .layout
            .downloads_dir()
            .join(format!("{}-{}", std::process::id(), seq))
    }

    /// Run archive and file work off the async executor, bounded by the
    /// operation timeout.
    ///
    /// Blocking work cannot be cancelled. On timeout this still waits for the
    /// work to stop before reporting [`ModError::Timeout`], so the caller
    /// never reverts state while files are still being touched.
    async fn run_blocking<T, F>(&self, action: &str, work: F) -> ModResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Runtime, &dyn ArchiveExtractor) -> anyhow::Result<T> + Send + 'static,
    {
        let runtime = Arc::clone(&self.inner.runtime);
        let extractor = Arc::clone(&self.inner.extractor);
        let mut task =
            tokio::task::spawn_blocking(move || work(runtime.as_ref(), extractor.as_ref()));

        let limit = self.inner.operation_timeout;
        match tokio::time::timeout(limit, &mut task).await {
            Ok(Ok(result)) => result.map_err(|e| ModError::io(action, e)),
            Ok(Err(join_error)) => Err(ModError::io(action, anyhow!(join_error))),
            Err(_) => {
                warn!("{} exceeded {:?}, waiting for it to stop", action, limit);
                if let Ok(Err(e)) = task.await {
                    debug!("{} failed after timing out: {:#}", action, e);
                }
                Err(ModError::Timeout {
                    operation: action.to_string(),
                    elapsed: limit,
                })
            }
        }
    }
}

/// Final path component of an archive entry name.
fn entry_file_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn destination_in(dir: &std::path::Path, entry_name: &str) -> PathBuf {
    dir.join(entry_file_name(entry_name))
}

#[cfg(test)]
pub(crate) mod test_support;
