//! Cascades run after an uninstall.

use log::{debug, info, warn};

use super::ModManager;
use super::uninstall::UninstallOptions;

impl ModManager {
    /// Disable every installed mod that depends on `id`.
    ///
    /// Protected dependents are skipped; the others are disabled with a
    /// cascade of their own.
    pub(crate) async fn clean_dependents(&self, id: &str) {
        for dependent in self.inner.registry.dependents_of(id, true) {
            if !dependent.uninstallable() {
                warn!(
                    "Not disabling protected mod {:?} which depends on {:?}",
                    dependent.id(),
                    id
                );
                continue;
            }
            info!("Disabling {:?} because it depends on {:?}", dependent.id(), id);
            let dependent_id = dependent.id().to_string();
            if let Err(e) = self
                .uninstall_record(dependent, UninstallOptions::disable())
                .await
            {
                warn!("Failed to disable {:?}: {}", dependent_id, e);
            }
        }
    }

    /// Disable library mods nothing installed depends on, until none are left.
    pub(crate) async fn clean_unused_libraries(&self) {
        loop {
            let mut changed = false;
            for record in self.inner.registry.snapshot() {
                if !record.is_library() || !record.uninstallable() || !record.is_installed() {
                    continue;
                }
                if !self.inner.registry.dependents_of(record.id(), true).is_empty() {
                    continue;
                }

                info!("Disabling unused library {:?}", record.id());
                let id = record.id().to_string();
                match self
                    .uninstall_record(record, UninstallOptions::disable())
                    .await
                {
                    Ok(()) => changed = true,
                    Err(e) => warn!("Failed to disable unused library {:?}: {}", id, e),
                }
            }
            if !changed {
                debug!("Library sweep finished");
                return;
            }
        }
    }
}
