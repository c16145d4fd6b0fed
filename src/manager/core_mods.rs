//! Core mods: the set of mods the host requires, listed per host version in
//! a remote index.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ModManager;
use super::uninstall::UninstallOptions;
use crate::error::{ModError, ModResult};
use crate::package::VersionMatcher;

/// One entry of the core mod index.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoreModInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub download_link: String,
    #[serde(default)]
    pub filename: String,
}

#[derive(Debug, Default)]
pub struct CoreModReport {
    pub host_version: String,
    /// Core mods listed for the host version.
    pub listed: Vec<CoreModInfo>,
    /// Listed but not downloaded.
    pub missing: Vec<CoreModInfo>,
    /// Downloaded at a version older than listed.
    pub outdated: Vec<CoreModInfo>,
}

impl CoreModReport {
    /// Entries that need a fresh download.
    pub fn needs_install(&self) -> Vec<CoreModInfo> {
        self.missing.iter().chain(&self.outdated).cloned().collect()
    }

    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty() && self.outdated.is_empty()
    }
}

impl ModManager {
    /// Load the core mod index and compare it with the registry.
    ///
    /// Registered core mods are added to the registry's core set.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_core_mods(&self) -> ModResult<CoreModReport> {
        let host_version = self.inner.host.package_version();
        let index = self.load_core_index().await?;

        let mut report = CoreModReport {
            host_version: host_version.clone(),
            ..Default::default()
        };
        let Some(entries) = index
            .get(&host_version)
            .and_then(|v| v.get("mods"))
            .and_then(Value::as_array)
        else {
            warn!("No core mods listed for host version {:?}", host_version);
            return Ok(report);
        };

        for entry in entries {
            let info: CoreModInfo = match serde_json::from_value(entry.clone()) {
                Ok(info) => info,
                Err(e) => {
                    warn!("Skipping malformed core mod entry: {}", e);
                    continue;
                }
            };

            match self.inner.registry.get(&info.id) {
                None => {
                    info!("Core mod {:?} is missing", info.id);
                    report.missing.push(info.clone());
                }
                Some(record) => {
                    self.inner.registry.mark_core(&info.id);
                    if VersionMatcher::is_older(record.version(), &info.version) {
                        info!(
                            "Core mod {:?} is outdated: {} < {}",
                            info.id,
                            record.version(),
                            info.version
                        );
                        report.outdated.push(info.clone());
                    } else {
                        debug!("Core mod {:?} {} is up to date", info.id, record.version());
                    }
                }
            }
            report.listed.push(info);
        }
        Ok(report)
    }

    /// Refresh the index and install every missing or outdated core mod.
    pub async fn install_missing_core_mods(&self, restart: bool) -> ModResult<usize> {
        let report = self.refresh_core_mods().await?;
        let pending = report.needs_install();
        if pending.is_empty() {
            info!("All core mods are installed");
            return Ok(0);
        }
        self.install_core_mods(&pending, restart).await
    }

    /// Download and install each core mod, replacing an existing copy.
    ///
    /// Returns how many were installed. The host is restarted when `restart`
    /// is set and at least one install succeeded.
    #[tracing::instrument(skip(self, mods))]
    pub async fn install_core_mods(&self, mods: &[CoreModInfo], restart: bool) -> ModResult<usize> {
        let mut installed = 0;
        for info in mods {
            if info.filename.is_empty() || info.download_link.is_empty() {
                warn!("Core mod {:?} has no file name or download link, skipping", info.id);
                continue;
            }

            if let Some(existing) = self.inner.registry.get(&info.id) {
                let options = UninstallOptions::disable().with_force().without_cascade();
                if let Err(e) = self.uninstall_record(existing, options).await {
                    warn!("Failed to disable old copy of core mod {:?}: {}", info.id, e);
                }
            }

            let record = match self.install_from_url(&info.filename, &info.download_link).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Failed to install core mod {:?}: {}", info.id, e);
                    continue;
                }
            };

            record.set_uninstallable(false);
            if self.targets_host(&record) {
                if let Err(e) = self.sync_activation(&record).await {
                    warn!("Failed to update activation record for {:?}: {:#}", info.id, e);
                }
            }
            self.inner.registry.mark_core(record.id());
            info!("Installed core mod {:?} {}", record.id(), record.version());
            installed += 1;
        }

        if restart && installed > 0 {
            self.inner
                .host
                .restart()
                .map_err(|e| ModError::io("restarting the host", e))?;
        }
        Ok(installed)
    }

    /// Fetch the index, falling back to the local cache.
    async fn load_core_index(&self) -> ModResult<Value> {
        let url = &self.inner.core_index_url;
        let cache = &self.inner.layout.core_index_cache;
        let runtime = &self.inner.runtime;

        let fetched =
            tokio::time::timeout(self.inner.fetch_timeout, self.inner.fetcher.fetch_text(url)).await;
        match fetched {
            Ok(Ok(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(index) => {
                    let cached = cache
                        .parent()
                        .map_or(Ok(()), |parent| runtime.create_dir_all(parent))
                        .and_then(|_| runtime.write(cache, text.as_bytes()));
                    if let Err(e) = cached {
                        warn!("Failed to cache core mod index at {:?}: {:#}", cache, e);
                    }
                    return Ok(index);
                }
                Err(e) => warn!("Core mod index from {} is malformed: {}", url, e),
            },
            Ok(Err(e)) => warn!("Failed to fetch core mod index: {:#}", e),
            Err(_) => warn!("Fetching core mod index timed out"),
        }

        if !runtime.exists(cache) {
            return Err(ModError::Fetch {
                url: url.clone(),
                reason: "the index is unavailable and no cached copy exists".into(),
            });
        }
        info!("Using cached core mod index {:?}", cache);
        let text = runtime
            .read_to_string(cache)
            .map_err(|e| ModError::io("reading the cached core mod index", e))?;
        serde_json::from_str(&text).map_err(|e| ModError::Parse {
            path: cache.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::download::MockFetcher;
    use crate::host::MockHostBridge;
    use crate::config::DEFAULT_HOST_PACKAGE;
    use std::fs;

    const CORE_URL: &str = "https://mods.example.com/hook.qmod";

    fn index(mods: &str) -> String {
        format!(r#"{{"{}": {{"mods": {}}}, "0.0.1": {{"mods": []}}}}"#, HOST_VERSION, mods)
    }

    fn hook_entry(version: &str) -> String {
        format!(
            r#"[{{"id":"hook","version":"{}","downloadLink":"{}","filename":"hook.qmod"}}]"#,
            version, CORE_URL
        )
    }

    fn host(restarts: usize) -> MockHostBridge {
        let mut host = MockHostBridge::new();
        host.expect_package_id()
            .returning(|| DEFAULT_HOST_PACKAGE.to_string());
        host.expect_package_version()
            .returning(|| HOST_VERSION.to_string());
        host.expect_restart().times(restarts).returning(|| Ok(()));
        host
    }

    #[tokio::test]
    async fn test_missing_and_outdated_core_mods() {
        let env = TestEnv::new();
        env.write_mod(ModSpec::new("hook", "1.0.0"));
        let mut fetcher = MockFetcher::new();
        let body = index(
            r#"[{"id":"hook","version":"1.2.0","downloadLink":"x","filename":"hook.qmod"},
                {"id":"types","version":"0.1.0","downloadLink":"y","filename":"types.qmod"},
                {"id":"new","version":1}]"#,
        );
        fetcher
            .expect_fetch_text()
            .returning(move |_| Ok(body.clone()));
        let manager = env.manager_with(fetcher);
        manager.scan().await.unwrap();

        let report = manager.refresh_core_mods().await.unwrap();

        assert_eq!(report.listed.len(), 2);
        assert_eq!(report.missing[0].id, "types");
        assert_eq!(report.outdated[0].id, "hook");
        assert_eq!(report.needs_install().len(), 2);
        assert!(manager.is_core("hook"));
        assert!(!manager.is_core("types"));
        assert!(env.layout().core_index_cache.exists());
    }

    #[tokio::test]
    async fn test_up_to_date_core_mods() {
        let env = TestEnv::new();
        env.write_mod(ModSpec::new("hook", "1.2.0"));
        let mut fetcher = MockFetcher::new();
        let body = index(&hook_entry("1.2.0"));
        fetcher
            .expect_fetch_text()
            .returning(move |_| Ok(body.clone()));
        let manager = env.manager_with(fetcher);
        manager.scan().await.unwrap();

        let report = manager.refresh_core_mods().await.unwrap();
        assert!(report.is_satisfied());
    }

    #[tokio::test]
    async fn test_index_falls_back_to_cache() {
        let env = TestEnv::new();
        fs::write(&env.layout().core_index_cache, index(&hook_entry("1.0.0"))).unwrap();
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_text()
            .returning(|_| Err(anyhow::anyhow!("offline")));
        let manager = env.manager_with(fetcher);

        let report = manager.refresh_core_mods().await.unwrap();
        assert_eq!(report.missing.len(), 1);
    }

    #[tokio::test]
    async fn test_index_unavailable_without_cache() {
        let env = TestEnv::new();
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_text()
            .returning(|_| Ok("not json".to_string()));
        let manager = env.manager_with(fetcher);

        let err = manager.refresh_core_mods().await.unwrap_err();
        assert!(matches!(err, ModError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_unknown_host_version_lists_nothing() {
        let env = TestEnv::new();
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_text()
            .returning(|_| Ok(r#"{"9.9.9": {"mods": []}}"#.to_string()));
        let manager = env.manager_with(fetcher);

        let report = manager.refresh_core_mods().await.unwrap();
        assert!(report.listed.is_empty());
        assert!(report.is_satisfied());
    }

    #[tokio::test]
    async fn test_install_core_mods_replaces_and_protects() {
        let env = TestEnv::new();
        env.write_mod(ModSpec::new("hook", "1.0.0").mod_files(&["libhook.so"]));
        let mut fetcher = MockFetcher::new();
        serving(&mut fetcher, CORE_URL, &ModSpec::new("hook", "1.2.0").mod_files(&["libhook.so"]), 1);
        let manager = env.manager_with_host(fetcher, host(1));
        manager.scan().await.unwrap();
        manager.install("hook").await.unwrap();

        let info: Vec<CoreModInfo> = serde_json::from_str(&hook_entry("1.2.0")).unwrap();
        let count = manager.install_core_mods(&info, true).await.unwrap();

        assert_eq!(count, 1);
        let record = manager.get("hook").unwrap();
        assert_eq!(record.version(), "1.2.0");
        assert!(record.is_installed());
        assert!(!record.uninstallable());
        assert!(manager.is_core("hook"));
        let entry = manager.activation().lookup("hook").await.unwrap().unwrap();
        assert!(!entry.uninstallable);
        assert!(entry.installed);
    }

    #[tokio::test]
    async fn test_install_missing_core_mods_end_to_end() {
        let env = TestEnv::new();
        let mut fetcher = MockFetcher::new();
        let body = index(&hook_entry("1.0.0"));
        fetcher
            .expect_fetch_text()
            .returning(move |_| Ok(body.clone()));
        serving(&mut fetcher, CORE_URL, &ModSpec::new("hook", "1.0.0"), 1);
        let manager = env.manager_with_host(fetcher, host(0));

        let count = manager.install_missing_core_mods(false).await.unwrap();

        assert_eq!(count, 1);
        assert!(manager.get("hook").unwrap().is_installed());
        assert!(manager.refresh_core_mods().await.unwrap().is_satisfied());
    }

    #[tokio::test]
    async fn test_install_core_mods_skips_incomplete_entries() {
        let env = TestEnv::new();
        let manager = env.manager_with_host(MockFetcher::new(), host(0));

        let info = vec![CoreModInfo {
            id: "hook".into(),
            version: "1.0.0".into(),
            ..Default::default()
        }];
        let count = manager.install_core_mods(&info, true).await.unwrap();

        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_failed_core_install_does_not_restart() {
        let env = TestEnv::new();
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_, _| Err(anyhow::anyhow!("offline")));
        let manager = env.manager_with_host(fetcher, host(0));

        let info: Vec<CoreModInfo> = serde_json::from_str(&hook_entry("1.0.0")).unwrap();
        let count = manager.install_core_mods(&info, true).await.unwrap();

        assert_eq!(count, 0);
    }
}
