//! Fixtures for manager tests: a temp root, archive builders and mocks.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::FileOptions;

use super::{Collaborators, ModManager};
use crate::archive::{ArchiveExtractor, ZipExtractor};
use crate::config::{Config, DEFAULT_HOST_PACKAGE, Layout};
use crate::download::{Fetcher, MockFetcher};
use crate::host::{ConfiguredHost, HostBridge};
use crate::package::{Dependency, FileCopy, Manifest};
use crate::runtime::{RealRuntime, Runtime};

pub const HOST_VERSION: &str = "1.17.1";

/// Builder for a test mod archive.
#[derive(Clone)]
pub struct ModSpec {
    pub manifest: Manifest,
    omitted: Vec<String>,
}

impl ModSpec {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            manifest: Manifest {
                id: id.into(),
                name: format!("{} mod", id),
                version: version.into(),
                package_id: DEFAULT_HOST_PACKAGE.into(),
                package_version: HOST_VERSION.into(),
                ..Default::default()
            },
            omitted: Vec::new(),
        }
    }

    pub fn target(mut self, package_id: &str) -> Self {
        self.manifest.package_id = package_id.into();
        self
    }

    pub fn mod_files(mut self, files: &[&str]) -> Self {
        self.manifest.mod_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn library_files(mut self, files: &[&str]) -> Self {
        self.manifest.library_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn library(mut self) -> Self {
        self.manifest.is_library = true;
        self
    }

    pub fn cover(mut self, name: &str) -> Self {
        self.manifest.cover_image = name.into();
        self
    }

    pub fn dep(self, id: &str, range: &str) -> Self {
        self.dep_url(id, range, "")
    }

    pub fn dep_url(mut self, id: &str, range: &str, url: &str) -> Self {
        self.manifest.dependencies.push(Dependency {
            id: id.into(),
            version_range: range.into(),
            download_if_missing: url.into(),
        });
        self
    }

    pub fn file_copy(mut self, name: &str, destination: &Path) -> Self {
        self.manifest.file_copies.push(FileCopy {
            source_name: name.into(),
            destination: destination.to_path_buf(),
        });
        self
    }

    /// Declare a file in the manifest without shipping it in the archive.
    pub fn without_entry(mut self, name: &str) -> Self {
        self.omitted.push(name.to_string());
        self
    }

    fn entry_names(&self) -> Vec<String> {
        let m = &self.manifest;
        let mut names: Vec<String> = m
            .mod_files
            .iter()
            .chain(&m.library_files)
            .cloned()
            .chain(m.file_copies.iter().map(|c| c.source_name.clone()))
            .collect();
        if !m.cover_image.is_empty() {
            names.push(m.cover_image.clone());
        }
        names.retain(|n| !self.omitted.contains(n));
        names.dedup();
        names
    }

    /// Zip bytes: the manifest plus one entry per declared file.
    pub fn archive_bytes(&self) -> Vec<u8> {
        let manifest = serde_json::to_vec(&self.manifest).unwrap();
        let mut entries: Vec<(String, Vec<u8>)> = vec![("mod.json".into(), manifest)];
        for name in self.entry_names() {
            let content = format!("{}:{}", self.manifest.id, name).into_bytes();
            entries.push((name, content));
        }
        zip_bytes(
            &entries
                .iter()
                .map(|(n, c)| (n.as_str(), c.as_slice()))
                .collect::<Vec<_>>(),
        )
    }
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options: FileOptions<()> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A temporary root with its own layout.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: Config,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        Self { dir, config }
    }

    pub fn layout(&self) -> &Layout {
        &self.config.layout
    }

    pub fn archives_dir(&self) -> PathBuf {
        let dir = self.config.layout.archives_dir.clone();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.config.layout.mods_dir.clone()
    }

    pub fn libs_dir(&self) -> PathBuf {
        self.config.layout.libs_dir.clone()
    }

    /// Entries left in the downloads directory.
    pub fn downloads_left(&self) -> usize {
        std::fs::read_dir(self.config.layout.downloads_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Write a mod archive into the archives directory as `<id>.qmod`.
    pub fn write_mod(&self, spec: ModSpec) -> PathBuf {
        let path = self
            .archives_dir()
            .join(format!("{}.qmod", spec.manifest.id));
        std::fs::write(&path, spec.archive_bytes()).unwrap();
        path
    }

    pub fn write_zip(&self, file_name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.archives_dir().join(file_name);
        std::fs::write(&path, zip_bytes(entries)).unwrap();
        path
    }

    /// An archive whose manifest is the given raw bytes.
    pub fn write_raw_archive(&self, file_name: &str, manifest: &[u8]) -> PathBuf {
        self.write_zip(file_name, &[("mod.json", manifest)])
    }

    pub fn host(&self) -> ConfiguredHost {
        ConfiguredHost::new(DEFAULT_HOST_PACKAGE, HOST_VERSION, None)
    }

    /// A manager whose fetcher must not be called.
    pub fn manager(&self) -> ModManager {
        self.manager_with(MockFetcher::new())
    }

    pub fn manager_with(&self, fetcher: impl Fetcher + 'static) -> ModManager {
        self.manager_with_host(fetcher, self.host())
    }

    pub fn manager_with_host(
        &self,
        fetcher: impl Fetcher + 'static,
        host: impl HostBridge + 'static,
    ) -> ModManager {
        ModManager::new(
            &self.config,
            Collaborators {
                runtime: Arc::new(RealRuntime),
                extractor: Arc::new(ZipExtractor),
                fetcher: Arc::new(fetcher),
                host: Arc::new(host),
            },
        )
    }

    /// A manager unpacking archives with `extractor`; its fetcher must not be called.
    pub fn manager_with_extractor(&self, extractor: impl ArchiveExtractor + 'static) -> ModManager {
        ModManager::new(
            &self.config,
            Collaborators {
                runtime: Arc::new(RealRuntime),
                extractor: Arc::new(extractor),
                fetcher: Arc::new(MockFetcher::new()),
                host: Arc::new(self.host()),
            },
        )
    }
}

/// Zip extraction that stalls before unpacking entries.
pub struct SlowExtractor {
    pub delay: Duration,
}

impl ArchiveExtractor for SlowExtractor {
    fn read_entry(
        &self,
        runtime: &dyn Runtime,
        archive: &Path,
        name: &str,
    ) -> Result<Option<Vec<u8>>> {
        ZipExtractor.read_entry(runtime, archive, name)
    }

    fn entry_exists(&self, runtime: &dyn Runtime, archive: &Path, name: &str) -> Result<bool> {
        ZipExtractor.entry_exists(runtime, archive, name)
    }

    fn extract_entries(
        &self,
        runtime: &dyn Runtime,
        archive: &Path,
        names: &[String],
        dest: &Path,
    ) -> Result<Vec<PathBuf>> {
        std::thread::sleep(self.delay);
        ZipExtractor.extract_entries(runtime, archive, names, dest)
    }
}

/// Serves archives by URL after an async delay, counting downloads.
pub struct DelayedFetcher {
    archives: HashMap<String, Vec<u8>>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl DelayedFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            archives: HashMap::new(),
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn serving(mut self, url: &str, spec: &ModSpec) -> Self {
        self.archives.insert(url.to_string(), spec.archive_bytes());
        self
    }

    /// Download counter, readable after the fetcher moved into a manager.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Fetcher for DelayedFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let bytes = self
            .archives
            .get(url)
            .ok_or_else(|| anyhow!("nothing served at {}", url))?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, bytes)?;
        Ok(())
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        bail!("no documents served, asked for {}", url)
    }
}

/// A fetcher serving `spec`'s archive for `url`, expected exactly `times` times.
pub fn serving(fetcher: &mut MockFetcher, url: &str, spec: &ModSpec, times: usize) {
    let bytes = spec.archive_bytes();
    fetcher
        .expect_fetch()
        .withf({
            let url = url.to_string();
            move |requested, _| requested == url
        })
        .times(times)
        .returning(move |_, dest| {
            std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
            std::fs::write(dest, &bytes)?;
            Ok(())
        });
}
