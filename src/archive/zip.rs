use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use log::debug;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use super::ArchiveExtractor;

/// Extractor for `.qmod` archives, which are plain zip files.
pub struct ZipExtractor;

impl ZipExtractor {
    fn open_archive(
        &self,
        runtime: &dyn Runtime,
        archive_path: &Path,
    ) -> Result<ZipArchive<Cursor<Vec<u8>>>> {
        let mut reader = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        // zip needs Read + Seek, Runtime::open only gives Read
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?;

        ZipArchive::new(Cursor::new(buffer))
            .with_context(|| format!("Failed to parse ZIP archive {:?}", archive_path))
    }
}

impl ArchiveExtractor for ZipExtractor {
    #[tracing::instrument(skip(self, runtime))]
    fn read_entry(
        &self,
        runtime: &dyn Runtime,
        archive: &Path,
        name: &str,
    ) -> Result<Option<Vec<u8>>> {
        let mut zip = self.open_archive(runtime, archive)?;
        let Some(index) = zip.index_for_name(name) else {
            debug!("Entry {:?} not found in {:?}", name, archive);
            return Ok(None);
        };

        let mut entry = zip
            .by_index(index)
            .with_context(|| format!("Failed to read ZIP entry {:?}", name))?;
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .with_context(|| format!("Failed to decompress ZIP entry {:?}", name))?;
        Ok(Some(content))
    }

    #[tracing::instrument(skip(self, runtime))]
    fn entry_exists(&self, runtime: &dyn Runtime, archive: &Path, name: &str) -> Result<bool> {
        let zip = self.open_archive(runtime, archive)?;
        Ok(zip.index_for_name(name).is_some())
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract_entries(
        &self,
        runtime: &dyn Runtime,
        archive: &Path,
        names: &[String],
        dest: &Path,
    ) -> Result<Vec<PathBuf>> {
        debug!("Extracting {} entries to {:?}...", names.len(), dest);
        let mut zip = self.open_archive(runtime, archive)?;
        runtime.create_dir_all(dest)?;

        let mut extracted = Vec::with_capacity(names.len());
        for name in names {
            let index = zip
                .index_for_name(name)
                .ok_or_else(|| anyhow!("Entry {:?} not found in archive {:?}", name, archive))?;
            let mut entry = zip
                .by_index(index)
                .with_context(|| format!("Failed to read ZIP entry {:?}", name))?;

            let entry_path = entry
                .enclosed_name()
                .ok_or_else(|| anyhow!("Entry {:?} has an unsafe path", name))?;
            let full_path = dest.join(entry_path);

            if let Some(parent) = full_path.parent() {
                runtime.create_dir_all(parent)?;
            }
            let mut dest_file = runtime.create_file(&full_path)?;
            std::io::copy(&mut entry, &mut dest_file)
                .with_context(|| format!("Failed to extract file {:?}", full_path))?;

            debug!("Extracted {:?}", full_path);
            extracted.push(full_path);
        }

        Ok(extracted)
    }
}
