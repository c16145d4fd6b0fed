mod zip;

use crate::runtime::Runtime;
use anyhow::Result;
use std::path::{Path, PathBuf};

pub use zip::ZipExtractor;

/// Reads and unpacks named entries of a mod archive.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor: Send + Sync {
    /// Read a single entry into memory. `Ok(None)` when the entry is absent.
    fn read_entry(&self, runtime: &dyn Runtime, archive: &Path, name: &str)
    -> Result<Option<Vec<u8>>>;

    /// Check whether the archive contains an entry with this name.
    fn entry_exists(&self, runtime: &dyn Runtime, archive: &Path, name: &str) -> Result<bool>;

    /// Extract the named entries into `dest`, keeping their paths inside the
    /// archive.
    ///
    /// Returns the extracted paths in the order of `names`. A name that is
    /// not present in the archive is an error.
    fn extract_entries(
        &self,
        runtime: &dyn Runtime,
        archive: &Path,
        names: &[String],
        dest: &Path,
    ) -> Result<Vec<PathBuf>>;
}
