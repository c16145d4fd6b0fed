//! Registry of downloaded mods.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use super::ModRecord;

/// Process-wide map from mod id to record, plus the set of core mod ids.
///
/// Locks are held only for the duration of a lookup, insert, remove or
/// snapshot. Sweeps iterate over [`ModRegistry::snapshot`] so concurrent
/// inserts and removals never invalidate an iteration.
#[derive(Debug, Default)]
pub struct ModRegistry {
    records: RwLock<HashMap<String, Arc<ModRecord>>>,
    core: RwLock<HashSet<String>>,
}

impl ModRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record under its id, replacing any previous record.
    ///
    /// Invalid records are never registered; returns `false` for them.
    pub fn insert(&self, record: Arc<ModRecord>) -> bool {
        if !record.is_valid() {
            return false;
        }
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id().to_string(), record);
        true
    }

    pub fn get(&self, id: &str) -> Option<Arc<ModRecord>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Remove the record registered under `id`, but only if it is `record`.
    ///
    /// A replacement registered under the same id in the meantime is kept.
    pub fn remove_if_same(&self, record: &Arc<ModRecord>) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.get(record.id()) {
            Some(existing) if Arc::ptr_eq(existing, record) => {
                records.remove(record.id());
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records, sorted by id.
    pub fn snapshot(&self) -> Vec<Arc<ModRecord>> {
        let mut records: Vec<_> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id().to_lowercase().cmp(&b.id().to_lowercase()));
        records
    }

    pub fn installed(&self) -> Vec<Arc<ModRecord>> {
        self.snapshot()
            .into_iter()
            .filter(|r| r.is_installed())
            .collect()
    }

    pub fn uninstalled(&self) -> Vec<Arc<ModRecord>> {
        self.snapshot()
            .into_iter()
            .filter(|r| !r.is_installed())
            .collect()
    }

    /// Records declaring a dependency on `id`.
    pub fn dependents_of(&self, id: &str, only_installed: bool) -> Vec<Arc<ModRecord>> {
        self.snapshot()
            .into_iter()
            .filter(|r| r.id() != id && r.depends_on(id))
            .filter(|r| !only_installed || r.is_installed())
            .collect()
    }

    /// Whether any installed record other than `except_id` ships `library_file`.
    pub fn library_in_use(&self, library_file: &str, except_id: &str) -> Option<String> {
        self.snapshot()
            .into_iter()
            .filter(|r| r.id() != except_id && r.is_installed())
            .find(|r| r.library_files().iter().any(|f| f == library_file))
            .map(|r| r.id().to_string())
    }

    pub fn mark_core(&self, id: &str) {
        self.core
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
    }

    pub fn is_core(&self, id: &str) -> bool {
        self.core
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::InstallState;
    use crate::package::manifest::{Dependency, Manifest};
    use std::path::PathBuf;

    fn record(id: &str, deps: &[&str], libs: &[&str]) -> Arc<ModRecord> {
        let manifest = Manifest {
            id: id.into(),
            version: "1.0.0".into(),
            library_files: libs.iter().map(|s| s.to_string()).collect(),
            dependencies: deps
                .iter()
                .map(|d| Dependency {
                    id: d.to_string(),
                    version_range: "*".into(),
                    download_if_missing: String::new(),
                })
                .collect(),
            ..Default::default()
        };
        Arc::new(ModRecord::new(manifest, PathBuf::from(format!("/mods/{id}.qmod"))))
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = ModRegistry::new();
        assert!(registry.insert(record("a", &[], &[])));

        assert!(registry.contains("a"));
        assert_eq!(registry.get("a").unwrap().id(), "a");
        assert!(registry.get("b").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_records_are_not_registered() {
        let registry = ModRegistry::new();
        let invalid = Arc::new(ModRecord::invalid(PathBuf::from("/x.qmod"), "bad"));

        assert!(!registry.insert(invalid));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_if_same_keeps_replacement() {
        let registry = ModRegistry::new();
        let old = record("a", &[], &[]);
        let new = record("a", &[], &[]);
        registry.insert(Arc::clone(&old));
        registry.insert(Arc::clone(&new));

        assert!(!registry.remove_if_same(&old));
        assert!(registry.contains("a"));
        assert!(registry.remove_if_same(&new));
        assert!(!registry.contains("a"));
    }

    #[test]
    fn test_dependents_of() {
        let registry = ModRegistry::new();
        let b = record("b", &["a"], &[]);
        registry.insert(record("a", &[], &[]));
        registry.insert(Arc::clone(&b));
        registry.insert(record("c", &["a"], &[]));

        let all: Vec<_> = registry
            .dependents_of("a", false)
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(all, vec!["b", "c"]);

        b.state_cell().set(InstallState::Installed);
        let installed: Vec<_> = registry
            .dependents_of("a", true)
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(installed, vec!["b"]);
    }

    #[test]
    fn test_library_in_use_only_counts_installed_others() {
        let registry = ModRegistry::new();
        let a = record("a", &[], &["libshared.so"]);
        let b = record("b", &[], &["libshared.so"]);
        registry.insert(Arc::clone(&a));
        registry.insert(Arc::clone(&b));

        assert_eq!(registry.library_in_use("libshared.so", "a"), None);

        b.state_cell().set(InstallState::Installed);
        assert_eq!(
            registry.library_in_use("libshared.so", "a"),
            Some("b".to_string())
        );
        assert_eq!(registry.library_in_use("libshared.so", "b"), None);
    }

    #[test]
    fn test_core_set() {
        let registry = ModRegistry::new();
        registry.insert(record("core", &[], &[]));
        registry.mark_core("core");
        registry.mark_core("absent");

        assert!(registry.is_core("core"));
        assert!(!registry.is_core("other"));
        assert!(registry.is_core("absent"));
        assert!(registry.get("absent").is_none());
    }
}
