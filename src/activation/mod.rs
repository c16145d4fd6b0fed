//! Persisted activation records.
//!
//! The store is a JSON document of the form `{"Mods": [...]}` shared with
//! the host's loader. Each entry describes one mod by id. Other top-level
//! keys of the document are preserved on rewrite.

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::package::ModRecord;
use crate::runtime::Runtime;

const MODS_KEY: &str = "Mods";

/// One mod's activation record. Empty strings are stored as `null`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ActivationEntry {
    #[serde(default, deserialize_with = "string_or_null", serialize_with = "null_if_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "string_or_null", serialize_with = "null_if_empty")]
    pub path: String,
    #[serde(default, deserialize_with = "bool_or_false")]
    pub installed: bool,
    /// Reserved for the external sync tool, always written as `false`.
    #[serde(default, deserialize_with = "bool_or_false")]
    pub toggling_on_sync: bool,
    /// Reserved for the external sync tool, always written as `false`.
    #[serde(default, deserialize_with = "bool_or_false")]
    pub removing_on_sync: bool,
    #[serde(default, deserialize_with = "string_or_null", serialize_with = "null_if_empty")]
    pub version: String,
    #[serde(default, deserialize_with = "bool_or_false")]
    pub uninstallable: bool,
    #[serde(default, deserialize_with = "string_or_null", serialize_with = "null_if_empty")]
    pub cover_image_filename: String,
    #[serde(default, deserialize_with = "string_or_null", serialize_with = "null_if_empty")]
    pub target_beatsaber_version: String,
    #[serde(default, deserialize_with = "string_or_null", serialize_with = "null_if_empty")]
    pub author: String,
    #[serde(default, deserialize_with = "string_or_null", serialize_with = "null_if_empty")]
    pub porter: String,
    #[serde(default, deserialize_with = "string_or_null", serialize_with = "null_if_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "string_or_null", serialize_with = "null_if_empty")]
    pub description: String,
}

impl ActivationEntry {
    /// Snapshot of a record's current state.
    pub fn for_record(record: &ModRecord) -> Self {
        let manifest = record.manifest();
        Self {
            id: manifest.id.clone(),
            path: record.path().to_string_lossy().into_owned(),
            installed: record.is_installed(),
            toggling_on_sync: false,
            removing_on_sync: false,
            version: manifest.version.clone(),
            uninstallable: record.uninstallable(),
            cover_image_filename: record.cover_image_filename(),
            target_beatsaber_version: manifest.package_version.clone(),
            author: manifest.author.clone(),
            porter: manifest.porter.clone(),
            name: manifest.name.clone(),
            description: manifest.description.clone(),
        }
    }
}

/// Activation-record document guarded by a single store-wide lock.
pub struct ActivationStore {
    runtime: Arc<dyn Runtime>,
    path: PathBuf,
    lock: Mutex<()>,
}

impl ActivationStore {
    pub fn new(runtime: Arc<dyn Runtime>, path: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Find the entry for `id`. A missing document has no entries.
    #[tracing::instrument(skip(self))]
    pub async fn lookup(&self, id: &str) -> Result<Option<ActivationEntry>> {
        let _guard = self.lock.lock().await;
        let document = self.load()?;
        Ok(mods(&document)
            .iter()
            .filter_map(parse_entry)
            .find(|entry| entry.id == id))
    }

    /// Replace the entry with the same id, or append a new one.
    #[tracing::instrument(skip(self, entry), fields(id = %entry.id))]
    pub async fn upsert(&self, entry: ActivationEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.load()?;
        let value = serde_json::to_value(&entry).context("Failed to serialize activation entry")?;

        let list = mods_mut(&mut document)?;
        match list
            .iter_mut()
            .find(|existing| entry_id(existing) == Some(entry.id.as_str()))
        {
            Some(existing) => {
                debug!("Updating activation record for {:?}", entry.id);
                *existing = value;
            }
            None => {
                debug!("Creating activation record for {:?}", entry.id);
                list.push(value);
            }
        }

        self.save(&document)?;
        info!(
            "Saved activation record for {:?} (installed: {})",
            entry.id, entry.installed
        );
        Ok(())
    }

    /// Delete the entry for `id`. Returns whether one was removed.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        if !self.runtime.exists(&self.path) {
            return Ok(false);
        }

        let mut document = self.load()?;
        let list = mods_mut(&mut document)?;
        let Some(index) = list
            .iter()
            .position(|existing| entry_id(existing) == Some(id))
        else {
            debug!("No activation record for {:?}", id);
            return Ok(false);
        };
        list.remove(index);

        self.save(&document)?;
        info!("Removed activation record for {:?}", id);
        Ok(true)
    }

    fn load(&self) -> Result<Value> {
        if !self.runtime.exists(&self.path) {
            let mut document = Map::new();
            document.insert(MODS_KEY.to_string(), Value::Array(Vec::new()));
            return Ok(Value::Object(document));
        }

        let content = self.runtime.read_to_string(&self.path)?;
        let document: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse activation records at {:?}", self.path))?;
        if !document.is_object() {
            bail!("Activation records at {:?} are not a JSON object", self.path);
        }
        Ok(document)
    }

    fn save(&self, document: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            self.runtime.create_dir_all(parent)?;
        }
        let content = serde_json::to_vec(document).context("Failed to serialize activation records")?;
        self.runtime.write(&self.path, &content)
    }
}

fn mods(document: &Value) -> &[Value] {
    document
        .get(MODS_KEY)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn mods_mut(document: &mut Value) -> Result<&mut Vec<Value>> {
    let Some(object) = document.as_object_mut() else {
        bail!("Activation records are not a JSON object");
    };
    object
        .entry(MODS_KEY)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| anyhow!("\"{}\" in activation records is not an array", MODS_KEY))
}

fn entry_id(value: &Value) -> Option<&str> {
    value.get("Id").and_then(Value::as_str)
}

fn parse_entry(value: &Value) -> Option<ActivationEntry> {
    ActivationEntry::deserialize(value).ok()
}

fn string_or_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string).unwrap_or_default())
}

fn bool_or_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_bool().unwrap_or(false))
}

fn null_if_empty<S: Serializer>(value: &str, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_empty() {
        serializer.serialize_none()
    } else {
        serializer.serialize_str(value)
    }
}
