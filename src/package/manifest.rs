//! Mod manifest (`mod.json`) model.
//!
//! Parsing is deliberately forgiving at the field level: a field that is
//! absent or has the wrong JSON type falls back to its default, and list
//! elements of the wrong shape are dropped. Only a document that is not a
//! JSON object at all is rejected.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name of the manifest entry inside a mod archive.
pub const MANIFEST_ENTRY: &str = "mod.json";

/// Parsed contents of a mod manifest.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient")]
    pub author: String,
    #[serde(default, deserialize_with = "lenient")]
    pub porter: String,
    #[serde(default, deserialize_with = "lenient")]
    pub version: String,
    #[serde(default, deserialize_with = "lenient")]
    pub cover_image: String,
    /// Host application package id this mod is built for.
    #[serde(default, deserialize_with = "lenient")]
    pub package_id: String,
    /// Host application version this mod is built for.
    #[serde(default, deserialize_with = "lenient")]
    pub package_version: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub mod_files: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub library_files: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub file_copies: Vec<FileCopy>,
    #[serde(default, deserialize_with = "lenient")]
    pub is_library: bool,
}

impl Manifest {
    /// Parse a manifest document.
    ///
    /// Fails only when the document is malformed JSON or not an object.
    pub fn parse(content: &[u8]) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(content)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("manifest must be a JSON object"));
        }
        Manifest::deserialize(value)
    }
}

/// A dependency on another mod.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    #[serde(default, deserialize_with = "lenient")]
    pub id: String,
    /// Semantic version range the dependency must satisfy.
    #[serde(rename = "version", default, deserialize_with = "lenient")]
    pub version_range: String,
    #[serde(default, deserialize_with = "lenient")]
    pub download_if_missing: String,
}

impl Dependency {
    /// The URL to fetch the dependency from, if one was provided.
    pub fn download_url(&self) -> Option<&str> {
        let url = self.download_if_missing.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// A file extracted from the archive to an arbitrary destination.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FileCopy {
    /// Entry name inside the archive.
    #[serde(rename = "name", default, deserialize_with = "lenient")]
    pub source_name: String,
    /// Absolute destination path.
    #[serde(default, deserialize_with = "lenient")]
    pub destination: PathBuf,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter(|item| !item.is_null())
        .filter_map(|item| T::deserialize(item).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_manifest() {
        let json = br#"{
            "_QPVersion": "0.1.1",
            "name": "Noodle Extensions",
            "id": "NoodleExtensions",
            "author": "StackDoubleFlow",
            "porter": "",
            "version": "1.3.2",
            "packageId": "com.beatgames.beatsaber",
            "packageVersion": "1.17.1",
            "description": "Animations",
            "coverImage": "cover.png",
            "modFiles": ["libnoodleextensions.so"],
            "libraryFiles": ["libcustom-json-data.so"],
            "dependencies": [
                {"id": "codegen", "version": "^0.14.0", "downloadIfMissing": "https://example.com/codegen.qmod"}
            ],
            "fileCopies": [{"name": "extra.txt", "destination": "/sdcard/extra.txt"}],
            "isLibrary": false
        }"#;

        let manifest = Manifest::parse(json).unwrap();

        assert_eq!(manifest.id, "NoodleExtensions");
        assert_eq!(manifest.version, "1.3.2");
        assert_eq!(manifest.package_id, "com.beatgames.beatsaber");
        assert_eq!(manifest.mod_files, vec!["libnoodleextensions.so"]);
        assert_eq!(manifest.library_files, vec!["libcustom-json-data.so"]);
        assert_eq!(manifest.dependencies.len(), 1);
        assert_eq!(manifest.dependencies[0].version_range, "^0.14.0");
        assert_eq!(
            manifest.dependencies[0].download_url(),
            Some("https://example.com/codegen.qmod")
        );
        assert_eq!(manifest.file_copies[0].source_name, "extra.txt");
        assert_eq!(
            manifest.file_copies[0].destination,
            PathBuf::from("/sdcard/extra.txt")
        );
        assert!(!manifest.is_library);
    }

    #[test]
    fn test_absent_and_mistyped_fields_default() {
        let json = br#"{
            "id": "lib",
            "version": 3,
            "isLibrary": "yes",
            "modFiles": "not-a-list",
            "libraryFiles": ["liba.so", 7, "libb.so"],
            "dependencies": [42, {"id": "dep"}]
        }"#;

        let manifest = Manifest::parse(json).unwrap();

        assert_eq!(manifest.id, "lib");
        assert_eq!(manifest.version, "");
        assert_eq!(manifest.name, "");
        assert!(!manifest.is_library);
        assert!(manifest.mod_files.is_empty());
        assert_eq!(manifest.library_files, vec!["liba.so", "libb.so"]);
        assert_eq!(manifest.dependencies.len(), 1);
        assert_eq!(manifest.dependencies[0].id, "dep");
        assert_eq!(manifest.dependencies[0].version_range, "");
        assert_eq!(manifest.dependencies[0].download_url(), None);
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        assert!(Manifest::parse(b"{ not json").is_err());
        assert!(Manifest::parse(b"[1, 2, 3]").is_err());
        assert!(Manifest::parse(b"").is_err());
    }

    #[test]
    fn test_blank_download_url_is_none() {
        let dep = Dependency {
            id: "x".into(),
            version_range: "*".into(),
            download_if_missing: "   ".into(),
        };
        assert_eq!(dep.download_url(), None);
    }
}
