//! Configuration: filesystem layout, host identity and network settings.

use anyhow::{Context, Result};
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::HttpClient;
use crate::runtime::Runtime;

pub const DEFAULT_HOST_PACKAGE: &str = "com.beatgames.beatsaber";
pub const DEFAULT_CORE_INDEX_URL: &str =
    "https://raw.githubusercontent.com/BMBF/resources/master/com.beatgames.beatsaber/core-mods.json";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

const ROOT_DIR_NAME: &str = ".modman";
const TOKEN_ENV: &str = "MODMAN_TOKEN";

/// Every path the manager touches, derived from one root.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub root: PathBuf,
    /// Downloaded mod archives and extracted cover images.
    pub archives_dir: PathBuf,
    /// Staging area; removed after a scan.
    pub temp_dir: PathBuf,
    /// Shared destination for mod files.
    pub mods_dir: PathBuf,
    /// Shared destination for library files.
    pub libs_dir: PathBuf,
    pub activation_file: PathBuf,
    pub core_index_cache: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let archives_dir = root.join("Mods");
        Self {
            temp_dir: archives_dir.join("Temp"),
            archives_dir,
            mods_dir: root.join("files").join("mods"),
            libs_dir: root.join("files").join("libs"),
            activation_file: root.join("config.json"),
            core_index_cache: root.join("core-mods.json"),
            root,
        }
    }

    pub fn with_mods_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mods_dir = dir.into();
        self
    }

    pub fn with_libs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.libs_dir = dir.into();
        self
    }

    /// Where fetched archives land before they are parsed.
    pub fn downloads_dir(&self) -> PathBuf {
        self.temp_dir.join("Downloads")
    }

    /// Per-archive staging directory, keyed by the archive's display stem.
    pub fn staging_dir(&self, stem: &str) -> PathBuf {
        self.temp_dir.join(stem)
    }

    /// Final location of an archive with the given display stem.
    pub fn archive_path(&self, stem: &str) -> PathBuf {
        self.archives_dir.join(format!("{}.qmod", stem))
    }
}

/// Values supplied on the command line (or their environment fallbacks).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root: Option<PathBuf>,
    pub host_package: Option<String>,
    pub host_version: Option<String>,
    pub core_index_url: Option<String>,
    pub mods_dir: Option<PathBuf>,
    pub libs_dir: Option<PathBuf>,
    pub restart_command: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub layout: Layout,
    pub host_package_id: String,
    pub host_version: String,
    pub core_index_url: String,
    pub restart_command: Option<String>,
    pub token: Option<String>,
    pub fetch_timeout: Duration,
    pub operation_timeout: Duration,
}

impl Config {
    /// Resolve configuration. The root defaults to `<home>/.modman`.
    pub fn load(runtime: &dyn Runtime, overrides: ConfigOverrides) -> Result<Self> {
        let root = match overrides.root {
            Some(root) => root,
            None => runtime
                .home_dir()
                .map(|home| home.join(ROOT_DIR_NAME))
                .context("Could not determine the home directory, pass --root")?,
        };
        debug!("Using root {:?}", root);

        let mut layout = Layout::new(root);
        if let Some(dir) = overrides.mods_dir {
            layout = layout.with_mods_dir(dir);
        }
        if let Some(dir) = overrides.libs_dir {
            layout = layout.with_libs_dir(dir);
        }

        let token = runtime.env_var(TOKEN_ENV).ok().filter(|t| !t.is_empty());

        Ok(Self {
            layout,
            host_package_id: overrides
                .host_package
                .unwrap_or_else(|| DEFAULT_HOST_PACKAGE.to_string()),
            host_version: overrides.host_version.unwrap_or_default(),
            core_index_url: overrides
                .core_index_url
                .unwrap_or_else(|| DEFAULT_CORE_INDEX_URL.to_string()),
            restart_command: overrides.restart_command,
            token,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        })
    }

    /// A config rooted at `root` with defaults everywhere else.
    pub fn with_root(root: &Path) -> Self {
        Self {
            layout: Layout::new(root),
            host_package_id: DEFAULT_HOST_PACKAGE.to_string(),
            host_version: String::new(),
            core_index_url: DEFAULT_CORE_INDEX_URL.to_string(),
            restart_command: None,
            token: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Build the HTTP client, authenticated when a token is configured.
    pub fn http_client(&self) -> Result<HttpClient> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
            debug!("HTTP client configured with authentication");
        }

        let client = Client::builder()
            .user_agent(concat!("modman/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(HttpClient::new(client))
    }
}
