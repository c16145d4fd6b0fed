//! Command handlers behind the `modman` binary.
//!
//! Each handler loads the downloaded archives, performs one operation on the
//! [`ModManager`] and prints the outcome.

use anyhow::Result;
use log::debug;
use std::sync::Arc;

use crate::config::{Config, ConfigOverrides};
use crate::manager::ModManager;
use crate::runtime::Runtime;

mod core_mods;
mod install;
mod list;
mod uninstall;

pub use core_mods::core;
pub use install::{install, install_url};
pub use list::{list, scan};
pub use uninstall::{toggle, uninstall};

/// Resolve configuration and build a manager. Archives are not loaded yet.
#[tracing::instrument(skip(runtime, overrides))]
pub async fn open(runtime: Arc<dyn Runtime>, overrides: ConfigOverrides) -> Result<ModManager> {
    let config = Config::load(runtime.as_ref(), overrides)?;
    debug!("Using archives directory {:?}", config.layout.archives_dir);
    let manager = ModManager::from_config(&config, runtime)?;
    Ok(manager)
}

fn state_label(installed: bool) -> &'static str {
    if installed { "enabled" } else { "disabled" }
}
