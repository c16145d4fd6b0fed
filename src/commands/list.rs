use anyhow::Result;
use log::debug;

use super::state_label;
use crate::manager::ModManager;

/// Print every downloaded mod with its state.
#[tracing::instrument(skip(manager))]
pub async fn list(manager: &ModManager) -> Result<()> {
    manager.scan().await?;

    let records = manager.registry().snapshot();
    if records.is_empty() {
        println!("No mods downloaded.");
        return Ok(());
    }
    debug!("Found {} mod(s)", records.len());

    for record in records {
        let mut tags = vec![state_label(record.is_installed())];
        if record.is_library() {
            tags.push("library");
        }
        if !record.uninstallable() {
            tags.push("protected");
        }
        if manager.is_core(record.id()) {
            tags.push("core");
        }
        println!("{} {} [{}]", record.id(), record.version(), tags.join(", "));
    }
    Ok(())
}

/// Reload the archives directory and report what was found.
#[tracing::instrument(skip(manager))]
pub async fn scan(manager: &ModManager) -> Result<()> {
    let report = manager.scan().await?;

    println!(
        "Loaded {} mod(s) from {}",
        report.loaded.len(),
        manager.layout().archives_dir.display()
    );
    for (path, reason) in &report.invalid {
        println!("  invalid: {} ({})", path.display(), reason);
    }
    Ok(())
}
