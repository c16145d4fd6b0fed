use anyhow::{Context, Result};

use super::state_label;
use crate::manager::{ModManager, UninstallOptions};

/// Disable a mod, or delete it with `delete`.
#[tracing::instrument(skip(manager))]
pub async fn uninstall(manager: &ModManager, id: &str, delete: bool, force: bool) -> Result<()> {
    manager.scan().await?;

    let mut options = if delete {
        UninstallOptions::delete()
    } else {
        UninstallOptions::disable()
    };
    if force {
        options = options.with_force();
    }
    manager.uninstall(id, options).await?;

    println!("{} {}", if delete { "Deleted" } else { "Disabled" }, id);
    Ok(())
}

/// Flip a mod between enabled and disabled.
#[tracing::instrument(skip(manager))]
pub async fn toggle(manager: &ModManager, id: &str) -> Result<()> {
    manager.scan().await?;
    manager.toggle(id).await?;

    let record = manager
        .get(id)
        .with_context(|| format!("Mod {:?} disappeared while toggling", id))?;
    println!("{} is now {}", id, state_label(record.is_installed()));
    Ok(())
}
