use anyhow::{Result, bail};
use log::debug;
use std::path::Path;

use crate::manager::ModManager;

/// Install a downloaded mod, given either its id or an archive path.
#[tracing::instrument(skip(manager))]
pub async fn install(manager: &ModManager, target: &str) -> Result<()> {
    manager.scan().await?;

    let record = match manager.get(target) {
        Some(record) => record,
        None if looks_like_path(target) => {
            debug!("Loading archive {:?}", target);
            let record = manager.load_archive(Path::new(target)).await;
            if let Some(reason) = record.invalid_reason() {
                bail!("{} is not a valid mod archive: {}", target, reason);
            }
            record
        }
        None => bail!("Mod {:?} is not downloaded", target),
    };

    manager.install_record(record.clone()).await?;
    println!("Installed {} {}", record.id(), record.version());
    Ok(())
}

/// Download an archive and install it.
#[tracing::instrument(skip(manager))]
pub async fn install_url(manager: &ModManager, file_name: &str, url: &str) -> Result<()> {
    manager.scan().await?;

    let record = manager.install_from_url(file_name, url).await?;
    println!(
        "Installed {} {} from {}",
        record.id(),
        record.version(),
        url
    );
    Ok(())
}

fn looks_like_path(target: &str) -> bool {
    let path = Path::new(target);
    path.components().count() > 1
        || path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("qmod") || ext.eq_ignore_ascii_case("zip"))
}
