use anyhow::Result;

use crate::manager::ModManager;

/// Show core mod status and optionally install what is missing.
#[tracing::instrument(skip(manager))]
pub async fn core(manager: &ModManager, install: bool, restart: bool) -> Result<()> {
    manager.scan().await?;
    let report = manager.refresh_core_mods().await?;

    if report.listed.is_empty() {
        println!("No core mods listed for version {:?}.", report.host_version);
        return Ok(());
    }

    for info in &report.listed {
        let status = if report.missing.iter().any(|m| m.id == info.id) {
            "missing"
        } else if report.outdated.iter().any(|m| m.id == info.id) {
            "outdated"
        } else {
            "ok"
        };
        println!("{} {} [{}]", info.id, info.version, status);
    }

    if report.is_satisfied() || !install {
        return Ok(());
    }

    let pending = report.needs_install();
    let installed = manager.install_core_mods(&pending, restart).await?;
    println!("Installed {} of {} core mod(s)", installed, pending.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::MockFetcher;
    use crate::manager::test_support::{HOST_VERSION, ModSpec, TestEnv, serving};

    #[tokio::test]
    async fn test_core_installs_missing() {
        let env = TestEnv::new();
        let url = "https://mods.example.com/hook.qmod";
        let body = format!(
            r#"{{"{}": {{"mods": [{{"id":"hook","version":"1.0.0","downloadLink":"{}","filename":"hook.qmod"}}]}}}}"#,
            HOST_VERSION, url
        );
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_text()
            .returning(move |_| Ok(body.clone()));
        serving(&mut fetcher, url, &ModSpec::new("hook", "1.0.0"), 1);
        let manager = env.manager_with(fetcher);

        core(&manager, true, false).await.unwrap();

        assert!(manager.get("hook").unwrap().is_installed());
        assert!(manager.is_core("hook"));
    }

    #[tokio::test]
    async fn test_core_report_only() {
        let env = TestEnv::new();
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch_text().returning(|_| {
            Ok(format!(
                r#"{{"{}": {{"mods": [{{"id":"hook","version":"1.0.0","downloadLink":"x","filename":"hook.qmod"}}]}}}}"#,
                HOST_VERSION
            ))
        });
        let manager = env.manager_with(fetcher);

        core(&manager, false, false).await.unwrap();
        assert!(manager.get("hook").is_none());
    }
}
