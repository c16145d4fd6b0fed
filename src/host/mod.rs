//! Bridge to the host application the mods are installed into.

use anyhow::{Context, Result, bail};
use log::info;

/// Identity of the running host application, and control over its process.
#[cfg_attr(test, mockall::automock)]
pub trait HostBridge: Send + Sync {
    /// Package id of the running host, e.g. `com.beatgames.beatsaber`.
    fn package_id(&self) -> String;

    /// Version of the running host.
    fn package_version(&self) -> String;

    /// Restart the host process.
    fn restart(&self) -> Result<()>;
}

/// Host identity taken from configuration, restarted through an optional
/// shell command.
#[derive(Debug, Clone)]
pub struct ConfiguredHost {
    package_id: String,
    package_version: String,
    restart_command: Option<String>,
}

impl ConfiguredHost {
    pub fn new(
        package_id: impl Into<String>,
        package_version: impl Into<String>,
        restart_command: Option<String>,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            package_version: package_version.into(),
            restart_command,
        }
    }
}

impl HostBridge for ConfiguredHost {
    fn package_id(&self) -> String {
        self.package_id.clone()
    }

    fn package_version(&self) -> String {
        self.package_version.clone()
    }

    #[tracing::instrument(skip(self))]
    fn restart(&self) -> Result<()> {
        let Some(command) = self.restart_command.as_deref() else {
            info!(
                "No restart command configured, restart {} manually",
                self.package_id
            );
            return Ok(());
        };

        info!("Restarting {} with `{}`", self.package_id, command);
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .with_context(|| format!("Failed to run restart command `{}`", command))?;
        if !status.success() {
            bail!("Restart command `{}` exited with {}", command, status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_identity() {
        let host = ConfiguredHost::new("com.beatgames.beatsaber", "1.17.1", None);
        assert_eq!(host.package_id(), "com.beatgames.beatsaber");
        assert_eq!(host.package_version(), "1.17.1");
    }

    #[test]
    fn test_restart_without_command_is_noop() {
        let host = ConfiguredHost::new("com.example.app", "1.0.0", None);
        assert!(host.restart().is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn test_restart_reports_failing_command() {
        let host = ConfiguredHost::new("com.example.app", "1.0.0", Some("exit 3".into()));
        let err = host.restart().unwrap_err();
        assert!(err.to_string().contains("exit 3"));

        let host = ConfiguredHost::new("com.example.app", "1.0.0", Some("true".into()));
        assert!(host.restart().is_ok());
    }
}
