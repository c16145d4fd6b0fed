//! Per-record lifecycle state.

use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle state of a mod record.
///
/// `Invalid` is terminal and only ever assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Uninstalled,
    Installing,
    Installed,
    Uninstalling,
    Invalid,
}

impl InstallState {
    /// States another task is expected to leave shortly.
    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Installing | Self::Uninstalling)
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninstalled => "uninstalled",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Uninstalling => "uninstalling",
            Self::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// State cell with atomic compare-and-swap transitions that other tasks can
/// wait on.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<InstallState>,
}

impl StateCell {
    pub fn new(initial: InstallState) -> Self {
        Self {
            tx: watch::Sender::new(initial),
        }
    }

    pub fn get(&self) -> InstallState {
        *self.tx.borrow()
    }

    /// Move from `from` to `to` if and only if the current state is `from`.
    ///
    /// Returns the state observed before the attempt.
    pub fn transition(&self, from: InstallState, to: InstallState) -> Result<(), InstallState> {
        let mut observed = from;
        self.tx.send_if_modified(|state| {
            observed = *state;
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if observed == from {
            Ok(())
        } else {
            Err(observed)
        }
    }

    /// Unconditionally set a non-invalid state.
    pub fn set(&self, to: InstallState) {
        self.tx.send_if_modified(|state| {
            if *state == InstallState::Invalid || *state == to {
                return false;
            }
            *state = to;
            true
        });
    }

    /// Wait until the state is no longer transitional, up to `timeout`.
    ///
    /// Returns `None` when the timeout elapsed first.
    pub async fn settled(&self, timeout: Duration) -> Option<InstallState> {
        let mut rx = self.tx.subscribe();
        let wait = rx.wait_for(|state| !state.is_transitional());
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(state)) => Some(*state),
            Ok(Err(_)) => Some(self.get()),
            Err(_) => None,
        }
    }
}
