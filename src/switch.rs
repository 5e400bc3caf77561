//! Switching the active Steam login.
//!
//! A switch writes the auto-login identity, restarts the client with
//! `-login <account>` and checks that a client process came back. Only the
//! first two steps can abort the operation; everything after the credential
//! write degrades to a partial success because the credential alone already
//! takes effect on the next manual launch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::credentials::CredentialStore;
use crate::error::ProcessError;
use crate::locate::InstallLocator;
use crate::process::{CLIENT_IMAGE, LaunchSpec, ProcessControl};

const LAUNCH_FAILED: &str = "Account set in registry but Steam may not have started properly";
const LAUNCH_INCOMPLETE: &str =
    "Registry set but Steam may not have started. Account will be used next time Steam starts.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchTimings {
    /// Wait after a running client was stopped.
    pub after_terminate: Duration,
    /// Wait when stopping failed or found nothing, since a client may still
    /// be shutting down on its own.
    pub after_noop: Duration,
    /// Wait between launching and checking the process table.
    pub settle: Duration,
}

impl Default for SwitchTimings {
    fn default() -> Self {
        Self {
            after_terminate: Duration::from_millis(500),
            after_noop: Duration::from_millis(2000),
            settle: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStage {
    Start,
    PathResolved,
    CredentialSet,
    ProcessTerminated,
    ProcessLaunched,
    Verified,
    Aborted,
}

/// Outcome of a switch. `registry_set`, `steam_started` and `login_verified`
/// are reported separately because they can disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchResult {
    pub success: bool,
    pub registry_set: bool,
    pub steam_started: bool,
    pub login_verified: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl SwitchResult {
    fn aborted(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    fn registry_only(message: &str) -> Self {
        Self {
            success: true,
            registry_set: true,
            message: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn started(account_name: &str, login_verified: bool) -> Self {
        let message = if login_verified {
            format!("Successfully logged in with account: {account_name}")
        } else {
            format!("Steam started with account: {account_name}, but login verification is pending")
        };
        Self {
            success: true,
            registry_set: true,
            steam_started: true,
            login_verified,
            message: Some(message),
            error: None,
        }
    }
}

pub struct Switcher {
    locator: Arc<dyn InstallLocator>,
    credentials: Arc<dyn CredentialStore>,
    processes: Arc<dyn ProcessControl>,
    timings: SwitchTimings,
    gate: Mutex<()>,
}

impl Switcher {
    pub fn new(
        locator: Arc<dyn InstallLocator>,
        credentials: Arc<dyn CredentialStore>,
        processes: Arc<dyn ProcessControl>,
        timings: SwitchTimings,
    ) -> Self {
        Self {
            locator,
            credentials,
            processes,
            timings,
            gate: Mutex::new(()),
        }
    }

    /// Runs one switch to completion. Concurrent calls queue behind each
    /// other. Never fails: every outcome is described by the result.
    ///
    /// `login_verified` only means a client process is running after the
    /// settle delay. It does not confirm which account that client logged in.
    pub async fn switch_account(&self, account_name: &str) -> SwitchResult {
        let _turn = self.gate.lock().await;
        let account = account_name.trim();
        tracing::info!(stage = ?SwitchStage::Start, account, "Switching account");

        if account.is_empty() {
            tracing::warn!(stage = ?SwitchStage::Aborted, "No account name given");
            return SwitchResult::aborted("Account name is required");
        }

        let steam_root = match self.locator.locate().await {
            Ok(root) => root,
            Err(err) => {
                tracing::warn!(stage = ?SwitchStage::Aborted, %err, "Steam install not resolved");
                return SwitchResult::aborted(format!(
                    "Steam path not found. Make sure Steam is installed. ({err})"
                ));
            }
        };
        tracing::info!(stage = ?SwitchStage::PathResolved, path = %steam_root.display());

        if let Err(err) = self.credentials.set_auto_login(account).await {
            tracing::warn!(stage = ?SwitchStage::Aborted, %err, "Auto-login not written");
            return SwitchResult::aborted(err.to_string());
        }
        tracing::info!(stage = ?SwitchStage::CredentialSet, account);

        let delay = match self.processes.terminate(CLIENT_IMAGE).await {
            Ok(()) => {
                tracing::info!(stage = ?SwitchStage::ProcessTerminated, "Stopped running client");
                self.timings.after_terminate
            }
            Err(err) => {
                tracing::debug!(%err, "Client not stopped");
                self.timings.after_noop
            }
        };
        tokio::time::sleep(delay).await;

        let spec = LaunchSpec::steam_client(&steam_root, Some(account));
        match self.processes.launch(&spec).await {
            Ok(()) => {
                tracing::info!(stage = ?SwitchStage::ProcessLaunched, program = %spec.program.display());
            }
            Err(ProcessError::Task(err)) => {
                tracing::warn!(%err, "Launch task did not complete");
                return SwitchResult::registry_only(LAUNCH_INCOMPLETE);
            }
            Err(err) => {
                tracing::warn!(%err, "Launch failed");
                return SwitchResult::registry_only(LAUNCH_FAILED);
            }
        }

        tokio::time::sleep(self.timings.settle).await;
        let running = match self.processes.is_running(CLIENT_IMAGE).await {
            Ok(running) => running,
            Err(err) => {
                tracing::warn!(%err, "Could not check client process");
                false
            }
        };

        if running {
            tracing::info!(stage = ?SwitchStage::Verified, account);
        } else {
            tracing::warn!(account, "Client not running after launch");
        }
        SwitchResult::started(account, running)
    }
}
