//! Root-only side effects needed during bring-up: re-enabling the WiFi
//! radio and starting a fallback access point.
//!
//! Commands are run through an escalation wrapper (`su -c "..."` by default)
//! rather than assuming the supervisor itself runs as root.

use crate::config::PrivilegedConfig;
use crate::error::SupervisorError;
use crate::executor::ProcessExecutor;
use std::sync::Arc;

pub trait PrivilegedOps: Send + Sync {
    /// Ask the OS to turn the WiFi radio on. Safe to call when already on.
    async fn enable_radio(&self) -> Result<(), SupervisorError>;

    /// Start a local access point with the given credentials.
    async fn provision_access_point(
        &self,
        ssid: &str,
        passphrase: &str,
    ) -> Result<(), SupervisorError>;
}

/// Runs configured command templates through the escalation wrapper.
pub struct SuShellOps<E> {
    executor: Arc<E>,
    config: PrivilegedConfig,
}

impl<E: ProcessExecutor> SuShellOps<E> {
    pub fn new(executor: Arc<E>, config: PrivilegedConfig) -> Self {
        Self { executor, config }
    }

    async fn escalate(&self, operation: &str, command: &str) -> Result<(), SupervisorError> {
        let args = vec!["-c".to_string(), command.to_string()];
        tracing::debug!(operation, escalation = %self.config.escalation, "running privileged command");
        match self
            .executor
            .run(&self.config.escalation, &args, None, &[])
            .await
        {
            Ok(Some(0)) => Ok(()),
            Ok(code) => Err(SupervisorError::PrivilegedOpFailure {
                operation: operation.to_string(),
                detail: format!("exit code {code:?}"),
            }),
            Err(e) => Err(SupervisorError::PrivilegedOpFailure {
                operation: operation.to_string(),
                detail: e.to_string(),
            }),
        }
    }
}

/// Fill `{ssid}` and `{passphrase}` into the access point command template.
fn render_access_point_command(template: &str, ssid: &str, passphrase: &str) -> String {
    template
        .replace("{ssid}", &shell_quote(ssid))
        .replace("{passphrase}", &shell_quote(passphrase))
}

/// Single-quote a value for `sh -c`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

impl<E: ProcessExecutor> PrivilegedOps for SuShellOps<E> {
    async fn enable_radio(&self) -> Result<(), SupervisorError> {
        self.escalate("enable_radio", &self.config.enable_radio_command)
            .await
    }

    async fn provision_access_point(
        &self,
        ssid: &str,
        passphrase: &str,
    ) -> Result<(), SupervisorError> {
        let command =
            render_access_point_command(&self.config.access_point_command, ssid, passphrase);
        self.escalate("provision_access_point", &command).await
    }
}

/// Name of the user the supervisor runs as, used to derive the hotspot SSID.
pub fn resolve_user_name() -> String {
    if let Ok(Some(user)) = nix::unistd::User::from_uid(nix::unistd::getuid()) {
        return user.name;
    }
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "device".to_string())
}

/// Hotspot SSID: the configured prefix followed by the user name.
pub fn hotspot_ssid(prefix: &str, user: &str) -> String {
    format!("{prefix}{user}")
}
