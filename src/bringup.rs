//! Network bring-up: probe with bounded retries, nudging the radio between
//! attempts, and fall back to a self-hosted access point when nothing works.
//!
//! Bring-up cannot fail. Side-effect errors are logged and the function
//! reports only the final observed connectivity.

use crate::log_sink::LogSink;
use crate::privileged::PrivilegedOps;
use crate::probe::{self, ConnectivityState, NetworkProbe};
use crate::retry::RetryBudget;
use crate::signals::ShutdownSignal;
use std::time::Duration;

/// Credentials for the fallback access point.
#[derive(Debug, Clone)]
pub struct HotspotParams {
    pub ssid: String,
    /// `None` when no secret was provisioned; the access point is then skipped.
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BringupParams {
    pub max_attempts: u32,
    pub probe_host: String,
    pub probe_timeout: Duration,
    pub retry_delay: Duration,
    pub hotspot: HotspotParams,
}

pub struct NetworkBringup<'a, P, O> {
    probe: &'a P,
    ops: &'a O,
    boot_log: &'a LogSink,
    shutdown: Option<ShutdownSignal>,
}

impl<'a, P: NetworkProbe, O: PrivilegedOps> NetworkBringup<'a, P, O> {
    pub fn new(probe: &'a P, ops: &'a O, boot_log: &'a LogSink) -> Self {
        Self {
            probe,
            ops,
            boot_log,
            shutdown: None,
        }
    }

    /// Abandon bring-up (skipping the remaining retries and the access point)
    /// once shutdown is requested.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn stop_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|s| s.is_requested())
    }

    /// Sleep for `delay`. Returns true if shutdown cut the sleep short.
    async fn pause(&self, delay: Duration) -> bool {
        let Some(shutdown) = &self.shutdown else {
            tokio::time::sleep(delay).await;
            return false;
        };
        let mut shutdown = shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = shutdown.requested() => true,
        }
    }

    fn abandon(&self, attempts: u32) -> ConnectivityState {
        tracing::info!(attempts, "shutdown requested, abandoning network bring-up");
        self.boot_log.append(&format!(
            "network bring-up abandoned after {attempts} attempts: shutdown requested"
        ));
        ConnectivityState::Unreachable
    }

    /// Probe up to `max_attempts` times, returning as soon as one succeeds.
    ///
    /// Between failed attempts the radio is re-enabled and `retry_delay`
    /// elapses; no delay follows the final attempt. If every attempt fails,
    /// the fallback access point is provisioned once.
    pub async fn bring_up(&self, params: &BringupParams) -> ConnectivityState {
        let mut budget = RetryBudget::new(params.max_attempts, params.retry_delay);
        self.boot_log.append(&format!(
            "network bring-up: probing {} (up to {} attempts)",
            params.probe_host,
            budget.max_attempts()
        ));

        while let Some(attempt) = budget.next_attempt() {
            let state = probe::check(self.probe, &params.probe_host, params.probe_timeout).await;
            if state.is_reachable() {
                tracing::info!(attempt, host = %params.probe_host, "network reachable");
                self.boot_log
                    .append(&format!("network reachable on attempt {attempt}"));
                return ConnectivityState::Reachable;
            }

            tracing::warn!(
                attempt,
                max_attempts = budget.max_attempts(),
                host = %params.probe_host,
                "network unreachable"
            );

            if !budget.has_remaining() {
                break;
            }

            if let Err(e) = self.ops.enable_radio().await {
                tracing::warn!(error = %e, "radio re-enable failed");
                self.boot_log.append(&format!("radio re-enable failed: {e}"));
            }
            if self.pause(budget.backoff()).await {
                return self.abandon(budget.used());
            }
        }

        if self.stop_requested() {
            return self.abandon(budget.used());
        }
        self.boot_log.append(&format!(
            "network unreachable after {} attempts, starting fallback access point",
            budget.used()
        ));
        self.provision_fallback(&params.hotspot).await;
        ConnectivityState::Unreachable
    }

    async fn provision_fallback(&self, hotspot: &HotspotParams) {
        let Some(passphrase) = &hotspot.passphrase else {
            tracing::warn!(ssid = %hotspot.ssid, "no hotspot passphrase configured, skipping access point");
            self.boot_log
                .append("fallback access point skipped: no passphrase configured");
            return;
        };

        match self.ops.provision_access_point(&hotspot.ssid, passphrase).await {
            Ok(()) => {
                tracing::info!(ssid = %hotspot.ssid, "fallback access point started");
                self.boot_log
                    .append(&format!("fallback access point {} started", hotspot.ssid));
            }
            Err(e) => {
                tracing::warn!(ssid = %hotspot.ssid, error = %e, "fallback access point failed");
                self.boot_log
                    .append(&format!("fallback access point failed: {e}"));
            }
        }
    }
}
