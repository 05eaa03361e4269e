//! Connectivity probes. A probe answers one question, once: is `host`
//! reachable right now? Results are never cached.

use crate::error::SupervisorError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Binary connectivity state derived fresh from each probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Reachable,
    Unreachable,
}

impl ConnectivityState {
    pub fn is_reachable(self) -> bool {
        self == ConnectivityState::Reachable
    }
}

pub trait NetworkProbe: Send + Sync {
    /// Probe `host` once, bounded by `timeout`. `Ok(false)` means a definite
    /// "no answer"; `Err` means the probe itself could not complete.
    async fn reachable(&self, host: &str, timeout: Duration) -> Result<bool, SupervisorError>;
}

/// Probe once and collapse the outcome into a [`ConnectivityState`].
///
/// A probe error counts as unreachable; it is logged here and goes no further.
pub async fn check<P: NetworkProbe>(probe: &P, host: &str, timeout: Duration) -> ConnectivityState {
    match probe.reachable(host, timeout).await {
        Ok(true) => ConnectivityState::Reachable,
        Ok(false) => ConnectivityState::Unreachable,
        Err(e) => {
            tracing::warn!(host, error = %e, "connectivity probe failed");
            ConnectivityState::Unreachable
        }
    }
}

/// Sends a single ICMP echo using the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
}

impl PingProbe {
    pub fn new() -> Self {
        Self::with_program("ping")
    }

    /// Use a specific `ping` binary instead of the one on `PATH`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for a single ping bounded by `timeout` (whole seconds, at least 1).
fn ping_args(host: &str, timeout: Duration) -> Vec<String> {
    let secs = timeout.as_secs().max(1);
    vec![
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        secs.to_string(),
        host.to_string(),
    ]
}

impl NetworkProbe for PingProbe {
    async fn reachable(&self, host: &str, timeout: Duration) -> Result<bool, SupervisorError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(ping_args(host, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // ping's own -W bounds the wait for a reply, not DNS resolution; the
        // outer timeout covers the whole invocation.
        let outer = timeout + Duration::from_secs(1);
        match tokio::time::timeout(outer, cmd.status()).await {
            Ok(Ok(status)) => Ok(status.success()),
            Ok(Err(e)) => Err(SupervisorError::ProbeUnavailable {
                command: self.program.clone(),
                source: e,
            }),
            Err(_) => Err(SupervisorError::ProbeTimeout {
                host: host.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// Opens (and immediately drops) a TCP connection to `host:port`.
///
/// Useful where ICMP is filtered or `ping` needs privileges the supervisor lacks.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: u16,
}

impl TcpProbe {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl NetworkProbe for TcpProbe {
    async fn reachable(&self, host: &str, timeout: Duration) -> Result<bool, SupervisorError> {
        let addr = format!("{host}:{}", self.port);
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) => {
                tracing::debug!(addr, error = %e, "tcp probe refused or unroutable");
                Ok(false)
            }
            Err(_) => Err(SupervisorError::ProbeTimeout {
                host: host.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// The probe selected by config.
#[derive(Debug, Clone)]
pub enum ConfiguredProbe {
    Ping(PingProbe),
    Tcp(TcpProbe),
}

impl ConfiguredProbe {
    pub fn from_config(config: &crate::config::NetworkConfig) -> Self {
        match config.probe_method {
            crate::config::ProbeMethod::Ping => ConfiguredProbe::Ping(PingProbe::new()),
            crate::config::ProbeMethod::Tcp => {
                ConfiguredProbe::Tcp(TcpProbe::new(config.probe_port))
            }
        }
    }
}

impl NetworkProbe for ConfiguredProbe {
    async fn reachable(&self, host: &str, timeout: Duration) -> Result<bool, SupervisorError> {
        match self {
            ConfiguredProbe::Ping(p) => p.reachable(host, timeout).await,
            ConfiguredProbe::Tcp(p) => p.reachable(host, timeout).await,
        }
    }
}
