use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from bootwarden.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct WardenConfig {
    pub network: NetworkConfig,
    pub hotspot: HotspotConfig,
    pub privileged: PrivilegedConfig,
    pub watchdog: WatchdogConfig,
    pub process: ProcessConfig,
    pub logging: LoggingConfig,
    pub serve: ServeConfig,
    pub boot_services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    /// One ICMP echo via the system `ping` binary.
    Ping,
    /// TCP connect to `probe_host:probe_port`.
    Tcp,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub probe_host: String,
    pub probe_method: ProbeMethod,
    pub probe_port: u16,
    pub probe_timeout_secs: u64,
    pub max_bringup_attempts: u32,
    pub bringup_retry_delay_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HotspotConfig {
    pub ssid_prefix: String,
    /// Name of an environment variable holding the passphrase. Checked first.
    pub passphrase_env: Option<String>,
    /// Literal fallback passphrase.
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrivilegedConfig {
    /// Escalation wrapper; commands run as `<escalation> -c "<command>"`.
    pub escalation: String,
    pub enable_radio_command: String,
    /// `{ssid}` and `{passphrase}` are substituted before running.
    pub access_point_command: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub poll_interval_secs: u64,
    /// Consecutive SIGTERM ticks tolerated before escalating to SIGKILL.
    pub kill_grace_ticks: u32,
    pub stop_process_on_exit: bool,
}

/// The single long-running task the watchdog supervises.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub name: String,
    /// Regex matched against each process's command line.
    pub pattern: String,
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// A one-shot daemon started after bring-up if not already running.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub pattern: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Output log. Relative paths are under the logs directory; defaults to `<name>.log`.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub retention_days: u32,
    /// Logs larger than this are rotated into zstd archives at startup.
    pub rotate_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_host: "8.8.8.8".to_string(),
            probe_method: ProbeMethod::Ping,
            probe_port: 53,
            probe_timeout_secs: 2,
            max_bringup_attempts: 10,
            bringup_retry_delay_secs: 10,
        }
    }
}

impl Default for HotspotConfig {
    fn default() -> Self {
        Self {
            ssid_prefix: "termux-".to_string(),
            passphrase_env: Some("BOOTWARDEN_HOTSPOT_PASSPHRASE".to_string()),
            passphrase: None,
        }
    }
}

impl Default for PrivilegedConfig {
    fn default() -> Self {
        Self {
            escalation: "su".to_string(),
            enable_radio_command: "svc wifi enable".to_string(),
            access_point_command: "cmd wifi start-softap {ssid} wpa2 {passphrase}".to_string(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 120,
            kill_grace_ticks: 1,
            stop_process_on_exit: false,
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            name: "miner".to_string(),
            pattern: "xmrig".to_string(),
            command: "./xmrig".to_string(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            retention_days: 7,
            rotate_bytes: 5 * 1024 * 1024,
        }
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1".to_string(),
            port: 8421,
        }
    }
}

impl NetworkConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.bringup_retry_delay_secs)
    }
}

impl WatchdogConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl HotspotConfig {
    /// Resolve the access point passphrase: environment variable first, then the literal.
    pub fn resolve_passphrase(&self) -> Option<String> {
        if let Some(var) = &self.passphrase_env {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        self.passphrase.clone()
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {source}", path.display())
            }
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl WardenConfig {
    /// Load config from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the supervisor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "watchdog.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.network.probe_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "network.probe_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.network.probe_host.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "network.probe_host must not be empty".to_string(),
            ));
        }
        if self.process.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "process.command must not be empty".to_string(),
            ));
        }
        regex::Regex::new(&self.process.pattern).map_err(|e| {
            ConfigError::Invalid(format!("process.pattern is not a valid regex: {e}"))
        })?;
        for service in &self.boot_services {
            regex::Regex::new(&service.pattern).map_err(|e| {
                ConfigError::Invalid(format!(
                    "boot_services[{}].pattern is not a valid regex: {e}",
                    service.name
                ))
            })?;
        }
        Ok(())
    }
}
