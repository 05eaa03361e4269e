use fs2::FileExt;
use std::path::{Path, PathBuf};

/// Manages the `.bootwarden/` directory layout.
///
/// All supervisor artifacts live under a single data directory (default `.bootwarden/`).
/// This struct provides accessors for each well-known path and handles initialization.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Create a new DataDir referencing the given root path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory (e.g. `.bootwarden/`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the status file.
    pub fn status(&self) -> PathBuf {
        self.root.join("status")
    }

    /// Path to the logs directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Boot log: bring-up, boot services, and watchdog lifecycle lines.
    pub fn boot_log(&self) -> PathBuf {
        self.logs_dir().join("boot.log")
    }

    /// Output log for a supervised process or boot service (e.g. `logs/miner.log`).
    pub fn process_log(&self, name: &str) -> PathBuf {
        self.logs_dir().join(format!("{}.log", sanitize_name(name)))
    }

    /// Path to the singleton lock file.
    pub fn lock(&self) -> PathBuf {
        self.root.join("lock")
    }

    /// Path to the config file (e.g. `.bootwarden/config.toml`).
    pub fn config(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Creating this file asks a running supervisor to stop.
    pub fn stop_file(&self) -> PathBuf {
        self.root.join("STOP")
    }

    /// Default content written to `config.toml` when initializing a new data directory.
    const DEFAULT_CONFIG: &str = "\
# bootwarden configuration
# Every key is optional; omitted keys use built-in defaults.

[network]
probe_host = \"8.8.8.8\"
probe_timeout_secs = 2
max_bringup_attempts = 10
bringup_retry_delay_secs = 10

[hotspot]
ssid_prefix = \"termux-\"
passphrase_env = \"BOOTWARDEN_HOTSPOT_PASSPHRASE\"

[watchdog]
poll_interval_secs = 120

[process]
name = \"miner\"
pattern = \"xmrig\"
command = \"./xmrig\"

[logging]
retention_days = 7

# [[boot_services]]
# name = \"sshd\"
# pattern = \"^sshd\"
# command = \"sshd\"
# log_file = \"sshd.log\"
";

    /// Initialize the directory structure: root and logs/.
    /// Also writes a default config.toml if one doesn't already exist.
    /// Returns Ok(true) if the root was created, Ok(false) if it already existed.
    pub fn init(&self) -> std::io::Result<bool> {
        let created = !self.root.exists();
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.logs_dir())?;

        let config_path = self.config();
        if !config_path.exists() {
            std::fs::write(&config_path, Self::DEFAULT_CONFIG)?;
        }

        Ok(created)
    }

    /// Take the single-instance lock. Held until the returned guard is dropped.
    pub fn acquire_lock(&self) -> Result<InstanceLock, LockError> {
        let path = self.lock();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| LockError::Io {
                path: path.clone(),
                source: e,
            })?;

        file.try_lock_exclusive()
            .map_err(|_| LockError::Held { path: path.clone() })?;

        // Record our PID for operators; the lock itself is what matters.
        let _ = std::fs::write(&path, std::process::id().to_string());

        Ok(InstanceLock { file, path })
    }
}

/// File names derived from user-supplied process names.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "process".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Exclusive lock on the data directory. Released on drop.
#[derive(Debug)]
pub struct InstanceLock {
    file: std::fs::File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[derive(Debug)]
pub enum LockError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Another supervisor already holds the lock.
    Held { path: PathBuf },
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::Io { path, source } => {
                write!(f, "failed to open lock file {}: {source}", path.display())
            }
            LockError::Held { path } => write!(
                f,
                "another bootwarden instance holds {}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LockError::Io { source, .. } => Some(source),
            LockError::Held { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths() {
        let dd = DataDir::new("/tmp/test-bootwarden");
        assert_eq!(dd.root(), Path::new("/tmp/test-bootwarden"));
        assert_eq!(dd.status(), PathBuf::from("/tmp/test-bootwarden/status"));
        assert_eq!(dd.logs_dir(), PathBuf::from("/tmp/test-bootwarden/logs"));
        assert_eq!(
            dd.boot_log(),
            PathBuf::from("/tmp/test-bootwarden/logs/boot.log")
        );
        assert_eq!(
            dd.process_log("miner"),
            PathBuf::from("/tmp/test-bootwarden/logs/miner.log")
        );
        assert_eq!(dd.lock(), PathBuf::from("/tmp/test-bootwarden/lock"));
        assert_eq!(
            dd.config(),
            PathBuf::from("/tmp/test-bootwarden/config.toml")
        );
        assert_eq!(dd.stop_file(), PathBuf::from("/tmp/test-bootwarden/STOP"));
    }

    #[test]
    fn test_process_log_sanitizes_name() {
        let dd = DataDir::new("/d");
        assert_eq!(
            dd.process_log("../bridge service"),
            PathBuf::from("/d/logs/_bridge_service.log")
        );
        assert_eq!(dd.process_log(""), PathBuf::from("/d/logs/process.log"));
    }

    #[test]
    fn test_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let dd = DataDir::new(tmp.path().join(".bootwarden"));

        let created = dd.init().unwrap();
        assert!(created);
        assert!(dd.root().is_dir());
        assert!(dd.logs_dir().is_dir());
        assert!(dd.config().is_file());
    }

    #[test]
    fn test_init_is_idempotent_and_keeps_config() {
        let tmp = tempdir().unwrap();
        let dd = DataDir::new(tmp.path().join(".bootwarden"));
        dd.init().unwrap();
        std::fs::write(dd.config(), "[watchdog]\npoll_interval_secs = 5\n").unwrap();

        let created = dd.init().unwrap();
        assert!(!created);
        let contents = std::fs::read_to_string(dd.config()).unwrap();
        assert!(contents.contains("poll_interval_secs = 5"));
    }

    #[test]
    fn test_default_config_parses() {
        let tmp = tempdir().unwrap();
        let dd = DataDir::new(tmp.path().join(".bootwarden"));
        dd.init().unwrap();
        let config = crate::config::WardenConfig::load(&dd.config()).unwrap();
        assert_eq!(config.watchdog.poll_interval_secs, 120);
        assert_eq!(config.process.pattern, "xmrig");
    }

    #[test]
    fn test_lock_is_exclusive() {
        let tmp = tempdir().unwrap();
        let dd = DataDir::new(tmp.path().join(".bootwarden"));
        dd.init().unwrap();

        let lock = dd.acquire_lock().unwrap();
        assert_eq!(lock.path(), dd.lock());
        let pid = std::fs::read_to_string(dd.lock()).unwrap();
        assert_eq!(pid, std::process::id().to_string());

        let err = dd.acquire_lock().unwrap_err();
        assert!(matches!(err, LockError::Held { .. }));

        drop(lock);
        assert!(dd.acquire_lock().is_ok());
    }

    #[test]
    fn test_lock_missing_dir_is_io_error() {
        let dd = DataDir::new("/nonexistent-dir/impossible/.bootwarden");
        assert!(matches!(dd.acquire_lock(), Err(LockError::Io { .. })));
    }
}
