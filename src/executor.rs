//! Process execution seam: one-shot commands, detached launches, and
//! liveness detection by command-line pattern over the process table.
//!
//! Liveness is never tracked through a stored PID or child handle. A fresh
//! process-table snapshot answers "is it running?" every time, so a
//! supervisor that restarts (or a process started by hand) is judged the
//! same way.

use crate::error::SupervisorError;
use crate::log_sink::LogSink;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::process::Command;

/// What to launch for a supervised process or boot service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Returned by a successful detached launch. Diagnostics only; never used for liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnHandle {
    pub pid: u32,
}

pub trait ProcessExecutor: Send + Sync {
    /// Run a command to completion and return its exit code (None if killed by signal).
    async fn run(
        &self,
        command: &str,
        args: &[String],
        cwd: Option<&Path>,
        env: &[(String, String)],
    ) -> std::io::Result<Option<i32>>;

    /// Start a command detached from the caller, stdout+stderr appended to `log`.
    fn spawn_detached(
        &self,
        spec: &LaunchSpec,
        log: &LogSink,
    ) -> Result<SpawnHandle, SupervisorError>;

    /// True if any process other than ourselves has a command line matching `pattern`.
    fn is_running(&self, pattern: &str) -> bool;

    /// Send SIGTERM to every matching process. Returns how many were signalled.
    fn terminate(&self, pattern: &str) -> Result<usize, SupervisorError>;

    /// Send SIGKILL to every matching process. Returns how many were signalled.
    fn kill(&self, pattern: &str) -> Result<usize, SupervisorError>;
}

/// Source of `(pid, command line)` pairs for liveness matching.
pub trait ProcessTable: Send + Sync {
    fn command_lines(&self) -> Vec<(u32, String)>;
}

/// The live process table, read through `sysinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoTable;

impl ProcessTable for SysinfoTable {
    fn command_lines(&self) -> Vec<(u32, String)> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
        );

        system
            .processes()
            .iter()
            // Threads show up as their own entries on Linux; only count processes.
            .filter(|(_, process)| process.thread_kind().is_none())
            .filter_map(|(pid, process)| {
                joined_cmdline(process.cmd()).map(|cmdline| (pid.as_u32(), cmdline))
            })
            .collect()
    }
}

/// Space-join argv. Kernel threads and zombies have none and are skipped.
fn joined_cmdline(parts: &[OsString]) -> Option<String> {
    let joined: Vec<String> = parts
        .iter()
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string_lossy().into_owned())
        .collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined.join(" "))
    }
}

/// Real executor backed by tokio subprocesses, the process table, and POSIX signals.
#[derive(Debug, Clone)]
pub struct SystemExecutor<T = SysinfoTable> {
    table: T,
}

impl SystemExecutor {
    pub fn new() -> Self {
        Self::with_table(SysinfoTable)
    }
}

impl<T: ProcessTable> SystemExecutor<T> {
    pub fn with_table(table: T) -> Self {
        Self { table }
    }

    /// PIDs whose command line matches `pattern`, excluding this process.
    pub fn matching_pids(&self, pattern: &str) -> Vec<i32> {
        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid liveness pattern");
                return Vec::new();
            }
        };

        let own_pid = std::process::id();
        let mut pids: Vec<i32> = self
            .table
            .command_lines()
            .into_iter()
            .filter(|(pid, cmdline)| *pid != own_pid && regex.is_match(cmdline))
            .map(|(pid, _)| pid as i32)
            .collect();
        pids.sort_unstable();
        pids
    }

    fn signal_matching(&self, pattern: &str, signal: Signal) -> Result<usize, SupervisorError> {
        let mut signalled = 0;
        let mut failures = Vec::new();
        for pid in self.matching_pids(pattern) {
            match kill(Pid::from_raw(pid), signal) {
                Ok(()) => signalled += 1,
                // Already gone.
                Err(Errno::ESRCH) => {}
                Err(e) => failures.push(format!("pid {pid}: {e}")),
            }
        }

        if failures.is_empty() {
            tracing::debug!(pattern, ?signal, signalled, "signalled matching processes");
            Ok(signalled)
        } else {
            Err(SupervisorError::TerminationFailure {
                pattern: pattern.to_string(),
                detail: failures.join(", "),
            })
        }
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ProcessTable> ProcessExecutor for SystemExecutor<T> {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        cwd: Option<&Path>,
        env: &[(String, String)],
    ) -> std::io::Result<Option<i32>> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!(command, stderr = %stderr.trim(), "command wrote to stderr");
        }
        Ok(output.status.code())
    }

    fn spawn_detached(
        &self,
        spec: &LaunchSpec,
        log: &LogSink,
    ) -> Result<SpawnHandle, SupervisorError> {
        let launch_failure = |source: std::io::Error| SupervisorError::LaunchFailure {
            command: spec.command.clone(),
            source,
        };

        let stdout = log.open_for_child().map_err(launch_failure)?;
        // A second handle for stderr since File doesn't impl Clone
        let stderr = stdout.try_clone().map_err(launch_failure)?;

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0); // Own group: terminal signals to us don't reach it
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(launch_failure)?;
        let pid = child.id().unwrap_or(0);

        // Reap in the background so the exited child doesn't linger as a zombie
        // and the caller never waits on it.
        let command = spec.command.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::info!(pid, command, exit_code = ?status.code(), "detached process exited"),
                Err(e) => tracing::warn!(pid, command, error = %e, "failed to reap detached process"),
            }
        });

        tracing::info!(
            pid,
            command = %spec.command,
            args = ?spec.args,
            log = %log.path().display(),
            "detached process started"
        );
        Ok(SpawnHandle { pid })
    }

    fn is_running(&self, pattern: &str) -> bool {
        !self.matching_pids(pattern).is_empty()
    }

    fn terminate(&self, pattern: &str) -> Result<usize, SupervisorError> {
        self.signal_matching(pattern, Signal::SIGTERM)
    }

    fn kill(&self, pattern: &str) -> Result<usize, SupervisorError> {
        self.signal_matching(pattern, Signal::SIGKILL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Fixed process table for matching tests.
    struct StaticTable(Vec<(u32, &'static str)>);

    impl ProcessTable for StaticTable {
        fn command_lines(&self) -> Vec<(u32, String)> {
            self.0
                .iter()
                .map(|(pid, cmdline)| (*pid, cmdline.to_string()))
                .collect()
        }
    }

    #[test]
    fn test_matching_pids_over_table() {
        let executor = SystemExecutor::with_table(StaticTable(vec![
            (202, "sshd -D"),
            (101, "./xmrig -o pool:3333"),
        ]));
        assert_eq!(executor.matching_pids("xmrig"), vec![101]);
        assert_eq!(executor.matching_pids("^sshd"), vec![202]);
        assert!(executor.is_running("pool:3333"));
        assert!(!executor.is_running("dropbear"));
    }

    #[test]
    fn test_matching_pids_sorted() {
        let executor = SystemExecutor::with_table(StaticTable(vec![
            (30, "xmrig --threads 2"),
            (10, "xmrig --threads 4"),
            (20, "xmrig --threads 1"),
        ]));
        assert_eq!(executor.matching_pids("xmrig"), vec![10, 20, 30]);
    }

    #[test]
    fn test_matching_pids_excludes_self() {
        let executor = SystemExecutor::with_table(StaticTable(vec![(
            std::process::id(),
            "bootwarden --watch xmrig",
        )]));
        assert!(!executor.is_running("xmrig"));
    }

    #[test]
    fn test_invalid_pattern_is_not_running() {
        let executor = SystemExecutor::with_table(StaticTable(vec![(101, "anything")]));
        assert!(!executor.is_running("(unclosed"));
    }

    #[test]
    fn test_joined_cmdline() {
        let parts: Vec<OsString> = vec!["python".into(), "bridgeservice.py".into()];
        assert_eq!(
            joined_cmdline(&parts).as_deref(),
            Some("python bridgeservice.py")
        );
        assert_eq!(joined_cmdline(&[]), None);
        assert_eq!(joined_cmdline(&[OsString::new()]), None);
    }

    #[test]
    fn test_sysinfo_table_sees_own_process() {
        let own_pid = std::process::id();
        let lines = SysinfoTable.command_lines();
        assert!(lines.iter().any(|(pid, _)| *pid == own_pid));
    }

    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let executor = SystemExecutor::new();
        let code = executor
            .run("sh", &["-c".to_string(), "exit 3".to_string()], None, &[])
            .await
            .unwrap();
        assert_eq!(code, Some(3));
    }

    #[tokio::test]
    async fn test_run_passes_env_and_cwd() {
        let dir = tempdir().unwrap();
        let executor = SystemExecutor::new();
        let code = executor
            .run(
                "sh",
                &[
                    "-c".to_string(),
                    "test \"$WARDEN_TEST\" = yes && test -f marker".to_string(),
                ],
                Some(dir.path()),
                &[("WARDEN_TEST".to_string(), "yes".to_string())],
            )
            .await
            .unwrap();
        // marker doesn't exist yet
        assert_eq!(code, Some(1));

        std::fs::write(dir.path().join("marker"), "").unwrap();
        let code = executor
            .run(
                "sh",
                &[
                    "-c".to_string(),
                    "test \"$WARDEN_TEST\" = yes && test -f marker".to_string(),
                ],
                Some(dir.path()),
                &[("WARDEN_TEST".to_string(), "yes".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(code, Some(0));
    }

    #[tokio::test]
    async fn test_spawn_detached_writes_to_log() {
        let dir = tempdir().unwrap();
        let log = LogSink::new(dir.path().join("child.log"));
        let executor = SystemExecutor::new();
        let spec = LaunchSpec {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo stdout-line; echo stderr-line >&2".to_string(),
            ],
            working_dir: Some(dir.path().to_path_buf()),
        };

        let handle = executor.spawn_detached(&spec, &log).unwrap();
        assert!(handle.pid > 0);

        let mut contents = String::new();
        for _ in 0..50 {
            contents = std::fs::read_to_string(log.path()).unwrap_or_default();
            if contents.contains("stdout-line") && contents.contains("stderr-line") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(contents.contains("stdout-line"));
        assert!(contents.contains("stderr-line"));
    }

    #[tokio::test]
    async fn test_spawn_detached_missing_binary() {
        let dir = tempdir().unwrap();
        let log = LogSink::new(dir.path().join("child.log"));
        let spec = LaunchSpec {
            command: "nonexistent-binary-xyz".to_string(),
            args: vec![],
            working_dir: None,
        };
        let err = SystemExecutor::new()
            .spawn_detached(&spec, &log)
            .unwrap_err();
        assert!(matches!(err, SupervisorError::LaunchFailure { .. }));
    }

    #[tokio::test]
    async fn test_terminate_real_process() {
        let dir = tempdir().unwrap();
        let log = LogSink::new(dir.path().join("sleeper.log"));
        let executor = SystemExecutor::new();
        // Unique marker so the pattern can't match anything else on the host
        let marker = format!("bootwarden-test-sleeper-{}", std::process::id());
        let spec = LaunchSpec {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30; true".to_string(), marker.clone()],
            working_dir: None,
        };
        executor.spawn_detached(&spec, &log).unwrap();

        let mut running = false;
        for _ in 0..50 {
            if executor.is_running(&marker) {
                running = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(running, "spawned process should be detected by pattern");

        assert_eq!(executor.terminate(&marker).unwrap(), 1);

        let mut stopped = false;
        for _ in 0..100 {
            if !executor.is_running(&marker) {
                stopped = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(stopped, "process should exit after SIGTERM");
        assert_eq!(executor.kill(&marker).unwrap(), 0);
    }
}
