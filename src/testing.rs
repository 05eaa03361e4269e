//! In-memory collaborators for bring-up and watchdog tests.

use crate::error::SupervisorError;
use crate::executor::{LaunchSpec, ProcessExecutor, SpawnHandle};
use crate::log_sink::LogSink;
use crate::privileged::PrivilegedOps;
use crate::probe::NetworkProbe;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Answers probes from a script, then a fixed fallback answer.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
    fallback: Option<bool>,
    calls: AtomicU32,
}

impl ScriptedProbe {
    pub fn always(reachable: bool) -> Self {
        Self::sequence(Vec::new(), reachable)
    }

    pub fn sequence(script: Vec<bool>, then: bool) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Some(then),
            calls: AtomicU32::new(0),
        }
    }

    /// Every probe fails with a timeout error.
    pub fn erroring() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NetworkProbe for ScriptedProbe {
    async fn reachable(&self, host: &str, timeout: Duration) -> Result<bool, SupervisorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return Ok(next);
        }
        self.fallback.ok_or_else(|| SupervisorError::ProbeTimeout {
            host: host.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }
}

/// Records privileged calls; optionally fails all of them.
#[derive(Default)]
pub struct MockOps {
    fail: bool,
    radio_calls: AtomicU32,
    access_points: Mutex<Vec<(String, String)>>,
}

impl MockOps {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn radio_calls(&self) -> u32 {
        self.radio_calls.load(Ordering::SeqCst)
    }

    pub fn access_points(&self) -> Vec<(String, String)> {
        self.access_points.lock().unwrap().clone()
    }

    fn outcome(&self, operation: &str) -> Result<(), SupervisorError> {
        if self.fail {
            Err(SupervisorError::PrivilegedOpFailure {
                operation: operation.to_string(),
                detail: "permission denied".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl PrivilegedOps for MockOps {
    async fn enable_radio(&self) -> Result<(), SupervisorError> {
        self.radio_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome("enable_radio")
    }

    async fn provision_access_point(
        &self,
        ssid: &str,
        passphrase: &str,
    ) -> Result<(), SupervisorError> {
        self.access_points
            .lock()
            .unwrap()
            .push((ssid.to_string(), passphrase.to_string()));
        self.outcome("provision_access_point")
    }
}

/// A fake process table holding at most one "process" per executor.
///
/// Spawning marks it running; SIGTERM stops it unless `ignore_sigterm` is
/// set; SIGKILL always stops it.
#[derive(Default)]
pub struct MockExecutor {
    running: AtomicBool,
    ignore_sigterm: AtomicBool,
    fail_spawn: AtomicBool,
    pub spawns: Mutex<Vec<LaunchSpec>>,
    pub terminates: AtomicU32,
    pub kills: AtomicU32,
    /// Ordered record of "spawn" / "terminate" / "kill" calls.
    pub events: Mutex<Vec<&'static str>>,
}

impl MockExecutor {
    pub fn running() -> Self {
        let executor = Self::default();
        executor.set_running(true);
        executor
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn set_ignore_sigterm(&self, ignore: bool) {
        self.ignore_sigterm.store(ignore, Ordering::SeqCst);
    }

    pub fn set_fail_spawn(&self, fail: bool) {
        self.fail_spawn.store(fail, Ordering::SeqCst);
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.lock().unwrap().len()
    }

    pub fn terminate_count(&self) -> u32 {
        self.terminates.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> u32 {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl ProcessExecutor for MockExecutor {
    async fn run(
        &self,
        _command: &str,
        _args: &[String],
        _cwd: Option<&Path>,
        _env: &[(String, String)],
    ) -> std::io::Result<Option<i32>> {
        Ok(Some(0))
    }

    fn spawn_detached(
        &self,
        spec: &LaunchSpec,
        log: &LogSink,
    ) -> Result<SpawnHandle, SupervisorError> {
        self.events.lock().unwrap().push("spawn");
        self.spawns.lock().unwrap().push(spec.clone());
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(SupervisorError::LaunchFailure {
                command: spec.command.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        log.append(&format!("spawned {}", spec.command));
        self.set_running(true);
        Ok(SpawnHandle { pid: 4242 })
    }

    fn is_running(&self, _pattern: &str) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn terminate(&self, _pattern: &str) -> Result<usize, SupervisorError> {
        self.events.lock().unwrap().push("terminate");
        self.terminates.fetch_add(1, Ordering::SeqCst);
        let was_running = self.running.load(Ordering::SeqCst);
        if !self.ignore_sigterm.load(Ordering::SeqCst) {
            self.set_running(false);
        }
        Ok(usize::from(was_running))
    }

    fn kill(&self, _pattern: &str) -> Result<usize, SupervisorError> {
        self.events.lock().unwrap().push("kill");
        self.kills.fetch_add(1, Ordering::SeqCst);
        let was_running = self.running.swap(false, Ordering::SeqCst);
        Ok(usize::from(was_running))
    }
}
