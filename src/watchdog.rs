//! Connectivity-gated supervisor for a single background process.
//!
//! Every tick probes the network once and reconciles the process against it:
//! reachable means the process should run, unreachable means it should not.
//! Whether it *is* running comes from a fresh process-table match on each
//! tick, never from a remembered PID, so a restarted supervisor picks up an
//! instance started by its predecessor instead of launching a duplicate.

use crate::error::SupervisorError;
use crate::executor::{LaunchSpec, ProcessExecutor};
use crate::log_sink::LogSink;
use crate::probe::{self, ConnectivityState, NetworkProbe};
use crate::signals::ShutdownSignal;
use crate::status::{StatusTracker, WardenState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle phase of the supervised process, as last observed by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Failed,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    /// Reachable and not running: launched a new instance.
    Launched { pid: u32 },
    /// Reachable and already running.
    AlreadyRunning,
    /// Unreachable and running: sent SIGTERM.
    Stopped,
    /// Unreachable and still running after SIGTERM: sent SIGKILL.
    ForceKilled,
    /// Unreachable and not running.
    Idle,
    LaunchFailed,
    StopFailed,
}

/// The single process the watchdog owns.
#[derive(Debug)]
pub struct SupervisedProcess {
    pub name: String,
    /// Regex over the command line that identifies a live instance.
    pub pattern: String,
    pub launch: LaunchSpec,
    pub log: LogSink,
    phase: Phase,
    started_at: Option<DateTime<Utc>>,
    launches: u32,
    stops: u32,
    /// Consecutive ticks on which SIGTERM was sent without the process exiting.
    sigterm_streak: u32,
}

impl SupervisedProcess {
    pub fn new(name: &str, pattern: &str, launch: LaunchSpec, log: LogSink) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            launch,
            log,
            phase: Phase::Stopped,
            started_at: None,
            launches: 0,
            stops: 0,
            sigterm_streak: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn launches(&self) -> u32 {
        self.launches
    }

    pub fn stops(&self) -> u32 {
        self.stops
    }
}

#[derive(Debug, Clone)]
pub struct WatchdogSettings {
    pub poll_interval: Duration,
    pub probe_host: String,
    pub probe_timeout: Duration,
    /// SIGTERM ticks tolerated before escalating to SIGKILL. Zero kills outright.
    pub kill_grace_ticks: u32,
    /// Terminate the process when the watchdog itself shuts down.
    pub stop_process_on_exit: bool,
}

pub struct ProcessWatchdog<E, P> {
    executor: Arc<E>,
    probe: P,
    settings: WatchdogSettings,
    process: SupervisedProcess,
    boot_log: LogSink,
    status: Option<StatusTracker>,
    ticks: u64,
}

impl<E: ProcessExecutor, P: NetworkProbe> ProcessWatchdog<E, P> {
    pub fn new(
        executor: Arc<E>,
        probe: P,
        settings: WatchdogSettings,
        process: SupervisedProcess,
        boot_log: LogSink,
    ) -> Self {
        Self {
            executor,
            probe,
            settings,
            process,
            boot_log,
            status: None,
            ticks: 0,
        }
    }

    /// Publish state to a status file after every tick.
    pub fn with_status(mut self, status: StatusTracker) -> Self {
        self.status = Some(status);
        self
    }

    pub fn process(&self) -> &SupervisedProcess {
        &self.process
    }

    #[cfg(test)]
    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one probe-and-reconcile step. Never fails; problems are logged and
    /// reflected in the returned outcome.
    pub async fn tick(&mut self) -> (ConnectivityState, TickOutcome) {
        self.ticks += 1;
        let connectivity = probe::check(
            &self.probe,
            &self.settings.probe_host,
            self.settings.probe_timeout,
        )
        .await;
        let live = self.executor.is_running(&self.process.pattern);

        tracing::debug!(
            tick = self.ticks,
            ?connectivity,
            live,
            phase = ?self.process.phase,
            "watchdog tick"
        );

        let outcome = match (connectivity, live) {
            (ConnectivityState::Reachable, false) => {
                self.process.sigterm_streak = 0;
                if self.process.phase == Phase::Running {
                    tracing::warn!(process = %self.process.name, "process exited unexpectedly, restarting");
                    self.process
                        .log
                        .append(&format!("{} exited unexpectedly", self.process.name));
                }
                self.launch()
            }
            (ConnectivityState::Reachable, true) => {
                self.process.sigterm_streak = 0;
                if self.process.phase != Phase::Running {
                    tracing::info!(process = %self.process.name, "found running instance, adopting it");
                    self.process.phase = Phase::Running;
                }
                TickOutcome::AlreadyRunning
            }
            (ConnectivityState::Unreachable, true) => self.stop(),
            (ConnectivityState::Unreachable, false) => {
                self.process.sigterm_streak = 0;
                if self.process.phase == Phase::Running {
                    tracing::info!(process = %self.process.name, "process no longer running");
                }
                if self.process.phase != Phase::Failed {
                    self.process.phase = Phase::Stopped;
                }
                TickOutcome::Idle
            }
        };

        self.publish(connectivity, outcome);
        (connectivity, outcome)
    }

    fn launch(&mut self) -> TickOutcome {
        self.process.phase = Phase::Starting;
        match self
            .executor
            .spawn_detached(&self.process.launch, &self.process.log)
        {
            Ok(handle) => {
                let now = Utc::now();
                self.process.phase = Phase::Running;
                self.process.started_at = Some(now);
                self.process.launches += 1;
                tracing::info!(process = %self.process.name, pid = handle.pid, "process launched");
                self.process.log.append(&format!(
                    "{} started at {} (pid {})",
                    self.process.name,
                    now.to_rfc3339(),
                    handle.pid
                ));
                TickOutcome::Launched { pid: handle.pid }
            }
            Err(e) => {
                self.process.phase = Phase::Failed;
                self.record_failure(&e);
                TickOutcome::LaunchFailed
            }
        }
    }

    fn stop(&mut self) -> TickOutcome {
        let escalate = self.process.sigterm_streak >= self.settings.kill_grace_ticks;
        let result = if escalate {
            self.executor.kill(&self.process.pattern)
        } else {
            self.executor.terminate(&self.process.pattern)
        };

        match result {
            Ok(signalled) => {
                self.process.phase = Phase::Stopped;
                self.process.started_at = None;
                self.process.stops += 1;
                let (outcome, how) = if escalate {
                    self.process.sigterm_streak = 0;
                    (TickOutcome::ForceKilled, "killed")
                } else {
                    self.process.sigterm_streak += 1;
                    (TickOutcome::Stopped, "stopped")
                };
                tracing::info!(process = %self.process.name, signalled, how, "network unreachable, process stopped");
                self.process.log.append(&format!(
                    "{} {how}: network unreachable",
                    self.process.name
                ));
                outcome
            }
            Err(e) => {
                self.record_failure(&e);
                TickOutcome::StopFailed
            }
        }
    }

    fn record_failure(&self, error: &SupervisorError) {
        tracing::warn!(process = %self.process.name, error = %error, "watchdog action failed");
        self.boot_log.append(&format!("watchdog: {error}"));
    }

    fn publish(&mut self, connectivity: ConnectivityState, outcome: TickOutcome) {
        if let Some(status) = &mut self.status {
            status.record_tick(self.ticks, connectivity, outcome, self.process.phase);
            status.set_process_counters(
                self.process.started_at(),
                self.process.launches(),
                self.process.stops(),
            );
            status.update(WardenState::Watching);
        }
    }

    /// Tick, sleep, repeat until shutdown is requested.
    ///
    /// Ticks never overlap: the interval sleep begins only after a tick has
    /// finished, and shutdown is observed only during that sleep.
    pub async fn run(&mut self, shutdown: &mut ShutdownSignal) {
        tracing::info!(
            process = %self.process.name,
            interval_secs = self.settings.poll_interval.as_secs(),
            "watchdog started"
        );
        self.boot_log.append(&format!(
            "watchdog started for {} (every {}s)",
            self.process.name,
            self.settings.poll_interval.as_secs()
        ));

        while !shutdown.is_requested() {
            self.tick().await;
            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = shutdown.requested() => break,
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(status) = &self.status {
            status.update(WardenState::ShuttingDown);
        }
        if self.settings.stop_process_on_exit && self.executor.is_running(&self.process.pattern) {
            match self.executor.terminate(&self.process.pattern) {
                Ok(_) => {
                    self.process.phase = Phase::Stopped;
                    self.process
                        .log
                        .append(&format!("{} stopped: supervisor exiting", self.process.name));
                }
                Err(e) => self.record_failure(&e),
            }
        }
        tracing::info!(ticks = self.ticks, "watchdog stopped");
        self.boot_log
            .append(&format!("watchdog stopped after {} ticks", self.ticks));
    }
}
