//! Status file: writes the supervisor's current state as JSON after every
//! bring-up step and watchdog tick.
//!
//! Uses atomic write pattern: write to temp file then rename.
use crate::probe::ConnectivityState;
use crate::watchdog::{Phase, TickOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Supervisor states written to the status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WardenState {
    Starting,
    BringingUp,
    StartingServices,
    Watching,
    ShuttingDown,
}

/// The JSON payload written to the status file.
#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    pub pid: u32,
    pub state: WardenState,
    pub connectivity: Option<ConnectivityState>,
    pub process_name: String,
    pub phase: Phase,
    pub tick: u64,
    pub last_outcome: Option<TickOutcome>,
    pub process_started_at: Option<DateTime<Utc>>,
    pub launches: u32,
    pub stops: u32,
    pub last_update: DateTime<Utc>,
}

/// Manages the status file lifecycle.
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    /// Create a new StatusFile writer for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Atomically write status data to the status file.
    ///
    /// Writes to a temporary file in the same directory, then renames
    /// to ensure readers never see a partial write.
    pub fn write(&self, data: &StatusData) -> Result<(), StatusError> {
        let json =
            serde_json::to_string_pretty(data).map_err(|e| StatusError::Serialize { source: e })?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = dir.join(format!(".status.tmp.{}", std::process::id()));

        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| StatusError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| StatusError::Rename {
            from: tmp_path,
            to: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }

}

/// Read the status file as raw JSON, for `--status` and the HTTP endpoint.
pub fn read_status(path: &Path) -> Option<serde_json::Value> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Mutable state tracker that builds StatusData for each update.
pub struct StatusTracker {
    file: StatusFile,
    pid: u32,
    process_name: String,
    connectivity: Option<ConnectivityState>,
    phase: Phase,
    tick: u64,
    last_outcome: Option<TickOutcome>,
    process_started_at: Option<DateTime<Utc>>,
    launches: u32,
    stops: u32,
}

impl StatusTracker {
    /// Create a new tracker.
    pub fn new(status_path: PathBuf, process_name: &str) -> Self {
        Self {
            file: StatusFile::new(status_path),
            pid: std::process::id(),
            process_name: process_name.to_string(),
            connectivity: None,
            phase: Phase::Stopped,
            tick: 0,
            last_outcome: None,
            process_started_at: None,
            launches: 0,
            stops: 0,
        }
    }

    /// Update and write the status file with the given state.
    pub fn update(&self, state: WardenState) {
        let data = StatusData {
            pid: self.pid,
            state,
            connectivity: self.connectivity,
            process_name: self.process_name.clone(),
            phase: self.phase,
            tick: self.tick,
            last_outcome: self.last_outcome,
            process_started_at: self.process_started_at,
            launches: self.launches,
            stops: self.stops,
            last_update: Utc::now(),
        };

        if let Err(e) = self.file.write(&data) {
            tracing::warn!(error = %e, "failed to write status file");
        }
    }

    pub fn set_connectivity(&mut self, connectivity: ConnectivityState) {
        self.connectivity = Some(connectivity);
    }

    /// Record the result of one watchdog tick.
    pub fn record_tick(
        &mut self,
        tick: u64,
        connectivity: ConnectivityState,
        outcome: TickOutcome,
        phase: Phase,
    ) {
        self.tick = tick;
        self.connectivity = Some(connectivity);
        self.last_outcome = Some(outcome);
        self.phase = phase;
    }

    pub fn set_process_counters(
        &mut self,
        started_at: Option<DateTime<Utc>>,
        launches: u32,
        stops: u32,
    ) {
        self.process_started_at = started_at;
        self.launches = launches;
        self.stops = stops;
    }
}

/// Errors from status file operations.
#[derive(Debug)]
pub enum StatusError {
    Serialize {
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusError::Serialize { source } => write!(f, "failed to serialize status: {source}"),
            StatusError::Write { path, source } => {
                write!(
                    f,
                    "failed to write temp status file {}: {source}",
                    path.display()
                )
            }
            StatusError::Rename { from, to, source } => {
                write!(
                    f,
                    "failed to rename {} -> {}: {source}",
                    from.display(),
                    to.display()
                )
            }
        }
    }
}

impl std::error::Error for StatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatusError::Serialize { source } => Some(source),
            StatusError::Write { source, .. } => Some(source),
            StatusError::Rename { source, .. } => Some(source),
        }
    }
}
