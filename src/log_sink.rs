//! Append-only, timestamped line logs kept on disk (boot log, process logs).
//!
//! These are the durable record an operator reads after a reboot; `tracing`
//! output goes to the terminal and is gone once the session ends.

use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One log file per subsystem. Writes are best-effort.
#[derive(Debug, Clone)]
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `[timestamp] message` to the log.
    pub fn append(&self, message: &str) {
        self.append_at(Local::now(), message);
    }

    fn append_at(&self, at: DateTime<Local>, message: &str) {
        if let Err(e) = self.try_append(&format_line(at, message)) {
            tracing::warn!(
                error = %e,
                path = %self.path.display(),
                "failed to append to log sink"
            );
        }
    }

    fn try_append(&self, line: &str) -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// Open the file in append mode for use as a child's stdout/stderr.
    pub fn open_for_child(&self) -> std::io::Result<std::fs::File> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
    }
}

fn format_line(at: DateTime<Local>, message: &str) -> String {
    format!("[{}] {}\n", at.format(TIMESTAMP_FORMAT), message)
}
