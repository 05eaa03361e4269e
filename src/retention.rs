//! Log rotation and retention using zstd.
//!
//! At startup, any `*.log` in the logs directory larger than `rotate_bytes`
//! is compressed to `{stem}.{timestamp}.log.zst` and the original removed.
//! Archives older than `retention_days` are deleted.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Rotate oversized logs, then prune expired archives.
/// Errors on individual files are logged but do not stop processing.
pub fn apply(logs_dir: &Path, rotate_bytes: u64, retention_days: u32) {
    rotate_large_logs(logs_dir, rotate_bytes, Local::now());
    prune_archives(logs_dir, retention_days, SystemTime::now());
}

/// Compress every `*.log` larger than `rotate_bytes` into a timestamped archive.
pub fn rotate_large_logs(logs_dir: &Path, rotate_bytes: u64, now: DateTime<Local>) {
    if rotate_bytes == 0 {
        return;
    }

    for path in matching(logs_dir, "*.log") {
        let size = match std::fs::metadata(&path) {
            Ok(m) => m.len(),
            Err(_) => continue,
        };
        if size <= rotate_bytes {
            continue;
        }

        let dest = archive_path(&path, now);
        match compress_file(&path, &dest) {
            Ok(()) => tracing::info!(
                file = %path.display(),
                archive = %dest.display(),
                size,
                "rotated log file"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                file = %path.display(),
                "failed to rotate log file"
            ),
        }
    }
}

/// Delete `*.log.zst` archives whose modification time is older than `retention_days`.
/// A retention of zero keeps everything.
pub fn prune_archives(logs_dir: &Path, retention_days: u32, now: SystemTime) {
    if retention_days == 0 {
        return;
    }
    let max_age = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);

    for path in matching(logs_dir, "*.log.zst") {
        let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => continue,
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }

        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(error = %e, file = %path.display(), "failed to remove expired log archive");
        } else {
            tracing::debug!(file = %path.display(), age_days = age.as_secs() / 86_400, "removed expired log archive");
        }
    }
}

fn matching(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let full = format!("{escaped}/{pattern}");
    match glob::glob(&full) {
        Ok(paths) => paths.flatten().collect(),
        Err(e) => {
            tracing::warn!(error = %e, dir = %dir.display(), "invalid log glob");
            Vec::new()
        }
    }
}

/// `logs/miner.log` -> `logs/miner.20260301-070509.log.zst`
fn archive_path(path: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());
    path.with_file_name(format!("{stem}.{}.log.zst", now.format("%Y%m%d-%H%M%S")))
}

/// Compress a single file with zstd, writing to `dest` and removing the original.
fn compress_file(path: &Path, dest: &Path) -> std::io::Result<()> {
    let input = std::fs::read(path)?;
    let compressed = zstd::encode_all(input.as_slice(), 3)?;
    std::fs::write(dest, compressed)?;
    std::fs::remove_file(path)?;
    Ok(())
}
