//! One-shot daemons started after bring-up (SSH server, bridge service).
//!
//! Each service is launched only if no process matches its pattern, so
//! re-running the supervisor never duplicates an already running daemon.
//! Unlike the watchdog's process, services are not monitored afterwards.

use crate::config::ServiceConfig;
use crate::data_dir::DataDir;
use crate::executor::{LaunchSpec, ProcessExecutor};
use crate::log_sink::LogSink;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    Started { pid: u32 },
    AlreadyRunning,
    Failed,
}

/// Launch every configured service that isn't already running.
pub fn start_all<E: ProcessExecutor>(
    executor: &E,
    services: &[ServiceConfig],
    data_dir: &DataDir,
    boot_log: &LogSink,
) -> Vec<(String, ServiceOutcome)> {
    services
        .iter()
        .map(|service| {
            let outcome = start_one(executor, service, data_dir, boot_log);
            (service.name.clone(), outcome)
        })
        .collect()
}

fn start_one<E: ProcessExecutor>(
    executor: &E,
    service: &ServiceConfig,
    data_dir: &DataDir,
    boot_log: &LogSink,
) -> ServiceOutcome {
    if executor.is_running(&service.pattern) {
        tracing::info!(service = %service.name, "boot service already running");
        boot_log.append(&format!("{} already running", service.name));
        return ServiceOutcome::AlreadyRunning;
    }

    let spec = LaunchSpec {
        command: service.command.clone(),
        args: service.args.clone(),
        working_dir: service.working_dir.clone(),
    };
    let log = LogSink::new(service_log_path(service, data_dir));

    match executor.spawn_detached(&spec, &log) {
        Ok(handle) => {
            boot_log.append(&format!("{} started (pid {})", service.name, handle.pid));
            ServiceOutcome::Started { pid: handle.pid }
        }
        Err(e) => {
            tracing::warn!(service = %service.name, error = %e, "boot service failed to start");
            boot_log.append(&format!("{} failed to start: {e}", service.name));
            ServiceOutcome::Failed
        }
    }
}

/// Where a service's output goes: its configured `log_file`, resolved
/// against the logs directory when relative, or `<name>.log` there.
fn service_log_path(service: &ServiceConfig, data_dir: &DataDir) -> PathBuf {
    match &service.log_file {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => data_dir.logs_dir().join(path),
        None => data_dir.process_log(&service.name),
    }
}
