/// Recoverable failures inside bring-up and watchdog ticks.
///
/// None of these abort the supervisor: each is logged where it happens and the
/// next attempt or tick proceeds as usual.
#[derive(Debug)]
pub enum SupervisorError {
    /// The connectivity probe did not finish within its bound.
    ProbeTimeout { host: String, timeout_secs: u64 },
    /// The probe could not run at all (e.g. the `ping` binary is missing).
    ProbeUnavailable {
        command: String,
        source: std::io::Error,
    },
    /// The supervised process (or a boot service) could not be started.
    LaunchFailure {
        command: String,
        source: std::io::Error,
    },
    /// A privileged side effect (radio toggle, access point) failed.
    PrivilegedOpFailure { operation: String, detail: String },
    /// Signalling a matched process failed.
    TerminationFailure { pattern: String, detail: String },
}

impl std::fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorError::ProbeTimeout { host, timeout_secs } => {
                write!(f, "probe of {host} timed out after {timeout_secs}s")
            }
            SupervisorError::ProbeUnavailable { command, source } => {
                write!(f, "probe command {command} could not run: {source}")
            }
            SupervisorError::LaunchFailure { command, source } => {
                write!(f, "failed to launch {command}: {source}")
            }
            SupervisorError::PrivilegedOpFailure { operation, detail } => {
                write!(f, "privileged operation {operation} failed: {detail}")
            }
            SupervisorError::TerminationFailure { pattern, detail } => {
                write!(f, "failed to terminate processes matching {pattern:?}: {detail}")
            }
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SupervisorError::LaunchFailure { source, .. } => Some(source),
            SupervisorError::ProbeUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}
