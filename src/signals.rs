//! Signal handling for graceful shutdown.
//!
//! SIGINT (Ctrl-C), SIGTERM, and the appearance of a STOP file all request
//! shutdown. The watchdog only observes the request between ticks, while it
//! sleeps; a tick in progress always runs to completion. Bring-up checks it
//! before each of its side effects.
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

const STOP_FILE_POLL: Duration = Duration::from_secs(1);

/// Receiving side of a shutdown request.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Sending side, used by the signal listeners (and by tests).
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self, reason: &str) {
        if !*self.tx.borrow() {
            tracing::info!(reason, "shutdown requested");
        }
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    /// A signal that fires only through the returned trigger.
    pub fn manual() -> (ShutdownTrigger, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, ShutdownSignal { rx })
    }

    /// Listen for SIGINT, SIGTERM, and `stop_file`.
    pub fn install(stop_file: PathBuf) -> std::io::Result<ShutdownSignal> {
        use tokio::signal::unix::{signal, SignalKind};

        let (trigger, shutdown) = Self::manual();
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let on_signal = trigger.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => on_signal.trigger("SIGINT"),
                _ = sigterm.recv() => on_signal.trigger("SIGTERM"),
            }
        });

        tokio::spawn(async move {
            loop {
                if stop_file.exists() {
                    // Consume the file so the next boot doesn't stop immediately
                    let _ = std::fs::remove_file(&stop_file);
                    trigger.trigger("STOP file");
                    return;
                }
                tokio::time::sleep(STOP_FILE_POLL).await;
            }
        });

        Ok(shutdown)
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested.
    pub async fn requested(&mut self) {
        // A closed channel means every trigger is gone; nothing can request
        // shutdown any more, so wait forever.
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
