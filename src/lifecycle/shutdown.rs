//! Signal handling for graceful shutdown

use std::sync::Arc;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;
use tracing::debug;

/// Why the daemon is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The exit line fired
    ExitButton,
    /// SIGTERM
    Terminate,
    /// SIGINT
    Interrupt,
}

/// Fires the exit-button shutdown from any thread
///
/// Firing more than once is harmless.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger(Arc<watch::Sender<bool>>);

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.0.send_replace(true);
    }
}

/// Handles shutdown requests (exit button, SIGTERM, SIGINT)
pub struct ShutdownSignal {
    exit_tx: Arc<watch::Sender<bool>>,
    exit_rx: watch::Receiver<bool>,
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignal {
    /// Register the signal handlers; must run inside the tokio runtime
    pub fn new() -> std::io::Result<Self> {
        let (exit_tx, exit_rx) = watch::channel(false);
        Ok(Self {
            exit_tx: Arc::new(exit_tx),
            exit_rx,
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Handle for the exit-line monitor
    pub fn trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger(Arc::clone(&self.exit_tx))
    }

    /// Wait for a shutdown request
    pub async fn wait(&mut self) -> ShutdownReason {
        let exit_rx = &mut self.exit_rx;
        tokio::select! {
            _ = exit_rx.wait_for(|&fired| fired) => {
                debug!("exit button shutdown");
                ShutdownReason::ExitButton
            }
            reason = next_signal(&mut self.sigterm, &mut self.sigint) => reason,
        }
    }

    /// Wait for SIGTERM or SIGINT only, ignoring the exit button
    ///
    /// Shutdown work races this so a signal still ends the daemon once the
    /// handlers have replaced the default ones.
    pub async fn signalled(&mut self) -> ShutdownReason {
        next_signal(&mut self.sigterm, &mut self.sigint).await
    }
}

async fn next_signal(sigterm: &mut Signal, sigint: &mut Signal) -> ShutdownReason {
    tokio::select! {
        _ = sigterm.recv() => {
            debug!("received SIGTERM");
            ShutdownReason::Terminate
        }
        _ = sigint.recv() => {
            debug!("received SIGINT");
            ShutdownReason::Interrupt
        }
    }
}
