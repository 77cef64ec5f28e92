//! payphone-daemon: Voicemail controller for a repurposed payphone
//!
//! This daemon runs on the phone's Raspberry Pi and provides:
//! - Bit-banged sampling of the keypad's analog line
//! - Debounced monitors for the keypad, hook switch and exit button
//! - A menu state machine for recording and listening to messages
//! - Interruptible prompt playback through the ALSA command-line tools
//!
//! Recordings live as flat files in one directory; audio content is opaque
//! to the daemon.

mod audio;
mod config;
mod events;
mod hardware;
mod lifecycle;
mod monitor;
mod state;
mod store;

#[cfg(test)]
mod testing;

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::AlsaBackend;
use crate::config::Config;
use crate::events::StateEvent;
use crate::hardware::{GpioLines, PhoneLines};
use crate::lifecycle::{ShutdownReason, ShutdownSignal};
use crate::monitor::LineMonitors;
use crate::state::{InterruptGate, PromptLibrary, StateMachine};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first: it names the event log
    let config = Config::load()?;

    init_logging(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "payphone-daemon starting"
    );
    info!(?config.recordings_dir, ?config.prompts_dir, "configuration loaded");

    config.ensure_dirs()?;

    let missing = PromptLibrary::new(&config.prompts_dir).missing();
    if !missing.is_empty() {
        warn!(?missing, "prompt clips missing, those prompts will fail to play");
    }

    // Create shutdown signal handler
    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    let lines: Arc<dyn PhoneLines> = Arc::new(
        GpioLines::open(&config.pins, config.keypad_channel)
            .context("failed to open GPIO lines")?,
    );
    let backend = Arc::new(AlsaBackend::new(
        config.audio.device.clone(),
        config.audio.playback_program.clone(),
        config.audio.capture_program.clone(),
    ));

    // Line monitors -> State machine
    let (line_tx, line_rx) = mpsc::channel(32);
    // State machine -> event log
    let (event_tx, mut event_rx) = broadcast::channel::<StateEvent>(64);

    let gate = InterruptGate::default();
    let mut state_machine = StateMachine::new(
        &config,
        Arc::clone(&lines),
        backend,
        gate.clone(),
        event_tx,
    );

    let monitors = LineMonitors::new(
        lines,
        line_tx,
        shutdown.trigger(),
        gate,
        config.timing.clone(),
    );
    monitors.start()?;
    info!("line monitors started");

    info!("daemon initialized, entering main loop");

    // Main event loop
    let reason = tokio::select! {
        // Run the state machine (processes line events)
        _ = state_machine.run(line_rx) => {
            info!("state machine exited");
            None
        }

        // Write state events to the event log
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => info!(%event, "state event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "state event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("state event logger exited");
            None
        }

        // Wait for the exit button or a termination signal
        reason = shutdown.wait() => {
            info!(?reason, "shutdown requested");
            Some(reason)
        }
    };

    // Cleanup
    info!("shutting down...");

    let reason = reason.unwrap_or_else(|| {
        error!("main loop ended without a shutdown request");
        ShutdownReason::Terminate
    });
    // A signal during the closing prompt cuts it short
    let interrupted = tokio::select! {
        _ = state_machine.shutdown(reason) => None,
        signal = shutdown.signalled() => Some(signal),
    };
    if let Some(signal) = interrupted {
        warn!(?signal, "signal during shutdown, stopping audio now");
        state_machine.shutdown(signal).await;
    }
    monitors.stop();

    info!("payphone-daemon stopped");

    Ok(())
}

/// Log to the configured event log file (appending), or stderr
fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open event log {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    Ok(())
}
