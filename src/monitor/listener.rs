//! Line monitors for the keypad, hook switch and exit button
//!
//! Each line is sampled on a dedicated thread. Edges become [`PhoneEvent`]s
//! sent to the state machine, except the exit button, which fires the
//! shutdown trigger directly so it can preempt anything in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::edge::{Edge, EdgeDetector};
use crate::config::TimingConfig;
use crate::hardware::{PhoneLines, Sample};
use crate::lifecycle::ShutdownTrigger;
use crate::state::InterruptGate;

/// Events sent from the line monitors to the state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhoneEvent {
    /// A key went down; carries the keypad sample taken at the edge
    KeyPress { sample: Sample },

    /// The hook switch changed level
    Reset {
        off_hook: bool,
        /// On a pickup, how long the handset had been down
        on_hook_for_ms: Option<u64>,
    },
}

/// Errors that can occur starting the monitors
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("line monitors are already running")]
    AlreadyRunning,

    #[error("failed to spawn monitor thread: {0}")]
    ThreadSpawn(String),
}

/// The three line monitors
pub struct LineMonitors {
    lines: Arc<dyn PhoneLines>,
    event_tx: mpsc::Sender<PhoneEvent>,
    shutdown: ShutdownTrigger,
    gate: InterruptGate,
    timing: TimingConfig,
    running: Arc<AtomicBool>,
}

impl LineMonitors {
    pub fn new(
        lines: Arc<dyn PhoneLines>,
        event_tx: mpsc::Sender<PhoneEvent>,
        shutdown: ShutdownTrigger,
        gate: InterruptGate,
        timing: TimingConfig,
    ) -> Self {
        Self {
            lines,
            event_tx,
            shutdown,
            gate,
            timing,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn one thread per line
    ///
    /// The monitors run until `stop()` is called, the event channel closes,
    /// or the program exits.
    pub fn start(&self) -> Result<(), MonitorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MonitorError::AlreadyRunning);
        }

        let result = self
            .start_keypad()
            .and_then(|()| self.start_hook())
            .and_then(|()| self.start_exit());
        if result.is_err() {
            self.stop();
        }
        result
    }

    /// Stop all monitors at their next poll
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the monitors are currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn start_keypad(&self) -> Result<(), MonitorError> {
        let lines = Arc::clone(&self.lines);
        let reader = Arc::clone(&self.lines);
        let event_tx = self.event_tx.clone();
        let gate = self.gate.clone();
        let detector =
            EdgeDetector::new(Edge::Rising, self.timing.key_debounce(), lines.key_line());

        self.spawn_line("keypad-monitor", detector, move || reader.key_line(), move |_, _| {
            if !lines.is_off_hook() {
                debug!("keypress ignored while on hook");
                return true;
            }
            if !gate.is_open() {
                debug!("keypress dropped while interrupts are gated");
                return true;
            }
            let sample = lines.read_keypad();
            debug!(sample, "keypress");
            send(&event_tx, PhoneEvent::KeyPress { sample })
        })
    }

    fn start_hook(&self) -> Result<(), MonitorError> {
        let reader = Arc::clone(&self.lines);
        let event_tx = self.event_tx.clone();
        let off_hook = self.lines.is_off_hook();
        let detector = EdgeDetector::new(Edge::Both, self.timing.hook_debounce(), off_hook);
        let mut on_hook_since = (!off_hook).then(Instant::now);

        let level = move || reader.is_off_hook();
        self.spawn_line("hook-monitor", detector, level, move |off_hook, now| {
            let on_hook_for_ms = if off_hook {
                on_hook_since
                    .take()
                    .map(|since| now.duration_since(since).as_millis() as u64)
            } else {
                on_hook_since = Some(now);
                None
            };
            info!(off_hook, ?on_hook_for_ms, "hook switch changed");
            send(&event_tx, PhoneEvent::Reset { off_hook, on_hook_for_ms })
        })
    }

    fn start_exit(&self) -> Result<(), MonitorError> {
        let reader = Arc::clone(&self.lines);
        let shutdown = self.shutdown.clone();
        let detector = EdgeDetector::new(Edge::Rising, Duration::ZERO, reader.exit_line());

        self.spawn_line("exit-monitor", detector, move || reader.exit_line(), move |_, _| {
            info!("exit button pressed");
            shutdown.fire();
            true
        })
    }

    /// Run a sampling loop for one line; `on_edge` returns false to stop the loop
    fn spawn_line<R, F>(
        &self,
        name: &'static str,
        mut detector: EdgeDetector,
        read: R,
        mut on_edge: F,
    ) -> Result<(), MonitorError>
    where
        R: Fn() -> bool + Send + 'static,
        F: FnMut(bool, Instant) -> bool + Send + 'static,
    {
        let running = Arc::clone(&self.running);
        let interval = self.timing.line_poll_interval();

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                info!(monitor = name, "monitor thread started");

                while running.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if let Some(level) = detector.update(read(), now) {
                        if !on_edge(level, now) {
                            break;
                        }
                    }
                    thread::sleep(interval);
                }

                info!(monitor = name, "monitor thread stopped");
            })
            .map_err(|e| MonitorError::ThreadSpawn(e.to_string()))?;

        Ok(())
    }
}

/// Blocking send from a monitor thread; false once the state machine is gone
fn send(event_tx: &mpsc::Sender<PhoneEvent>, event: PhoneEvent) -> bool {
    if event_tx.blocking_send(event).is_err() {
        error!("failed to send line event - channel closed?");
        return false;
    }
    true
}

impl Drop for LineMonitors {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("line monitors dropped while running, stopping");
            self.stop();
        }
    }
}
