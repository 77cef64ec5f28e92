//! Owner of the single playback handle and the single capture handle

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::process::{AudioBackend, AudioProcess};
use super::AudioError;

/// Which of the two handles an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    Playback,
    Capture,
}

impl std::fmt::Display for AudioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioKind::Playback => write!(f, "playback"),
            AudioKind::Capture => write!(f, "capture"),
        }
    }
}

/// Result of a non-blocking poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// No handle of this kind is tracked
    Absent,
    Running,
    /// The process has exited; the handle is released
    Exited { success: bool },
}

/// Starts, polls and stops the external audio processes
///
/// At most one playback and one capture handle exist. Starting either kind
/// stops whatever is live first, so exactly one of idle, playing or
/// capturing holds.
pub struct AudioGateway {
    backend: Arc<dyn AudioBackend>,
    playback: Option<Box<dyn AudioProcess>>,
    capture: Option<Box<dyn AudioProcess>>,
    poll_interval: Duration,
}

impl AudioGateway {
    pub fn new(backend: Arc<dyn AudioBackend>, poll_interval: Duration) -> Self {
        Self {
            backend,
            playback: None,
            capture: None,
            poll_interval,
        }
    }

    /// Start streaming `clips` in order
    pub fn play(&mut self, clips: &[PathBuf]) -> Result<(), AudioError> {
        self.stop_all();
        debug!(clips = ?clips, "starting playback");
        self.playback = Some(self.backend.spawn_playback(clips)?);
        Ok(())
    }

    /// Start capturing into `path`, bounded by `max_duration`
    pub fn record(&mut self, path: &Path, max_duration: Duration) -> Result<(), AudioError> {
        self.stop_all();
        info!(?path, max_secs = max_duration.as_secs(), "starting capture");
        self.capture = Some(self.backend.spawn_capture(path, max_duration)?);
        Ok(())
    }

    /// Check whether the handle of `kind` has exited
    pub fn poll(&mut self, kind: AudioKind) -> PollState {
        let slot = self.slot(kind);
        let Some(process) = slot.as_mut() else {
            return PollState::Absent;
        };

        match process.try_wait() {
            Ok(None) => PollState::Running,
            Ok(Some(success)) => {
                *slot = None;
                if !success {
                    warn!(%kind, "audio process exited abnormally");
                }
                PollState::Exited { success }
            }
            Err(e) => {
                warn!(?e, %kind, "failed to poll audio process");
                *slot = None;
                PollState::Exited { success: false }
            }
        }
    }

    /// Block until the handle of `kind` exits; `true` when it exited cleanly
    ///
    /// An absent handle counts as done.
    pub async fn wait_for_completion(&mut self, kind: AudioKind) -> bool {
        loop {
            match self.poll(kind) {
                PollState::Absent => return true,
                PollState::Exited { success } => return success,
                PollState::Running => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    /// Stop the handle of `kind`; a no-op when absent or already exited
    pub fn force_stop(&mut self, kind: AudioKind) {
        let Some(mut process) = self.slot(kind).take() else {
            debug!(%kind, "no audio process to stop");
            return;
        };

        match process.try_wait() {
            Ok(Some(_)) => debug!(%kind, "audio process already exited"),
            _ => {
                if let Err(e) = process.interrupt() {
                    warn!(?e, %kind, "failed to interrupt audio process");
                } else {
                    debug!(%kind, "audio process interrupted");
                }
            }
        }
    }

    /// Stop both handles
    pub fn stop_all(&mut self) {
        self.force_stop(AudioKind::Playback);
        self.force_stop(AudioKind::Capture);
    }

    /// True while a handle of `kind` is tracked
    pub fn is_active(&self, kind: AudioKind) -> bool {
        match kind {
            AudioKind::Playback => self.playback.is_some(),
            AudioKind::Capture => self.capture.is_some(),
        }
    }

    fn slot(&mut self, kind: AudioKind) -> &mut Option<Box<dyn AudioProcess>> {
        match kind {
            AudioKind::Playback => &mut self.playback,
            AudioKind::Capture => &mut self.capture,
        }
    }
}
