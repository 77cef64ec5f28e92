//! External playback and capture processes
//!
//! Audio never passes through the daemon: clips are handed to the ALSA
//! command-line tools, which are started here and polled by the gateway.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::AudioError;

/// A running playback or capture process
pub trait AudioProcess: Send {
    /// Non-blocking exit check: `Some(success)` once the process has exited
    fn try_wait(&mut self) -> std::io::Result<Option<bool>>;

    /// Ask the process to stop
    fn interrupt(&mut self) -> std::io::Result<()>;
}

/// Starts audio processes
pub trait AudioBackend: Send + Sync {
    /// Play `clips` back to back
    fn spawn_playback(&self, clips: &[PathBuf]) -> Result<Box<dyn AudioProcess>, AudioError>;

    /// Capture into `path`, ending on its own after `max_duration`
    fn spawn_capture(
        &self,
        path: &Path,
        max_duration: Duration,
    ) -> Result<Box<dyn AudioProcess>, AudioError>;
}

/// How long an interrupted process gets to finish its file before SIGKILL
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// A spawned `aplay`/`arecord`
///
/// Interrupting sends SIGINT, which lets `arecord` finish the WAV header,
/// then hands the child to a reaper task that kills it if it lingers.
struct ChildProcess {
    child: Option<Child>,
}

impl ChildProcess {
    fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }
}

impl AudioProcess for ChildProcess {
    fn try_wait(&mut self) -> std::io::Result<Option<bool>> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?.map(|status| status.success())),
            // Handed to the reaper
            None => Ok(Some(false)),
        }
    }

    fn interrupt(&mut self) -> std::io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let Some(pid) = child.id() else {
            // Already reaped
            return Ok(());
        };
        let pid = i32::try_from(pid).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range")
        })?;
        kill(Pid::from_raw(pid), Signal::SIGINT)?;

        tokio::spawn(async move {
            match tokio::time::timeout(INTERRUPT_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!(pid, ?status, "interrupted audio process exited"),
                Ok(Err(e)) => warn!(pid, ?e, "failed to reap interrupted audio process"),
                Err(_) => {
                    warn!(pid, "audio process ignored SIGINT, killing it");
                    if let Err(e) = child.kill().await {
                        warn!(pid, ?e, "failed to kill audio process");
                    }
                }
            }
        });
        Ok(())
    }
}

/// `aplay`/`arecord` on a fixed ALSA device
#[derive(Debug, Clone)]
pub struct AlsaBackend {
    device: String,
    playback_program: String,
    capture_program: String,
}

impl AlsaBackend {
    pub fn new(
        device: impl Into<String>,
        playback_program: impl Into<String>,
        capture_program: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            playback_program: playback_program.into(),
            capture_program: capture_program.into(),
        }
    }

    fn spawn(
        &self,
        mut command: Command,
        program: &str,
    ) -> Result<Box<dyn AudioProcess>, AudioError> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AudioError::Spawn {
                program: program.to_string(),
                source,
            })?;
        debug!(program, pid = ?child.id(), "audio process started");
        Ok(Box::new(ChildProcess::new(child)))
    }
}

impl AudioBackend for AlsaBackend {
    fn spawn_playback(&self, clips: &[PathBuf]) -> Result<Box<dyn AudioProcess>, AudioError> {
        let mut command = Command::new(&self.playback_program);
        command.args(["-i", "-D", self.device.as_str()]).args(clips);
        self.spawn(command, &self.playback_program)
    }

    fn spawn_capture(
        &self,
        path: &Path,
        max_duration: Duration,
    ) -> Result<Box<dyn AudioProcess>, AudioError> {
        let seconds = max_duration.as_secs().max(1).to_string();
        let mut command = Command::new(&self.capture_program);
        command
            .args(["-f", "cd", "-t", "wav", "-D", self.device.as_str()])
            .args(["-d", seconds.as_str(), "--max-file-time", seconds.as_str()])
            .arg(path);
        self.spawn(command, &self.capture_program)
    }
}
