//! Interruptible wait on a playback or capture process
//!
//! Polls at a fixed tick for the process to finish while racing the hook
//! line and the keypad. The keypad must read released before the race
//! starts and again before returning, so one physical press never counts
//! twice.
//!
//! A keypad sample is a few dozen sysfs writes and reads, so it runs on the
//! blocking pool. The hook line is a single read and stays inline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::gateway::{AudioGateway, AudioKind, PollState};
use crate::hardware::{KeypadBands, PhoneLines, Sample, INVALID_SAMPLE};
use crate::store::RecordingsStore;

/// What is being waited on
#[derive(Debug, Clone, Copy)]
pub enum WaitKind<'a> {
    Playback,
    /// Capture into `clip`, bounded by `max_duration`
    Capture {
        clip: &'a Path,
        max_duration: Duration,
    },
}

/// How the wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The process exited, or capture reached its bound
    Completed { success: bool },
    /// Handset replaced; audio stopped and any partial capture deleted
    HookInterrupt,
    /// A key was pressed; the process is still running and the caller stops it
    KeyInterrupt(Sample),
}

/// Polls one audio process against the hook and keypad lines
pub struct InterruptibleWait<'a> {
    lines: Arc<dyn PhoneLines>,
    bands: &'a KeypadBands,
    store: &'a RecordingsStore,
    tick: Duration,
}

impl<'a> InterruptibleWait<'a> {
    pub fn new(
        lines: Arc<dyn PhoneLines>,
        bands: &'a KeypadBands,
        store: &'a RecordingsStore,
        tick: Duration,
    ) -> Self {
        Self {
            lines,
            bands,
            store,
            tick,
        }
    }

    /// Wait for the process of `kind` to finish or be interrupted
    pub async fn run(&self, gateway: &mut AudioGateway, kind: WaitKind<'_>) -> WaitOutcome {
        let audio_kind = match kind {
            WaitKind::Playback => AudioKind::Playback,
            WaitKind::Capture { .. } => AudioKind::Capture,
        };

        // A key still held from the press that got us here must not retrigger
        self.wait_for_release().await;

        let started = Instant::now();
        let outcome = loop {
            if let WaitKind::Capture { max_duration, .. } = kind {
                if started.elapsed() >= max_duration {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    info!(elapsed_ms, "capture reached its bound");
                    gateway.force_stop(AudioKind::Capture);
                    break WaitOutcome::Completed { success: true };
                }
            }

            match gateway.poll(audio_kind) {
                PollState::Running => {}
                PollState::Exited { success } => break WaitOutcome::Completed { success },
                PollState::Absent => {
                    debug!(kind = %audio_kind, "no process to wait on");
                    break WaitOutcome::Completed { success: true };
                }
            }

            if !self.lines.is_off_hook() {
                gateway.force_stop(audio_kind);
                if let WaitKind::Capture { clip, .. } = kind {
                    if let Err(e) = self.store.delete(clip) {
                        warn!(?e, "failed to delete partial recording");
                    } else {
                        info!(?clip, "deleted partial recording");
                    }
                }
                return WaitOutcome::HookInterrupt;
            }

            let sample = self.sample_keypad().await;
            if let Some(symbol) = self.bands.decode(sample) {
                debug!(%symbol, sample, kind = %audio_kind, "key interrupt");
                break WaitOutcome::KeyInterrupt(sample);
            }

            tokio::time::sleep(self.tick).await;
        };

        self.wait_for_release().await;
        outcome
    }

    /// Poll until no key decodes, or the handset is replaced
    async fn wait_for_release(&self) {
        while self.lines.is_off_hook() && !self.bands.is_released(self.sample_keypad().await) {
            tokio::time::sleep(self.tick).await;
        }
    }

    async fn sample_keypad(&self) -> Sample {
        let lines = Arc::clone(&self.lines);
        match tokio::task::spawn_blocking(move || lines.read_keypad()).await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(?e, "keypad read task failed");
                INVALID_SAMPLE
            }
        }
    }
}
