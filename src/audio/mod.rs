//! Audio module for prompt playback and message capture
//!
//! Wraps the external playback/capture processes behind a gateway that
//! tracks at most one handle of each kind, plus the interruptible wait the
//! state machine blocks in while audio runs.

mod gateway;
mod process;
mod wait;

pub use gateway::{AudioGateway, AudioKind};
pub use process::{AlsaBackend, AudioBackend, AudioProcess};
pub use wait::{InterruptibleWait, WaitKind, WaitOutcome};

/// Errors starting an audio process
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
