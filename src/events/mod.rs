//! Events module for menu transitions
//!
//! Provides structured event types emitted by the state machine for the
//! event log: menu entries, recording lifecycle, playback and hang-ups.

use serde::{Deserialize, Serialize};

/// Events emitted by the state machine during transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Main menu presented
    MainMenu {
        /// Whether the greeting was played first
        greeting: bool,
    },

    /// Capture process started for a new clip
    RecordingStarted { sequence: u32 },

    /// Capture ended, naturally or by keypress
    RecordingStopped {
        sequence: u32,
        /// Duration in milliseconds that capture was active
        duration_ms: u64,
    },

    /// Newest clip kept (#)
    MessageSaved,

    /// Newest clip deleted (re-record or discard)
    MessageDeleted { sequence: u32 },

    /// A stored clip started playing
    PlaybackStarted { index: usize, sequence: u32 },

    /// Handset replaced
    HungUp {
        /// Hard hang-ups also clear the greeting flag
        hard: bool,
    },

    /// Playback or capture process failed
    AudioFailed,
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::MainMenu { greeting } => {
                write!(f, "MAIN_MENU (greeting={})", greeting)
            }
            StateEvent::RecordingStarted { sequence } => {
                write!(f, "RECORDING_STARTED ({:08})", sequence)
            }
            StateEvent::RecordingStopped {
                sequence,
                duration_ms,
            } => write!(f, "RECORDING_STOPPED ({:08}, {}ms)", sequence, duration_ms),
            StateEvent::MessageSaved => write!(f, "MESSAGE_SAVED"),
            StateEvent::MessageDeleted { sequence } => {
                write!(f, "MESSAGE_DELETED ({:08})", sequence)
            }
            StateEvent::PlaybackStarted { index, sequence } => {
                write!(f, "PLAYBACK_STARTED (#{} = {:08})", index, sequence)
            }
            StateEvent::HungUp { hard } => write!(f, "HUNG_UP (hard={})", hard),
            StateEvent::AudioFailed => write!(f, "AUDIO_FAILED"),
        }
    }
}
