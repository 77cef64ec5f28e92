//! Per-process session state threaded through the state machine

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Whether the keypad monitor may deliver presses
///
/// Shared with the keypad monitor thread. While closed, presses are
/// discarded at the source rather than queued.
#[derive(Debug, Clone)]
pub struct InterruptGate(Arc<AtomicBool>);

impl InterruptGate {
    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Close the gate until the returned guard is dropped
    pub fn hold(&self) -> GateGuard {
        self.close();
        GateGuard(self.clone())
    }
}

impl Default for InterruptGate {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

/// Reopens the gate on drop
#[must_use = "the gate reopens as soon as the guard is dropped"]
pub struct GateGuard(InterruptGate);

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.0.open();
    }
}

/// State that outlives a single menu visit
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Greeting already played; survives soft resets
    pub greeting_shown: bool,
    /// Position in the newest-first listing while in playback
    pub playback_index: usize,
    pub accepting_interrupts: InterruptGate,
}

impl Session {
    pub fn new(accepting_interrupts: InterruptGate) -> Self {
        Self {
            greeting_shown: false,
            playback_index: 0,
            accepting_interrupts,
        }
    }

    /// Back to the main menu; the greeting flag is kept
    pub fn soft_reset(&mut self) {
        self.playback_index = 0;
    }

    /// Back to the main menu after a real hang-up
    pub fn hard_reset(&mut self) {
        self.soft_reset();
        self.greeting_shown = false;
    }
}
