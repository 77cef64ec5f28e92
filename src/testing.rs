//! In-memory stand-ins for pins, lines and audio processes

use std::collections::VecDeque;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::audio::{AudioBackend, AudioError, AudioProcess};
use crate::hardware::{PhoneLines, Sample};

/// Shared record of every output pin write, in order
#[derive(Debug, Clone, Default)]
pub struct PinLog(Arc<Mutex<Vec<(&'static str, bool)>>>);

impl PinLog {
    pub fn events(&self) -> Vec<(&'static str, bool)> {
        self.0.lock().clone()
    }

    pub fn levels_of(&self, pin: &str) -> Vec<bool> {
        self.0
            .lock()
            .iter()
            .filter(|(name, _)| *name == pin)
            .map(|(_, level)| *level)
            .collect()
    }
}

pub struct RecordingOutputPin {
    name: &'static str,
    log: PinLog,
}

impl RecordingOutputPin {
    pub fn new(name: &'static str, log: PinLog) -> Self {
        Self { name, log }
    }
}

impl ErrorType for RecordingOutputPin {
    type Error = Infallible;
}

impl OutputPin for RecordingOutputPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.log.0.lock().push((self.name, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.log.0.lock().push((self.name, true));
        Ok(())
    }
}

/// Input pin replaying a fixed bit sequence, low once exhausted
pub struct ScriptedInputPin {
    bits: VecDeque<bool>,
}

impl ScriptedInputPin {
    pub fn new(bits: Vec<bool>) -> Self {
        Self { bits: bits.into() }
    }
}

impl ErrorType for ScriptedInputPin {
    type Error = Infallible;
}

impl InputPin for ScriptedInputPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.bits.pop_front().unwrap_or(false))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// Phone lines driven by the test
///
/// Keypad reads pop from a script and read 0 (no key) once it runs out.
pub struct FakeLines {
    keypad: Mutex<VecDeque<Sample>>,
    keypad_readers: Mutex<Vec<ThreadId>>,
    off_hook: AtomicBool,
    hang_up_at: Mutex<Option<Instant>>,
    key_line: AtomicBool,
    exit_line: AtomicBool,
}

impl FakeLines {
    pub fn off_hook() -> Self {
        Self {
            keypad: Mutex::new(VecDeque::new()),
            keypad_readers: Mutex::new(Vec::new()),
            off_hook: AtomicBool::new(true),
            hang_up_at: Mutex::new(None),
            key_line: AtomicBool::new(false),
            exit_line: AtomicBool::new(false),
        }
    }

    pub fn script_keypad(&self, samples: impl IntoIterator<Item = Sample>) {
        self.keypad.lock().extend(samples);
    }

    pub fn keypad_reads_remaining(&self) -> usize {
        self.keypad.lock().len()
    }

    /// Thread of every keypad read so far
    pub fn keypad_readers(&self) -> Vec<ThreadId> {
        self.keypad_readers.lock().clone()
    }

    pub fn set_off_hook(&self, off_hook: bool) {
        self.off_hook.store(off_hook, Ordering::SeqCst);
    }

    /// The hook line reads on-hook once `delay` has passed on the tokio clock
    pub fn hang_up_after(&self, delay: Duration) {
        *self.hang_up_at.lock() = Some(Instant::now() + delay);
    }

    pub fn set_key_line(&self, high: bool) {
        self.key_line.store(high, Ordering::SeqCst);
    }

    pub fn set_exit_line(&self, high: bool) {
        self.exit_line.store(high, Ordering::SeqCst);
    }
}

impl PhoneLines for FakeLines {
    fn read_keypad(&self) -> Sample {
        self.keypad_readers.lock().push(std::thread::current().id());
        self.keypad.lock().pop_front().unwrap_or(0)
    }

    fn is_off_hook(&self) -> bool {
        let hung_up = self
            .hang_up_at
            .lock()
            .map_or(false, |deadline| Instant::now() >= deadline);
        self.off_hook.load(Ordering::SeqCst) && !hung_up
    }

    fn key_line(&self) -> bool {
        self.key_line.load(Ordering::SeqCst)
    }

    fn exit_line(&self) -> bool {
        self.exit_line.load(Ordering::SeqCst)
    }
}

/// How a fake audio process behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Running for this many polls, then exits cleanly
    Polls(u32),
    /// Runs until interrupted
    Forever,
    /// Exits abnormally on the first poll
    Fails,
    /// The program cannot be started
    Unavailable,
}

struct FakeProcess {
    lifetime: Lifetime,
    polls: u32,
    interrupted: bool,
    interrupts: Arc<AtomicUsize>,
}

impl AudioProcess for FakeProcess {
    fn try_wait(&mut self) -> std::io::Result<Option<bool>> {
        if self.interrupted {
            return Ok(Some(false));
        }
        Ok(match self.lifetime {
            Lifetime::Polls(n) if self.polls >= n => Some(true),
            Lifetime::Polls(_) => {
                self.polls += 1;
                None
            }
            Lifetime::Forever => None,
            Lifetime::Fails | Lifetime::Unavailable => Some(false),
        })
    }

    fn interrupt(&mut self) -> std::io::Result<()> {
        self.interrupted = true;
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend recording every spawn; processes exit on first poll unless queued otherwise
#[derive(Default)]
pub struct FakeBackend {
    lifetimes: Mutex<VecDeque<Lifetime>>,
    playbacks: Mutex<Vec<Vec<PathBuf>>>,
    captures: Mutex<Vec<PathBuf>>,
    interrupts: Arc<AtomicUsize>,
}

impl FakeBackend {
    /// Queue the behaviour of the next spawned process
    pub fn push_lifetime(&self, lifetime: Lifetime) {
        self.lifetimes.lock().push_back(lifetime);
    }

    pub fn playbacks(&self) -> Vec<Vec<PathBuf>> {
        self.playbacks.lock().clone()
    }

    pub fn captures(&self) -> Vec<PathBuf> {
        self.captures.lock().clone()
    }

    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    fn next_process(&self, program: &str) -> Result<Box<dyn AudioProcess>, AudioError> {
        let lifetime = self.lifetimes.lock().pop_front().unwrap_or(Lifetime::Polls(0));
        if lifetime == Lifetime::Unavailable {
            return Err(AudioError::Spawn {
                program: program.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        Ok(Box::new(FakeProcess {
            lifetime,
            polls: 0,
            interrupted: false,
            interrupts: self.interrupts.clone(),
        }))
    }
}

impl AudioBackend for FakeBackend {
    fn spawn_playback(&self, clips: &[PathBuf]) -> Result<Box<dyn AudioProcess>, AudioError> {
        let process = self.next_process("aplay")?;
        self.playbacks.lock().push(clips.to_vec());
        Ok(process)
    }

    fn spawn_capture(
        &self,
        path: &Path,
        _max_duration: Duration,
    ) -> Result<Box<dyn AudioProcess>, AudioError> {
        let process = self.next_process("arecord")?;
        std::fs::write(path, b"RIFF").map_err(|source| AudioError::Spawn {
            program: "arecord".to_string(),
            source,
        })?;
        self.captures.lock().push(path.to_owned());
        Ok(process)
    }
}
