//! Core state machine implementation
//!
//! Resolves keypresses against the menu stack, drives the audio gateway
//! through the interruptible wait, and mutates the recordings store. Every
//! menu entry stops current audio, then re-lists the store, then picks the
//! prompt, in that order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::prompts::{Prompt, PromptLibrary};
use super::session::{InterruptGate, Session};
use crate::audio::{
    AudioBackend, AudioGateway, AudioKind, InterruptibleWait, WaitKind, WaitOutcome,
};
use crate::config::{Config, TimingConfig};
use crate::events::StateEvent;
use crate::hardware::{KeypadBands, PhoneLines, Sample, Symbol};
use crate::lifecycle::ShutdownReason;
use crate::monitor::PhoneEvent;
use crate::store::{RecordingClip, RecordingsStore};

/// How a menu step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Audio finished; wait for the next key
    Done,
    /// A key cut the audio short and is the next input
    Next(Symbol),
    /// The handset went down mid-step
    HungUp,
    /// An audio process could not run
    Failed,
}

/// The menu state machine
pub struct StateMachine {
    /// Keys resolved so far; empty at the main menu
    menu: Vec<Symbol>,
    session: Session,
    gateway: AudioGateway,
    store: RecordingsStore,
    prompts: PromptLibrary,
    lines: Arc<dyn PhoneLines>,
    bands: KeypadBands,
    timing: TimingConfig,
    /// Clip being captured; set only while a capture wait is in flight
    pending_capture: Option<PathBuf>,
    /// Channel for emitting state events
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateMachine {
    /// Create a new state machine at the main menu
    pub fn new(
        config: &Config,
        lines: Arc<dyn PhoneLines>,
        backend: Arc<dyn AudioBackend>,
        gate: InterruptGate,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        Self {
            menu: Vec::new(),
            session: Session::new(gate),
            gateway: AudioGateway::new(backend, config.timing.poll_interval()),
            store: RecordingsStore::new(&config.recordings_dir, &config.audio.extension),
            prompts: PromptLibrary::new(&config.prompts_dir),
            lines,
            bands: config.keypad_bands.clone(),
            timing: config.timing.clone(),
            pending_capture: None,
            event_tx,
        }
    }

    /// Current menu stack
    pub fn menu(&self) -> &[Symbol] {
        &self.menu
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run the state machine, processing line events until the channel closes
    pub async fn run(&mut self, mut event_rx: mpsc::Receiver<PhoneEvent>) {
        info!("state machine started at main menu");

        if self.lines.is_off_hook() {
            let _gate = self.session.accepting_interrupts.hold();
            let flow = self.present_main_menu(&[]).await;
            if let Some(symbol) = self.settle(flow).await {
                self.navigate(symbol).await;
            }
        }

        while let Some(event) = event_rx.recv().await {
            self.handle_event(event).await;
        }

        info!("state machine stopped");
    }

    /// Handle one line event; keypresses are gated off until it completes
    pub async fn handle_event(&mut self, event: PhoneEvent) {
        let _gate = self.session.accepting_interrupts.hold();

        match event {
            PhoneEvent::KeyPress { sample } => {
                if !self.lines.is_off_hook() {
                    debug!(sample, "keypress while on hook ignored");
                    return;
                }
                match self.bands.decode(sample) {
                    Some(symbol) => self.navigate(symbol).await,
                    None => debug!(sample, "keypad sample matched no key"),
                }
            }
            PhoneEvent::Reset {
                off_hook,
                on_hook_for_ms,
            } => self.handle_reset(off_hook, on_hook_for_ms).await,
        }
    }

    /// Resolve a key, then any key that interrupts the resulting audio
    pub async fn navigate(&mut self, symbol: Symbol) {
        let mut next = Some(symbol);
        while let Some(symbol) = next.take() {
            self.menu.push(symbol);
            debug!(menu = %self.menu_string(), "navigating");
            let flow = self.resolve().await;
            next = self.settle(flow).await;
        }
    }

    /// Stop audio and play the closing prompt (exit button only)
    ///
    /// A capture cut off here was never saved, so its clip is deleted.
    pub async fn shutdown(&mut self, reason: ShutdownReason) {
        info!(?reason, "state machine shutting down");
        if let Some(path) = self.pending_capture.take() {
            self.gateway.force_stop(AudioKind::Capture);
            info!(?path, "capture cut off by shutdown");
            self.discard(&path);
        }
        self.gateway.stop_all();

        if reason == ShutdownReason::ExitButton {
            match self.gateway.play(&[self.prompts.path(Prompt::Goodbye)]) {
                Ok(()) => self.wait_for_goodbye().await,
                Err(e) => warn!(?e, "failed to play closing prompt"),
            }
        }

        self.gateway.stop_all();
    }

    /// Let the closing prompt finish, unless the handset goes down or it overruns
    async fn wait_for_goodbye(&mut self) {
        let lines = Arc::clone(&self.lines);
        let tick = self.timing.poll_interval();
        let limit = self.timing.goodbye_timeout();
        let gateway = &mut self.gateway;

        let hung_up = async move {
            while lines.is_off_hook() {
                tokio::time::sleep(tick).await;
            }
        };
        let waited = tokio::time::timeout(limit, async {
            tokio::select! {
                _ = gateway.wait_for_completion(AudioKind::Playback) => {}
                _ = hung_up => debug!("handset down, cutting closing prompt"),
            }
        })
        .await;

        if waited.is_err() {
            warn!(timeout_secs = limit.as_secs(), "closing prompt overran, stopping it");
        }
    }

    async fn handle_reset(&mut self, off_hook: bool, on_hook_for_ms: Option<u64>) {
        if !off_hook {
            self.hang_up(false);
            return;
        }

        // A pickup after a real hang-up, not a bounce, greets again
        let hard = on_hook_for_ms.map_or(false, |ms| ms > self.timing.hook_debounce_ms);
        if hard {
            self.session.hard_reset();
        } else {
            self.session.soft_reset();
        }
        self.menu.clear();
        info!(hard, ?on_hook_for_ms, "handset lifted");

        let flow = self.present_main_menu(&[]).await;
        if let Some(symbol) = self.settle(flow).await {
            self.navigate(symbol).await;
        }
    }

    /// Walk the menu stack until a step plays something
    async fn resolve(&mut self) -> Flow {
        loop {
            match self.menu.as_slice() {
                [Symbol::One] => return self.record_message().await,
                [Symbol::One, Symbol::One] => {
                    // Re-record: drop the take, then record again at [1]
                    self.delete_newest();
                    self.menu.pop();
                }
                [Symbol::One, Symbol::Two] => {
                    self.menu.pop();
                    return self.review_message().await;
                }
                [Symbol::One, Symbol::Zero] => {
                    self.delete_newest();
                    return self.reset_to_main(&[Prompt::MessageDiscarded]).await;
                }
                [Symbol::One, Symbol::Pound] => {
                    info!("message saved");
                    self.emit(StateEvent::MessageSaved);
                    return self.reset_to_main(&[Prompt::MessageSaved]).await;
                }
                [Symbol::One, _] => {
                    self.menu.pop();
                    return self.present(&[Prompt::RecordInstructions]).await;
                }
                [Symbol::Two] => return self.enter_playback().await,
                [Symbol::Two, Symbol::One] => {
                    self.menu.pop();
                    return self.replay_current().await;
                }
                [Symbol::Two, Symbol::Two] => {
                    self.menu.pop();
                    return self.next_message().await;
                }
                [Symbol::Two, Symbol::Zero] => return self.reset_to_main(&[]).await,
                [Symbol::Two, _] => {
                    self.menu.pop();
                    return self.playback_instructions().await;
                }
                _ => {
                    self.menu.pop();
                    debug!(menu = %self.menu_string(), "unknown key, repeating menu");
                    return self.present_current_level().await;
                }
            }
        }
    }

    /// Turn a step's outcome into the next input, if any
    async fn settle(&mut self, flow: Flow) -> Option<Symbol> {
        let flow = match flow {
            Flow::Failed => self.recover().await,
            other => other,
        };

        match flow {
            Flow::Done | Flow::Failed => None,
            Flow::Next(symbol) => Some(symbol),
            Flow::HungUp => {
                self.hang_up(true);
                None
            }
        }
    }

    async fn record_message(&mut self) -> Flow {
        match self.present(&[Prompt::RecordIntro]).await {
            // A key during the intro only skips it
            Flow::Done | Flow::Next(_) => {}
            flow @ (Flow::HungUp | Flow::Failed) => return flow,
        }

        self.gateway.stop_all();
        let clip = match self.store.next_clip() {
            Ok(clip) => clip,
            Err(e) => {
                error!(?e, "failed to list recordings before capture");
                return Flow::Failed;
            }
        };

        let max_duration = self.timing.max_recording();
        if let Err(e) = self.gateway.record(&clip.path, max_duration) {
            error!(?e, "failed to start capture");
            self.emit(StateEvent::AudioFailed);
            return Flow::Failed;
        }
        self.pending_capture = Some(clip.path.clone());
        self.emit(StateEvent::RecordingStarted {
            sequence: clip.sequence,
        });

        let started = Instant::now();
        let outcome = self
            .wait(WaitKind::Capture {
                clip: &clip.path,
                max_duration,
            })
            .await;
        self.pending_capture = None;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            WaitOutcome::HookInterrupt => {
                info!(sequence = %clip.sequence_id(), duration_ms, "capture abandoned by hang-up");
                Flow::HungUp
            }
            WaitOutcome::Completed { success: false } => {
                error!(sequence = %clip.sequence_id(), "capture process failed");
                self.discard(&clip.path);
                self.emit(StateEvent::AudioFailed);
                Flow::Failed
            }
            WaitOutcome::Completed { success: true } => {
                self.capture_stopped(&clip, duration_ms);
                self.present(&[Prompt::RecordInstructions]).await
            }
            WaitOutcome::KeyInterrupt(sample) => {
                self.gateway.force_stop(AudioKind::Capture);
                self.capture_stopped(&clip, duration_ms);
                self.key_flow(sample)
            }
        }
    }

    async fn review_message(&mut self) -> Flow {
        self.gateway.stop_all();
        let Some(clips) = self.list_store() else {
            return Flow::Failed;
        };

        let mut playlist = Vec::with_capacity(2);
        match clips.first() {
            Some(newest) => playlist.push(newest.path.clone()),
            None => warn!("no recording to review"),
        }
        playlist.push(self.prompts.path(Prompt::RecordInstructions));
        self.play_and_wait(playlist).await
    }

    async fn enter_playback(&mut self) -> Flow {
        self.gateway.stop_all();
        let Some(clips) = self.list_store() else {
            return Flow::Failed;
        };

        if clips.is_empty() {
            info!("no messages to play");
            return self.reset_to_main(&[Prompt::NoMessages]).await;
        }

        self.play_message(&clips, &[Prompt::PlaybackIntro]).await
    }

    async fn replay_current(&mut self) -> Flow {
        self.gateway.stop_all();
        let Some(clips) = self.list_store() else {
            return Flow::Failed;
        };
        self.play_message(&clips, &[]).await
    }

    async fn next_message(&mut self) -> Flow {
        self.session.playback_index += 1;
        self.gateway.stop_all();
        let Some(clips) = self.list_store() else {
            return Flow::Failed;
        };
        self.play_message(&clips, &[Prompt::NextMessage]).await
    }

    async fn playback_instructions(&mut self) -> Flow {
        self.gateway.stop_all();
        let Some(clips) = self.list_store() else {
            return Flow::Failed;
        };

        let prompt = if self.session.playback_index + 1 >= clips.len() {
            Prompt::PlaybackInstructionsLast
        } else {
            Prompt::PlaybackInstructions
        };
        self.present(&[prompt]).await
    }

    /// Play the clip at the playback index, or announce the end of the list
    async fn play_message(&mut self, clips: &[RecordingClip], lead: &[Prompt]) -> Flow {
        let index = self.session.playback_index;
        let Some(clip) = clips.get(index) else {
            info!(index, count = clips.len(), "no messages left");
            return self.reset_to_main(&[Prompt::NoMessagesLeft]).await;
        };

        let last = index + 1 == clips.len();
        let mut playlist = self.prompts.paths(lead);
        if last {
            playlist.push(self.prompts.path(Prompt::LastMessage));
        }
        playlist.push(clip.path.clone());
        playlist.push(self.prompts.path(if last {
            Prompt::PlaybackInstructionsLast
        } else {
            Prompt::PlaybackInstructions
        }));

        self.emit(StateEvent::PlaybackStarted {
            index,
            sequence: clip.sequence,
        });
        self.play_and_wait(playlist).await
    }

    async fn reset_to_main(&mut self, lead: &[Prompt]) -> Flow {
        self.menu.clear();
        self.session.soft_reset();
        self.present_main_menu(lead).await
    }

    async fn present_main_menu(&mut self, lead: &[Prompt]) -> Flow {
        let mut prompts = lead.to_vec();
        let greeting = !self.session.greeting_shown;
        if greeting {
            prompts.push(Prompt::Greeting);
            self.session.greeting_shown = true;
        }
        prompts.push(Prompt::MainMenu);

        self.emit(StateEvent::MainMenu { greeting });
        self.present(&prompts).await
    }

    async fn present_current_level(&mut self) -> Flow {
        match self.menu.as_slice() {
            [] => self.present_main_menu(&[]).await,
            [Symbol::One, ..] => self.present(&[Prompt::RecordInstructions]).await,
            [Symbol::Two, ..] => self.playback_instructions().await,
            _ => self.reset_to_main(&[]).await,
        }
    }

    /// Error prompt and main menu; a second failure is not retried
    async fn recover(&mut self) -> Flow {
        warn!(menu = %self.menu_string(), "audio failure, returning to main menu");
        self.menu.clear();
        self.session.soft_reset();
        self.present_main_menu(&[Prompt::Error]).await
    }

    async fn present(&mut self, prompts: &[Prompt]) -> Flow {
        let playlist = self.prompts.paths(prompts);
        self.play_and_wait(playlist).await
    }

    async fn play_and_wait(&mut self, playlist: Vec<PathBuf>) -> Flow {
        self.gateway.stop_all();
        if let Err(e) = self.gateway.play(&playlist) {
            error!(?e, "failed to start playback");
            self.emit(StateEvent::AudioFailed);
            return Flow::Failed;
        }

        match self.wait(WaitKind::Playback).await {
            WaitOutcome::Completed { success: true } => Flow::Done,
            WaitOutcome::Completed { success: false } => {
                self.emit(StateEvent::AudioFailed);
                Flow::Failed
            }
            WaitOutcome::HookInterrupt => Flow::HungUp,
            WaitOutcome::KeyInterrupt(sample) => {
                self.gateway.force_stop(AudioKind::Playback);
                self.key_flow(sample)
            }
        }
    }

    async fn wait(&mut self, kind: WaitKind<'_>) -> WaitOutcome {
        let wait = InterruptibleWait::new(
            Arc::clone(&self.lines),
            &self.bands,
            &self.store,
            self.timing.poll_interval(),
        );
        wait.run(&mut self.gateway, kind).await
    }

    fn key_flow(&self, sample: Sample) -> Flow {
        match self.bands.decode(sample) {
            Some(symbol) => Flow::Next(symbol),
            None => Flow::Done,
        }
    }

    fn hang_up(&mut self, hard: bool) {
        self.gateway.stop_all();
        self.menu.clear();
        if hard {
            self.session.hard_reset();
        } else {
            self.session.soft_reset();
        }
        info!(hard, "hung up, back at main menu");
        self.emit(StateEvent::HungUp { hard });
    }

    fn capture_stopped(&self, clip: &RecordingClip, duration_ms: u64) {
        info!(sequence = %clip.sequence_id(), duration_ms, "capture finished");
        self.emit(StateEvent::RecordingStopped {
            sequence: clip.sequence,
            duration_ms,
        });
    }

    fn delete_newest(&self) {
        match self.store.delete_newest() {
            Ok(Some(clip)) => {
                info!(sequence = %clip.sequence_id(), "deleted newest recording");
                self.emit(StateEvent::MessageDeleted {
                    sequence: clip.sequence,
                });
            }
            Ok(None) => warn!("nothing deleted, listing was stale or empty"),
            Err(e) => error!(?e, "failed to delete newest recording"),
        }
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = self.store.delete(path) {
            error!(?e, "failed to delete unsaved recording");
        }
    }

    fn list_store(&self) -> Option<Vec<RecordingClip>> {
        match self.store.list() {
            Ok(clips) => Some(clips),
            Err(e) => {
                error!(?e, "failed to list recordings");
                None
            }
        }
    }

    fn menu_string(&self) -> String {
        self.menu.iter().map(|symbol| symbol.as_char()).collect()
    }

    /// Emit a state event for the event log
    fn emit(&self, event: StateEvent) {
        debug!(%event, "emitting state event");
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testing::{FakeBackend, FakeLines, Lifetime};

    struct Phone {
        dir: tempfile::TempDir,
        store: RecordingsStore,
        lines: Arc<FakeLines>,
        backend: Arc<FakeBackend>,
        machine: StateMachine,
        events: broadcast::Receiver<StateEvent>,
    }

    /// A phone off the hook with the given clips stored
    fn phone(existing: &[u32]) -> Phone {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            recordings_dir: dir.path().join("recordings"),
            prompts_dir: PathBuf::from("/prompts"),
            ..Config::default()
        };
        config.ensure_dirs().unwrap();
        let store = RecordingsStore::new(&config.recordings_dir, "wav");
        for &sequence in existing {
            let name = format!("recording_#_{:08}.wav", sequence);
            std::fs::write(config.recordings_dir.join(name), b"RIFF").unwrap();
        }

        let lines = Arc::new(FakeLines::off_hook());
        let backend = Arc::new(FakeBackend::default());
        let (event_tx, events) = broadcast::channel(64);
        let machine = StateMachine::new(
            &config,
            lines.clone(),
            backend.clone(),
            InterruptGate::default(),
            event_tx,
        );

        Phone {
            dir,
            store,
            lines,
            backend,
            machine,
            events,
        }
    }

    impl Phone {
        /// Pick up after a long hang-up, hearing the greeting
        async fn pick_up(&mut self) {
            self.machine
                .handle_event(PhoneEvent::Reset {
                    off_hook: true,
                    on_hook_for_ms: Some(5_000),
                })
                .await;
        }

        async fn press(&mut self, symbol: Symbol) {
            self.machine.navigate(symbol).await;
        }

        /// File names of every playback, in order
        fn played(&self) -> Vec<Vec<String>> {
            self.backend
                .playbacks()
                .iter()
                .map(|playlist| {
                    playlist
                        .iter()
                        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
                        .collect()
                })
                .collect()
        }

        fn last_played(&self) -> Vec<String> {
            self.played().pop().unwrap_or_default()
        }

        fn stored(&self) -> Vec<u32> {
            self.store.list().unwrap().iter().map(|c| c.sequence).collect()
        }

        fn events(&mut self) -> Vec<StateEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }
    }

    fn clip(sequence: u32) -> String {
        format!("recording_#_{:08}.wav", sequence)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pickup_plays_greeting_once() {
        let mut phone = phone(&[]);
        phone.pick_up().await;
        assert_eq!(phone.last_played(), vec!["greeting.wav", "main_menu.wav"]);
        assert!(phone.machine.session().greeting_shown);

        // Unknown key at the main menu repeats the menu without the greeting
        phone.press(Symbol::Three).await;
        assert_eq!(phone.last_played(), vec!["main_menu.wav"]);
        assert!(phone.machine.menu().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_brief_on_hook_is_soft_reset() {
        let mut phone = phone(&[]);
        phone.pick_up().await;
        phone.press(Symbol::Two).await;

        phone
            .machine
            .handle_event(PhoneEvent::Reset {
                off_hook: false,
                on_hook_for_ms: None,
            })
            .await;
        assert!(phone.machine.menu().is_empty());
        assert!(phone.machine.session().greeting_shown);

        phone
            .machine
            .handle_event(PhoneEvent::Reset {
                off_hook: true,
                on_hook_for_ms: Some(60),
            })
            .await;
        assert_eq!(phone.last_played(), vec!["main_menu.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_hang_up_replays_greeting() {
        let mut phone = phone(&[]);
        phone.pick_up().await;

        phone
            .machine
            .handle_event(PhoneEvent::Reset {
                off_hook: false,
                on_hook_for_ms: None,
            })
            .await;
        phone.pick_up().await;
        assert_eq!(phone.last_played(), vec!["greeting.wav", "main_menu.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_then_save() {
        let mut phone = phone(&[1, 2]);
        phone.pick_up().await;

        phone.press(Symbol::One).await;
        assert_eq!(phone.machine.menu(), &[Symbol::One]);
        assert_eq!(phone.stored(), vec![3, 2, 1]);
        assert_eq!(phone.last_played(), vec!["record_instructions.wav"]);

        phone.press(Symbol::Pound).await;
        assert!(phone.machine.menu().is_empty());
        assert_eq!(phone.machine.session().playback_index, 0);
        assert_eq!(phone.stored(), vec![3, 2, 1]);
        assert_eq!(phone.last_played(), vec!["message_saved.wav", "main_menu.wav"]);
        assert!(phone.events().contains(&StateEvent::MessageSaved));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerecord_keeps_one_pending_clip() {
        let mut phone = phone(&[1]);
        phone.pick_up().await;

        for _ in 0..3 {
            phone.press(Symbol::One).await;
            phone.press(Symbol::One).await;
            phone.press(Symbol::One).await;
            assert_eq!(phone.stored(), vec![2, 1]);
            assert_eq!(phone.machine.menu(), &[Symbol::One]);

            phone.press(Symbol::Zero).await;
            assert_eq!(phone.stored(), vec![1]);
            assert!(phone.machine.menu().is_empty());
        }

        let captures = phone.backend.captures();
        assert!(captures.iter().all(|path| path.ends_with(clip(2))));
        assert_eq!(captures.len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_review_plays_newest() {
        let mut phone = phone(&[1]);
        phone.pick_up().await;

        phone.press(Symbol::One).await;
        phone.press(Symbol::Two).await;
        assert_eq!(phone.machine.menu(), &[Symbol::One]);
        assert_eq!(
            phone.last_played(),
            vec![clip(2), "record_instructions.wav".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_key_after_recording_repeats_instructions() {
        let mut phone = phone(&[]);
        phone.pick_up().await;

        phone.press(Symbol::One).await;
        phone.press(Symbol::Five).await;
        assert_eq!(phone.machine.menu(), &[Symbol::One]);
        assert_eq!(phone.last_played(), vec!["record_instructions.wav"]);
        assert_eq!(phone.stored(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_with_empty_store() {
        let mut phone = phone(&[]);
        phone.pick_up().await;
        phone.events();

        phone.press(Symbol::Two).await;
        assert!(phone.machine.menu().is_empty());
        assert_eq!(phone.last_played(), vec!["no_messages.wav", "main_menu.wav"]);
        assert!(!phone
            .events()
            .iter()
            .any(|e| matches!(e, StateEvent::PlaybackStarted { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_walks_newest_to_oldest() {
        let mut phone = phone(&[1, 2, 3]);
        phone.pick_up().await;

        phone.press(Symbol::Two).await;
        assert_eq!(phone.machine.menu(), &[Symbol::Two]);
        assert_eq!(
            phone.last_played(),
            vec![
                "playback_intro.wav".to_string(),
                clip(3),
                "playback_instructions.wav".to_string()
            ]
        );

        phone.press(Symbol::Two).await;
        assert_eq!(
            phone.last_played(),
            vec![
                "next_message.wav".to_string(),
                clip(2),
                "playback_instructions.wav".to_string()
            ]
        );

        phone.press(Symbol::Two).await;
        assert_eq!(
            phone.last_played(),
            vec![
                "next_message.wav".to_string(),
                "last_message.wav".to_string(),
                clip(1),
                "playback_instructions_last.wav".to_string()
            ]
        );
        assert_eq!(phone.machine.menu(), &[Symbol::Two]);

        phone.press(Symbol::Two).await;
        assert!(phone.machine.menu().is_empty());
        assert_eq!(phone.machine.session().playback_index, 0);
        assert_eq!(
            phone.last_played(),
            vec!["no_messages_left.wav", "main_menu.wav"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_and_unknown_key_in_playback() {
        let mut phone = phone(&[1, 2]);
        phone.pick_up().await;

        phone.press(Symbol::Two).await;
        phone.press(Symbol::One).await;
        assert_eq!(phone.machine.menu(), &[Symbol::Two]);
        assert_eq!(
            phone.last_played(),
            vec![clip(2), "playback_instructions.wav".to_string()]
        );

        phone.press(Symbol::Seven).await;
        assert_eq!(phone.machine.menu(), &[Symbol::Two]);
        assert_eq!(phone.last_played(), vec!["playback_instructions.wav"]);

        phone.press(Symbol::Zero).await;
        assert!(phone.machine.menu().is_empty());
        assert_eq!(phone.last_played(), vec!["main_menu.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keypress_during_playback_is_next_input() {
        let mut phone = phone(&[1]);
        phone.pick_up().await;

        phone.backend.push_lifetime(Lifetime::Forever);
        phone.lines.script_keypad([0, 430, 0]);
        phone.press(Symbol::Two).await;

        // 0 was routed at [2]: back to the main menu
        assert!(phone.machine.menu().is_empty());
        assert_eq!(phone.backend.interrupts(), 1);
        let played = phone.played();
        assert_eq!(
            played[played.len() - 2],
            vec![
                "playback_intro.wav".to_string(),
                "last_message.wav".to_string(),
                clip(1),
                "playback_instructions_last.wav".to_string()
            ]
        );
        assert_eq!(phone.last_played(), vec!["main_menu.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keypress_during_capture_saves() {
        let mut phone = phone(&[]);
        phone.pick_up().await;

        // Intro finishes, capture runs until # is pressed
        phone.backend.push_lifetime(Lifetime::Polls(0));
        phone.backend.push_lifetime(Lifetime::Forever);
        phone.lines.script_keypad([0, 0, 0, 0, 400, 0]);
        phone.press(Symbol::One).await;

        assert!(phone.machine.menu().is_empty());
        assert_eq!(phone.stored(), vec![1]);
        assert_eq!(phone.last_played(), vec!["message_saved.wav", "main_menu.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_up_during_capture() {
        let mut phone = phone(&[]);
        phone.pick_up().await;
        phone.events();

        phone.backend.push_lifetime(Lifetime::Polls(0));
        phone.backend.push_lifetime(Lifetime::Forever);
        phone.lines.hang_up_after(Duration::from_secs(10));
        phone.press(Symbol::One).await;

        assert!(phone.machine.menu().is_empty());
        assert!(!phone.machine.session().greeting_shown);
        assert!(phone.stored().is_empty());
        assert_eq!(phone.backend.captures().len(), 1);
        assert!(!phone.backend.captures()[0].exists());
        assert_eq!(phone.backend.interrupts(), 1);
        assert!(phone.events().contains(&StateEvent::HungUp { hard: true }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_recovers_to_main_menu() {
        let mut phone = phone(&[]);
        phone.pick_up().await;

        phone.backend.push_lifetime(Lifetime::Polls(0));
        phone.backend.push_lifetime(Lifetime::Fails);
        phone.press(Symbol::One).await;

        assert!(phone.machine.menu().is_empty());
        assert!(phone.stored().is_empty());
        assert_eq!(phone.last_played(), vec!["error.wav", "main_menu.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_failure_recovers_to_main_menu() {
        let mut phone = phone(&[1]);
        phone.pick_up().await;

        phone.backend.push_lifetime(Lifetime::Unavailable);
        phone.press(Symbol::Two).await;

        assert!(phone.machine.menu().is_empty());
        assert_eq!(phone.last_played(), vec!["error.wav", "main_menu.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognised_and_on_hook_keypresses_are_ignored() {
        let mut phone = phone(&[]);
        phone.pick_up().await;
        let before = phone.played().len();

        // Gap between 0 and *
        phone
            .machine
            .handle_event(PhoneEvent::KeyPress { sample: 442 })
            .await;
        phone.lines.set_off_hook(false);
        phone
            .machine
            .handle_event(PhoneEvent::KeyPress { sample: 965 })
            .await;

        assert_eq!(phone.played().len(), before);
        assert!(phone.machine.menu().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_reopens_after_event() {
        let mut phone = phone(&[]);
        phone.pick_up().await;
        phone
            .machine
            .handle_event(PhoneEvent::KeyPress { sample: 890 })
            .await;
        assert!(phone.machine.session().accepting_interrupts.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_shutdown_plays_goodbye_once_stopped() {
        let mut phone = phone(&[]);
        phone.backend.push_lifetime(Lifetime::Forever);
        phone
            .machine
            .gateway
            .play(&[PathBuf::from("/prompts/main_menu.wav")])
            .unwrap();

        phone.machine.shutdown(ShutdownReason::ExitButton).await;
        phone.machine.shutdown(ShutdownReason::ExitButton).await;

        assert_eq!(phone.backend.interrupts(), 1);
        assert_eq!(phone.last_played(), vec!["goodbye.wav"]);
        assert!(!phone.machine.gateway.is_active(AudioKind::Playback));
        assert!(!phone.machine.gateway.is_active(AudioKind::Capture));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_shutdown_is_silent() {
        let mut phone = phone(&[]);
        phone.machine.shutdown(ShutdownReason::Terminate).await;
        assert!(phone.played().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_goodbye_is_cut_when_handset_is_down() {
        let mut phone = phone(&[]);
        phone.backend.push_lifetime(Lifetime::Forever);
        phone.lines.set_off_hook(false);

        let finished = tokio::time::timeout(
            Duration::from_secs(600),
            phone.machine.shutdown(ShutdownReason::ExitButton),
        )
        .await;

        assert!(finished.is_ok());
        assert_eq!(phone.last_played(), vec!["goodbye.wav"]);
        assert_eq!(phone.backend.interrupts(), 1);
        assert!(!phone.machine.gateway.is_active(AudioKind::Playback));
    }

    #[tokio::test(start_paused = true)]
    async fn test_goodbye_that_never_ends_is_bounded() {
        let mut phone = phone(&[]);
        phone.backend.push_lifetime(Lifetime::Forever);

        let started = Instant::now();
        let finished = tokio::time::timeout(
            Duration::from_secs(600),
            phone.machine.shutdown(ShutdownReason::ExitButton),
        )
        .await;

        assert!(finished.is_ok());
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(phone.backend.interrupts(), 1);
        assert!(!phone.machine.gateway.is_active(AudioKind::Playback));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_capture_deletes_partial_clip() {
        let mut phone = phone(&[1]);
        phone.pick_up().await;

        // Intro finishes, capture never does
        phone.backend.push_lifetime(Lifetime::Polls(0));
        phone.backend.push_lifetime(Lifetime::Forever);
        let cut = tokio::time::timeout(Duration::from_secs(5), phone.press(Symbol::One)).await;
        assert!(cut.is_err());
        assert_eq!(phone.stored(), vec![2, 1]);

        phone.machine.shutdown(ShutdownReason::ExitButton).await;

        assert_eq!(phone.stored(), vec![1]);
        assert_eq!(phone.backend.interrupts(), 1);
        assert!(!phone.machine.gateway.is_active(AudioKind::Capture));
        assert_eq!(phone.last_played(), vec!["goodbye.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_after_capture_keeps_clip() {
        let mut phone = phone(&[]);
        phone.pick_up().await;
        phone.press(Symbol::One).await;
        assert_eq!(phone.stored(), vec![1]);

        phone.machine.shutdown(ShutdownReason::Terminate).await;
        assert_eq!(phone.stored(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_after_gap_keeps_older_message() {
        // Clips 1 and 2 were removed by hand
        let mut phone = phone(&[3]);
        phone.pick_up().await;

        phone.press(Symbol::One).await;
        assert_eq!(phone.stored(), vec![4, 3]);

        phone.press(Symbol::Zero).await;
        assert_eq!(phone.stored(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_channel_closes() {
        let mut phone = phone(&[]);
        let (tx, rx) = mpsc::channel(8);
        tx.send(PhoneEvent::KeyPress { sample: 890 }).await.unwrap();
        tx.send(PhoneEvent::Reset {
            off_hook: false,
            on_hook_for_ms: None,
        })
        .await
        .unwrap();
        drop(tx);

        phone.machine.run(rx).await;

        let played = phone.played();
        assert_eq!(played[0], vec!["greeting.wav", "main_menu.wav"]);
        assert_eq!(played[1], vec!["no_messages.wav", "main_menu.wav"]);
        assert!(phone.machine.menu().is_empty());
        assert!(phone.dir.path().join("recordings").is_dir());
    }
}
