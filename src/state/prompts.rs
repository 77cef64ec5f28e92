//! The fixed set of spoken prompts

use std::path::PathBuf;

/// One prompt clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Greeting,
    MainMenu,
    /// Ends with the beep
    RecordIntro,
    /// 1 re-record, 2 review, # save, 0 discard
    RecordInstructions,
    MessageSaved,
    MessageDiscarded,
    PlaybackIntro,
    NextMessage,
    LastMessage,
    /// 1 replay, 2 next, 0 main menu
    PlaybackInstructions,
    /// As above, without "next"
    PlaybackInstructionsLast,
    NoMessages,
    NoMessagesLeft,
    Error,
    Goodbye,
}

impl Prompt {
    pub const ALL: [Prompt; 15] = [
        Prompt::Greeting,
        Prompt::MainMenu,
        Prompt::RecordIntro,
        Prompt::RecordInstructions,
        Prompt::MessageSaved,
        Prompt::MessageDiscarded,
        Prompt::PlaybackIntro,
        Prompt::NextMessage,
        Prompt::LastMessage,
        Prompt::PlaybackInstructions,
        Prompt::PlaybackInstructionsLast,
        Prompt::NoMessages,
        Prompt::NoMessagesLeft,
        Prompt::Error,
        Prompt::Goodbye,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Prompt::Greeting => "greeting.wav",
            Prompt::MainMenu => "main_menu.wav",
            Prompt::RecordIntro => "record_intro.wav",
            Prompt::RecordInstructions => "record_instructions.wav",
            Prompt::MessageSaved => "message_saved.wav",
            Prompt::MessageDiscarded => "message_discarded.wav",
            Prompt::PlaybackIntro => "playback_intro.wav",
            Prompt::NextMessage => "next_message.wav",
            Prompt::LastMessage => "last_message.wav",
            Prompt::PlaybackInstructions => "playback_instructions.wav",
            Prompt::PlaybackInstructionsLast => "playback_instructions_last.wav",
            Prompt::NoMessages => "no_messages.wav",
            Prompt::NoMessagesLeft => "no_messages_left.wav",
            Prompt::Error => "error.wav",
            Prompt::Goodbye => "goodbye.wav",
        }
    }
}

/// Resolves prompts to files under the prompts root
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    root: PathBuf,
}

impl PromptLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, prompt: Prompt) -> PathBuf {
        self.root.join(prompt.file_name())
    }

    pub fn paths(&self, prompts: &[Prompt]) -> Vec<PathBuf> {
        prompts.iter().map(|&prompt| self.path(prompt)).collect()
    }

    /// Prompts with no file on disk
    pub fn missing(&self) -> Vec<Prompt> {
        Prompt::ALL
            .into_iter()
            .filter(|&prompt| !self.path(prompt).is_file())
            .collect()
    }
}
