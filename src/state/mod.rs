//! State machine module for the payphone menus
//!
//! The menu is a stack of pressed keys:
//! - `[]`: main menu (1 record, 2 listen)
//! - `[1]`: record flow, after a message has been captured
//! - `[2]`: playback flow, positioned on one stored message
//!
//! A second key resolves against the level below it; unknown keys pop one
//! level and repeat that level's instructions.

mod machine;
mod prompts;
mod session;

pub use machine::StateMachine;
pub use prompts::PromptLibrary;
pub use session::InterruptGate;
