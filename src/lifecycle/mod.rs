//! Process lifecycle: shutdown on the exit button or a termination signal

mod shutdown;

pub use shutdown::{ShutdownReason, ShutdownSignal, ShutdownTrigger};
