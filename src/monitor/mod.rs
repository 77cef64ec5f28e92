//! Monitor module for the payphone's digital input lines
//!
//! Three independent monitors (keypad press, hook switch, exit button) run
//! on their own threads, debounce their line, and hand events to the state
//! machine or the shutdown signal.

mod edge;
mod listener;

pub use listener::{LineMonitors, PhoneEvent};
