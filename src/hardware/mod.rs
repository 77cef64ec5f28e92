//! Hardware module for the payphone's digital and analog lines
//!
//! Provides the bit-banged keypad ADC driver, the voltage-band keypad
//! decoder, and the sysfs GPIO lines the daemon runs against.

mod adc;
mod gpio;
mod keypad;

pub use adc::{Sample, INVALID_SAMPLE};
pub use gpio::GpioLines;
pub use keypad::{KeypadBands, Symbol};

/// Read access to every line the controller and monitors watch
pub trait PhoneLines: Send + Sync {
    /// Sample the keypad's analog line
    fn read_keypad(&self) -> Sample;

    /// True while the handset is lifted
    fn is_off_hook(&self) -> bool;

    /// Level of the keypad-press digital line
    fn key_line(&self) -> bool;

    /// Level of the exit button line
    fn exit_line(&self) -> bool;
}
