//! Linux sysfs GPIO lines
//!
//! Pins are exported through `/sys/class/gpio` and driven by writing their
//! `value` files. Pull resistors are not configurable through sysfs and are
//! expected to be set by the board overlay.

use std::fs;
use std::path::PathBuf;

use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::adc::{Adc, Sample, INVALID_SAMPLE};
use super::PhoneLines;
use crate::config::PinConfig;

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Errors from the sysfs GPIO interface
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("failed to export GPIO {pin}: {source}")]
    Export {
        pin: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("GPIO {pin} I/O error: {source}")]
    Io {
        pin: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("GPIO {pin} returned unexpected value {value:?}")]
    BadValue { pin: u8, value: String },
}

impl embedded_hal::digital::Error for GpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Pin direction used at export time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// A single exported GPIO line
#[derive(Debug)]
pub struct SysfsPin {
    pin: u8,
    value_path: PathBuf,
}

impl SysfsPin {
    /// Export `pin` (if needed) and set its direction
    pub fn export(pin: u8, direction: Direction) -> Result<Self, GpioError> {
        let root = PathBuf::from(SYSFS_GPIO_ROOT);
        let pin_dir = root.join(format!("gpio{pin}"));

        if !pin_dir.exists() {
            fs::write(root.join("export"), pin.to_string())
                .map_err(|source| GpioError::Export { pin, source })?;
            debug!(pin, "exported GPIO");
        }

        fs::write(pin_dir.join("direction"), direction.as_str())
            .map_err(|source| GpioError::Export { pin, source })?;

        Ok(Self {
            pin,
            value_path: pin_dir.join("value"),
        })
    }

    /// Read the current level
    pub fn level(&self) -> Result<bool, GpioError> {
        let raw = fs::read_to_string(&self.value_path).map_err(|source| GpioError::Io {
            pin: self.pin,
            source,
        })?;
        match raw.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(GpioError::BadValue {
                pin: self.pin,
                value: other.to_string(),
            }),
        }
    }

    fn write_level(&self, high: bool) -> Result<(), GpioError> {
        fs::write(&self.value_path, if high { "1" } else { "0" }).map_err(|source| {
            GpioError::Io {
                pin: self.pin,
                source,
            }
        })
    }
}

impl ErrorType for SysfsPin {
    type Error = GpioError;
}

impl InputPin for SysfsPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.level()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.level().map(|high| !high)
    }
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write_level(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write_level(true)
    }
}

type SysfsAdc = Adc<SysfsPin, SysfsPin, SysfsPin, SysfsPin>;

/// The payphone's physical lines on a Raspberry Pi header
pub struct GpioLines {
    adc: Mutex<SysfsAdc>,
    keypad_channel: u8,
    key_press: SysfsPin,
    hook: SysfsPin,
    exit: SysfsPin,
}

impl GpioLines {
    /// Export every pin named in the configuration
    pub fn open(pins: &PinConfig, keypad_channel: u8) -> Result<Self, GpioError> {
        let adc = Adc::new(
            SysfsPin::export(pins.adc_clock, Direction::Out)?,
            SysfsPin::export(pins.adc_data_out, Direction::Out)?,
            SysfsPin::export(pins.adc_data_in, Direction::In)?,
            SysfsPin::export(pins.adc_chip_select, Direction::Out)?,
        );

        Ok(Self {
            adc: Mutex::new(adc),
            keypad_channel,
            key_press: SysfsPin::export(pins.key_press, Direction::In)?,
            hook: SysfsPin::export(pins.hook, Direction::In)?,
            exit: SysfsPin::export(pins.exit, Direction::In)?,
        })
    }

    fn read_input(pin: &SysfsPin, name: &'static str) -> bool {
        match pin.level() {
            Ok(level) => level,
            Err(e) => {
                warn!(?e, line = name, "failed to read input line");
                false
            }
        }
    }
}

impl PhoneLines for GpioLines {
    fn read_keypad(&self) -> Sample {
        match self.adc.lock().read_channel(self.keypad_channel) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(?e, "keypad sample failed");
                INVALID_SAMPLE
            }
        }
    }

    fn is_off_hook(&self) -> bool {
        Self::read_input(&self.hook, "hook")
    }

    fn key_line(&self) -> bool {
        Self::read_input(&self.key_press, "key_press")
    }

    fn exit_line(&self) -> bool {
        Self::read_input(&self.exit, "exit")
    }
}
