//! Bit-banged driver for the 8-channel, 10-bit keypad ADC
//!
//! The chip speaks a 4-wire synchronous serial protocol: a 5-bit command
//! (start bit, single-ended bit, 3-bit channel address) is shifted out MSB
//! first, then 12 bits are clocked back in: a null bit, the 10 data bits
//! MSB first, and one trailing bit. A 1-bit right shift of the accumulator
//! leaves the 10-bit sample.

use embedded_hal::digital::{Error as _, ErrorKind, InputPin, OutputPin};
use tracing::trace;

/// A raw ADC reading in `0..=1023`, or [`INVALID_SAMPLE`]
pub type Sample = i32;

/// Returned for channels outside `0..=7`; the bus is not touched
pub const INVALID_SAMPLE: Sample = -1;

/// Highest addressable channel on the chip
pub const MAX_CHANNEL: u8 = 7;

/// Start bit + single-ended bit, OR'd over the channel address
const COMMAND_PREFIX: u8 = 0x18;
const COMMAND_BITS: usize = 5;
const RESPONSE_BITS: usize = 12;

/// Errors raised while clocking the bus
#[derive(Debug, thiserror::Error)]
pub enum AdcError {
    #[error("ADC bus pin error: {0:?}")]
    Bus(ErrorKind),
}

/// ADC driver owning the four bus lines
pub struct Adc<CLK, DOUT, DIN, CS> {
    clock: CLK,
    data_out: DOUT,
    data_in: DIN,
    chip_select: CS,
}

impl<CLK, DOUT, DIN, CS> Adc<CLK, DOUT, DIN, CS>
where
    CLK: OutputPin,
    DOUT: OutputPin,
    DIN: InputPin,
    CS: OutputPin,
{
    /// Create a driver from the clock, data-out, data-in and chip-select lines
    pub fn new(clock: CLK, data_out: DOUT, data_in: DIN, chip_select: CS) -> Self {
        Self {
            clock,
            data_out,
            data_in,
            chip_select,
        }
    }

    /// Read one 10-bit sample from `channel`
    ///
    /// Channels above 7 yield [`INVALID_SAMPLE`] without any bus activity.
    pub fn read_channel(&mut self, channel: u8) -> Result<Sample, AdcError> {
        if channel > MAX_CHANNEL {
            return Ok(INVALID_SAMPLE);
        }

        self.chip_select.set_high().map_err(|e| AdcError::Bus(e.kind()))?;
        self.clock.set_low().map_err(|e| AdcError::Bus(e.kind()))?;
        self.chip_select.set_low().map_err(|e| AdcError::Bus(e.kind()))?;

        // Only the top 5 bits of the shifted command are sent
        let mut command = (channel | COMMAND_PREFIX) << 3;
        for _ in 0..COMMAND_BITS {
            if command & 0x80 != 0 {
                self.data_out.set_high().map_err(|e| AdcError::Bus(e.kind()))?;
            } else {
                self.data_out.set_low().map_err(|e| AdcError::Bus(e.kind()))?;
            }
            command <<= 1;
            self.pulse_clock()?;
        }

        let mut accumulator: Sample = 0;
        for _ in 0..RESPONSE_BITS {
            self.pulse_clock()?;
            accumulator <<= 1;
            if self.data_in.is_high().map_err(|e| AdcError::Bus(e.kind()))? {
                accumulator |= 0x1;
            }
        }

        self.chip_select.set_high().map_err(|e| AdcError::Bus(e.kind()))?;

        let sample = accumulator >> 1;
        trace!(channel, sample, "adc read");
        Ok(sample)
    }

    fn pulse_clock(&mut self) -> Result<(), AdcError> {
        self.clock.set_high().map_err(|e| AdcError::Bus(e.kind()))?;
        self.clock.set_low().map_err(|e| AdcError::Bus(e.kind()))?;
        Ok(())
    }
}
