//! Keypad symbols and the voltage-band decoder
//!
//! Each key pulls the keypad's analog line to a different voltage. A sample
//! maps to a key only when it falls strictly inside that key's band; the
//! gaps between bands decode to no key at all.

use serde::{Deserialize, Serialize};

use super::adc::Sample;

/// A key on the payphone keypad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "*")]
    Star,
    #[serde(rename = "#")]
    Pound,
}

impl Symbol {
    /// The character printed on the key
    pub fn as_char(self) -> char {
        match self {
            Symbol::Zero => '0',
            Symbol::One => '1',
            Symbol::Two => '2',
            Symbol::Three => '3',
            Symbol::Four => '4',
            Symbol::Five => '5',
            Symbol::Six => '6',
            Symbol::Seven => '7',
            Symbol::Eight => '8',
            Symbol::Nine => '9',
            Symbol::Star => '*',
            Symbol::Pound => '#',
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One calibrated band: `above < sample < below` (no upper bound when `below` is absent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub symbol: Symbol,
    pub above: Sample,
    #[serde(default)]
    pub below: Option<Sample>,
}

impl Band {
    const fn new(symbol: Symbol, above: Sample, below: Option<Sample>) -> Self {
        Self {
            symbol,
            above,
            below,
        }
    }

    fn contains(&self, sample: Sample) -> bool {
        sample > self.above && self.below.map_or(true, |below| sample < below)
    }
}

/// Calibration of the phone this daemon was built against
const DEFAULT_BANDS: [Band; 12] = [
    Band::new(Symbol::One, 960, None),
    Band::new(Symbol::Two, 870, Some(910)),
    Band::new(Symbol::Three, 760, Some(810)),
    Band::new(Symbol::Four, 700, Some(750)),
    Band::new(Symbol::Five, 650, Some(670)),
    Band::new(Symbol::Six, 580, Some(610)),
    Band::new(Symbol::Seven, 540, Some(570)),
    Band::new(Symbol::Eight, 500, Some(525)),
    Band::new(Symbol::Nine, 470, Some(490)),
    Band::new(Symbol::Zero, 420, Some(440)),
    Band::new(Symbol::Star, 445, Some(470)),
    Band::new(Symbol::Pound, 390, Some(420)),
];

/// The voltage-band table used to decode keypad samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeypadBands {
    bands: Vec<Band>,
}

impl KeypadBands {
    /// Build a decoder from a custom calibration
    pub fn new(bands: Vec<Band>) -> Self {
        Self { bands }
    }

    /// Decode a sample into the key being held, if any
    pub fn decode(&self, sample: Sample) -> Option<Symbol> {
        self.bands
            .iter()
            .find(|band| band.contains(sample))
            .map(|band| band.symbol)
    }

    /// True when the sample decodes to no key
    pub fn is_released(&self, sample: Sample) -> bool {
        self.decode(sample).is_none()
    }
}

impl Default for KeypadBands {
    fn default() -> Self {
        Self::new(DEFAULT_BANDS.to_vec())
    }
}
