//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::hardware::KeypadBands;

const DEFAULT_CONFIG_PATH: &str = "/etc/payphone/config.json";

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding recorded messages
    pub recordings_dir: PathBuf,

    /// Directory holding the fixed prompt clips
    pub prompts_dir: PathBuf,

    /// Append-only event log; stderr when unset
    pub log_file: Option<PathBuf>,

    /// BCM pin numbers
    pub pins: PinConfig,

    /// ADC channel the keypad is wired to
    pub keypad_channel: u8,

    pub timing: TimingConfig,

    pub audio: AudioConfig,

    /// Voltage bands for keypad decoding
    pub keypad_bands: KeypadBands,
}

/// BCM numbers of every line the daemon touches
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub adc_clock: u8,
    pub adc_data_in: u8,
    pub adc_data_out: u8,
    pub adc_chip_select: u8,
    pub key_press: u8,
    pub hook: u8,
    pub exit: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            adc_clock: 18,
            adc_data_in: 23,
            adc_data_out: 24,
            adc_chip_select: 25,
            key_press: 20,
            hook: 8,
            exit: 21,
        }
    }
}

/// Polling cadences, debounce windows and the recording bound
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Interruptible-wait tick
    pub poll_interval_ms: u64,
    /// How often the monitor threads sample their lines
    pub line_poll_interval_ms: u64,
    pub key_debounce_ms: u64,
    pub hook_debounce_ms: u64,
    pub max_recording_secs: u64,
    /// Longest the closing prompt may hold up shutdown
    pub goodbye_timeout_secs: u64,
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn line_poll_interval(&self) -> Duration {
        Duration::from_millis(self.line_poll_interval_ms)
    }

    pub fn key_debounce(&self) -> Duration {
        Duration::from_millis(self.key_debounce_ms)
    }

    pub fn hook_debounce(&self) -> Duration {
        Duration::from_millis(self.hook_debounce_ms)
    }

    pub fn max_recording(&self) -> Duration {
        Duration::from_secs(self.max_recording_secs)
    }

    pub fn goodbye_timeout(&self) -> Duration {
        Duration::from_secs(self.goodbye_timeout_secs)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            line_poll_interval_ms: 5,
            key_debounce_ms: 500,
            hook_debounce_ms: 100,
            max_recording_secs: 60,
            goodbye_timeout_secs: 10,
        }
    }
}

/// External playback and capture programs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// ALSA device passed to both programs
    pub device: String,
    pub playback_program: String,
    pub capture_program: String,
    /// Extension of recorded clips
    pub extension: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: "plughw:1".to_string(),
            playback_program: "aplay".to_string(),
            capture_program: "arecord".to_string(),
            extension: "wav".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("/var/lib/payphone");
        Self {
            recordings_dir: data_dir.join("recordings"),
            prompts_dir: data_dir.join("prompts"),
            log_file: None,
            pins: PinConfig::default(),
            keypad_channel: 0,
            timing: TimingConfig::default(),
            audio: AudioConfig::default(),
            keypad_bands: KeypadBands::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file, environment and defaults
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("PAYPHONE_CONFIG")
            .map(PathBuf::from)
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                default.exists().then_some(default)
            });

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(dir) = std::env::var_os("PAYPHONE_RECORDINGS_DIR") {
            config.recordings_dir = PathBuf::from(dir);
        }
        if let Some(dir) = std::env::var_os("PAYPHONE_PROMPTS_DIR") {
            config.prompts_dir = PathBuf::from(dir);
        }
        if let Some(file) = std::env::var_os("PAYPHONE_LOG_FILE") {
            config.log_file = Some(PathBuf::from(file));
        }

        Ok(config)
    }

    /// Parse a JSON config file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Ensure the recordings directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.recordings_dir)?;
        Ok(())
    }
}
