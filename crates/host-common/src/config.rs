//! Configuration structures for the script host.
//!
//! Supports TOML deserialization with defaults that match the
//! behavior of the reference board emulation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Millisecond clock configuration.
    pub clock: ClockConfig,

    /// Background scheduler configuration.
    pub scheduler: SchedulerConfig,

    /// Emulated non-volatile storage.
    pub storage: StorageConfig,

    /// Emulated digital pins.
    pub pins: PinConfig,

    /// Reference console interpreter settings.
    pub console: ConsoleConfig,

    /// `save()` extension settings.
    pub save: SaveConfig,
}

/// Which platform time source backs the millisecond clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeSourceKind {
    /// Fine-grained monotonic clock (`clock_gettime`).
    #[default]
    Monotonic,
    /// Coarse wall-clock sampling at microsecond resolution.
    Wall,
}

impl std::fmt::Display for TimeSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSourceKind::Monotonic => write!(f, "monotonic"),
            TimeSourceKind::Wall => write!(f, "wall"),
        }
    }
}

/// Clock configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Time source selected once at startup.
    pub source: TimeSourceKind,
}

/// Background scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name given to the background thread.
    pub thread_name: String,

    /// Consecutive zero deadlines tolerated before a forced back-off.
    pub max_immediate_reruns: u32,

    /// Sleep applied once `max_immediate_reruns` is reached.
    #[serde(with = "humantime_serde")]
    pub zero_deadline_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: String::from("background"),
            max_immediate_reruns: 64,
            zero_deadline_backoff: Duration::from_millis(1),
        }
    }
}

/// Emulated non-volatile storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Size in bytes.
    pub size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { size: 4096 }
    }
}

/// Emulated digital pin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// Number of pins in the bank (at most 64).
    pub count: u32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self { count: 64 }
    }
}

/// Reference console interpreter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Deadline reported to the scheduler when no task is scheduled.
    #[serde(with = "humantime_serde")]
    pub idle_interval: Duration,

    /// Maximum number of concurrently scheduled background tasks.
    pub max_tasks: usize,

    /// Longest accepted command line in bytes; longer lines are truncated.
    pub max_line_len: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(100),
            max_tasks: 10,
            max_line_len: 256,
        }
    }
}

/// `save()` extension configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// File written when `save()` is called without arguments.
    pub default_file: PathBuf,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            default_file: PathBuf::from("eeprom"),
        }
    }
}

impl HostConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pins.count == 0 || self.pins.count > 64 {
            return Err(ConfigError::Invalid(format!(
                "pins.count must be in 1..=64, got {}",
                self.pins.count
            )));
        }
        if self.storage.size == 0 {
            return Err(ConfigError::Invalid("storage.size must be non-zero".into()));
        }
        if self.scheduler.max_immediate_reruns == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_immediate_reruns must be at least 1".into(),
            ));
        }
        if self.scheduler.zero_deadline_backoff.is_zero() {
            return Err(ConfigError::Invalid(
                "scheduler.zero_deadline_backoff must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is syntactically valid but out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
