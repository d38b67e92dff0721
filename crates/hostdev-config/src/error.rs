use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No device was configured at all.
    #[error("no devices configured; pass e.g. --devs /dev/mem:rwm")]
    NoDevices,

    /// A device list entry is not of the form `<path>:<permissions>`.
    #[error("invalid device entry '{entry}': must contain exactly one ':', e.g. /dev/mem:rwm")]
    MalformedEntry {
        /// The offending list entry.
        entry: String,
    },

    /// The device name cannot be normalized.
    #[error("invalid device name '{name}': {reason}")]
    InvalidDeviceName {
        /// The offending device name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The permission string is not a subset of `rwm`.
    #[error("invalid permission string '{value}': {reason}")]
    InvalidPermissions {
        /// The offending permission string.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Stat of the device file failed.
    #[error("stat of {path} failed: {source}")]
    DeviceStat {
        /// Device path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The path exists but is not a character or block device.
    #[error("{path} is not a device file")]
    NotADevice {
        /// Device path.
        path: PathBuf,
    },

    /// Two entries resolve to the same device or socket name.
    #[error("device '{name}' collides with an earlier entry (normalized name '{normalized}')")]
    DuplicateDevice {
        /// Device name of the later entry.
        name: String,
        /// The shared normalized name.
        normalized: String,
    },

    /// Failed to read configuration file.
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// Path to the config file that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("Failed to parse config file at {path}: {source}")]
    ParseError {
        /// Path to the config file that failed to parse.
        path: String,
        /// Underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// Field that failed validation.
        field: String,
        /// Validation failure description.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
