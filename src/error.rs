/// Error types for configuration, line decoding and the device session
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Problems found while loading the station configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: '{value}' is not a valid number")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key}: channel {value} out of range {min}-{max}")]
    ChannelOutOfRange {
        key: &'static str,
        value: u8,
        min: u8,
        max: u8,
    },

    #[error("METEOSTICK_RAIN_BUCKET_TYPE must be 0 or 1, got {0}")]
    InvalidRainBucket(u8),

    #[error("METEOSTICK_SENSOR_MAP entry '{0}' is not of the form observation=field")]
    InvalidSensorMapEntry(String),
}

/// A line that could not be decoded. Never fatal: the read loop logs it and
/// moves on to the next line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown sensor identifier '{tag}' in '{line}'")]
    UnknownTag { tag: String, line: String },

    #[error("parse failed for '{line}': {field} '{token}' is not a number")]
    InvalidNumber {
        field: &'static str,
        token: String,
        line: String,
    },
}

/// Failures of the serial session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("serial transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("no reset prompt from the device after {waited:?} (received {received:?})")]
    SentinelTimeout { waited: Duration, received: String },

    #[error("max retries ({max_tries}) exceeded for readings")]
    RetriesExceeded { max_tries: u32 },

    #[error("session is not streaming; run the configuration handshake first")]
    NotStreaming,

    #[error("acquisition stopped on request")]
    Stopped,
}
