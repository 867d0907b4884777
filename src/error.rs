/// Error types for the Pinecil session
use std::time::Duration;

use thiserror::Error;

/// Failure reported by a [`DeviceClient`](crate::device::DeviceClient).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("device is not connected")]
    NotConnected,

    #[error("malformed payload from {characteristic}: {reason}")]
    Malformed {
        characteristic: &'static str,
        reason: String,
    },

    #[error("setting {0} is not supported by the device")]
    UnsupportedSetting(String),
}

#[cfg(feature = "bluetooth")]
impl From<bluer::Error> for DeviceError {
    fn from(e: bluer::Error) -> Self {
        DeviceError::Transport(e.to_string())
    }
}

/// Soft connect failure. The session stays retryable on the next trigger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("connect rejected: {0}")]
    Transport(DeviceError),

    #[error("connected but could not fetch settings and device info: {0}")]
    Incomplete(DeviceError),

    #[error("no device handle bound")]
    NoDevice,

    #[error("session closed")]
    Closed,
}

/// Live-data or settings fetch failed after a successful connect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    #[error("read failed: {0}")]
    Device(DeviceError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Read(#[from] ReadError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("unknown setting {0}")]
    UnknownSetting(String),

    #[error("{key}={value} outside allowed range {min}..={max}")]
    OutOfRange {
        key: String,
        value: i32,
        min: i32,
        max: i32,
    },

    #[error("{key} cannot be set to {value}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("write failed: {0}")]
    Device(DeviceError),
}

/// An enum ordinal from the device is outside the known table.
#[derive(Debug, Clone, Error, PartialEq, Eq, Hash)]
#[error("unknown {field} value {ordinal}")]
pub struct DecodeDefect {
    pub field: &'static str,
    pub ordinal: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
