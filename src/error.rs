//! Error types for the rgm3800 library.

use thiserror::Error;

/// The main error type for rgm3800 operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial connection is gone, nothing can be sent or received anymore.
    #[error("serial connection lost")]
    ConnectionLost,

    /// The device did not answer properly, even after retrying.
    #[error("communication error: {message}")]
    Communication { message: String },

    /// A reply line matched the request but its fields could not be parsed.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Waypoint format code not known.
    #[error("track format {0} not supported")]
    UnsupportedFormat(u8),

    /// A configuration value was rejected before talking to the device.
    #[error("invalid setting: {reason}")]
    InvalidSetting { reason: String },

    /// Waypoint record decoding error.
    #[error("record error: {0}")]
    Record(#[from] RecordError),
}

/// Waypoint record errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Record length does not match its format.
    #[error("format {format} records are {expected} bytes, got {got}")]
    WrongLength {
        format: u8,
        expected: usize,
        got: usize,
    },

    /// The device had no valid fix when the record was logged.
    #[error("fix flag is {0}, expected 1")]
    FixNotOk(u8),

    /// Time of day fields out of range.
    #[error("invalid time of day {hour:02}:{minute:02}:{second:02}")]
    InvalidTime { hour: u8, minute: u8, second: u8 },
}

/// Result type alias for rgm3800 operations.
pub type Result<T> = std::result::Result<T, Error>;
