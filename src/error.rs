//! Error types for the TDS thin client.

use std::io;
use std::panic::Location;
use thiserror::Error;

/// Result type alias for TDS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for TDS thin client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading or writing LOB data.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Position argument out of range (positions are 1-based).
    #[error("Invalid position: {pos}")]
    InvalidPosition { pos: i64 },

    /// Negative length argument.
    #[error("Invalid length: {len}")]
    InvalidLength { len: i64 },

    /// Requested range runs past the end of the value.
    #[error("Requested range exceeds value length {length}")]
    RangeExceeded { length: u64 },

    /// A read returned fewer characters than the value's length promised.
    #[error("Short read: expected {expected} characters, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// A skip covered fewer characters than requested.
    #[error("Skip mismatch: requested {requested} characters, skipped {skipped}")]
    SkipMismatch { requested: u64, skipped: u64 },

    /// A single-use stream was already consumed or its connection advanced.
    #[error("LOB stream already consumed and cannot be replayed")]
    Exhausted,

    /// Write attempted on a closed writer.
    #[error("Writer is closed")]
    WriterClosed,

    /// Temporary file creation was denied by the environment.
    #[error("Temporary file creation denied: {message}")]
    PermissionDenied { message: String },

    /// Protocol error.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Buffer too small.
    #[error("Buffer too small: need {needed} bytes, have {available} at {location}")]
    BufferTooSmall {
        needed: usize,
        available: usize,
        location: &'static Location<'static>,
    },
}

impl Error {
    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}
