//! Error types for the netsdr library.

use thiserror::Error;

/// The main error type for netsdr operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// The component was disposed and cannot be used anymore.
    #[error("{component} has been disposed")]
    Disposed { component: &'static str },
}

/// Frame-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Buffer too short to contain the 2-byte header.
    #[error("frame too short: need at least 2 bytes, got {0}")]
    TooShort(usize),

    /// Length declared in the header does not match the buffer.
    #[error("length mismatch: header declares {declared} bytes, buffer holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Body does not fit in the 13-bit length field.
    #[error("message too large: {size} byte body exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    /// Unsupported sample width.
    #[error("unsupported sample size: {0} bits")]
    InvalidSampleSize(u16),

    /// Frequency does not fit in the 40-bit wire field.
    #[error("frequency out of range: {0} Hz exceeds the 40-bit field")]
    FrequencyOutOfRange(u64),

    /// A control item was requested from a data item message.
    #[error("message is not a control item")]
    NotControlItem,
}

/// Result type alias for netsdr operations.
pub type Result<T> = std::result::Result<T, Error>;
