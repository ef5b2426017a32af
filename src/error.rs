//! Error types for VESC protocol operations.

use thiserror::Error;

/// Result type alias for VESC operations.
pub type Result<T> = std::result::Result<T, VescError>;

/// Error types for VESC communication.
///
/// No variant is fatal to the process: a failed exchange degrades the
/// current poll tick or command, never the session.
#[derive(Error, Debug)]
pub enum VescError {
    /// The serial endpoint could not be opened or is not present
    #[error("serial link unavailable: {0}")]
    Unavailable(String),

    /// Serial port communication error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No or partial response within the byte timeout
    #[error("response timeout")]
    Timeout,

    /// Frame did not begin with a valid start marker
    #[error("bad frame start marker: {byte:#04x}")]
    BadStart {
        /// Byte received where the start marker was expected
        byte: u8,
    },

    /// Frame did not close with the end marker
    #[error("bad frame end marker: {byte:#04x}")]
    BadEnd {
        /// Byte received where the end marker was expected
        byte: u8,
    },

    /// Frame CRC did not match the payload
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// CRC recomputed over the received payload
        expected: u16,
        /// CRC carried by the frame
        actual: u16,
    },

    /// Telemetry payload shorter than the fixed field layout
    #[error("truncated payload: needed {needed} bytes, got {got}")]
    Truncated {
        /// Bytes required by the layout
        needed: usize,
        /// Bytes actually available
        got: usize,
    },

    /// First response byte did not echo the command id
    #[error("unexpected response: expected command {expected:#04x}, got {actual:#04x}")]
    UnexpectedResponse {
        /// Command id that was sent
        expected: u8,
        /// First byte of the response payload
        actual: u8,
    },

    /// Empty response payload where at least a command id was expected
    #[error("empty response")]
    EmptyResponse,

    /// Observer-supplied command missing or with invalid fields
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Configuration file could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),

    /// The dispatcher worker is gone (only during shutdown)
    #[error("link dispatcher stopped")]
    DispatcherClosed,
}

impl VescError {
    /// True for the frame-corruption family (framing or CRC damage).
    pub fn is_corrupt_frame(&self) -> bool {
        matches!(
            self,
            VescError::BadStart { .. } | VescError::BadEnd { .. } | VescError::CrcMismatch { .. }
        )
    }
}
