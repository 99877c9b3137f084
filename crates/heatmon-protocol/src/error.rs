//! Error types for the controller protocol.

use thiserror::Error;

/// Errors that can occur when working with the controller protocol.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    /// A status payload could not be parsed. No partial status is produced.
    #[error("malformed payload entry {entry:?}: {reason}")]
    MalformedPayload {
        /// The offending `type:zone:slot=value` entry.
        entry: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A relay mode token other than `ON` or `OFF`.
    #[error("invalid relay mode {0:?} (expected ON or OFF)")]
    InvalidMode(String),

    /// A relay value outside {0, 1}.
    #[error("invalid relay value {0} (expected 0 or 1)")]
    InvalidRelayValue(f64),

    /// No line terminator arrived before the buffer limit.
    #[error("line too long: max {max} bytes, got {actual}")]
    LineTooLong { max: usize, actual: usize },
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
