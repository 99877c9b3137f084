//! Error types for the client.

use std::path::PathBuf;

use heatmon_protocol::ProtocolError;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors from device operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Payload or argument rejected by the protocol layer.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The liveness probe failed.
    #[error("device {device} is unreachable")]
    Unreachable {
        /// Device name.
        device: String,
    },

    /// Every query attempt failed or returned nothing.
    #[error("data not available from {device} after {attempts} attempts (last error: {last_error})")]
    DataUnavailable {
        /// Device name.
        device: String,
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        last_error: String,
    },

    /// The status report carries no relay zone.
    #[error("status of {device} has no relay zone")]
    NoRelayZone {
        /// Device name.
        device: String,
    },

    /// No device with this id in the fleet.
    #[error("unknown device id {0}")]
    UnknownDevice(u32),
}

/// Result type alias for device operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors loading the fleet file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid fleet configuration: {0}")]
    Invalid(String),
}

/// Errors capturing, saving or loading a configuration snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot format error: {0}")]
    Format(#[from] serde_json::Error),

    /// A device failed during capture; nothing was captured.
    #[error("capture aborted at device {device}: {source}")]
    Capture {
        /// Name of the device that failed.
        device: String,
        #[source]
        source: ClientError,
    },
}
