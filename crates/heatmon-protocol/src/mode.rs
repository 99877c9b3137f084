//! Relay mode vocabulary.

use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, ProtocolResult};

/// Wire token for an energized relay.
pub const RELAY_ON: &str = "ON";

/// Wire token for a released relay.
pub const RELAY_OFF: &str = "OFF";

/// Target or reported state of a single relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayMode {
    /// Relay energized (`ON`, value 1).
    On,
    /// Relay released (`OFF`, value 0).
    Off,
}

impl RelayMode {
    /// Get the wire token for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayMode::On => RELAY_ON,
            RelayMode::Off => RELAY_OFF,
        }
    }

    /// Numeric value as reported in status payloads.
    pub fn to_int(self) -> u8 {
        match self {
            RelayMode::On => 1,
            RelayMode::Off => 0,
        }
    }

    /// Convert a stored relay value back to a mode.
    ///
    /// Only 0 and 1 are accepted.
    pub fn from_int(value: i64) -> ProtocolResult<RelayMode> {
        match value {
            1 => Ok(RelayMode::On),
            0 => Ok(RelayMode::Off),
            other => Err(ProtocolError::InvalidRelayValue(other as f64)),
        }
    }

    /// Permissive conversion: exactly 1 is `On`, everything else is `Off`.
    pub fn from_int_lossy(value: i64) -> RelayMode {
        if value == 1 {
            RelayMode::On
        } else {
            RelayMode::Off
        }
    }

    /// Convert a relay value from a status payload (always reported as a float).
    pub fn from_value(value: f64) -> ProtocolResult<RelayMode> {
        if value == 1.0 {
            Ok(RelayMode::On)
        } else if value == 0.0 {
            Ok(RelayMode::Off)
        } else {
            Err(ProtocolError::InvalidRelayValue(value))
        }
    }
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelayMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            RELAY_ON => Ok(RelayMode::On),
            RELAY_OFF => Ok(RelayMode::Off),
            other => Err(ProtocolError::InvalidMode(other.to_string())),
        }
    }
}
