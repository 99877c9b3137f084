//! Commands that can be sent to a controller board.
//!
//! The board understands exactly three requests. They are opaque text to the
//! transport; only the board interprets them.

use crate::codec::LineCodec;
use crate::error::ProtocolResult;
use crate::mode::RelayMode;

/// Command token for a full status report.
pub const CMD_DATA: &str = "data";

/// Command token ending a session.
pub const CMD_CLOSE: &str = "close";

/// Prefix of the relay-set command.
pub const CMD_RELAY_PREFIX: &str = "releu";

/// Commands that can be sent to a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request the status report.
    Data,

    /// Tell the board the session is over. No response is expected.
    Close,

    /// Drive one relay to a mode.
    SetRelay {
        /// Relay slot index.
        slot: u32,
        /// Target mode.
        mode: RelayMode,
    },
}

impl Command {
    /// Encode the command as a line to send to the board.
    /// Returns the bytes to send (including the `\n` terminator).
    pub fn encode(&self) -> Vec<u8> {
        LineCodec::encode_line(&self.to_command_string())
    }

    /// Get the command string without the terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            Command::Data => CMD_DATA.to_string(),
            Command::Close => CMD_CLOSE.to_string(),
            Command::SetRelay { slot, mode } => {
                format!("{}{}{}", CMD_RELAY_PREFIX, slot, mode.as_str())
            }
        }
    }
}

/// Render a relay-set command from an untyped mode token.
///
/// Fails with [`ProtocolError::InvalidMode`](crate::ProtocolError::InvalidMode)
/// unless the token is exactly `ON` or `OFF`, so a bad request never reaches
/// the network.
pub fn encode_set_command(slot: u32, mode_token: &str) -> ProtocolResult<String> {
    let mode: RelayMode = mode_token.parse()?;
    Ok(Command::SetRelay { slot, mode }.to_command_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;

    #[test]
    fn test_encode_data() {
        assert_eq!(Command::Data.encode(), b"data\n");
    }

    #[test]
    fn test_encode_close() {
        assert_eq!(Command::Close.encode(), b"close\n");
    }

    #[test]
    fn test_encode_set_relay() {
        let cmd = Command::SetRelay { slot: 0, mode: RelayMode::On };
        assert_eq!(cmd.encode(), b"releu0ON\n");

        let cmd = Command::SetRelay { slot: 12, mode: RelayMode::Off };
        assert_eq!(cmd.to_command_string(), "releu12OFF");
    }

    #[test]
    fn test_encode_set_command_from_token() {
        assert_eq!(encode_set_command(5, "OFF").unwrap(), "releu5OFF");
        assert_eq!(
            encode_set_command(5, "TOGGLE"),
            Err(ProtocolError::InvalidMode("TOGGLE".to_string()))
        );
    }
}
