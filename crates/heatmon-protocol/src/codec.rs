//! Line-based codec for board communication.
//!
//! Every message in either direction is a single line terminated with `\n`.
//! Reads from a socket can deliver a line in pieces, a terminator on its own,
//! or several lines at once; the codec accumulates bytes and hands back one
//! complete line at a time, keeping whatever follows for the next call.

use bytes::{Buf, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Maximum number of bytes buffered while waiting for a terminator.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Line terminator used in both directions.
pub const LINE_TERMINATOR: u8 = b'\n';

/// A codec for reading and writing protocol lines.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(MAX_LINE_LENGTH),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode a complete line from the buffer.
    ///
    /// Returns `Ok(Some(line))` with the terminator (and a `\r` right before it)
    /// removed, or `Ok(None)` if more data is needed. Bytes after the
    /// terminator stay in the buffer.
    pub fn decode_line(&mut self) -> ProtocolResult<Option<String>> {
        let Some(end) = self.buffer.iter().position(|&b| b == LINE_TERMINATOR) else {
            if self.buffer.len() > MAX_LINE_LENGTH {
                return Err(ProtocolError::LineTooLong {
                    max: MAX_LINE_LENGTH,
                    actual: self.buffer.len(),
                });
            }
            return Ok(None);
        };

        let mut line_data = self.buffer.split_to(end);
        self.buffer.advance(1);

        if line_data.last() == Some(&b'\r') {
            line_data.truncate(line_data.len() - 1);
        }

        Ok(Some(String::from_utf8_lossy(&line_data).into_owned()))
    }

    /// Encode a line for transmission.
    ///
    /// Appends the `\n` terminator.
    pub fn encode_line(text: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(text.len() + 1);
        buf.extend_from_slice(text.as_bytes());
        buf.push(LINE_TERMINATOR);
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
