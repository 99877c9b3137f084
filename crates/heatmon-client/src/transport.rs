//! Framed line transport.
//!
//! Exchanges newline-terminated messages over one connected byte stream.
//! Partial reads are coalesced by a [`LineCodec`]; bytes that arrive after a
//! terminator are kept for the next [`LineTransport::read_line`] call.
//!
//! The socket is closed when the transport is dropped, so every exit path of
//! an operation (success, retry exhaustion, parse failure) releases it exactly
//! once.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use heatmon_protocol::{LineCodec, ProtocolError};
use thiserror::Error;
use tracing::trace;

/// Size of a single socket read.
const READ_CHUNK_SIZE: usize = 8192;

/// Default connect/read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Network location of a board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP address.
    pub address: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Endpoint {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Transport-level failures. All of them are retryable by the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint unreachable, unresolvable, or connect timed out.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// No terminator arrived within the read timeout.
    #[error("timeout waiting for response")]
    Timeout,

    /// The peer closed the connection before a full line arrived.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Writing to the socket failed.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    /// Reading from the socket failed for a reason other than timeout.
    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    /// The peer sent more than the codec buffers without a terminator.
    #[error("line too long: max {max} bytes, got {actual}")]
    LineTooLong { max: usize, actual: usize },
}

/// A connection that exchanges whole lines.
pub trait LineTransport {
    /// Send `text` followed by a single `\n`.
    fn send_line(&mut self, text: &str) -> Result<(), TransportError>;

    /// Block until a complete line is available and return it without the
    /// terminator.
    fn read_line(&mut self) -> Result<String, TransportError>;
}

/// Line framing over any byte stream.
#[derive(Debug)]
pub struct FramedStream<S> {
    stream: S,
    codec: LineCodec,
}

impl<S: Read + Write> FramedStream<S> {
    pub fn new(stream: S) -> Self {
        FramedStream {
            stream,
            codec: LineCodec::new(),
        }
    }

    /// Number of bytes received but not yet returned as a line.
    pub fn buffered_len(&self) -> usize {
        self.codec.buffered_len()
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> LineTransport for FramedStream<S> {
    fn send_line(&mut self, text: &str) -> Result<(), TransportError> {
        trace!("-> {:?}", text);
        self.stream
            .write_all(&LineCodec::encode_line(text))
            .and_then(|_| self.stream.flush())
            .map_err(TransportError::Write)
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.codec.decode_line() {
                Ok(Some(line)) => {
                    trace!("<- {:?}", line);
                    return Ok(line);
                }
                Ok(None) => {}
                Err(ProtocolError::LineTooLong { max, actual }) => {
                    self.codec.clear();
                    return Err(TransportError::LineTooLong { max, actual });
                }
                Err(other) => {
                    return Err(TransportError::Read(io::Error::new(
                        io::ErrorKind::InvalidData,
                        other.to_string(),
                    )))
                }
            }

            let n = match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    return Err(TransportError::Timeout)
                }
                Err(e) => return Err(TransportError::Read(e)),
            };
            self.codec.push(&chunk[..n]);
        }
    }
}

/// Opens connections to boards.
pub trait Connector {
    type Transport: LineTransport;

    /// Open a new connection.
    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Transport, TransportError>;

    /// Bare connection attempt with no payload exchange.
    fn probe(&self, endpoint: &Endpoint) -> bool {
        self.connect(endpoint).is_ok()
    }
}

/// Connector for real boards over TCP.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    /// Connect, read and write timeout.
    pub timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        TcpConnector {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TcpConnector {
    pub fn new(timeout: Duration) -> Self {
        TcpConnector { timeout }
    }

    fn open_stream(&self, endpoint: &Endpoint) -> io::Result<TcpStream> {
        let mut last_error =
            io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing");

        for addr in (endpoint.address.as_str(), endpoint.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    return Ok(stream);
                }
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }
}

impl Connector for TcpConnector {
    type Transport = FramedStream<TcpStream>;

    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Transport, TransportError> {
        let stream = self
            .open_stream(endpoint)
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        Ok(FramedStream::new(stream))
    }
}
