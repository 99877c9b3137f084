//! Command protocol: the two board operations with acknowledgment checking
//! and bounded retry.
//!
//! Each query attempt reconnects from scratch. A relay set keeps one
//! connection for all of its attempts and backs off between them.

use std::time::Duration;

use heatmon_protocol::{Command, RelayMode, CMD_CLOSE, CMD_DATA};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Fleet;
use crate::error::{ClientError, ClientResult};
use crate::room::Device;
use crate::transport::{Connector, LineTransport, TcpConnector};

/// Default number of attempts per operation.
pub const DEFAULT_ATTEMPTS: u32 = 2;

/// Default pause after an unacknowledged relay command.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// How often to try and how long to wait between relay attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Pause after every unacknowledged relay attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// How a relay acknowledgment is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckMatch {
    /// The response line must equal the command text (surrounding whitespace
    /// ignored).
    #[default]
    Exact,
    /// The response line must contain the command text anywhere. Accepts
    /// echoes buried in log noise, and also false positives such as
    /// `releu1ON` inside `releu11ON`.
    Contains,
}

impl AckMatch {
    /// Check whether `response` acknowledges `command`.
    pub fn matches(&self, command: &str, response: &str) -> bool {
        match self {
            AckMatch::Exact => response.trim() == command,
            AckMatch::Contains => response.contains(command),
        }
    }
}

/// Outcome of a relay-set command.
///
/// A connection failure and a board that never echoes the command both end up
/// as [`SetOutcome::NotAcknowledged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Acknowledged,
    NotAcknowledged,
}

impl SetOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, SetOutcome::Acknowledged)
    }
}

/// Waits out a backoff interval.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Talks to boards through a [`Connector`].
#[derive(Debug, Clone)]
pub struct DeviceLink<C, S = ThreadSleeper> {
    connector: C,
    retry: RetryPolicy,
    ack: AckMatch,
    sleeper: S,
}

impl<C: Connector> DeviceLink<C, ThreadSleeper> {
    /// Create a link with exact acknowledgment matching.
    pub fn new(connector: C, retry: RetryPolicy) -> Self {
        DeviceLink {
            connector,
            retry,
            ack: AckMatch::default(),
            sleeper: ThreadSleeper,
        }
    }
}

impl DeviceLink<TcpConnector, ThreadSleeper> {
    /// Create a TCP link using the fleet's timeout, retry and ack settings.
    pub fn for_fleet(fleet: &Fleet) -> Self {
        DeviceLink::new(TcpConnector::new(fleet.timeout()), fleet.retry_policy())
            .with_ack_match(fleet.ack_match())
    }
}

impl<C: Connector, S: Sleeper> DeviceLink<C, S> {
    /// Use a different acknowledgment rule.
    pub fn with_ack_match(mut self, ack: AckMatch) -> Self {
        self.ack = ack;
        self
    }

    /// Use a different way of waiting out backoffs.
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> DeviceLink<C, S2> {
        DeviceLink {
            connector: self.connector,
            retry: self.retry,
            ack: self.ack,
            sleeper,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn ack_match(&self) -> AckMatch {
        self.ack
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Liveness check: a bare connection, nothing sent.
    pub fn probe(&self, device: &Device) -> bool {
        let up = self.connector.probe(&device.endpoint);
        if !up {
            warn!("{} ({}) seems down", device.name, device.endpoint);
        }
        up
    }

    /// Request the raw status line from a board.
    ///
    /// Empty responses and transport failures are retried with a fresh
    /// connection, up to the policy's attempt count.
    pub fn query_status(&self, device: &Device) -> ClientResult<String> {
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=self.retry.attempts {
            match self.query_once(device) {
                Ok(data) if !data.is_empty() => {
                    debug!("{}: {}", device.name, data);
                    return Ok(data);
                }
                Ok(_) => {
                    warn!(
                        "{}: empty status response (attempt {}/{})",
                        device.name, attempt, self.retry.attempts
                    );
                    last_error = "data string is empty".to_string();
                }
                Err(e) => {
                    warn!(
                        "{}: status query failed (attempt {}/{}): {}",
                        device.name, attempt, self.retry.attempts, e
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(ClientError::DataUnavailable {
            device: device.name.clone(),
            attempts: self.retry.attempts,
            last_error,
        })
    }

    fn query_once(&self, device: &Device) -> ClientResult<String> {
        let mut transport = self.connector.connect(&device.endpoint)?;
        debug!("Sending message: {}", CMD_DATA);
        transport.send_line(CMD_DATA)?;
        let data = transport.read_line()?;
        if let Err(e) = transport.send_line(CMD_CLOSE) {
            debug!("{}: close notification failed: {}", device.name, e);
        }
        Ok(data)
    }

    /// Drive one relay to `mode` and wait for the board's acknowledgment.
    pub fn set_relay(&self, device: &Device, slot: u32, mode: RelayMode) -> SetOutcome {
        let command = Command::SetRelay { slot, mode }.to_command_string();

        let mut transport = match self.connector.connect(&device.endpoint) {
            Ok(transport) => transport,
            Err(e) => {
                warn!("{}: cannot send {}: {}", device.name, command, e);
                return SetOutcome::NotAcknowledged;
            }
        };

        for attempt in 1..=self.retry.attempts {
            debug!("Sending message: {}", command);
            if let Err(e) = transport.send_line(&command) {
                warn!("{}: connection broken while sending {}: {}", device.name, command, e);
                self.sleeper.sleep(self.retry.backoff);
                break;
            }

            let response = transport.read_line().unwrap_or_else(|e| {
                debug!("{}: no response to {}: {}", device.name, command, e);
                String::new()
            });

            if self.ack.matches(&command, &response) {
                debug!("Message ack received.");
                return SetOutcome::Acknowledged;
            }

            warn!(
                "{}: failed ack for {} (attempt {}/{}). Data: {:?}",
                device.name, command, attempt, self.retry.attempts, response
            );
            self.sleeper.sleep(self.retry.backoff);
        }

        if let Err(e) = transport.send_line(CMD_CLOSE) {
            debug!("{}: close notification failed: {}", device.name, e);
        }
        SetOutcome::NotAcknowledged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{device, relay_board, CountingSleeper, MockConnector};
    use crate::transport::{Endpoint, LineTransport, TransportError};
    use std::cell::{Cell, RefCell};
    use std::io;
    use std::rc::Rc;

    fn link(connector: MockConnector, attempts: u32) -> DeviceLink<MockConnector, CountingSleeper> {
        DeviceLink::new(
            connector,
            RetryPolicy {
                attempts,
                backoff: Duration::from_secs(2),
            },
        )
        .with_sleeper(CountingSleeper::default())
    }

    #[test]
    fn test_ack_match_exact_vs_contains() {
        assert!(AckMatch::Exact.matches("releu1ON", "releu1ON"));
        assert!(AckMatch::Exact.matches("releu1ON", " releu1ON\r"));
        assert!(!AckMatch::Exact.matches("releu1ON", "xx releu1ON yy"));
        assert!(!AckMatch::Exact.matches("releu1ON", "releu11ON"));

        assert!(AckMatch::Contains.matches("releu1ON", "xx releu1ON yy"));
        assert!(AckMatch::Contains.matches("releu1ON", "releu1ONreleu11ON"));
        assert!(!AckMatch::Contains.matches("releu1ON", ""));
    }

    #[test]
    fn test_query_status_success() {
        let connector = MockConnector::new().with_board("10.0.0.1", relay_board("R:1:0=1"));
        let link = link(connector, 2);

        let data = link.query_status(&device("10.0.0.1", 1)).unwrap();
        assert_eq!(data, "R:1:0=1");
        assert_eq!(link.connector().connects_to("10.0.0.1"), 1);
        assert_eq!(link.connector().sent_to("10.0.0.1"), vec!["data", "close"]);
    }

    #[test]
    fn test_query_status_retries_empty_response_on_fresh_connection() {
        let calls = Cell::new(0);
        let connector = MockConnector::new().with_board("10.0.0.1", move |line: &str| {
            if line != "data" {
                return None;
            }
            calls.set(calls.get() + 1);
            Some(if calls.get() == 1 { String::new() } else { "T:1:0=20".to_string() })
        });
        let link = link(connector, 2);

        assert_eq!(link.query_status(&device("10.0.0.1", 1)).unwrap(), "T:1:0=20");
        assert_eq!(link.connector().connects_to("10.0.0.1"), 2);
        // Queries never back off
        assert_eq!(link.sleeper.calls(), 0);
    }

    #[test]
    fn test_query_status_exhausted() {
        let connector = MockConnector::new().with_board("10.0.0.1", |_: &str| None);
        let link = link(connector, 3);

        let err = link.query_status(&device("10.0.0.1", 1)).unwrap_err();
        match err {
            ClientError::DataUnavailable { attempts, last_error, .. } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("timeout"));
            }
            other => panic!("expected DataUnavailable, got {other:?}"),
        }
        assert_eq!(link.connector().connects_to("10.0.0.1"), 3);
    }

    #[test]
    fn test_query_status_device_down() {
        let link = link(MockConnector::new().with_down("10.0.0.9"), 2);
        assert!(matches!(
            link.query_status(&device("10.0.0.9", 1)),
            Err(ClientError::DataUnavailable { .. })
        ));
    }

    #[test]
    fn test_set_relay_acknowledged() {
        let link = link(MockConnector::new().with_board("10.0.0.1", relay_board("R:1:0=0")), 2);

        let outcome = link.set_relay(&device("10.0.0.1", 1), 0, RelayMode::On);
        assert_eq!(outcome, SetOutcome::Acknowledged);
        assert_eq!(link.connector().sent_to("10.0.0.1"), vec!["releu0ON"]);
        assert_eq!(link.sleeper.calls(), 0);
    }

    #[test]
    fn test_set_relay_never_acknowledged() {
        let link = link(MockConnector::new().with_board("10.0.0.1", |_: &str| None), 2);

        let outcome = link.set_relay(&device("10.0.0.1", 1), 4, RelayMode::Off);
        assert_eq!(outcome, SetOutcome::NotAcknowledged);
        assert_eq!(
            link.connector().sent_to("10.0.0.1"),
            vec!["releu4OFF", "releu4OFF", "close"]
        );
        assert_eq!(link.connector().connects_to("10.0.0.1"), 1);
        assert_eq!(link.sleeper.calls(), 2);
        assert_eq!(link.sleeper.total(), Duration::from_secs(4));
    }

    #[test]
    fn test_set_relay_second_attempt_acknowledged() {
        let calls = Cell::new(0);
        let connector = MockConnector::new().with_board("10.0.0.1", move |line: &str| {
            calls.set(calls.get() + 1);
            (calls.get() > 1).then(|| line.to_string())
        });
        let link = link(connector, 2);

        assert!(link.set_relay(&device("10.0.0.1", 1), 2, RelayMode::On).is_acknowledged());
        assert_eq!(link.sleeper.calls(), 1);
    }

    #[test]
    fn test_set_relay_noisy_echo_depends_on_ack_mode() {
        let noisy = |line: &str| Some(format!("dbg: {} done", line));

        let exact = link(MockConnector::new().with_board("10.0.0.1", noisy), 1);
        assert_eq!(
            exact.set_relay(&device("10.0.0.1", 1), 1, RelayMode::On),
            SetOutcome::NotAcknowledged
        );

        let loose = link(MockConnector::new().with_board("10.0.0.1", noisy), 1)
            .with_ack_match(AckMatch::Contains);
        assert_eq!(
            loose.set_relay(&device("10.0.0.1", 1), 1, RelayMode::On),
            SetOutcome::Acknowledged
        );
    }

    /// Connects, then fails every write.
    #[derive(Default)]
    struct BrokenPipeConnector {
        sent: Rc<RefCell<Vec<String>>>,
    }

    struct BrokenPipeTransport {
        sent: Rc<RefCell<Vec<String>>>,
    }

    impl LineTransport for BrokenPipeTransport {
        fn send_line(&mut self, text: &str) -> Result<(), TransportError> {
            self.sent.borrow_mut().push(text.to_string());
            Err(TransportError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "peer reset",
            )))
        }

        fn read_line(&mut self) -> Result<String, TransportError> {
            Err(TransportError::ConnectionClosed)
        }
    }

    impl Connector for BrokenPipeConnector {
        type Transport = BrokenPipeTransport;

        fn connect(&self, _endpoint: &Endpoint) -> Result<BrokenPipeTransport, TransportError> {
            Ok(BrokenPipeTransport {
                sent: self.sent.clone(),
            })
        }
    }

    #[test]
    fn test_set_relay_write_failure_ends_attempts() {
        let link = DeviceLink::new(
            BrokenPipeConnector::default(),
            RetryPolicy {
                attempts: 3,
                backoff: Duration::from_secs(2),
            },
        )
        .with_sleeper(CountingSleeper::default());

        let outcome = link.set_relay(&device("10.0.0.1", 1), 0, RelayMode::On);

        assert_eq!(outcome, SetOutcome::NotAcknowledged);
        assert_eq!(*link.connector().sent.borrow(), vec!["releu0ON", "close"]);
        assert_eq!(link.sleeper.calls(), 1);
    }

    #[test]
    fn test_set_relay_device_down() {
        let link = link(MockConnector::new().with_down("10.0.0.9"), 2);
        assert_eq!(
            link.set_relay(&device("10.0.0.9", 1), 0, RelayMode::On),
            SetOutcome::NotAcknowledged
        );
        assert_eq!(link.sleeper.calls(), 0);
    }
}
