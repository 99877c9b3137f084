//! In-memory boards for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use crate::link::Sleeper;
use crate::room::Device;
use crate::transport::{Connector, Endpoint, LineTransport, TransportError};

pub(crate) const TEST_PORT: u16 = 3300;

/// Maps a received line to the board's reply; `None` means no reply (the
/// read times out).
type Responder = Rc<dyn Fn(&str) -> Option<String>>;

#[derive(Default)]
struct MockLog {
    connects: Vec<String>,
    sent: Vec<(String, String)>,
}

/// Connector to a set of scripted boards keyed by address.
#[derive(Default)]
pub(crate) struct MockConnector {
    boards: HashMap<String, Responder>,
    down: HashSet<String>,
    log: Rc<RefCell<MockLog>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_board(
        mut self,
        address: &str,
        responder: impl Fn(&str) -> Option<String> + 'static,
    ) -> Self {
        self.boards.insert(address.to_string(), Rc::new(responder));
        self
    }

    pub(crate) fn with_down(mut self, address: &str) -> Self {
        self.down.insert(address.to_string());
        self
    }

    pub(crate) fn connects_to(&self, address: &str) -> usize {
        self.log.borrow().connects.iter().filter(|a| *a == address).count()
    }

    pub(crate) fn sent_to(&self, address: &str) -> Vec<String> {
        self.log
            .borrow()
            .sent
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, line)| line.clone())
            .collect()
    }

    fn is_up(&self, address: &str) -> bool {
        !self.down.contains(address) && self.boards.contains_key(address)
    }
}

pub(crate) struct MockTransport {
    address: String,
    responder: Responder,
    pending: VecDeque<String>,
    log: Rc<RefCell<MockLog>>,
}

impl LineTransport for MockTransport {
    fn send_line(&mut self, text: &str) -> Result<(), TransportError> {
        self.log
            .borrow_mut()
            .sent
            .push((self.address.clone(), text.to_string()));
        if let Some(reply) = (*self.responder)(text) {
            self.pending.push_back(reply);
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        self.pending.pop_front().ok_or(TransportError::Timeout)
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(&self, endpoint: &Endpoint) -> Result<MockTransport, TransportError> {
        let responder = match self.boards.get(&endpoint.address) {
            Some(responder) if self.is_up(&endpoint.address) => responder.clone(),
            _ => {
                return Err(TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "board down"),
                })
            }
        };
        self.log.borrow_mut().connects.push(endpoint.address.clone());
        Ok(MockTransport {
            address: endpoint.address.clone(),
            responder,
            pending: VecDeque::new(),
            log: self.log.clone(),
        })
    }

    fn probe(&self, endpoint: &Endpoint) -> bool {
        self.is_up(&endpoint.address)
    }
}

/// A board that reports a fixed status and echoes every relay command.
pub(crate) fn relay_board(status: &str) -> impl Fn(&str) -> Option<String> + 'static {
    let status = status.to_string();
    move |line: &str| match line {
        "data" => Some(status.clone()),
        "close" => None,
        other => Some(other.to_string()),
    }
}

/// A board whose relays actually change when commanded.
pub(crate) struct SimBoard {
    zone: u32,
    relays: RefCell<BTreeMap<u32, u8>>,
    refuse: HashSet<u32>,
}

impl SimBoard {
    pub(crate) fn new(zone: u32, relays: &[(u32, u8)]) -> Rc<SimBoard> {
        Self::refusing(zone, relays, &[])
    }

    /// A board that never acknowledges the given slots.
    pub(crate) fn refusing(zone: u32, relays: &[(u32, u8)], refuse: &[u32]) -> Rc<SimBoard> {
        Rc::new(SimBoard {
            zone,
            relays: RefCell::new(relays.iter().copied().collect()),
            refuse: refuse.iter().copied().collect(),
        })
    }

    pub(crate) fn relay(&self, slot: u32) -> Option<u8> {
        self.relays.borrow().get(&slot).copied()
    }

    pub(crate) fn responder(self: &Rc<Self>) -> impl Fn(&str) -> Option<String> + 'static {
        let board = self.clone();
        move |line: &str| board.handle(line)
    }

    fn handle(&self, line: &str) -> Option<String> {
        if line == "data" {
            let mut entries: Vec<String> = self
                .relays
                .borrow()
                .iter()
                .map(|(slot, value)| format!("R:{}:{}={}", self.zone, slot, value))
                .collect();
            entries.push(format!("T:{}:0=21.5", self.zone));
            return Some(entries.join("&&"));
        }

        let rest = line.strip_prefix("releu")?;
        let (slot, value) = if let Some(slot) = rest.strip_suffix("OFF") {
            (slot, 0)
        } else {
            (rest.strip_suffix("ON")?, 1)
        };
        let slot: u32 = slot.parse().ok()?;
        if self.refuse.contains(&slot) {
            return None;
        }
        self.relays.borrow_mut().insert(slot, value);
        Some(line.to_string())
    }
}

/// Records backoffs instead of sleeping.
#[derive(Debug, Default)]
pub(crate) struct CountingSleeper {
    calls: Cell<u32>,
    total: Cell<Duration>,
}

impl CountingSleeper {
    pub(crate) fn calls(&self) -> u32 {
        self.calls.get()
    }

    pub(crate) fn total(&self) -> Duration {
        self.total.get()
    }
}

impl Sleeper for CountingSleeper {
    fn sleep(&self, duration: Duration) {
        self.calls.set(self.calls.get() + 1);
        self.total.set(self.total.get() + duration);
    }
}

pub(crate) fn device(address: &str, id: u32) -> Device {
    Device::new(format!("board-{id}"), Endpoint::new(address, TEST_PORT), id)
}
