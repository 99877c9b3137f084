//! Per-device view.
//!
//! A [`Room`] bundles one board with the link used to reach it and the slots
//! that bulk operations must never touch.

use heatmon_protocol::{Category, DeviceStatus, RelayMode};
use tracing::{debug, info, warn};

use crate::config::ExclusionSet;
use crate::error::{ClientError, ClientResult};
use crate::link::{DeviceLink, SetOutcome, Sleeper, ThreadSleeper};
use crate::transport::{Connector, Endpoint};

/// Identity of one board. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Human-readable name.
    pub name: String,
    /// Where the board listens.
    pub endpoint: Endpoint,
    /// Small integer identifier, used as the key in snapshots.
    pub id: u32,
}

impl Device {
    pub fn new(name: impl Into<String>, endpoint: Endpoint, id: u32) -> Self {
        Device {
            name: name.into(),
            endpoint,
            id,
        }
    }
}

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

/// Result of driving every relay of a board to one mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Target mode.
    pub mode: RelayMode,
    /// Slots a relay command was sent for.
    pub attempted: Vec<u32>,
    /// Slots that did not acknowledge.
    pub failed: Vec<u32>,
    /// Excluded slots that were left alone.
    pub skipped: Vec<u32>,
}

impl BulkOutcome {
    /// Number of slots that failed to reach the target mode.
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True if every non-excluded relay is now at the target mode.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Operations on a single board.
pub struct Room<'a, C, S = ThreadSleeper> {
    link: &'a DeviceLink<C, S>,
    device: &'a Device,
    exclusions: &'a ExclusionSet,
}

impl<'a, C: Connector, S: Sleeper> Room<'a, C, S> {
    pub fn new(link: &'a DeviceLink<C, S>, device: &'a Device, exclusions: &'a ExclusionSet) -> Self {
        Room {
            link,
            device,
            exclusions,
        }
    }

    pub fn device(&self) -> &Device {
        self.device
    }

    /// Cheap liveness check; nothing is exchanged.
    pub fn probe(&self) -> Reachability {
        if self.link.probe(self.device) {
            info!("{} is up.", self.device.name);
            Reachability::Reachable
        } else {
            info!("{} is down. Connection test failed.", self.device.name);
            Reachability::Unreachable
        }
    }

    /// Probe, then query and decode the status report.
    pub fn status(&self) -> ClientResult<DeviceStatus> {
        if self.probe() == Reachability::Unreachable {
            return Err(ClientError::Unreachable {
                device: self.device.name.clone(),
            });
        }
        self.fetch_status()
    }

    fn fetch_status(&self) -> ClientResult<DeviceStatus> {
        let raw = self.link.query_status(self.device)?;
        Ok(DeviceStatus::decode(&raw)?)
    }

    /// Drive every relay of the board to `mode`.
    ///
    /// Relays already at `mode` and excluded slots are left alone. Individual
    /// failures are collected, not fatal; only a missing or unusable status
    /// report aborts the operation.
    pub fn set_all(&self, mode: RelayMode) -> ClientResult<BulkOutcome> {
        let status = self.fetch_status()?;
        let zone = status
            .first_zone(&Category::Relay)
            .ok_or_else(|| ClientError::NoRelayZone {
                device: self.device.name.clone(),
            })?;
        debug!("{}: room index {}", self.device.name, zone);

        let mut outcome = BulkOutcome {
            mode,
            attempted: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        };

        for (&slot, &value) in status.slots(&Category::Relay, zone).into_iter().flatten() {
            if self.exclusions.contains(slot) {
                debug!("{}: slot {} is excluded", self.device.name, slot);
                outcome.skipped.push(slot);
                continue;
            }
            // Values outside {0, 1} never match, so the relay gets driven
            if RelayMode::from_value(value).ok() == Some(mode) {
                continue;
            }

            outcome.attempted.push(slot);
            if self.link.set_relay(self.device, slot, mode) == SetOutcome::NotAcknowledged {
                warn!("{}: relay {} was not set to {}", self.device.name, slot, mode);
                outcome.failed.push(slot);
            }
        }

        Ok(outcome)
    }

    pub fn turn_all_on(&self) -> ClientResult<BulkOutcome> {
        self.set_all(RelayMode::On)
    }

    pub fn turn_all_off(&self) -> ClientResult<BulkOutcome> {
        self.set_all(RelayMode::Off)
    }

    /// Set one relay without looking at its current value.
    pub fn set_one(&self, slot: u32, mode: RelayMode) -> SetOutcome {
        self.link.set_relay(self.device, slot, mode)
    }
}

/// Render a status report for the console.
///
/// ```text
/// Status of Beci
/// Room index: 1
/// R0 is ON; R1 is OFF
/// T0 is 21.5
/// ```
pub fn render_status(device: &Device, status: &DeviceStatus) -> String {
    let mut out = format!("Status of {}\n", device.name);

    let zone = status
        .first_zone(&Category::Relay)
        .or_else(|| status.first_zone(&Category::Temperature));
    let Some(zone) = zone else {
        out.push_str("No room data.\n");
        return out;
    };
    out.push_str(&format!("Room index: {}\n", zone));

    if let Some(relays) = status.slots(&Category::Relay, zone) {
        let line: Vec<String> = relays
            .iter()
            .map(|(slot, &value)| match RelayMode::from_value(value) {
                Ok(mode) => format!("R{} is {}", slot, mode),
                Err(_) => format!("R{} is invalid ({})", slot, value),
            })
            .collect();
        out.push_str(&line.join("; "));
        out.push('\n');
    }

    if let Some(temps) = status.slots(&Category::Temperature, zone) {
        let line: Vec<String> = temps
            .iter()
            .map(|(slot, value)| format!("T{} is {}", slot, value))
            .collect();
        out.push_str(&line.join("; "));
        out.push('\n');
    }

    out
}
