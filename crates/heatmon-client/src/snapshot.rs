//! Fleet-wide relay configuration snapshots.
//!
//! A snapshot maps device id → relay slot → relay value (0 or 1). It is
//! captured from live boards all-or-nothing and replayed onto them relay by
//! relay.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use heatmon_protocol::{Category, RelayMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ExclusionSet;
use crate::error::{ClientError, ClientResult, SnapshotError};
use crate::link::{DeviceLink, Sleeper};
use crate::room::{Device, Room};
use crate::transport::Connector;

/// File name used when the fleet file does not name one.
pub const DEFAULT_SNAPSHOT_PATH: &str = "config_monitor.json";

/// Relay slot → relay value.
pub type RelayValues = BTreeMap<u32, u8>;

/// Relay configuration of a set of devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When the boards were queried.
    pub captured_at: DateTime<Utc>,
    /// Device id → relay values.
    pub relays: BTreeMap<u32, RelayValues>,
}

impl ConfigSnapshot {
    pub fn new(relays: BTreeMap<u32, RelayValues>) -> Self {
        ConfigSnapshot {
            captured_at: Utc::now(),
            relays,
        }
    }

    /// Relay values recorded for one device.
    pub fn device(&self, id: u32) -> Option<&RelayValues> {
        self.relays.get(&id)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<ConfigSnapshot, SnapshotError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Write the snapshot to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Saved relay configuration of {} devices to {}", self.relays.len(), path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<ConfigSnapshot, SnapshotError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

/// What a restore did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Relay commands that were acknowledged.
    pub applied: usize,
    /// `(device id, slot)` pairs that could not be set.
    pub failed: Vec<(u32, u32)>,
    /// Devices with no entry in the snapshot, left untouched.
    pub skipped_devices: Vec<u32>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Query every device and record its relay states.
///
/// Devices are visited in order. The first device that is down or returns an
/// unusable report aborts the capture; no partial snapshot is returned.
pub fn capture<C: Connector, S: Sleeper>(
    link: &DeviceLink<C, S>,
    devices: &[Device],
) -> Result<ConfigSnapshot, SnapshotError> {
    let no_exclusions = ExclusionSet::default();
    let mut relays = BTreeMap::new();

    for device in devices {
        let room = Room::new(link, device, &no_exclusions);
        let values = capture_device(&room).map_err(|source| {
            warn!("Capture failed at {}: {}", device.name, source);
            SnapshotError::Capture {
                device: device.name.clone(),
                source,
            }
        })?;
        debug!("{}: captured {} relays", device.name, values.len());
        relays.insert(device.id, values);
    }

    Ok(ConfigSnapshot::new(relays))
}

fn capture_device<C: Connector, S: Sleeper>(room: &Room<'_, C, S>) -> ClientResult<RelayValues> {
    let status = room.status()?;
    let zone = status
        .first_zone(&Category::Relay)
        .ok_or_else(|| ClientError::NoRelayZone {
            device: room.device().name.clone(),
        })?;

    Ok(status
        .relay_states(zone)?
        .into_iter()
        .map(|(slot, mode)| (slot, mode.to_int()))
        .collect())
}

/// Replay a snapshot onto the devices that appear in it.
///
/// Every stored relay is set individually. A relay that does not acknowledge
/// is recorded as failed and not retried beyond the link's own attempts.
pub fn restore<C: Connector, S: Sleeper>(
    link: &DeviceLink<C, S>,
    devices: &[Device],
    snapshot: &ConfigSnapshot,
) -> RestoreReport {
    let no_exclusions = ExclusionSet::default();
    let mut report = RestoreReport::default();

    for id in snapshot.relays.keys() {
        if !devices.iter().any(|d| d.id == *id) {
            warn!("Snapshot entry for unknown device {} ignored", id);
        }
    }

    for device in devices {
        let Some(values) = snapshot.device(device.id) else {
            debug!("{}: not in snapshot, left untouched", device.name);
            report.skipped_devices.push(device.id);
            continue;
        };

        let room = Room::new(link, device, &no_exclusions);
        for (&slot, &value) in values {
            let mode = match RelayMode::from_int(value as i64) {
                Ok(mode) => mode,
                Err(e) => {
                    warn!("{}: stored value for relay {} rejected: {}", device.name, slot, e);
                    report.failed.push((device.id, slot));
                    continue;
                }
            };

            if room.set_one(slot, mode).is_acknowledged() {
                report.applied += 1;
            } else {
                warn!("{}: relay {} was not restored to {}", device.name, slot, mode);
                report.failed.push((device.id, slot));
            }
        }
    }

    report
}
