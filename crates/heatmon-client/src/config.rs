//! Fleet configuration.
//!
//! The fleet file lists every managed board plus protocol defaults. It is read
//! once at startup and turned into a [`Fleet`], which is read-only from then on.
//!
//! ```yaml
//! defaults:
//!   port: 3300
//!   timeout_ms: 2000
//!   attempts: 2
//!   backoff_ms: 2000
//!   ack: exact
//! snapshot_path: config_monitor.json
//! devices:
//!   - name: Beci
//!     address: 192.168.2.204
//!     id: 2
//!   - name: Panou Scari
//!     address: 192.168.2.207
//!     id: 4
//!     excluded_slots: [5]
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult, ConfigError};
use crate::link::{AckMatch, RetryPolicy, DEFAULT_ATTEMPTS, DEFAULT_BACKOFF};
use crate::room::Device;
use crate::snapshot::DEFAULT_SNAPSHOT_PATH;
use crate::transport::{Endpoint, DEFAULT_TIMEOUT};

/// Port the boards listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 3300;

// ============================================================================
// File Format
// ============================================================================

/// Protocol settings shared by all devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetDefaults {
    /// TCP port for devices that do not set their own.
    pub port: u16,
    /// Connect/read/write timeout in milliseconds.
    pub timeout_ms: u64,
    /// Attempts per query or relay command.
    pub attempts: u32,
    /// Pause after an unacknowledged relay command, in milliseconds.
    pub backoff_ms: u64,
    /// Acknowledgment matching rule.
    pub ack: AckMatch,
}

impl Default for FleetDefaults {
    fn default() -> Self {
        FleetDefaults {
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            attempts: DEFAULT_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF.as_millis() as u64,
            ack: AckMatch::default(),
        }
    }
}

/// One board in the fleet file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub name: String,
    pub address: String,
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Slots that bulk operations must never touch (e.g. a wiring hazard).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_slots: Vec<u32>,
}

/// The fleet file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub defaults: FleetDefaults,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    pub devices: Vec<DeviceEntry>,
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from(DEFAULT_SNAPSHOT_PATH)
}

impl FleetConfig {
    /// Load and validate a fleet file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<FleetConfig, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate a fleet file from a string.
    pub fn from_yaml_str(text: &str) -> Result<FleetConfig, ConfigError> {
        let config: FleetConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check the invariants the runtime relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::Invalid("no devices configured".to_string()));
        }
        if self.defaults.attempts == 0 {
            return Err(ConfigError::Invalid("attempts must be at least 1".to_string()));
        }
        if self.defaults.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".to_string()));
        }

        let mut seen = HashSet::new();
        for entry in &self.devices {
            if !seen.insert(entry.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device id {} ({})",
                    entry.id, entry.name
                )));
            }
            if entry.address.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "device {} has no address",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    /// Validate and build the runtime form.
    pub fn resolve(self) -> Result<Fleet, ConfigError> {
        self.validate()?;

        let defaults = &self.defaults;
        let mut fleet = Fleet::from_devices(
            self.devices
                .iter()
                .map(|entry| {
                    Device::new(
                        entry.name.clone(),
                        Endpoint::new(entry.address.clone(), entry.port.unwrap_or(defaults.port)),
                        entry.id,
                    )
                })
                .collect(),
        )
        .with_timeout(Duration::from_millis(defaults.timeout_ms))
        .with_retry_policy(RetryPolicy {
            attempts: defaults.attempts,
            backoff: Duration::from_millis(defaults.backoff_ms),
        })
        .with_ack_match(defaults.ack)
        .with_snapshot_path(self.snapshot_path.clone());

        for entry in &self.devices {
            if !entry.excluded_slots.is_empty() {
                fleet = fleet.with_exclusions(
                    entry.id,
                    ExclusionSet::from_slots(entry.excluded_slots.iter().copied()),
                );
            }
        }
        Ok(fleet)
    }
}

// ============================================================================
// Runtime Form
// ============================================================================

/// Relay slots excluded from bulk operations on one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet(BTreeSet<u32>);

impl ExclusionSet {
    pub fn from_slots(slots: impl IntoIterator<Item = u32>) -> Self {
        ExclusionSet(slots.into_iter().collect())
    }

    pub fn contains(&self, slot: u32) -> bool {
        self.0.contains(&slot)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

/// The managed fleet, built once and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Fleet {
    devices: Vec<Device>,
    exclusions: BTreeMap<u32, ExclusionSet>,
    no_exclusions: ExclusionSet,
    timeout: Duration,
    retry: RetryPolicy,
    ack: AckMatch,
    snapshot_path: PathBuf,
}

impl Fleet {
    /// A fleet with default protocol settings and no exclusions.
    pub fn from_devices(devices: Vec<Device>) -> Self {
        Fleet {
            devices,
            exclusions: BTreeMap::new(),
            no_exclusions: ExclusionSet::default(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            ack: AckMatch::default(),
            snapshot_path: default_snapshot_path(),
        }
    }

    pub fn with_exclusions(mut self, device_id: u32, exclusions: ExclusionSet) -> Self {
        self.exclusions.insert(device_id, exclusions);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_ack_match(mut self, ack: AckMatch) -> Self {
        self.ack = ack;
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    /// Devices in configuration order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, id: u32) -> ClientResult<&Device> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .ok_or(ClientError::UnknownDevice(id))
    }

    /// Excluded slots for a device (empty if none are configured).
    pub fn exclusions(&self, device_id: u32) -> &ExclusionSet {
        self.exclusions.get(&device_id).unwrap_or(&self.no_exclusions)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn ack_match(&self) -> AckMatch {
        self.ack
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}
