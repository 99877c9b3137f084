//! Status report parsing.
//!
//! The `data` command returns one flat line of entries separated by `&&`:
//!
//! ```text
//! R:1:0=1&&R:1:1=0&&T:1:0=21.5
//! │ │ │ └ value
//! │ │ └── slot index
//! │ └──── zone (room) index
//! └────── category: R = relay state, T = temperature
//! ```
//!
//! Parsing is all-or-nothing: one bad entry discards the whole report.

use std::collections::BTreeMap;
use std::fmt;

use log::warn;

use crate::error::{ProtocolError, ProtocolResult};
use crate::mode::RelayMode;

/// Separator between entries of a status report.
pub const ENTRY_SEPARATOR: &str = "&&";

/// Kind of reading an entry carries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Relay state (`R`), value 0 or 1.
    Relay,
    /// Temperature reading (`T`), any float.
    Temperature,
    /// A category tag this crate does not know about.
    Other(String),
}

impl Category {
    /// Parse a category tag.
    pub fn from_tag(tag: &str) -> Category {
        match tag {
            "R" => Category::Relay,
            "T" => Category::Temperature,
            other => Category::Other(other.to_string()),
        }
    }

    /// Get the tag used on the wire.
    pub fn tag(&self) -> &str {
        match self {
            Category::Relay => "R",
            Category::Temperature => "T",
            Category::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Slot index → value.
pub type SlotMap = BTreeMap<u32, f64>;

/// Zone index → slots.
pub type ZoneMap = BTreeMap<u32, SlotMap>;

/// A parsed status report.
///
/// Every category present has at least one zone and every zone at least one
/// slot. A report is never modified after decoding; each query produces a new
/// one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceStatus {
    entries: BTreeMap<Category, ZoneMap>,
}

impl DeviceStatus {
    /// Parse a raw status line.
    pub fn decode(raw: &str) -> ProtocolResult<DeviceStatus> {
        let mut entries: BTreeMap<Category, ZoneMap> = BTreeMap::new();

        for entry in raw.split(ENTRY_SEPARATOR) {
            let (category, zone, slot, value) = parse_entry(entry).inspect_err(|e| {
                warn!("Could not extract status from {:?}: {}", raw, e);
            })?;

            entries
                .entry(category)
                .or_default()
                .entry(zone)
                .or_default()
                .insert(slot, value);
        }

        Ok(DeviceStatus { entries })
    }

    /// Categories present in the report.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.entries.keys()
    }

    /// All zones of a category.
    pub fn zones(&self, category: &Category) -> Option<&ZoneMap> {
        self.entries.get(category)
    }

    /// All slots of one zone of a category.
    pub fn slots(&self, category: &Category, zone: u32) -> Option<&SlotMap> {
        self.entries.get(category)?.get(&zone)
    }

    /// A single value.
    pub fn get(&self, category: &Category, zone: u32, slot: u32) -> Option<f64> {
        self.slots(category, zone)?.get(&slot).copied()
    }

    /// The lowest zone index present for a category.
    ///
    /// Boards serve a single zone, so this is "the" zone of the device.
    pub fn first_zone(&self, category: &Category) -> Option<u32> {
        self.entries.get(category)?.keys().next().copied()
    }

    /// Relay states of one zone, validated to {0, 1}.
    pub fn relay_states(&self, zone: u32) -> ProtocolResult<BTreeMap<u32, RelayMode>> {
        let Some(slots) = self.slots(&Category::Relay, zone) else {
            return Ok(BTreeMap::new());
        };
        slots
            .iter()
            .map(|(&slot, &value)| Ok((slot, RelayMode::from_value(value)?)))
            .collect()
    }

    /// True if nothing was decoded (never the case for a successful decode).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse one `category:zone:slot=value` entry.
fn parse_entry(entry: &str) -> ProtocolResult<(Category, u32, u32, f64)> {
    let malformed = |reason: &str| ProtocolError::MalformedPayload {
        entry: entry.to_string(),
        reason: reason.to_string(),
    };

    let entry_trimmed = entry.trim();
    let (specifiers, value) = entry_trimmed
        .split_once('=')
        .ok_or_else(|| malformed("missing '='"))?;
    if value.contains('=') {
        return Err(malformed("more than one '='"));
    }

    let parts: Vec<&str> = specifiers.split(':').collect();
    if parts.len() != 3 {
        return Err(malformed(&format!(
            "expected category:zone:slot, got {} parts",
            parts.len()
        )));
    }
    if parts[0].is_empty() {
        return Err(malformed("empty category"));
    }

    let zone: u32 = parts[1]
        .trim()
        .parse()
        .map_err(|_| malformed(&format!("invalid zone index {:?}", parts[1])))?;
    let slot: u32 = parts[2]
        .trim()
        .parse()
        .map_err(|_| malformed(&format!("invalid slot index {:?}", parts[2])))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| malformed(&format!("invalid value {:?}", value)))?;

    Ok((Category::from_tag(parts[0].trim()), zone, slot, value))
}
