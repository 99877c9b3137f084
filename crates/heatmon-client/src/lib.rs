//! Heating controller client.
//!
//! Blocking, strictly sequential client for the relay/temperature boards
//! spoken to through [`heatmon_protocol`]. Every operation opens its own TCP
//! connection and closes it before returning; nothing is shared between
//! operations and nothing runs concurrently.
//!
//! The layers, bottom up:
//!
//! - [`transport`]: newline-framed exchange over one stream socket
//! - [`link`]: the `data` / `releu` commands with acknowledgment and retry
//! - [`room`]: per-device view (probe, status, bulk relay changes, rendering)
//! - [`snapshot`]: fleet-wide capture and restore of relay configuration
//! - [`config`]: the fleet file and its resolved, read-only runtime form
//!
//! # Example
//!
//! ```no_run
//! use heatmon_client::{DeviceLink, Fleet, FleetConfig, RelayMode, Room};
//!
//! let fleet: Fleet = FleetConfig::from_file("fleet.yaml")?.resolve()?;
//! let link = DeviceLink::for_fleet(&fleet);
//!
//! for device in fleet.devices() {
//!     let room = Room::new(&link, device, fleet.exclusions(device.id));
//!     let outcome = room.set_all(RelayMode::Off)?;
//!     println!("{}: {} relays failed", device.name, outcome.failed_count());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod link;
pub mod room;
pub mod snapshot;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{DeviceEntry, ExclusionSet, Fleet, FleetConfig, FleetDefaults};
pub use error::{ClientError, ClientResult, ConfigError, SnapshotError};
pub use link::{AckMatch, DeviceLink, RetryPolicy, SetOutcome, Sleeper, ThreadSleeper};
pub use room::{render_status, BulkOutcome, Device, Reachability, Room};
pub use snapshot::{capture, restore, ConfigSnapshot, RestoreReport};
pub use transport::{Connector, Endpoint, FramedStream, LineTransport, TcpConnector, TransportError};

pub use heatmon_protocol::{Category, DeviceStatus, ProtocolError, RelayMode};
