//! Heating Controller Line Protocol
//!
//! This crate provides types and utilities for talking to the relay/temperature
//! controller boards used by the heating monitor. The boards expose a tiny
//! plaintext protocol over a TCP stream: one newline-terminated request, one
//! newline-terminated response.
//!
//! # Protocol Overview
//!
//! - **Requests** (host → board): Text commands terminated with `\n`
//! - **Responses** (board → host): A single line terminated with `\n` (boards
//!   built on the Arduino `println` emit `\r\n`, which is accepted too)
//!
//! # Commands
//!
//! | Command | Response | Meaning |
//! |---|---|---|
//! | `data` | `type:zone:slot=value&&...` | full status report |
//! | `releu<slot><ON\|OFF>` | the same command text as acknowledgment | set one relay |
//! | `close` | none | hint that the session is over |
//!
//! # Example
//!
//! ```rust
//! use heatmon_protocol::{Category, Command, DeviceStatus, RelayMode};
//!
//! let cmd = Command::SetRelay { slot: 3, mode: RelayMode::On };
//! assert_eq!(cmd.to_command_string(), "releu3ON");
//!
//! let status = DeviceStatus::decode("R:1:0=1.0&&T:1:0=21.5")?;
//! assert_eq!(status.get(&Category::Temperature, 1, 0), Some(21.5));
//! # Ok::<(), heatmon_protocol::ProtocolError>(())
//! ```

mod codec;
mod commands;
mod error;
mod mode;
mod status;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use mode::*;
pub use status::*;
