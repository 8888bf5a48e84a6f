//! Client for daisy-chained motion controllers speaking the Zaber text
//! ("ASCII") or binary serial protocols.
//!
//! Detect which protocol a port speaks, enumerate the devices on it, then
//! drive them through the [`device::Motion`] and [`device::IoPort`] traits:
//!
//! ```no_run
//! use std::time::Duration;
//! use zaber_serial::{catalog::TableCatalog, device::Motion, protocol::Protocol, serial};
//!
//! # fn main() -> zaber_serial::errors::Result<()> {
//! let stream = serial::open_port("/dev/ttyUSB0", 115200, Duration::from_millis(500))?;
//! if let Some(protocol) = Protocol::detect(stream)? {
//!     for device in protocol.enumerate_devices(&TableCatalog::default())? {
//!         device.home()?;
//!         device.wait_for_idle(Duration::from_millis(100))?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod device;
pub mod errors;
pub mod io;
pub mod message;
pub mod protocol;
pub mod serial;
pub mod units;

pub use device::{Device, Motion};
pub use errors::{Error, Result};
pub use protocol::Protocol;
