//! Connection settings, loadable from a TOML file.
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! timeout_ms = 1000
//! catalog = "devices.toml"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::device::binary::DEFAULT_MOTION_TIMEOUT;
use crate::errors::LoadError;
use crate::serial::ASCII_BAUD_RATE;

/// How to reach a chain of devices.
///
/// # Members
///
/// * `port` - The serial port to open
/// * `baud_rate` - The line speed
/// * `timeout_ms` - How long a read waits before deciding nothing answered
/// * `poll_interval_ms` - The pause between status polls while waiting for idle
/// * `settle_ms` - How long protocol detection waits for stray replies to stop
/// * `motion_timeout_ms` - How long a binary motion command may go unanswered
/// * `catalog` - A TOML device table to name discovered devices with
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub port: Option<String>,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub settle_ms: u64,
    pub motion_timeout_ms: u64,
    pub catalog: Option<PathBuf>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            port: None,
            baud_rate: ASCII_BAUD_RATE,
            timeout_ms: 500,
            poll_interval_ms: 100,
            settle_ms: 100,
            motion_timeout_ms: DEFAULT_MOTION_TIMEOUT.as_millis() as u64,
            catalog: None,
        }
    }
}

impl ConnectionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, LoadError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn motion_timeout(&self) -> Duration {
        Duration::from_millis(self.motion_timeout_ms)
    }
}
