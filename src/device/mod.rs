//! Devices found on a port and the operations they support.

pub mod ascii;
pub use ascii::AsciiDevice;

pub mod binary;
pub use binary::BinaryDevice;

pub mod io;
pub use io::{AsciiIoPort, BinaryIoPort, IoCounts, IoPort};

pub mod meta;
pub use meta::FirmwareVersion;

use std::time::Duration;

use crate::errors::{Result, ValidationError};
use crate::io::ByteStream;
use crate::units::{MotionType, UnitConverter};

/// What discovery learned about a device or one of its axes.
///
/// # Members
///
/// * `address` - The device's address on the chain
/// * `axis` - The axis number, 0 for the device as a whole
/// * `device_id` - The numeric device type
/// * `peripheral_id` - The numeric peripheral type, 0 for none or integrated
/// * `name` - The display name from the catalog
/// * `is_axis` - Whether this entity moves on its own
/// * `firmware` - The firmware version of the device
/// * `motion_type` - What kind of motion the axis performs
/// * `units` - The unit converter, present when the motion type has physical units
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub address: u8,
    pub axis: u8,
    pub device_id: u32,
    pub peripheral_id: u32,
    pub name: String,
    pub is_axis: bool,
    pub firmware: FirmwareVersion,
    pub motion_type: MotionType,
    pub units: Option<UnitConverter>,
}

/// The argument of a move: one value, or one value per axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Amount {
    Single(i64),
    PerAxis(Vec<i64>),
}

impl Amount {
    /// Spreads the amount over `axes` axes.
    fn per_axis(self, axes: usize) -> std::result::Result<Vec<i64>, ValidationError> {
        let values = match self {
            Amount::Single(value) => vec![value],
            Amount::PerAxis(values) => values,
        };
        if values.len() != axes {
            return Err(ValidationError::AxisCountMismatch {
                expected: axes,
                found: values.len(),
            });
        }
        Ok(values)
    }

    /// The one value of a move aimed at a single axis.
    fn single(self) -> std::result::Result<i64, ValidationError> {
        Ok(self.per_axis(1)?[0])
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount::Single(value)
    }
}

impl From<i32> for Amount {
    fn from(value: i32) -> Self {
        Amount::Single(value as i64)
    }
}

impl From<Vec<i64>> for Amount {
    fn from(values: Vec<i64>) -> Self {
        Amount::PerAxis(values)
    }
}

impl From<&[i64]> for Amount {
    fn from(values: &[i64]) -> Self {
        Amount::PerAxis(values.to_vec())
    }
}

impl<const N: usize> From<[i64; N]> for Amount {
    fn from(values: [i64; N]) -> Self {
        Amount::PerAxis(values.to_vec())
    }
}

/// How [`Motion::wait_for_idle`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// The device is not an axis, so there was nothing to wait for.
    NotApplicable,
    Idle,
    /// The axis is parked and will not move until unparked.
    Parked,
    /// The axis was pushed off its position or stalled.
    Stalled,
}

/// The motion operations both protocols provide.
///
/// Over the text protocol a command returns as soon as the device accepts it
/// and the axis may still be moving. Over the binary protocol the device only
/// replies once the motion is over, so these calls block until then, or until
/// the device's motion timeout runs out with [`crate::Error::NoReply`].
pub trait Motion {
    fn info(&self) -> &DeviceInfo;

    fn home(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Moves to an absolute position in native units.
    ///
    /// A device with several axes needs one value per axis. The moves are
    /// issued in axis order and the first rejection ends the sequence; axes
    /// that already started keep moving.
    fn move_absolute(&self, position: impl Into<Amount>) -> Result<()>;

    fn move_relative(&self, distance: impl Into<Amount>) -> Result<()>;

    fn move_at_velocity(&self, velocity: impl Into<Amount>) -> Result<()>;

    /// Moves to a numbered index position.
    fn move_indexed(&self, index: impl Into<Amount>) -> Result<()>;

    /// Polls until the axis stops moving.
    ///
    /// A rejected poll, or a text reply carrying a fault flag, ends the wait
    /// with [`crate::Error::Device`].
    ///
    /// There is no timeout. A device that never settles keeps this looping,
    /// so callers that need a bound must enforce one themselves.
    fn wait_for_idle(&self, poll_interval: Duration) -> Result<IdleOutcome>;

    /// The travel range in native units, `None` for devices that are not axes.
    fn get_range(&self) -> Result<Option<(i64, i64)>>;

    /// How many index positions fit in the travel range; 0 when indexed moves
    /// are not supported.
    fn get_num_indices(&self) -> Result<u32>;
}

/// Treats a device rejection as "not available".
pub(crate) fn unless_rejected<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_device_fault() => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn indices_in_range(range: Option<(i64, i64)>, distance: i64) -> u32 {
    match range {
        Some((min, max)) if distance > 0 && max > min => ((max - min) / distance) as u32,
        _ => 0,
    }
}

pub(crate) fn clamp_rotary(max: i64, motion_type: MotionType, units: Option<&UnitConverter>) -> i64 {
    match (motion_type, units) {
        (MotionType::Rotary, Some(units)) => max.min(units.position_to_native(crate::units::DEGREES_PER_REVOLUTION)),
        _ => max,
    }
}

/// Names a setting in whichever form the device's protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingId<'a> {
    /// A setting name such as `maxspeed`.
    Ascii(&'a str),
    /// A binary setting command number, such as 42 for the target speed.
    Binary(u8),
}

impl<'a> From<&'a str> for SettingId<'a> {
    fn from(name: &'a str) -> Self {
        SettingId::Ascii(name)
    }
}

impl From<u8> for SettingId<'_> {
    fn from(command: u8) -> Self {
        SettingId::Binary(command)
    }
}

/// A discovered device speaking either protocol.
pub enum Device<S> {
    Ascii(AsciiDevice<S>),
    Binary(BinaryDevice<S>),
}

impl<S: ByteStream> Device<S> {
    /// Reads a setting.
    pub fn get<'a>(&self, setting: impl Into<SettingId<'a>>) -> Result<f64> {
        match (self, setting.into()) {
            (Device::Ascii(device), SettingId::Ascii(name)) => device.get(name),
            (Device::Binary(device), SettingId::Binary(command)) => Ok(device.get(command)? as f64),
            (Device::Ascii(_), _) => Err(ValidationError::WrongProtocol("text").into()),
            (Device::Binary(_), _) => Err(ValidationError::WrongProtocol("binary").into()),
        }
    }

    /// Writes a setting. Binary values are rounded to the nearest integer.
    pub fn set<'a>(&self, setting: impl Into<SettingId<'a>>, value: f64) -> Result<()> {
        match (self, setting.into()) {
            (Device::Ascii(device), SettingId::Ascii(name)) => device.set(name, value),
            (Device::Binary(device), SettingId::Binary(command)) => {
                device.set(command, value.round() as i64)?;
                Ok(())
            }
            (Device::Ascii(_), _) => Err(ValidationError::WrongProtocol("text").into()),
            (Device::Binary(_), _) => Err(ValidationError::WrongProtocol("binary").into()),
        }
    }

    /// The device's I/O channels, if it has any.
    pub fn io(&self) -> Option<&dyn IoPort> {
        match self {
            Device::Ascii(device) => device.io().map(|io| io as &dyn IoPort),
            Device::Binary(device) => device.io().map(|io| io as &dyn IoPort),
        }
    }

    /// Sets how long motion commands wait for their reply. Only binary
    /// devices wait; text devices answer as soon as a move starts.
    pub fn set_motion_timeout(&mut self, timeout: Duration) {
        if let Device::Binary(device) = self {
            device.set_motion_timeout(timeout);
        }
    }

    /// The axes of a multi-axis controller. Binary devices have none.
    pub fn axes(&self) -> &[AsciiDevice<S>] {
        match self {
            Device::Ascii(device) => device.axes(),
            Device::Binary(_) => &[],
        }
    }

    pub fn as_ascii(&self) -> Option<&AsciiDevice<S>> {
        match self {
            Device::Ascii(device) => Some(device),
            Device::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&BinaryDevice<S>> {
        match self {
            Device::Binary(device) => Some(device),
            Device::Ascii(_) => None,
        }
    }
}

impl<S: ByteStream> Motion for Device<S> {
    fn info(&self) -> &DeviceInfo {
        match self {
            Device::Ascii(device) => device.info(),
            Device::Binary(device) => device.info(),
        }
    }

    fn home(&self) -> Result<()> {
        match self {
            Device::Ascii(device) => device.home(),
            Device::Binary(device) => device.home(),
        }
    }

    fn stop(&self) -> Result<()> {
        match self {
            Device::Ascii(device) => device.stop(),
            Device::Binary(device) => device.stop(),
        }
    }

    fn move_absolute(&self, position: impl Into<Amount>) -> Result<()> {
        match self {
            Device::Ascii(device) => device.move_absolute(position),
            Device::Binary(device) => device.move_absolute(position),
        }
    }

    fn move_relative(&self, distance: impl Into<Amount>) -> Result<()> {
        match self {
            Device::Ascii(device) => device.move_relative(distance),
            Device::Binary(device) => device.move_relative(distance),
        }
    }

    fn move_at_velocity(&self, velocity: impl Into<Amount>) -> Result<()> {
        match self {
            Device::Ascii(device) => device.move_at_velocity(velocity),
            Device::Binary(device) => device.move_at_velocity(velocity),
        }
    }

    fn move_indexed(&self, index: impl Into<Amount>) -> Result<()> {
        match self {
            Device::Ascii(device) => device.move_indexed(index),
            Device::Binary(device) => device.move_indexed(index),
        }
    }

    fn wait_for_idle(&self, poll_interval: Duration) -> Result<IdleOutcome> {
        match self {
            Device::Ascii(device) => device.wait_for_idle(poll_interval),
            Device::Binary(device) => device.wait_for_idle(poll_interval),
        }
    }

    fn get_range(&self) -> Result<Option<(i64, i64)>> {
        match self {
            Device::Ascii(device) => device.get_range(),
            Device::Binary(device) => device.get_range(),
        }
    }

    fn get_num_indices(&self) -> Result<u32> {
        match self {
            Device::Ascii(device) => device.get_num_indices(),
            Device::Binary(device) => device.get_num_indices(),
        }
    }
}
