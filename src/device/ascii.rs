//! Devices speaking the text protocol.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use tracing::{debug, warn};

use super::io::{AsciiIoPort, IoCounts};
use super::meta::FirmwareVersion;
use super::{clamp_rotary, indices_in_range, unless_rejected, Amount, DeviceInfo, IdleOutcome, Motion};
use crate::catalog::DeviceCatalog;
use crate::errors::{DecodeError, Error, Result};
use crate::io::ByteStream;
use crate::message::ascii::format_number;
use crate::message::{AsciiMessage, MessageType};
use crate::protocol::{AsciiPort, SharedPort};
use crate::units::{MotionType, UnitConverter};

/// Sends a message and waits for the next reply, whatever it says.
///
/// Alerts and info lines that arrive first are skipped.
pub(crate) fn exchange<S: ByteStream>(port: &SharedPort<AsciiPort<S>>, message: &AsciiMessage) -> Result<AsciiMessage> {
    let mut port = port.borrow_mut();
    port.send(message)?;

    loop {
        match port.receive(false)? {
            Some(reply) if reply.kind() == MessageType::Response => return Ok(reply),
            Some(other) => debug!(message = %other, "skipping unsolicited message"),
            None => return Err(Error::NoReply),
        }
    }
}

fn accepted(reply: AsciiMessage) -> Result<AsciiMessage> {
    match reply.fault() {
        Some(fault) => Err(Error::Device(fault)),
        None => Ok(reply),
    }
}

/// Sends a command and returns the reply. Rejections become [`Error::Device`].
pub(crate) fn query<S: ByteStream>(
    port: &SharedPort<AsciiPort<S>>,
    address: u8,
    axis: u8,
    command: &str,
) -> Result<AsciiMessage> {
    let request = AsciiMessage::request(address, axis, command)?;
    accepted(exchange(port, &request)?)
}

/// The first number in a reply.
pub(crate) fn first_number(reply: &AsciiMessage) -> Result<f64> {
    reply.data().first().copied().ok_or_else(|| {
        DecodeError::MissingFields {
            kind: "reply data",
            needed: 1,
            found: 0,
        }
        .into()
    })
}

/// Fills in the resolution of converters that depend on it.
///
/// A device that refuses the query keeps the converter as it is.
fn resolve_units<S: ByteStream>(
    port: &SharedPort<AsciiPort<S>>,
    address: u8,
    axis: u8,
    units: Option<UnitConverter>,
) -> Result<Option<UnitConverter>> {
    match units {
        Some(units) if units.is_resolution_dependent() => {
            match unless_rejected(query(port, address, axis, "get resolution"))? {
                Some(reply) => {
                    let resolution = first_number(&reply)?;
                    Ok(Some(units.with_resolution(resolution.max(1.0) as u32)))
                }
                None => {
                    warn!(address, axis, "resolution query rejected, keeping the default");
                    Ok(Some(units))
                }
            }
        }
        other => Ok(other),
    }
}

/// A device, or one axis of a device, on a text protocol chain.
///
/// A controller with peripherals holds one child per axis. The children share
/// the controller's port and address and differ only in axis number.
pub struct AsciiDevice<S> {
    port: SharedPort<AsciiPort<S>>,
    info: DeviceInfo,
    axes: Vec<AsciiDevice<S>>,
    io: Option<AsciiIoPort<S>>,
    flags: RefCell<String>,
    idle: Cell<Option<bool>>,
}

impl<S: ByteStream> AsciiDevice<S> {
    fn new(port: SharedPort<AsciiPort<S>>, info: DeviceInfo, axes: Vec<AsciiDevice<S>>, io: Option<AsciiIoPort<S>>) -> Self {
        AsciiDevice {
            port,
            info,
            axes,
            io,
            flags: RefCell::new(crate::message::ascii::NO_FLAGS.to_string()),
            idle: Cell::new(None),
        }
    }

    /// Asks every device on the chain for its type, then discovers each one
    /// that answered, in address order.
    pub fn enumerate(port: &SharedPort<AsciiPort<S>>, catalog: &dyn DeviceCatalog) -> Result<Vec<Self>> {
        let mut found: Vec<(u8, u32)> = Vec::new();

        {
            let mut port = port.borrow_mut();
            port.send(&AsciiMessage::request(0, 0, "get deviceid")?)?;

            // Keep reading until nobody has anything more to say
            loop {
                let reply = match port.receive(false) {
                    Ok(Some(reply)) => reply,
                    Ok(None) => break,
                    // Already logged by the port
                    Err(Error::Decode(_)) => continue,
                    Err(e) => return Err(e),
                };

                if reply.kind() != MessageType::Response {
                    continue;
                }
                if let Some(fault) = reply.fault() {
                    warn!(address = reply.address(), %fault, "device rejected the identity query");
                    continue;
                }
                match reply.data().first() {
                    Some(id) => found.push((reply.address(), *id as u32)),
                    None => warn!(address = reply.address(), "identity reply carried no device id"),
                }
            }
        }

        found.sort_by_key(|(address, _)| *address);
        found.dedup_by_key(|(address, _)| *address);

        let mut devices = Vec::with_capacity(found.len());
        for (address, device_id) in found {
            match Self::discover(port.clone(), address, Some(device_id), catalog) {
                Ok(device) => devices.push(device),
                Err(e) => warn!(address, error = %e, "skipping device that failed discovery"),
            }
        }
        Ok(devices)
    }

    /// Queries a device and builds its model.
    ///
    /// `device_id` skips the type query when the caller already knows it.
    pub fn discover(
        port: SharedPort<AsciiPort<S>>,
        address: u8,
        device_id: Option<u32>,
        catalog: &dyn DeviceCatalog,
    ) -> Result<Self> {
        // Get the device type
        let device_id = match device_id {
            Some(id) => id,
            None => query(&port, address, 0, "get deviceid")
                .and_then(|reply| first_number(&reply))
                .map_err(|e| Error::Discovery(format!("device {} did not report its type: {}", address, e)))?
                as u32,
        };
        let record = catalog.find_device(device_id);

        // Get the firmware version
        let version = query(&port, address, 0, "get version")?;
        let firmware = match FirmwareVersion::parse(version.data_text()) {
            Some(firmware) => firmware,
            None => {
                warn!(address, version = version.data_text(), "unreadable firmware version");
                FirmwareVersion::default()
            }
        };

        // Get the number of axes
        let axis_count = match unless_rejected(query(&port, address, 0, "get system.axiscount"))? {
            Some(reply) => first_number(&reply)? as u8,
            None => 0,
        };

        // Get what is plugged into each axis. One refusal drops them all.
        let mut peripheral_ids: Vec<u32> = Vec::with_capacity(axis_count as usize);
        for axis in 1..=axis_count {
            match unless_rejected(query(&port, address, axis, "get peripheral.id"))? {
                Some(reply) => peripheral_ids.push(first_number(&reply)? as u32),
                None => {
                    warn!(address, axis, "axis rejected the peripheral query, ignoring all axes");
                    peripheral_ids.clear();
                    break;
                }
            }
        }

        let mut axes = Vec::with_capacity(peripheral_ids.len());
        for (axis, peripheral_id) in (1..=axis_count).zip(peripheral_ids) {
            let peripheral = catalog.find_peripheral(&record, peripheral_id);
            let (motion_type, units) = catalog.motion_type_and_units(&record, &peripheral);
            let info = DeviceInfo {
                address,
                axis,
                device_id,
                peripheral_id,
                name: catalog.device_name(&record, Some(&peripheral)),
                is_axis: true,
                firmware,
                motion_type,
                units: resolve_units(&port, address, axis, units)?,
            };
            debug!(address, axis, peripheral_id, name = %info.name, "found axis");
            axes.push(AsciiDevice::new(port.clone(), info, Vec::new(), None));
        }

        let mut info = DeviceInfo {
            address,
            axis: 0,
            device_id,
            peripheral_id: 0,
            name: catalog.device_name(&record, None),
            is_axis: false,
            firmware,
            motion_type: MotionType::None,
            units: None,
        };

        // A device without axes may still move on its own
        if axis_count == 0 && unless_rejected(query(&port, address, 0, "get pos"))?.is_some() {
            let peripheral = catalog.find_peripheral(&record, 0);
            let (motion_type, units) = catalog.motion_type_and_units(&record, &peripheral);
            info.name = catalog.device_name(&record, Some(&peripheral));
            info.is_axis = true;
            info.motion_type = motion_type;
            info.units = resolve_units(&port, address, 0, units)?;
        }

        // Get the I/O channel counts
        let io = match unless_rejected(query(&port, address, 0, "io info"))? {
            Some(reply) if reply.data().len() >= 4 => {
                let counts = reply.data();
                Some(IoCounts {
                    analog_outputs: counts[0] as usize,
                    analog_inputs: counts[1] as usize,
                    digital_outputs: counts[2] as usize,
                    digital_inputs: counts[3] as usize,
                })
            }
            _ => None,
        }
        .filter(IoCounts::any)
        .map(|counts| AsciiIoPort::new(port.clone(), address, counts));

        debug!(address, device_id, %firmware, name = %info.name, axes = axes.len(), "discovered device");
        Ok(AsciiDevice::new(port, info, axes, io))
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// The axes of a multi-axis controller, in axis order.
    pub fn axes(&self) -> &[AsciiDevice<S>] {
        &self.axes
    }

    /// Returns axis `number`, counting from 1.
    pub fn axis(&self, number: u8) -> Option<&AsciiDevice<S>> {
        self.axes.iter().find(|axis| axis.info.axis == number)
    }

    pub fn io(&self) -> Option<&AsciiIoPort<S>> {
        self.io.as_ref()
    }

    pub fn port(&self) -> &SharedPort<AsciiPort<S>> {
        &self.port
    }

    /// Warning flags from the latest reply.
    pub fn warning_flags(&self) -> String {
        self.flags.borrow().clone()
    }

    /// The idle state from the latest reply, `None` before any exchange.
    pub fn last_known_idle(&self) -> Option<bool> {
        self.idle.get()
    }

    fn send(&self, message: &AsciiMessage) -> Result<AsciiMessage> {
        let reply = exchange(&self.port, message)?;
        self.flags.replace(reply.flags().to_string());
        self.idle.set(Some(reply.is_idle()));
        accepted(reply)
    }

    /// Sends a command to this device or axis and returns the accepted reply.
    pub fn command(&self, command: &str) -> Result<AsciiMessage> {
        let request = AsciiMessage::request(self.info.address, self.info.axis, command)?;
        self.send(&request)
    }

    /// Reads a numeric setting.
    pub fn get(&self, setting: &str) -> Result<f64> {
        first_number(&self.command(&format!("get {}", setting))?)
    }

    /// Reads a setting as the text the device sent.
    pub fn get_text(&self, setting: &str) -> Result<String> {
        Ok(self.command(&format!("get {}", setting))?.data_text().to_string())
    }

    pub fn set(&self, setting: &str, value: f64) -> Result<()> {
        self.command(&format!("set {} {}", setting, format_number(value)))?;
        Ok(())
    }

    fn move_with(&self, kind: &str, amount: Amount) -> Result<()> {
        if self.axes.is_empty() {
            let value = amount.single()?;
            self.command(&format!("move {} {}", kind, value))?;
            return Ok(());
        }

        // One move per axis, stopping at the first refusal
        let values = amount.per_axis(self.axes.len())?;
        for (axis, value) in self.axes.iter().zip(values) {
            axis.command(&format!("move {} {}", kind, value))?;
        }
        Ok(())
    }
}

impl<S: ByteStream> Motion for AsciiDevice<S> {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn home(&self) -> Result<()> {
        self.command("home")?;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.command("stop")?;
        Ok(())
    }

    fn move_absolute(&self, position: impl Into<Amount>) -> Result<()> {
        self.move_with("abs", position.into())
    }

    fn move_relative(&self, distance: impl Into<Amount>) -> Result<()> {
        self.move_with("rel", distance.into())
    }

    fn move_at_velocity(&self, velocity: impl Into<Amount>) -> Result<()> {
        self.move_with("vel", velocity.into())
    }

    fn move_indexed(&self, index: impl Into<Amount>) -> Result<()> {
        self.move_with("index", index.into())
    }

    fn wait_for_idle(&self, poll_interval: Duration) -> Result<IdleOutcome> {
        if !self.info.is_axis {
            return Ok(IdleOutcome::NotApplicable);
        }

        let ping = AsciiMessage::ping(self.info.address, self.info.axis)?;
        loop {
            let reply = self.send(&ping)?;
            if let Some(fault) = reply.flag_fault() {
                return Err(Error::Device(fault));
            }
            if reply.is_idle() {
                return Ok(IdleOutcome::Idle);
            }
            std::thread::sleep(poll_interval);
        }
    }

    fn get_range(&self) -> Result<Option<(i64, i64)>> {
        if !self.info.is_axis {
            return Ok(None);
        }

        let min = self.get("limit.min")?.round() as i64;
        let max = self.get("limit.max")?.round() as i64;
        Ok(Some((min, clamp_rotary(max, self.info.motion_type, self.info.units.as_ref()))))
    }

    fn get_num_indices(&self) -> Result<u32> {
        let range = match self.get_range()? {
            Some(range) => range,
            None => return Ok(0),
        };

        match unless_rejected(self.get("motion.index.dist"))? {
            Some(distance) => Ok(indices_in_range(Some(range), distance.round() as i64)),
            None => Ok(0),
        }
    }
}
