//! Devices speaking the binary protocol.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::io::{BinaryIoPort, IoCounts};
use super::meta::{message_ids_enabled, FirmwareVersion};
use super::{clamp_rotary, indices_in_range, unless_rejected, Amount, DeviceInfo, IdleOutcome, Motion};
use crate::catalog::DeviceCatalog;
use crate::errors::{Error, Result};
use crate::io::ByteStream;
use crate::message::binary::{reply, BinaryCommand, BinaryStatus};
use crate::message::BinaryMessage;
use crate::protocol::{BinaryPort, SharedPort};

/// How long a motion command may go unanswered by default.
pub const DEFAULT_MOTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends a packet and waits for the answer.
///
/// With `patience` set, read timeouts keep the wait going until that much time
/// has passed: binary devices only answer motion commands once the motion is
/// over. Without it the first read timeout is [`Error::NoReply`].
fn exchange<S: ByteStream>(
    port: &SharedPort<BinaryPort<S>>,
    request: &BinaryMessage,
    message_ids: bool,
    patience: Option<Duration>,
) -> Result<BinaryMessage> {
    let mut port = port.borrow_mut();
    port.send(request)?;
    let started = Instant::now();

    loop {
        match port.receive(message_ids)? {
            Some(answer) if reply::is_unsolicited(answer.command()) => {
                debug!(message = %answer, "skipping unsolicited reply")
            }
            Some(answer) => return Ok(answer),
            None => match patience {
                Some(limit) if started.elapsed() < limit => continue,
                _ => return Err(Error::NoReply),
            },
        }
    }
}

fn send_command<S: ByteStream>(
    port: &SharedPort<BinaryPort<S>>,
    address: u8,
    message_ids: bool,
    command: u8,
    data: i64,
    patience: Option<Duration>,
) -> Result<BinaryMessage> {
    let mut request = BinaryMessage::new(address as i64, command as i64, data)?;
    if message_ids {
        let id = port.borrow_mut().next_message_id();
        request = request.with_message_id(id);
    }

    let answer = exchange(port, &request, message_ids, patience)?;
    match answer.fault() {
        Some(fault) => Err(Error::Device(fault)),
        None => Ok(answer),
    }
}

/// Sends a command and returns the reply. Rejections become [`Error::Device`].
pub(crate) fn query<S: ByteStream>(
    port: &SharedPort<BinaryPort<S>>,
    address: u8,
    message_ids: bool,
    command: BinaryCommand,
    data: i64,
) -> Result<BinaryMessage> {
    send_command(port, address, message_ids, command.into(), data, None)
}

/// A device on a binary protocol chain. Every binary device is a single axis.
pub struct BinaryDevice<S> {
    port: SharedPort<BinaryPort<S>>,
    info: DeviceInfo,
    message_ids: bool,
    motion_timeout: Duration,
    io: Option<BinaryIoPort<S>>,
}

impl<S: ByteStream> BinaryDevice<S> {
    /// Asks every device on the chain for its type, then discovers each one
    /// that answered, in address order.
    pub fn enumerate(port: &SharedPort<BinaryPort<S>>, catalog: &dyn DeviceCatalog) -> Result<Vec<Self>> {
        let mut found: Vec<(u8, u32)> = Vec::new();

        {
            let mut port = port.borrow_mut();
            port.send(&BinaryMessage::request(0, BinaryCommand::ReturnDeviceId, 0)?)?;

            // Keep reading until nobody has anything more to say
            loop {
                let answer = match port.receive(false) {
                    Ok(Some(answer)) => answer,
                    Ok(None) => break,
                    // Already logged by the port
                    Err(Error::Decode(_)) => continue,
                    Err(e) => return Err(e),
                };

                if let Some(fault) = answer.fault() {
                    warn!(address = answer.address(), %fault, "device rejected the identity query");
                } else if answer.command() == u8::from(BinaryCommand::ReturnDeviceId) {
                    found.push((answer.address(), answer.data() as u32));
                } else {
                    debug!(message = %answer, "ignoring unrelated reply");
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
        port: SharedPort<BinaryPort<S>>,
        address: u8,
        device_id: Option<u32>,
        catalog: &dyn DeviceCatalog,
    ) -> Result<Self> {
        // Get the device type
        let device_id = match device_id {
            Some(id) => id,
            None => query(&port, address, false, BinaryCommand::ReturnDeviceId, 0)
                .map_err(|e| Error::Discovery(format!("device {} did not report its type: {}", address, e)))?
                .data() as u32,
        };
        let record = catalog.find_device(device_id);

        // Get the firmware version
        let firmware = FirmwareVersion::from_scaled(query(&port, address, false, BinaryCommand::ReturnFirmwareVersion, 0)?.data());

        // Get the device mode to see whether replies carry message ids
        let mode = unless_rejected(query(
            &port,
            address,
            false,
            BinaryCommand::ReturnSetting,
            u8::from(BinaryCommand::SetDeviceMode) as i64,
        ))?;
        let message_ids = mode.map_or(false, |mode| message_ids_enabled(firmware, mode.data()));

        let setting = |command: BinaryCommand| -> Result<Option<i32>> {
            let reply = unless_rejected(query(
                &port,
                address,
                message_ids,
                BinaryCommand::ReturnSetting,
                u8::from(command) as i64,
            ))?;
            Ok(reply.map(|reply| reply.data()))
        };

        // Get the peripheral and look both up
        let peripheral_id = setting(BinaryCommand::SetPeripheralId)?.unwrap_or(0).max(0) as u32;
        let peripheral = catalog.find_peripheral(&record, peripheral_id);
        let (motion_type, units) = catalog.motion_type_and_units(&record, &peripheral);

        let units = match units {
            Some(units) if units.is_resolution_dependent() => match setting(BinaryCommand::SetMicrostepResolution)? {
                Some(resolution) => Some(units.with_resolution(resolution.max(1) as u32)),
                None => Some(units),
            },
            other => other,
        };

        // Get the I/O channel counts
        let count = |command: BinaryCommand| -> Result<usize> {
            let reply = unless_rejected(query(&port, address, message_ids, command, 0))?;
            Ok(reply.map_or(0, |reply| reply.data().max(0) as usize))
        };
        let counts = IoCounts {
            digital_inputs: count(BinaryCommand::ReturnDigitalInputCount)?,
            digital_outputs: count(BinaryCommand::ReturnDigitalOutputCount)?,
            analog_inputs: count(BinaryCommand::ReturnAnalogInputCount)?,
            analog_outputs: count(BinaryCommand::ReturnAnalogOutputCount)?,
        };
        let io = Some(counts)
            .filter(IoCounts::any)
            .map(|counts| BinaryIoPort::new(port.clone(), address, message_ids, counts));

        let info = DeviceInfo {
            address,
            axis: 0,
            device_id,
            peripheral_id,
            name: catalog.device_name(&record, Some(&peripheral)),
            is_axis: true,
            firmware,
            motion_type,
            units,
        };

        debug!(address, device_id, %firmware, message_ids, name = %info.name, "discovered device");
        Ok(BinaryDevice {
            port,
            info,
            message_ids,
            motion_timeout: DEFAULT_MOTION_TIMEOUT,
            io,
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn io(&self) -> Option<&BinaryIoPort<S>> {
        self.io.as_ref()
    }

    pub fn port(&self) -> &SharedPort<BinaryPort<S>> {
        &self.port
    }

    /// Whether requests to this device carry message ids.
    pub fn message_ids(&self) -> bool {
        self.message_ids
    }

    /// How long home, stop and the moves wait for their reply.
    pub fn motion_timeout(&self) -> Duration {
        self.motion_timeout
    }

    /// Sets how long home, stop and the moves wait for their reply before
    /// giving up with [`Error::NoReply`].
    pub fn set_motion_timeout(&mut self, timeout: Duration) {
        self.motion_timeout = timeout;
    }

    /// Sends a command and returns the accepted reply.
    pub fn command(&self, command: BinaryCommand, data: i64) -> Result<BinaryMessage> {
        query(&self.port, self.info.address, self.message_ids, command, data)
    }

    /// Sends a command that only gets an answer once the device stops moving.
    fn motion(&self, command: BinaryCommand, data: i64) -> Result<()> {
        send_command(
            &self.port,
            self.info.address,
            self.message_ids,
            command.into(),
            data,
            Some(self.motion_timeout),
        )?;
        Ok(())
    }

    /// Reads the setting written by the command numbered `setting`.
    pub fn get(&self, setting: u8) -> Result<i32> {
        Ok(self.command(BinaryCommand::ReturnSetting, setting as i64)?.data())
    }

    /// Writes a setting through its command number and returns the value the
    /// device reports back.
    pub fn set(&self, setting: u8, value: i64) -> Result<i32> {
        let reply = send_command(&self.port, self.info.address, self.message_ids, setting, value, None)?;
        Ok(reply.data())
    }
}

impl<S: ByteStream> Motion for BinaryDevice<S> {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn home(&self) -> Result<()> {
        self.motion(BinaryCommand::Home, 0)
    }

    fn stop(&self) -> Result<()> {
        self.motion(BinaryCommand::Stop, 0)
    }

    fn move_absolute(&self, position: impl Into<Amount>) -> Result<()> {
        self.motion(BinaryCommand::MoveAbsolute, position.into().single()?)
    }

    fn move_relative(&self, distance: impl Into<Amount>) -> Result<()> {
        self.motion(BinaryCommand::MoveRelative, distance.into().single()?)
    }

    fn move_at_velocity(&self, velocity: impl Into<Amount>) -> Result<()> {
        self.motion(BinaryCommand::MoveAtConstantSpeed, velocity.into().single()?)
    }

    fn move_indexed(&self, index: impl Into<Amount>) -> Result<()> {
        self.motion(BinaryCommand::MoveIndex, index.into().single()?)
    }

    fn wait_for_idle(&self, poll_interval: Duration) -> Result<IdleOutcome> {
        if !self.info.is_axis {
            return Ok(IdleOutcome::NotApplicable);
        }

        loop {
            let status = BinaryStatus::from_code(self.command(BinaryCommand::ReturnStatus, 0)?.data());
            match status {
                BinaryStatus::Idle => return Ok(IdleOutcome::Idle),
                BinaryStatus::Parked => return Ok(IdleOutcome::Parked),
                BinaryStatus::Stalled => return Ok(IdleOutcome::Stalled),
                BinaryStatus::Busy(_) => std::thread::sleep(poll_interval),
            }
        }
    }

    fn get_range(&self) -> Result<Option<(i64, i64)>> {
        if !self.info.is_axis {
            return Ok(None);
        }

        let max = self.get(BinaryCommand::SetMaximumPosition.into())? as i64;
        Ok(Some((0, clamp_rotary(max, self.info.motion_type, self.info.units.as_ref()))))
    }

    fn get_num_indices(&self) -> Result<u32> {
        let range = match self.get_range()? {
            Some(range) => range,
            None => return Ok(0),
        };

        match unless_rejected(self.get(BinaryCommand::SetIndexDistance.into()))? {
            Some(distance) => Ok(indices_in_range(Some(range), distance as i64)),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Framing, ScriptedStream};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn port(responder: impl FnMut(&[u8]) -> Vec<u8> + 'static) -> SharedPort<BinaryPort<ScriptedStream>> {
        Rc::new(RefCell::new(BinaryPort::new(ScriptedStream::new(Framing::Fixed(6), responder))))
    }

    #[test]
    fn skips_unsolicited_replies() {
        let port = port(|_| vec![1, reply::MANUAL_MOVE, 5, 0, 0, 0, 1, 60, 9, 0, 0, 0]);
        let answer = query(&port, 1, false, BinaryCommand::ReturnCurrentPosition, 0).unwrap();
        assert_eq!(answer.data(), 9);
    }

    #[test]
    fn requests_carry_rolling_ids() {
        let stream = ScriptedStream::new(Framing::Fixed(6), |frame| frame.to_vec());
        let log = stream.log();
        let port = Rc::new(RefCell::new(BinaryPort::new(stream)));

        query(&port, 2, true, BinaryCommand::EchoData, 7).unwrap();
        let answer = query(&port, 2, true, BinaryCommand::EchoData, -7).unwrap();

        assert_eq!(answer.data(), -7);
        assert_eq!(answer.message_id(), Some(2));
        assert_eq!(log.borrow()[0][5], 1);
    }

    #[test]
    fn motion_waits_are_bounded() {
        let port = port(|_| Vec::new());
        let started = Instant::now();
        let result = send_command(&port, 1, false, BinaryCommand::Home.into(), 0, Some(Duration::from_millis(20)));

        assert!(matches!(result, Err(Error::NoReply)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn error_reply_is_a_device_fault() {
        let port = port(|_| vec![1, reply::ERROR, 255, 0, 0, 0]);
        let err = query(&port, 1, false, BinaryCommand::Home, 0).unwrap_err();
        assert_eq!(err.device_fault(), Some(&crate::errors::DeviceFault::Binary { code: 255 }));
    }
}
