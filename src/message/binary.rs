//! Implements the fixed-length binary encoding.
//!
//! Every packet is 6 bytes: `[address, command, d0, d1, d2, d3]` with the data
//! as a little endian `i32`. When message ids are enabled the last byte is the
//! id instead and the data shrinks to a sign extended 24 bit value.

use std::fmt;

use super::Frame;
use crate::errors::{DecodeError, DeviceFault, ValidationError};
use crate::io::Framing;

/// Length of every binary packet.
pub const PACKET_LEN: usize = 6;

/// Highest device address accepted when building a packet.
pub const MAX_ADDRESS: i64 = 99;

const DATA_24_MIN: i32 = -(1 << 23);
const DATA_24_MAX: i32 = (1 << 23) - 1;

/// There are various commands that can be sent to a device.
/// Settings are written by sending the setting's number as the command and
/// read back with [`BinaryCommand::ReturnSetting`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryCommand {
    Reset = 0,
    Home = 1,
    Renumber = 2,
    StoreCurrentPosition = 16,
    ReturnStoredPosition = 17,
    MoveToStoredPosition = 18,
    MoveAbsolute = 20,
    MoveRelative = 21,
    MoveAtConstantSpeed = 22,
    Stop = 23,
    RestoreSettings = 36,
    SetMicrostepResolution = 37,
    SetRunningCurrent = 38,
    SetHoldCurrent = 39,
    SetDeviceMode = 40,
    SetHomeSpeed = 41,
    SetTargetSpeed = 42,
    SetAcceleration = 43,
    SetMaximumPosition = 44,
    SetCurrentPosition = 45,
    SetMaximumRelativeMove = 46,
    SetHomeOffset = 47,
    SetAliasNumber = 48,
    SetLockState = 49,
    ReturnDeviceId = 50,
    ReturnFirmwareVersion = 51,
    ReturnPowerSupplyVoltage = 52,
    ReturnSetting = 53,
    ReturnStatus = 54,
    EchoData = 55,
    ReturnFirmwareBuild = 56,
    ReturnCurrentPosition = 60,
    ReturnSerialNumber = 63,
    SetParkState = 65,
    SetPeripheralId = 66,
    ReturnDigitalInputCount = 67,
    ReadDigitalInput = 68,
    ReturnDigitalOutputCount = 69,
    ReadDigitalOutput = 70,
    WriteDigitalOutput = 71,
    ReturnAnalogInputCount = 72,
    ReadAnalogInput = 73,
    ReturnAnalogOutputCount = 74,
    MoveIndex = 78,
    SetIndexDistance = 79,
}

impl From<BinaryCommand> for u8 {
    fn from(command: BinaryCommand) -> u8 {
        command as u8
    }
}

/// Reply codes that never appear as requests.
pub mod reply {
    /// The device is tracking a move it did not start.
    pub const MOVE_TRACKING: u8 = 8;
    /// A travel limit was reached.
    pub const LIMIT_ACTIVE: u8 = 9;
    /// The knob or joystick moved the device.
    pub const MANUAL_MOVE_TRACKING: u8 = 10;
    pub const MANUAL_MOVE: u8 = 11;
    pub const SLIP_TRACKING: u8 = 12;
    pub const UNEXPECTED_POSITION: u8 = 13;
    /// The command was rejected; the data holds the error code.
    pub const ERROR: u8 = 255;

    /// True for codes a device sends on its own rather than in answer to a request.
    pub fn is_unsolicited(code: u8) -> bool {
        (MOVE_TRACKING..=UNEXPECTED_POSITION).contains(&code)
    }
}

/// What a device reports it is doing in reply to [`BinaryCommand::ReturnStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryStatus {
    Idle,
    Parked,
    Stalled,
    /// Anything else; the device is still busy with the given command.
    Busy(i32),
}

impl BinaryStatus {
    pub const IDLE: i32 = 0;
    pub const PARKED: i32 = 65;
    pub const STALLED: i32 = 90;

    pub fn from_code(code: i32) -> Self {
        match code {
            Self::IDLE => BinaryStatus::Idle,
            Self::PARKED => BinaryStatus::Parked,
            Self::STALLED => BinaryStatus::Stalled,
            other => BinaryStatus::Busy(other),
        }
    }

    /// True for the states in which the device will not move on its own.
    pub fn is_terminal(self) -> bool {
        !matches!(self, BinaryStatus::Busy(_))
    }
}

/// One binary packet.
///
/// # Members
///
/// * `address` - The device address, 0 reaches every device
/// * `command` - The command number on requests, the reply code on replies
/// * `data` - The signed data value
/// * `message_id` - The correlation id, only present when message ids are in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryMessage {
    address: u8,
    command: u8,
    data: i32,
    message_id: Option<u8>,
}

impl BinaryMessage {
    /// Creates a packet, checking every field fits its byte range.
    pub fn new(address: i64, command: i64, data: i64) -> Result<Self, ValidationError> {
        if !(0..=MAX_ADDRESS).contains(&address) {
            return Err(ValidationError::AddressOutOfRange(address));
        }
        let command = u8::try_from(command).map_err(|_| ValidationError::CommandOutOfRange(command))?;
        let data = i32::try_from(data).map_err(|_| ValidationError::DataOutOfRange { value: data, bits: 32 })?;

        Ok(BinaryMessage {
            address: address as u8,
            command,
            data,
            message_id: None,
        })
    }

    /// Creates a request for one of the named commands.
    pub fn request(address: u8, command: BinaryCommand, data: i64) -> Result<Self, ValidationError> {
        Self::new(address as i64, command as i64, data)
    }

    /// Tags the packet with a message id. An id of 0 means "none".
    pub fn with_message_id(mut self, id: u8) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn data(&self) -> i32 {
        self.data
    }

    pub fn message_id(&self) -> Option<u8> {
        self.message_id
    }

    /// True when the reply code is the reserved error code.
    pub fn is_error(&self) -> bool {
        self.command == reply::ERROR
    }

    /// The rejection carried by this reply, if it is one.
    pub fn fault(&self) -> Option<DeviceFault> {
        if self.is_error() {
            Some(DeviceFault::Binary { code: self.data })
        } else {
            None
        }
    }

    /// Encodes the packet.
    ///
    /// With a non-zero message id the data must fit in 24 bits.
    pub fn encode(&self) -> Result<[u8; PACKET_LEN], ValidationError> {
        // The data goes on the wire as its two's complement bit pattern
        let bytes = (self.data as u32).to_le_bytes();

        match self.message_id {
            Some(id) if id != 0 => {
                if !(DATA_24_MIN..=DATA_24_MAX).contains(&self.data) {
                    return Err(ValidationError::DataOutOfRange {
                        value: self.data as i64,
                        bits: 24,
                    });
                }
                Ok([self.address, self.command, bytes[0], bytes[1], bytes[2], id])
            }
            _ => Ok([self.address, self.command, bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Decodes one packet. `message_ids` must say whether the device that
    /// sent it has message ids enabled.
    pub fn decode(bytes: &[u8], message_ids: bool) -> Result<Self, DecodeError> {
        if bytes.len() != PACKET_LEN {
            return Err(DecodeError::BadPacketLength(bytes.len()));
        }

        let (data, message_id) = if message_ids {
            // Shift the 24 bit value to the top and back down to sign extend it
            let raw = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], 0]);
            (((raw << 8) as i32) >> 8, Some(bytes[5]))
        } else {
            (i32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]), None)
        };

        Ok(BinaryMessage {
            address: bytes[0],
            command: bytes[1],
            data,
            message_id,
        })
    }
}

impl Frame for BinaryMessage {
    const FRAMING: Framing = Framing::Fixed(PACKET_LEN);

    fn encode_frame(&self, _checksum: bool) -> Result<Vec<u8>, ValidationError> {
        Ok(self.encode()?.to_vec())
    }

    fn decode_frame(bytes: &[u8], message_ids: bool) -> Result<Self, DecodeError> {
        BinaryMessage::decode(bytes, message_ids)
    }

    fn address(&self) -> u8 {
        self.address
    }
}

impl fmt::Display for BinaryMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {}]", self.address, self.command, self.data)?;
        if let Some(id) = self.message_id {
            write!(f, " id {}", id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_move_reply() {
        let reply = BinaryMessage::decode(&[1, 20, 0xE8, 0x03, 0, 0], false).unwrap();
        assert_eq!(reply.address(), 1);
        assert_eq!(reply.command(), 20);
        assert_eq!(reply.data(), 1000);
        assert_eq!(reply.message_id(), None);
        assert!(!reply.is_error());
    }

    #[test]
    fn encodes_negative_data_little_endian() {
        let request = BinaryMessage::new(2, 21, -2).unwrap();
        assert_eq!(request.encode().unwrap(), [2, 21, 0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn message_id_takes_the_last_byte() {
        let request = BinaryMessage::new(1, 20, (1 << 23) - 1).unwrap().with_message_id(9);
        let bytes = request.encode().unwrap();
        assert_eq!(bytes, [1, 20, 0xFF, 0xFF, 0x7F, 9]);
        assert_eq!(BinaryMessage::decode(&bytes, true).unwrap(), request);

        let negative = BinaryMessage::new(1, 20, -(1 << 23)).unwrap().with_message_id(3);
        let decoded = BinaryMessage::decode(&negative.encode().unwrap(), true).unwrap();
        assert_eq!(decoded.data(), -(1 << 23));
        assert_eq!(decoded.message_id(), Some(3));
    }

    #[test]
    fn message_id_limits_data_to_24_bits() {
        for value in [1i64 << 23, -(1 << 23) - 1, i32::MAX as i64] {
            let request = BinaryMessage::new(1, 20, value).unwrap().with_message_id(1);
            assert_eq!(
                request.encode(),
                Err(ValidationError::DataOutOfRange { value, bits: 24 })
            );
        }

        // Id 0 means no id, so the full range is available
        let request = BinaryMessage::new(1, 20, i32::MAX as i64).unwrap().with_message_id(0);
        assert_eq!(request.encode().unwrap()[5], 0x7F);
    }

    #[test]
    fn construction_is_validated() {
        assert_eq!(BinaryMessage::new(-1, 1, 0), Err(ValidationError::AddressOutOfRange(-1)));
        assert_eq!(BinaryMessage::new(100, 1, 0), Err(ValidationError::AddressOutOfRange(100)));
        assert!(BinaryMessage::new(99, 255, 0).is_ok());
        assert_eq!(BinaryMessage::new(1, 256, 0), Err(ValidationError::CommandOutOfRange(256)));
        assert_eq!(BinaryMessage::new(1, -1, 0), Err(ValidationError::CommandOutOfRange(-1)));
        assert_eq!(
            BinaryMessage::new(1, 20, 1 << 32),
            Err(ValidationError::DataOutOfRange { value: 1 << 32, bits: 32 })
        );
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(BinaryMessage::decode(&[1, 2, 3], false), Err(DecodeError::BadPacketLength(3)));
        assert_eq!(BinaryMessage::decode(&[0; 7], false), Err(DecodeError::BadPacketLength(7)));
    }

    #[test]
    fn error_reply_carries_code() {
        let reply = BinaryMessage::decode(&[3, 255, 20, 0, 0, 0], false).unwrap();
        assert!(reply.is_error());
        assert_eq!(reply.fault(), Some(DeviceFault::Binary { code: 20 }));
    }

    #[test]
    fn io_and_peripheral_commands() {
        // A parked device reports the park command as its status
        assert_eq!(BinaryStatus::PARKED, u8::from(BinaryCommand::SetParkState) as i32);
        assert_eq!(u8::from(BinaryCommand::SetPeripheralId), 66);
        assert_eq!(u8::from(BinaryCommand::ReturnDigitalInputCount), 67);
        assert_eq!(u8::from(BinaryCommand::WriteDigitalOutput), 71);
        assert_eq!(u8::from(BinaryCommand::ReturnAnalogOutputCount), 74);
    }

    #[test]
    fn status_codes() {
        assert!(BinaryStatus::from_code(0).is_terminal());
        assert_eq!(BinaryStatus::from_code(65), BinaryStatus::Parked);
        assert_eq!(BinaryStatus::from_code(90), BinaryStatus::Stalled);
        assert!(!BinaryStatus::from_code(20).is_terminal());
    }
}
