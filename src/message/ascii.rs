//! Implements the line-based text encoding.
//!
//! A message looks like `<prefix><addr> <axis>[ <id>][ <body>][:<checksum>]\r\n`
//! where the prefix gives the [`MessageType`] and the body depends on it:
//! requests carry a command and its data, replies carry a status, an idle
//! marker, warning flags and data, alerts carry the idle marker and flags, and
//! info messages carry only data.

use std::fmt;

use super::{Frame, MessageType};
use crate::errors::{DecodeError, DeviceFault, ValidationError};
use crate::io::Framing;

/// Highest device address on a daisy chain.
pub const MAX_ADDRESS: u8 = 99;

/// Warning flags value meaning "no warnings".
pub const NO_FLAGS: &str = "--";

const STATUS_OK: &str = "OK";
const STATUS_REJECTED: &str = "RJ";
const IDLE: &str = "IDLE";
const BUSY: &str = "BUSY";
const FAULT_REASON: &str = "FAULT";

/// Computes the 8 bit two's complement checksum of a message body.
///
/// Adding the checksum to the byte sum of the body gives zero modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}

/// Renders a number the way devices expect to read it.
///
/// Integers have no decimal point and fractions never use exponent notation:
/// `3.0` is `3`, `-0.5` is `-0.5`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        // Also catches negative zero
        return "0".to_string();
    }
    // Display for f64 is already the shortest fixed-point form
    format!("{}", value)
}

fn parse_number(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// One message of the text protocol.
///
/// Messages are immutable; build requests with [`AsciiMessage::request`] and
/// the `with_*` methods.
#[derive(Debug, Clone, PartialEq)]
pub struct AsciiMessage {
    kind: MessageType,
    address: u8,
    axis: u8,
    message_id: Option<u8>,
    command: String,
    status: String,
    is_idle: bool,
    flags: String,
    data: Vec<f64>,
    data_text: String,
}

impl AsciiMessage {
    fn empty(kind: MessageType, address: u8, axis: u8) -> Result<Self, ValidationError> {
        if address > MAX_ADDRESS {
            return Err(ValidationError::AddressOutOfRange(address as i64));
        }

        Ok(AsciiMessage {
            kind,
            address,
            axis,
            message_id: None,
            command: String::new(),
            status: STATUS_OK.to_string(),
            is_idle: false,
            flags: NO_FLAGS.to_string(),
            data: Vec::new(),
            data_text: String::new(),
        })
    }

    /// Creates a request for a device (address 0 reaches every device) and
    /// axis (0 addresses the whole device).
    pub fn request(address: u8, axis: u8, command: &str) -> Result<Self, ValidationError> {
        let command = command.split_whitespace().collect::<Vec<_>>().join(" ");
        if command.is_empty() {
            return Err(ValidationError::MissingCommand);
        }

        let mut message = Self::empty(MessageType::Request, address, axis)?;
        message.command = command;
        Ok(message)
    }

    /// Creates the empty request that only asks for the device's status.
    pub fn ping(address: u8, axis: u8) -> Result<Self, ValidationError> {
        Self::empty(MessageType::Request, address, axis)
    }

    /// Creates a reply as a device would send it.
    pub fn response(
        address: u8,
        axis: u8,
        accepted: bool,
        idle: bool,
        flags: &str,
        data: &str,
    ) -> Result<Self, ValidationError> {
        let mut message = Self::empty(MessageType::Response, address, axis)?;
        message.status = if accepted { STATUS_OK } else { STATUS_REJECTED }.to_string();
        message.is_idle = idle;
        message.flags = flags.to_string();
        Ok(message.with_data_text(data))
    }

    /// Creates an unsolicited alert as a device would send it.
    pub fn alert(address: u8, axis: u8, idle: bool, flags: &str) -> Result<Self, ValidationError> {
        let mut message = Self::empty(MessageType::Alert, address, axis)?;
        message.is_idle = idle;
        message.flags = flags.to_string();
        Ok(message)
    }

    /// Creates an info message as a device would send it.
    pub fn info(address: u8, axis: u8, data: &str) -> Result<Self, ValidationError> {
        Ok(Self::empty(MessageType::Info, address, axis)?.with_data_text(data))
    }

    /// Replaces the payload with numbers.
    pub fn with_data(mut self, data: &[f64]) -> Self {
        self.data_text = data.iter().map(|v| format_number(*v)).collect::<Vec<_>>().join(" ");
        self.data = data.to_vec();
        self
    }

    /// Replaces the payload with pre-formatted text. Any tokens in it that
    /// read as numbers also become the numeric payload.
    pub fn with_data_text(mut self, text: &str) -> Self {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        self.data = tokens.iter().filter_map(|t| parse_number(t)).collect();
        self.data_text = tokens.join(" ");
        self
    }

    /// Sets the payload from numbers, text, or both. When both are given
    /// they must describe the same values.
    pub fn with_payload(self, data: Option<&[f64]>, text: Option<&str>) -> Result<Self, ValidationError> {
        match (data, text) {
            (Some(data), Some(text)) => {
                let from_text = self.clone().with_data_text(text);
                if from_text.data != data {
                    return Err(ValidationError::ConflictingPayload);
                }
                Ok(from_text)
            }
            (Some(data), None) => Ok(self.with_data(data)),
            (None, Some(text)) => Ok(self.with_data_text(text)),
            (None, None) => Ok(self),
        }
    }

    /// Tags the message with a correlation id the device will echo back.
    pub fn with_message_id(mut self, id: u8) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn axis(&self) -> u8 {
        self.axis
    }

    pub fn message_id(&self) -> Option<u8> {
        self.message_id
    }

    /// The command words of a request. Empty for every other message type.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The reply status, `OK` or `RJ`.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// True when a reply was rejected.
    pub fn is_error(&self) -> bool {
        self.status != STATUS_OK
    }

    pub fn is_idle(&self) -> bool {
        self.is_idle
    }

    /// The warning flags of a reply or alert; `--` when there are none.
    pub fn flags(&self) -> &str {
        &self.flags
    }

    /// Every payload token that parsed as a number, in order.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// The whole payload as sent, tokens joined by single spaces.
    pub fn data_text(&self) -> &str {
        &self.data_text
    }

    /// The rejection carried by this reply, if it is one.
    pub fn fault(&self) -> Option<DeviceFault> {
        if self.kind == MessageType::Response && self.is_error() {
            Some(DeviceFault::Ascii {
                reason: self.data_text.clone(),
                flags: self.flags.clone(),
            })
        } else {
            None
        }
    }

    /// The fault reported through the warning flags, if any.
    ///
    /// Flags starting with `F` (for example `FS` after a stall) mean the axis
    /// needs attention even though the reply itself was accepted.
    pub fn flag_fault(&self) -> Option<DeviceFault> {
        if self.flags.starts_with('F') {
            Some(DeviceFault::Ascii {
                reason: FAULT_REASON.to_string(),
                flags: self.flags.clone(),
            })
        } else {
            None
        }
    }

    /// Builds the text between the prefix and the checksum.
    fn body(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        // Devices pad their own address to two digits
        if self.kind == MessageType::Request {
            parts.push(self.address.to_string());
        } else {
            parts.push(format!("{:02}", self.address));
        }
        parts.push(self.axis.to_string());

        if let Some(id) = self.message_id {
            parts.push(id.to_string());
        }

        let idle = if self.is_idle { IDLE } else { BUSY };
        match self.kind {
            MessageType::Request => {
                parts.push(self.command.clone());
            }
            MessageType::Response => {
                parts.push(self.status.clone());
                parts.push(idle.to_string());
                parts.push(self.flags.clone());
            }
            MessageType::Alert => {
                parts.push(idle.to_string());
                parts.push(self.flags.clone());
            }
            MessageType::Info => {}
        }
        parts.push(self.data_text.clone());

        parts.retain(|p| !p.is_empty());
        parts.join(" ")
    }

    /// Encodes the message, optionally followed by its checksum.
    pub fn encode(&self, with_checksum: bool) -> Vec<u8> {
        let body = self.body();

        let mut line = String::with_capacity(body.len() + 6);
        line.push(self.kind.prefix());
        line.push_str(&body);
        if with_checksum {
            line.push_str(&format!(":{:02X}", checksum(body.as_bytes())));
        }
        line.push_str("\r\n");

        line.into_bytes()
    }

    /// Decodes one line of text.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let text = text.trim();

        // Classify the message by its first character
        let prefix = text.chars().next().ok_or(DecodeError::Empty)?;
        let kind = MessageType::from_prefix(prefix).ok_or(DecodeError::UnknownMessageType(prefix))?;
        let rest = &text[prefix.len_utf8()..];

        // Verify and strip the checksum, if there is one
        let body = match rest.matches(':').count() {
            0 => rest,
            1 => {
                let (body, sum) = rest.split_at(rest.find(':').unwrap_or(rest.len()));
                let sum = &sum[1..];
                if sum.len() != 2 {
                    return Err(DecodeError::MalformedChecksum);
                }
                let found = u8::from_str_radix(sum, 16).map_err(|_| DecodeError::MalformedChecksum)?;
                let expected = checksum(body.as_bytes());
                if found != expected {
                    return Err(DecodeError::BadChecksum { expected, found });
                }
                body
            }
            _ => return Err(DecodeError::MultipleChecksums),
        };

        let mut tokens = body.split_whitespace().peekable();

        // Device address. Only a request may go to address 0.
        let address_token = tokens.next().unwrap_or("");
        let address = match address_token.parse::<u8>() {
            Ok(0) if kind == MessageType::Request => 0,
            Ok(a) if (1..=MAX_ADDRESS).contains(&a) => a,
            _ => return Err(DecodeError::InvalidDeviceNo(address_token.to_string())),
        };

        // Axis number
        let axis = match tokens.next() {
            Some(token) => token
                .parse::<u8>()
                .map_err(|_| DecodeError::InvalidAxisNo(token.to_string()))?,
            None => 0,
        };

        // The first number after the axis is taken to be a message id
        let message_id = match tokens.peek().and_then(|t| t.parse::<u8>().ok()) {
            Some(id) => {
                tokens.next();
                Some(id)
            }
            None => None,
        };

        let mut message = AsciiMessage {
            kind,
            address,
            axis,
            message_id,
            command: String::new(),
            status: STATUS_OK.to_string(),
            is_idle: false,
            flags: NO_FLAGS.to_string(),
            data: Vec::new(),
            data_text: String::new(),
        };

        let remaining: Vec<&str> = tokens.collect();
        let data: &[&str] = match kind {
            MessageType::Response => {
                if remaining.len() < 4 {
                    return Err(DecodeError::MissingFields {
                        kind: "reply",
                        needed: 4,
                        found: remaining.len(),
                    });
                }
                message.status = remaining[0].to_string();
                message.is_idle = remaining[1] == IDLE;
                message.flags = remaining[2].to_string();
                &remaining[3..]
            }
            MessageType::Alert => {
                if remaining.len() >= 2 {
                    message.is_idle = remaining[0] == IDLE;
                    message.flags = remaining[1].to_string();
                    &remaining[2..]
                } else {
                    &remaining[..]
                }
            }
            MessageType::Request => {
                // Command words run up to the first number
                let words = remaining
                    .iter()
                    .take_while(|t| parse_number(t).is_none())
                    .count();
                message.command = remaining[..words].join(" ");
                &remaining[words..]
            }
            MessageType::Info => &remaining[..],
        };

        message.data = data.iter().filter_map(|t| parse_number(t)).collect();
        message.data_text = data.join(" ");

        Ok(message)
    }
}

impl Frame for AsciiMessage {
    const FRAMING: Framing = Framing::Line;

    fn encode_frame(&self, checksum: bool) -> Result<Vec<u8>, ValidationError> {
        Ok(self.encode(checksum))
    }

    fn decode_frame(bytes: &[u8], _message_ids: bool) -> Result<Self, DecodeError> {
        if !bytes.is_ascii() {
            return Err(DecodeError::NotAscii);
        }
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotAscii)?;
        AsciiMessage::decode(text)
    }

    fn address(&self) -> u8 {
        self.address
    }
}

impl fmt::Display for AsciiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.body())
    }
}
