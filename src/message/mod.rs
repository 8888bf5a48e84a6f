// Module that contains the two wire encodings a device can speak

pub mod ascii;
pub use ascii::AsciiMessage;

pub mod binary;
pub use binary::BinaryMessage;

use crate::errors::{DecodeError, ValidationError};
use crate::io::Framing;

/// What a message is for.
///
/// Binary packets only ever are requests or replies, and the packet itself
/// does not say which; text messages carry the type in their first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// A command sent to a device (`/`).
    Request,
    /// A device's reply to a command (`@`).
    Response,
    /// Extra information a device sends after a reply (`#`).
    Info,
    /// A message the device sends unprompted (`!`).
    Alert,
}

impl MessageType {
    /// The character a text message of this type starts with.
    pub const fn prefix(self) -> char {
        match self {
            MessageType::Request => '/',
            MessageType::Response => '@',
            MessageType::Info => '#',
            MessageType::Alert => '!',
        }
    }

    /// Classifies a text message by its first character.
    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            '/' => Some(MessageType::Request),
            '@' => Some(MessageType::Response),
            '#' => Some(MessageType::Info),
            '!' => Some(MessageType::Alert),
            _ => None,
        }
    }
}

/// A trait that both wire encodings implement so one port type can carry either
pub trait Frame: Sized + std::fmt::Debug + std::fmt::Display {
    /// How the encoding splits a byte stream into messages
    const FRAMING: Framing;

    /// Encodes the message into the bytes written to the wire
    fn encode_frame(&self, checksum: bool) -> Result<Vec<u8>, ValidationError>;

    /// Decodes one complete frame.
    ///
    /// `message_ids` says whether the sender had message ids enabled; the
    /// binary encoding cannot tell this from the bytes alone.
    fn decode_frame(bytes: &[u8], message_ids: bool) -> Result<Self, DecodeError>;

    /// The device address the message came from or is going to
    fn address(&self) -> u8;
}
