use thiserror::Error;

/// Errors raised while turning wire bytes into a message.
///
/// The caller decides whether the stream needs to be resynchronized after one
/// of these. Nothing in this crate retries on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,
    #[error("message contains non-ASCII bytes")]
    NotAscii,
    #[error("unrecognized message type prefix '{0}'")]
    UnknownMessageType(char),
    #[error("checksum marker must be followed by exactly two hex digits")]
    MalformedChecksum,
    #[error("message contains more than one checksum marker")]
    MultipleChecksums,
    #[error("bad checksum: expected {expected:02X}, found {found:02X}")]
    BadChecksum { expected: u8, found: u8 },
    #[error("invalid device number '{0}'")]
    InvalidDeviceNo(String),
    #[error("invalid axis number '{0}'")]
    InvalidAxisNo(String),
    #[error("{kind} needs at least {needed} fields, found {found}")]
    MissingFields {
        kind: &'static str,
        needed: usize,
        found: usize,
    },
    #[error("binary packets are 6 bytes long, got {0}")]
    BadPacketLength(usize),
}

/// Arguments rejected before any I/O takes place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("device address {0} is outside 0..=99")]
    AddressOutOfRange(i64),
    #[error("command {0} is outside 0..=255")]
    CommandOutOfRange(i64),
    #[error("data value {value} does not fit in {bits} bits")]
    DataOutOfRange { value: i64, bits: u32 },
    #[error("a command word is required")]
    MissingCommand,
    #[error("numeric data and a data string were both supplied and disagree")]
    ConflictingPayload,
    #[error("expected one value per axis ({expected}), got {found}")]
    AxisCountMismatch { expected: usize, found: usize },
    #[error("index {index} is outside 1..={count}")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("setting identifier does not belong to the {0} protocol")]
    WrongProtocol(&'static str),
}

/// A rejection or fault reported by the device itself.
///
/// These are expected outcomes (writing an out-of-range setting, moving a
/// parked axis) and are carried as data inside [`Error::Device`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFault {
    /// The binary reply code was `Error`; `code` is the reply's data value.
    Binary { code: i32 },
    /// The text reply status was not `OK`.
    Ascii { reason: String, flags: String },
}

impl std::fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFault::Binary { code } => write!(f, "binary error code {}", code),
            DeviceFault::Ascii { reason, flags } => write!(f, "{} (flags {})", reason, flags),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO Error")]
    Io(#[from] std::io::Error),
    #[error("Serialport Error")]
    Serialport(#[from] serialport::Error),
    #[error("no reply received before the read timeout")]
    NoReply,
    #[error("could not decode reply")]
    Decode(#[from] DecodeError),
    #[error("invalid argument")]
    Validation(#[from] ValidationError),
    #[error("device rejected the request: {0}")]
    Device(DeviceFault),
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
    #[error("device discovery failed: {0}")]
    Discovery(String),
}

impl Error {
    /// True when the device answered but refused the request.
    ///
    /// Such errors leave the stream in sync and the device usable; everything
    /// else means the exchange itself failed.
    pub fn is_device_fault(&self) -> bool {
        matches!(self, Error::Device(_))
    }

    /// Returns the device-reported fault, if that is what this error is.
    pub fn device_fault(&self) -> Option<&DeviceFault> {
        match self {
            Error::Device(fault) => Some(fault),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reading a TOML file (device tables, connection settings).
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO Error")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML")]
    Toml(#[from] toml::de::Error),
}
