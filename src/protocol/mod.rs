pub mod port;
pub use port::{AsciiPort, BinaryPort, Port};

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::catalog::DeviceCatalog;
use crate::device::{AsciiDevice, BinaryDevice, Device};
use crate::errors::Result;
use crate::io::ByteStream;

/// A port shared between every device discovered on it.
pub type SharedPort<P> = Rc<RefCell<P>>;

/// How long detection waits for stray replies to stop arriving.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

/// The detection request.
///
/// A binary device reads it as "echo `/\r\n\0` to every device" and sends the
/// last four bytes straight back. A text device ignores the NUL and the `7`
/// it cannot parse, then reads `/\r\n` as an empty request to every device
/// and answers with a reply line.
pub const DETECTION_REQUEST: [u8; 6] = [0x00, 0x37, b'/', b'\r', b'\n', 0x00];

/// Which of the two protocols a port speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    Ascii,
    Binary,
}

/// Classifies the first bytes received after sending [`DETECTION_REQUEST`].
pub fn classify(reply: &[u8]) -> Option<ProtocolKind> {
    let echo = &DETECTION_REQUEST[1..];
    if reply.len() > echo.len() && reply[1..=echo.len()] == *echo {
        return Some(ProtocolKind::Binary);
    }

    // Text replies start with "@DD D "
    let preamble = reply.get(..6)?;
    let digit = |i: usize| preamble[i].is_ascii_digit();
    if preamble[0] == b'@' && digit(1) && digit(2) && preamble[3] == b' ' && digit(4) && preamble[5] == b' ' {
        return Some(ProtocolKind::Ascii);
    }

    None
}

/// Sends the detection request and classifies whatever comes back.
///
/// Everything that arrives after the first six bytes is thrown away: every
/// device on the chain answers, and the answers keep trickling in for a while.
pub fn detect_kind<S: ByteStream>(stream: &mut S, settle: Duration) -> Result<Option<ProtocolKind>> {
    // Start from a clean input buffer
    stream.discard_input()?;
    stream.write_all(&DETECTION_REQUEST)?;
    stream.flush()?;

    // Read up to six bytes of the first reply
    let mut reply: Vec<u8> = Vec::with_capacity(DETECTION_REQUEST.len());
    while reply.len() < DETECTION_REQUEST.len() {
        let mut buf = [0u8; 6];
        let want = DETECTION_REQUEST.len() - reply.len();
        match stream.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => reply.extend_from_slice(&buf[..n]),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) => break,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    // Drain the rest until the line goes quiet
    loop {
        std::thread::sleep(settle);
        if stream.bytes_available()? == 0 {
            break;
        }
        stream.discard_input()?;
    }

    let kind = classify(&reply);
    debug!(reply = ?reply, ?kind, "protocol detection");
    Ok(kind)
}

/// A port bound to the protocol it was found to speak.
pub enum Protocol<S> {
    Ascii(SharedPort<AsciiPort<S>>),
    Binary(SharedPort<BinaryPort<S>>),
}

impl<S: ByteStream> Protocol<S> {
    /// Binds a stream to the text protocol without probing it.
    pub fn ascii(stream: S) -> Self {
        Protocol::Ascii(Rc::new(RefCell::new(AsciiPort::new(stream))))
    }

    /// Binds a stream to the binary protocol without probing it.
    pub fn binary(stream: S) -> Self {
        Protocol::Binary(Rc::new(RefCell::new(BinaryPort::new(stream))))
    }

    /// Works out which protocol the devices on a stream speak.
    ///
    /// Returns `Ok(None)` when nothing recognizable answered.
    pub fn detect(stream: S) -> Result<Option<Self>> {
        Self::detect_with(stream, DEFAULT_SETTLE)
    }

    /// Same as [`Protocol::detect`] with a custom settle window.
    pub fn detect_with(mut stream: S, settle: Duration) -> Result<Option<Self>> {
        Ok(match detect_kind(&mut stream, settle)? {
            Some(ProtocolKind::Ascii) => Some(Self::ascii(stream)),
            Some(ProtocolKind::Binary) => Some(Self::binary(stream)),
            None => None,
        })
    }

    pub fn kind(&self) -> ProtocolKind {
        match self {
            Protocol::Ascii(_) => ProtocolKind::Ascii,
            Protocol::Binary(_) => ProtocolKind::Binary,
        }
    }

    /// Finds every device on the chain and runs discovery on each.
    ///
    /// Devices that fail discovery are logged and left out.
    pub fn enumerate_devices(&self, catalog: &dyn DeviceCatalog) -> Result<Vec<Device<S>>> {
        Ok(match self {
            Protocol::Ascii(port) => AsciiDevice::enumerate(port, catalog)?
                .into_iter()
                .map(Device::Ascii)
                .collect(),
            Protocol::Binary(port) => BinaryDevice::enumerate(port, catalog)?
                .into_iter()
                .map(Device::Binary)
                .collect(),
        })
    }
}
