use std::io::ErrorKind;
use std::marker::PhantomData;

use tracing::{trace, warn};

use crate::errors::Result;
use crate::io::{ByteStream, Framing};
use crate::message::{AsciiMessage, BinaryMessage, Frame};

/// A port speaking the text protocol.
pub type AsciiPort<S> = Port<S, AsciiMessage>;

/// A port speaking the binary protocol.
pub type BinaryPort<S> = Port<S, BinaryMessage>;

/// Wraps a byte stream to send and receive one kind of message.
///
/// Exactly one request may be outstanding at a time. Nothing here matches a
/// reply to its request: if several devices talk at once, [`Port::request`]
/// returns whichever frame arrives first. Callers that share a port between
/// threads have to serialize access themselves.
pub struct Port<S, M> {
    /// The read/write object to wrap
    /// This can be a serial port or anything else.
    /// This struct does not care.
    stream: S,
    checksums: bool,
    last_id: u8,
    _message: PhantomData<M>,
}

impl<S: ByteStream, M: Frame> Port<S, M> {
    /// Creates a new port. Text requests carry checksums unless turned off.
    pub fn new(stream: S) -> Self {
        Port {
            stream,
            checksums: true,
            last_id: 0,
            _message: PhantomData,
        }
    }

    /// Sets whether outgoing text requests carry a checksum.
    pub fn with_checksums(mut self, checksums: bool) -> Self {
        self.checksums = checksums;
        self
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Gives the wrapped stream back.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Hands out the next message id, cycling through 1..=254.
    pub fn next_message_id(&mut self) -> u8 {
        self.last_id = if self.last_id >= 254 { 1 } else { self.last_id + 1 };
        self.last_id
    }

    /// Encodes and writes a message without waiting for anything.
    pub fn send(&mut self, message: &M) -> Result<()> {
        let bytes = message.encode_frame(self.checksums)?;
        trace!(%message, "send");

        self.stream.write_all(&bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Waits for the next message.
    ///
    /// Returns `Ok(None)` when the stream's read timeout passes with nothing
    /// received, and a decode error when something arrived but did not parse.
    pub fn receive(&mut self, message_ids: bool) -> Result<Option<M>> {
        let frame = match self.read_frame()? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        match M::decode_frame(&frame, message_ids) {
            Ok(message) => {
                trace!(%message, "receive");
                Ok(Some(message))
            }
            Err(e) => {
                warn!(frame = ?frame, error = %e, "could not decode frame");
                Err(e.into())
            }
        }
    }

    /// Sends a message and waits for the next message to arrive.
    pub fn request(&mut self, message: &M, message_ids: bool) -> Result<Option<M>> {
        self.send(message)?;
        self.receive(message_ids)
    }

    /// Reads one frame, returning whatever was read when the stream times out.
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut frame: Vec<u8> = Vec::new();

        loop {
            // Receive a single byte
            let mut b: [u8; 1] = [0];
            match self.stream.read(&mut b) {
                Ok(0) => break,
                Ok(_) => frame.push(b[0]),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            let complete = match M::FRAMING {
                Framing::Line => b[0] == b'\n',
                Framing::Fixed(len) => frame.len() >= len,
            };

            if complete {
                // Blank lines between messages carry nothing
                if M::FRAMING == Framing::Line && frame.iter().all(|b| b.is_ascii_whitespace()) {
                    frame.clear();
                    continue;
                }
                break;
            }
        }

        if frame.is_empty() {
            Ok(None)
        } else {
            Ok(Some(frame))
        }
    }
}
