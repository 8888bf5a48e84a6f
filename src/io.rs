//! The byte stream the protocol layer talks through.
//!
//! Anything that can read, write, report how many bytes are waiting and throw
//! those bytes away can carry either protocol. System serial ports do this out
//! of the box; [`ScriptedStream`] does it in memory for exercising the protocol
//! layer without hardware.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

/// A half-duplex byte stream with a read timeout.
///
/// Reads that run past the stream's timeout must fail with
/// [`io::ErrorKind::TimedOut`] (or `WouldBlock`), which the protocol layer
/// reports as "no message" rather than as an error.
pub trait ByteStream: Read + Write {
    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Drops everything currently waiting in the input buffer.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl ByteStream for Box<dyn serialport::SerialPort> {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        Ok(self.clear(serialport::ClearBuffer::Input)?)
    }
}

/// How a stream of bytes splits into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One frame per `\n`-terminated line.
    Line,
    /// Every frame is exactly this many bytes.
    Fixed(usize),
}

/// Every frame written to a [`ScriptedStream`], in order.
pub type FrameLog = Rc<RefCell<Vec<Vec<u8>>>>;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8>>;

/// An in-memory device emulator.
///
/// Written bytes are split into frames using the configured [`Framing`]; each
/// complete frame is handed to the responder closure and whatever it returns
/// is queued for reading. Reading from an empty queue times out, the same way
/// a serial port does when nothing answers.
pub struct ScriptedStream {
    framing: Framing,
    responder: Responder,
    partial: Vec<u8>,
    pending: VecDeque<u8>,
    log: FrameLog,
}

impl ScriptedStream {
    pub fn new(framing: Framing, responder: impl FnMut(&[u8]) -> Vec<u8> + 'static) -> Self {
        ScriptedStream {
            framing,
            responder: Box::new(responder),
            partial: Vec::new(),
            pending: VecDeque::new(),
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// A stream where nothing ever answers.
    pub fn silent(framing: Framing) -> Self {
        Self::new(framing, |_| Vec::new())
    }

    /// Returns a handle onto the log of written frames.
    pub fn log(&self) -> FrameLog {
        self.log.clone()
    }

    /// Queues bytes as if the device had sent them unprompted.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    fn take_frame(&mut self) -> Option<Vec<u8>> {
        match self.framing {
            Framing::Line => {
                let end = self.partial.iter().position(|b| *b == b'\n')?;
                Some(self.partial.drain(..=end).collect())
            }
            Framing::Fixed(len) => {
                if len == 0 || self.partial.len() < len {
                    return None;
                }
                Some(self.partial.drain(..len).collect())
            }
        }
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "scripted stream has no data"));
        }

        let n = usize::min(buf.len(), self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.partial.extend_from_slice(buf);

        // Answer every frame that is now complete
        while let Some(frame) = self.take_frame() {
            let reply = (self.responder)(&frame);
            self.log.borrow_mut().push(frame);
            self.pending.extend(reply);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteStream for ScriptedStream {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.pending.len())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_framing_answers_each_line() {
        let mut stream = ScriptedStream::new(Framing::Line, |frame| {
            let mut reply = b"echo ".to_vec();
            reply.extend_from_slice(frame);
            reply
        });
        let log = stream.log();

        stream.write_all(b"/1 0\r\n/2").unwrap();
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(stream.bytes_available().unwrap(), 11);

        stream.write_all(b" 0\r\n").unwrap();
        assert_eq!(log.borrow()[1], b"/2 0\r\n".to_vec());
    }

    #[test]
    fn empty_queue_times_out() {
        let mut stream = ScriptedStream::silent(Framing::Fixed(6));
        let mut buf = [0u8; 6];
        let err = stream.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn discard_drops_pending_input() {
        let mut stream = ScriptedStream::silent(Framing::Fixed(6));
        stream.push_input(&[1, 2, 3]);
        stream.discard_input().unwrap();
        assert_eq!(stream.bytes_available().unwrap(), 0);
    }
}
