//! Analog and digital I/O channels on a device.
//!
//! Channels are numbered from 1. Digital reads and writes without an index
//! work on every channel at once, channel 1 first.

use crate::errors::{Error, Result, ValidationError};
use crate::io::ByteStream;
use crate::message::ascii::format_number;
use crate::message::binary::BinaryCommand;
use crate::message::AsciiMessage;
use crate::protocol::{AsciiPort, BinaryPort, SharedPort};

/// Binary analog readings are in units of 0.1 mV.
pub const BINARY_ANALOG_SCALE: f64 = 0.0001;

/// How many channels of each kind a device has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoCounts {
    pub analog_inputs: usize,
    pub analog_outputs: usize,
    pub digital_inputs: usize,
    pub digital_outputs: usize,
}

impl IoCounts {
    /// True when the device has at least one channel.
    pub fn any(&self) -> bool {
        self.analog_inputs + self.analog_outputs + self.digital_inputs + self.digital_outputs > 0
    }
}

/// The I/O operations both protocols provide.
pub trait IoPort {
    fn counts(&self) -> IoCounts;

    /// Reads an analog input in volts.
    fn read_analog_input(&self, index: usize) -> Result<f64>;

    /// Sets an analog output in volts.
    fn write_analog_output(&self, index: usize, value: f64) -> Result<()>;

    fn read_analog_output(&self, index: usize) -> Result<f64>;

    /// Reads one digital input, or all of them when `index` is `None`.
    fn read_digital_input(&self, index: Option<usize>) -> Result<Vec<bool>>;

    /// Sets consecutive digital outputs starting at channel `start`.
    fn write_digital_output(&self, start: usize, bits: &[bool]) -> Result<()>;

    /// Reads one digital output, or all of them when `index` is `None`.
    fn read_digital_output(&self, index: Option<usize>) -> Result<Vec<bool>>;
}

fn check_index(index: usize, count: usize) -> Result<()> {
    if index == 0 || index > count {
        return Err(ValidationError::IndexOutOfRange { index, count }.into());
    }
    Ok(())
}

fn check_span(start: usize, len: usize, count: usize) -> Result<()> {
    check_index(start, count)?;
    if len > 0 {
        check_index(start + len - 1, count)?;
    }
    Ok(())
}

/// Channel 1 is the lowest bit.
fn mask_to_bits(mask: i32, count: usize) -> Vec<bool> {
    (0..count.min(32)).map(|i| mask & (1 << i) != 0).collect()
}

fn bits_to_mask(bits: &[bool]) -> i32 {
    bits.iter()
        .take(32)
        .enumerate()
        .fold(0, |mask, (i, bit)| if *bit { mask | (1 << i) } else { mask })
}

/// I/O over the text protocol.
pub struct AsciiIoPort<S> {
    port: SharedPort<AsciiPort<S>>,
    address: u8,
    counts: IoCounts,
}

impl<S: ByteStream> AsciiIoPort<S> {
    pub fn new(port: SharedPort<AsciiPort<S>>, address: u8, counts: IoCounts) -> Self {
        AsciiIoPort { port, address, counts }
    }

    fn query(&self, command: &str) -> Result<AsciiMessage> {
        super::ascii::query(&self.port, self.address, 0, command)
    }

    fn first_value(&self, command: &str) -> Result<f64> {
        super::ascii::first_number(&self.query(command)?)
    }

    fn read_bits(&self, command: &str) -> Result<Vec<bool>> {
        Ok(self.query(command)?.data().iter().map(|v| *v != 0.0).collect())
    }
}

impl<S: ByteStream> IoPort for AsciiIoPort<S> {
    fn counts(&self) -> IoCounts {
        self.counts
    }

    fn read_analog_input(&self, index: usize) -> Result<f64> {
        check_index(index, self.counts.analog_inputs)?;
        self.first_value(&format!("io get ai {}", index))
    }

    fn write_analog_output(&self, index: usize, value: f64) -> Result<()> {
        check_index(index, self.counts.analog_outputs)?;
        self.query(&format!("io set ao {} {}", index, format_number(value)))?;
        Ok(())
    }

    fn read_analog_output(&self, index: usize) -> Result<f64> {
        check_index(index, self.counts.analog_outputs)?;
        self.first_value(&format!("io get ao {}", index))
    }

    fn read_digital_input(&self, index: Option<usize>) -> Result<Vec<bool>> {
        match index {
            Some(i) => {
                check_index(i, self.counts.digital_inputs)?;
                self.read_bits(&format!("io get di {}", i))
            }
            None => self.read_bits("io get di port"),
        }
    }

    fn write_digital_output(&self, start: usize, bits: &[bool]) -> Result<()> {
        check_span(start, bits.len(), self.counts.digital_outputs)?;

        if start == 1 && bits.len() == self.counts.digital_outputs {
            let values: Vec<&str> = bits.iter().map(|b| if *b { "1" } else { "0" }).collect();
            self.query(&format!("io set do port {}", values.join(" ")))?;
            return Ok(());
        }

        for (offset, bit) in bits.iter().enumerate() {
            self.query(&format!("io set do {} {}", start + offset, u8::from(*bit)))?;
        }
        Ok(())
    }

    fn read_digital_output(&self, index: Option<usize>) -> Result<Vec<bool>> {
        match index {
            Some(i) => {
                check_index(i, self.counts.digital_outputs)?;
                self.read_bits(&format!("io get do {}", i))
            }
            None => self.read_bits("io get do port"),
        }
    }
}

/// I/O over the binary protocol. Analog outputs are not available.
pub struct BinaryIoPort<S> {
    port: SharedPort<BinaryPort<S>>,
    address: u8,
    message_ids: bool,
    counts: IoCounts,
}

impl<S: ByteStream> BinaryIoPort<S> {
    pub fn new(port: SharedPort<BinaryPort<S>>, address: u8, message_ids: bool, counts: IoCounts) -> Self {
        BinaryIoPort {
            port,
            address,
            message_ids,
            counts,
        }
    }

    fn query(&self, command: BinaryCommand, data: i64) -> Result<i32> {
        let reply = super::binary::query(&self.port, self.address, self.message_ids, command, data)?;
        Ok(reply.data())
    }
}

impl<S: ByteStream> IoPort for BinaryIoPort<S> {
    fn counts(&self) -> IoCounts {
        self.counts
    }

    fn read_analog_input(&self, index: usize) -> Result<f64> {
        check_index(index, self.counts.analog_inputs)?;
        let raw = self.query(BinaryCommand::ReadAnalogInput, index as i64)?;
        Ok(raw as f64 * BINARY_ANALOG_SCALE)
    }

    fn write_analog_output(&self, _index: usize, _value: f64) -> Result<()> {
        Err(Error::Unsupported("analog outputs over the binary protocol"))
    }

    fn read_analog_output(&self, _index: usize) -> Result<f64> {
        Err(Error::Unsupported("analog outputs over the binary protocol"))
    }

    fn read_digital_input(&self, index: Option<usize>) -> Result<Vec<bool>> {
        match index {
            Some(i) => {
                check_index(i, self.counts.digital_inputs)?;
                Ok(vec![self.query(BinaryCommand::ReadDigitalInput, i as i64)? != 0])
            }
            None => {
                let mask = self.query(BinaryCommand::ReadDigitalInput, 0)?;
                Ok(mask_to_bits(mask, self.counts.digital_inputs))
            }
        }
    }

    fn write_digital_output(&self, start: usize, bits: &[bool]) -> Result<()> {
        check_span(start, bits.len(), self.counts.digital_outputs)?;

        if start == 1 && bits.len() == self.counts.digital_outputs {
            self.query(BinaryCommand::WriteDigitalOutput, bits_to_mask(bits) as i64)?;
            return Ok(());
        }

        // One write per channel, each keeping the others as they are
        for (offset, bit) in bits.iter().enumerate() {
            let mask = self.query(BinaryCommand::ReadDigitalOutput, 0)?;
            let channel = 1i32.checked_shl((start + offset - 1) as u32).unwrap_or(0);
            let mask = if *bit { mask | channel } else { mask & !channel };
            self.query(BinaryCommand::WriteDigitalOutput, mask as i64)?;
        }
        Ok(())
    }

    fn read_digital_output(&self, index: Option<usize>) -> Result<Vec<bool>> {
        match index {
            Some(i) => {
                check_index(i, self.counts.digital_outputs)?;
                Ok(vec![self.query(BinaryCommand::ReadDigitalOutput, i as i64)? != 0])
            }
            None => {
                let mask = self.query(BinaryCommand::ReadDigitalOutput, 0)?;
                Ok(mask_to_bits(mask, self.counts.digital_outputs))
            }
        }
    }
}
