//! Finding and opening system serial ports.

use std::time::Duration;

use serialport::{SerialPort, SerialPortInfo, SerialPortType};

use crate::errors::Result;

/// The usual speed of text protocol devices.
pub const ASCII_BAUD_RATE: u32 = 115200;

/// The usual speed of binary protocol devices.
pub const BINARY_BAUD_RATE: u32 = 9600;

/// A serial port found on this computer.
///
/// # Members
///
/// * `name` - The path or name to pass to [`open_port`]
/// * `description` - What the operating system says is behind the port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortListing {
    pub name: String,
    pub description: String,
}

impl From<SerialPortInfo> for PortListing {
    fn from(info: SerialPortInfo) -> Self {
        // Describe the port as well as the system lets us
        let description = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let product = usb.product.unwrap_or_else(|| "USB serial".to_string());
                match usb.manufacturer {
                    Some(manufacturer) => format!("{} ({}) {:04x}:{:04x}", product, manufacturer, usb.vid, usb.pid),
                    None => format!("{} {:04x}:{:04x}", product, usb.vid, usb.pid),
                }
            }
            SerialPortType::PciPort => "PCI".to_string(),
            SerialPortType::BluetoothPort => "Bluetooth".to_string(),
            SerialPortType::Unknown => "unknown".to_string(),
        };

        PortListing {
            name: info.port_name,
            description,
        }
    }
}

/// Lists the serial ports on this computer.
pub fn available_ports() -> Result<Vec<PortListing>> {
    Ok(serialport::available_ports()?.into_iter().map(PortListing::from).collect())
}

/// Opens a serial port at 8N1 without flow control.
///
/// `timeout` bounds every read; a read that runs out of time is how the
/// protocol layer notices that nothing answered.
pub fn open_port(path: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(path, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(timeout)
        .open()?;
    Ok(port)
}
