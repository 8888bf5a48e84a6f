use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use zaber_serial::catalog::TableCatalog;
use zaber_serial::config::ConnectionConfig;
use zaber_serial::device::{Device, Motion};
use zaber_serial::io::ByteStream;
use zaber_serial::protocol::Protocol;
use zaber_serial::serial;

#[derive(Parser)]
#[command(name = "zaber-serial")]
#[command(about = "Find and inspect motion controllers on a serial port", long_about = None)]
struct Cli {
    /// More logging; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the serial ports on this computer
    Ports,

    /// Detect the protocol on a port and list the devices on it
    Scan {
        /// Serial port to open; falls back to the config file
        port: Option<String>,

        /// Line speed
        #[arg(long)]
        baud: Option<u32>,

        /// TOML device table used to name devices
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// TOML connection settings
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match cli.command {
        Commands::Ports => list_ports(),
        Commands::Scan {
            port,
            baud,
            catalog,
            config,
        } => scan(port, baud, catalog, config),
    }
}

fn list_ports() -> anyhow::Result<()> {
    let ports = serial::available_ports()?;
    if ports.is_empty() {
        info!("no serial ports found");
    }
    for port in ports {
        println!("{}\t{}", port.name, port.description);
    }
    Ok(())
}

fn scan(
    port: Option<String>,
    baud: Option<u32>,
    catalog: Option<PathBuf>,
    config: Option<PathBuf>,
) -> anyhow::Result<()> {
    // Command line options override the config file
    let mut config = match config {
        Some(path) => ConnectionConfig::load(&path).with_context(|| format!("reading {}", path.display()))?,
        None => ConnectionConfig::default(),
    };
    if port.is_some() {
        config.port = port;
    }
    if let Some(baud) = baud {
        config.baud_rate = baud;
    }
    if catalog.is_some() {
        config.catalog = catalog;
    }

    let path = match &config.port {
        Some(path) => path.clone(),
        None => bail!("no serial port given"),
    };
    let catalog = match &config.catalog {
        Some(file) => TableCatalog::load(file).with_context(|| format!("reading {}", file.display()))?,
        None => TableCatalog::default(),
    };

    let stream = serial::open_port(&path, config.baud_rate, config.timeout())
        .with_context(|| format!("opening {}", path))?;
    let protocol = match Protocol::detect_with(stream, config.settle())? {
        Some(protocol) => protocol,
        None => bail!("no devices answered on {} at {} baud", path, config.baud_rate),
    };
    info!(port = %path, protocol = ?protocol.kind(), "protocol detected");

    let mut devices = protocol.enumerate_devices(&catalog)?;
    info!(count = devices.len(), "enumeration finished");
    for device in devices.iter_mut() {
        device.set_motion_timeout(config.motion_timeout());
    }
    for device in &devices {
        print_device(device);
    }
    Ok(())
}

fn print_device<S: ByteStream>(device: &Device<S>) {
    let info = device.info();
    println!(
        "{:>3}  {}  (device {}, firmware {})",
        info.address, info.name, info.device_id, info.firmware
    );

    for axis in device.axes() {
        let axis = axis.info();
        println!("       axis {}  {}  (peripheral {})", axis.axis, axis.name, axis.peripheral_id);
    }

    if let Some(io) = device.io() {
        let counts = io.counts();
        println!(
            "       io  ai {}  ao {}  di {}  do {}",
            counts.analog_inputs, counts.analog_outputs, counts.digital_inputs, counts.digital_outputs
        );
    }
}
