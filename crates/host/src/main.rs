//! aoa-host
//!
//! Switches an Android device into accessory mode, then echoes every message
//! it receives back to the device.

use accessory::{Negotiator, RusbTransport};
use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use host::config::{HostConfig, parse_hex_id};
use host::{devices, run_echo};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "aoa-host")]
#[command(
    author,
    version,
    about = "AOA host - Talk to Android devices in accessory mode"
)]
#[command(long_about = "
Switches an Android device into Android Open Accessory mode over USB and
echoes every message it sends back to it.

EXAMPLES:
    # Run with default config
    aoa-host

    # Switch a specific device
    aoa-host --vendor-id 0x2717 --product-id 0xff40

    # List USB devices and exit
    aoa-host --list-devices

    # Echo ten messages with debug logging
    aoa-host --max-messages 10 --log-level debug

CONFIGURATION:
    The host looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/aoa-host/host.toml
    3. /etc/aoa-host/host.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Vendor ID of the device to switch (e.g. 0x2717)
    #[arg(long, value_name = "HEX")]
    vendor_id: Option<String>,

    /// Product ID of the device to switch (e.g. 0xff40)
    #[arg(long, value_name = "HEX")]
    product_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Stop after echoing this many messages
    #[arg(long, value_name = "N")]
    max_messages: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = HostConfig::default();
        let path = HostConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        HostConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        HostConfig::load_or_default()
    };

    // CLI flags win over the file
    if let Some(vid) = args.vendor_id {
        parse_hex_id(&vid, "vendor_id")?;
        config.device.vendor_id = vid;
    }
    if let Some(pid) = args.product_id {
        parse_hex_id(&pid, "product_id")?;
        config.device.product_id = pid;
    }
    if args.max_messages.is_some() {
        config.host.max_messages = args.max_messages;
    }

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.host.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("aoa-host v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let transport = RusbTransport::new().context("Failed to initialize libusb")?;

    if args.list_devices {
        info!("Listing USB devices...");
        devices::print_devices(&transport).context("Failed to list USB devices")?;
        return Ok(());
    }

    let identity = config.identity()?;
    let negotiator = Negotiator::new(transport, config.negotiator_config());

    info!("Opening accessory via {}", identity);
    let mut session = negotiator
        .open(identity, &config.descriptor())
        .context("Failed to open accessory")?;
    info!(
        "Accessory {} ready on endpoints {}",
        session.identity(),
        session.endpoints()
    );

    let result = run_echo(&mut session, &config.echo_options(), |message| {
        println!(
            "read {} bytes: {}",
            message.len(),
            String::from_utf8_lossy(message)
        );
    });
    session.close();

    match result {
        Ok(stats) => {
            info!(
                "Done: {} messages, {} bytes in, {} bytes out",
                stats.messages, stats.bytes_read, stats.bytes_written
            );
            Ok(())
        }
        Err(e) => {
            error!("Echo loop stopped: {}", e);
            Err(e).context("Accessory transfer failed")
        }
    }
}
