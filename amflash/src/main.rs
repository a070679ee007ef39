mod cli;
mod config;
mod ops;
mod progress;
mod serial;

use amflash_lib::{FlashSession, SerialTransport, SessionConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::process;

use crate::cli::{Cli, Settings, merge_config};
use crate::config::AmflashConfig;
use crate::ops::Action;

fn open_session(settings: &Settings) -> Result<FlashSession<SerialTransport>> {
    let port = match &settings.port {
        Some(port) => {
            // On macOS, convert /dev/tty.* to /dev/cu.*
            let port = serial::normalize_port_name(port);
            serial::check_port_available(&port)?;
            port
        }
        None => serial::select_port()?,
    };

    let transport = SerialTransport::open(&port, settings.baud)
        .with_context(|| format!("Failed to open serial port '{}'", port))?;

    let session = FlashSession::connect(
        transport,
        SessionConfig::with_pacing(settings.pacing),
        progress::create_progress_callback(settings.quiet),
    )
    .context("Failed to connect to the flash interface")?;

    let identity = session.identity();
    println!("Manufacturer ID: 0x{:02X}", identity.manufacturer_id);
    println!("Device ID: 0x{:02X} ({})", identity.device_id, identity.variant());
    Ok(session)
}

fn run(args: Cli) -> Result<()> {
    let config = match &args.config {
        Some(path) => Some(AmflashConfig::from_file(path)?),
        None => None,
    };
    let settings = merge_config(&args, config)?;

    let action = Action::from_command(&args.command)?;
    if let Action::Layout {
        variant: Some(variant),
    } = action
    {
        ops::print_layout(variant);
        return Ok(());
    }

    let mut session = open_session(&settings)?;
    ops::execute(&mut session, &settings, action)
}

fn main() {
    // Log level can be controlled by setting the RUST_LOG environment variable, e.g.:
    // RUST_LOG=debug, RUST_LOG=amflash_lib=trace, RUST_LOG=info
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Cli::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
