//! hp-gadget driver binary
//!
//! Attaches to hp-gadget PWM peripherals on this host and exposes each of
//! their bulk-OUT endpoints as a node that can be opened, read and written.

use anyhow::{Context, Result};
use clap::Parser;
use common::{DriverBridge, DriverCommand, DriverEvent, create_driver_bridge, setup_logging};
use driver::config::DriverConfig;
use driver::console::run_console;
use driver::controller::Driver;
use driver::nodes::NodeTable;
use driver::usb::spawn_usb_worker;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "hp-gadget")]
#[command(author, version, about = "hp-gadget USB PWM driver")]
#[command(long_about = "
Driver for the hp-gadget USB PWM peripheral. Every bulk-OUT endpoint of an
attached device becomes a node named hp-gadget<N>pwm<I> that holds one
integer value.

EXAMPLES:
    # Interactive console
    hp-gadget

    # List attached devices and their nodes
    hp-gadget --list-nodes --json

    # Run headless until Ctrl+C
    hp-gadget --service

CONFIGURATION:
    The driver looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/hp-gadget/driver.toml
    3. /etc/hp-gadget/driver.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Run headless until Ctrl+C (no console)
    #[arg(long)]
    service: bool,

    /// List attached devices and their nodes, then exit
    #[arg(long)]
    list_nodes: bool,

    /// Print the node listing as JSON
    #[arg(long, requires = "list_nodes")]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = DriverConfig::default();
        let path = DriverConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => DriverConfig::load_from(path).context("Failed to load configuration")?,
        None => DriverConfig::load(None).unwrap_or_else(|e| {
            eprintln!("Failed to load config: {:#}, using defaults", e);
            DriverConfig::default()
        }),
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.driver.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("hp-gadget driver v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let table = Arc::new(NodeTable::new());
    let driver = Arc::new(Driver::new(
        table.clone(),
        table.clone(),
        config.transfer_timeout(),
    ));

    let (bridge, worker) = create_driver_bridge();
    let worker_handle = spawn_usb_worker(worker, driver, config.usb.filters.clone())
        .context("Failed to spawn USB worker thread")?;

    let result = if args.list_nodes {
        list_nodes_mode(&bridge, args.json).await
    } else {
        let events = tokio::spawn(log_events(bridge.clone()));

        let result = if args.service || config.driver.service_mode {
            info!("Running in service mode (headless)");
            run_service().await
        } else {
            info!("Running in console mode (interactive)");
            tokio::task::spawn_blocking(move || {
                run_console(table, std::io::stdin().lock(), std::io::stdout())
            })
            .await
            .context("Console task failed")?
        };

        events.abort();
        result
    };

    info!("Shutting down USB subsystem...");
    if let Err(e) = bridge.send_command(DriverCommand::Shutdown).await {
        // Worker already gone, e.g. no USB access
        warn!("Could not send Shutdown command: {}", e);
    }

    match worker_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("USB worker failed: {}", e),
        Err(e) => error!("USB worker thread panicked: {:?}", e),
    }

    result
}

/// Print the attached devices with their nodes
async fn list_nodes_mode(bridge: &DriverBridge, json: bool) -> Result<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    bridge
        .send_command(DriverCommand::ListDevices { response: tx })
        .await
        .context("Failed to send ListDevices command")?;

    let devices = rx.await.context("Failed to receive device list")?;

    if json {
        let text = serde_json::to_string_pretty(&devices).context("Failed to encode devices")?;
        println!("{}", text);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No hp-gadget devices attached.");
        return Ok(());
    }

    println!("Found {} hp-gadget device(s):\n", devices.len());
    for device in devices {
        println!(
            "  [{}] Bus {:03} Device {:03} Interface {}",
            device.class, device.bus_number, device.device_address, device.interface
        );
        for node in &device.nodes {
            println!(
                "      {:<22} {:>8}  ep {:#04x}",
                node.name,
                node.dev.to_string(),
                node.endpoint
            );
        }
        println!();
    }

    Ok(())
}

/// Run until Ctrl+C
async fn run_service() -> Result<()> {
    info!("Press Ctrl+C to shutdown");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }

    Ok(())
}

/// Log attach/detach events from the USB worker
async fn log_events(bridge: DriverBridge) {
    while let Ok(event) = bridge.recv_event().await {
        match event {
            DriverEvent::DeviceAttached { slot, nodes } => {
                let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
                info!("hp-gadget{} attached: {}", slot, names.join(", "));
            }
            DriverEvent::DeviceDetached { slot } => {
                info!("hp-gadget{} detached", slot);
            }
            DriverEvent::AttachFailed {
                bus_number,
                device_address,
                error,
            } => {
                warn!(
                    "Device {:03}:{:03} refused: {}",
                    bus_number, device_address, error
                );
            }
        }
    }
}
