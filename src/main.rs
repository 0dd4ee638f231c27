//! CLI entry point for seed_daq
//!
//! # Usage
//!
//! ```bash
//! seed_daq --simulate status
//! seed_daq --simulate set wavelength 1086.85
//! seed_daq --simulate poll --interval-ms 500 --ticks 10
//! seed_daq --simulate stabilize wavelength --setpoint 1086.85 --max-wait 30s
//! seed_daq --simulate discover --name Basik
//! seed_daq ports
//! seed_daq config
//! ```
//!
//! The vendor transport is supplied by the embedding application through
//! the `Transport` trait; this binary drives the in-process simulated module.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use seed_daq::config::Settings;
use seed_daq::control::{apply_property, Property};
use seed_daq::discovery::{find_devices, find_devices_by_names};
use seed_daq::hardware::simulated::SimulatedBasik;
use seed_daq::hardware::{shared, system_serial_ports, SharedTransport};
use seed_daq::laser::BasikDriver;
use seed_daq::logging;
use seed_daq::monitor::{PollHandle, PollLoop, PollSnapshot, Quantity, StabilizationMonitor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "seed_daq")]
#[command(about = "Control and monitor NKT Basik seed lasers", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = seed_daq::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Drive the in-process simulated module
    #[arg(long, global = true)]
    simulate: bool,

    /// Serial port (overrides the configuration)
    #[arg(long, global = true)]
    port: Option<String>,

    /// Device index on the port (overrides the configuration)
    #[arg(long, global = true)]
    device_id: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read every polled field once and print the table
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set a property from text, e.g. `set mod_range narrow`
    Set {
        /// Property name
        property: String,
        /// Value as typed by the user
        value: String,
    },

    /// Poll the configured fields periodically
    Poll {
        /// Milliseconds between ticks
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Stop after this many ticks; runs until Ctrl+C otherwise
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Wait until wavelength or frequency settles at its setpoint
    Stabilize {
        /// wavelength or frequency
        quantity: Quantity,
        /// Move the setpoint first (nm or GHz)
        #[arg(long)]
        setpoint: Option<f64>,
        /// Largest deviation counted as in tolerance
        #[arg(long)]
        tolerance: Option<f64>,
        /// Give up after this long, e.g. `90s`
        #[arg(long, value_parser = parse_duration)]
        max_wait: Option<Duration>,
    },

    /// Scan ports for modules
    Discover {
        /// Only report modules with these names
        #[arg(long)]
        name: Vec<String>,
        /// Only scan these ports
        #[arg(long = "scan-port")]
        scan_ports: Vec<String>,
    },

    /// List serial ports on this machine
    Ports,

    /// Print the effective configuration as JSON
    Config,
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(text).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(port) = &cli.port {
        settings.connection.port = port.clone();
    }
    if let Some(device_id) = cli.device_id {
        settings.connection.device_id = device_id;
    }
    logging::init_from_settings(&settings).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Ports => {
            for port in system_serial_ports() {
                println!("{}", port);
            }
            Ok(())
        }
        Commands::Discover { name, scan_ports } => {
            let transport = transport(cli.simulate, &settings)?;
            discover(&transport, &name, &scan_ports).await
        }
        Commands::Status { json } => {
            let laser = connect(cli.simulate, &settings).await?;
            let result = status(&laser, &settings, json).await;
            close(&laser).await;
            result
        }
        Commands::Set { property, value } => {
            let laser = connect(cli.simulate, &settings).await?;
            let result = set(&laser, &property, &value).await;
            close(&laser).await;
            result
        }
        Commands::Poll { interval_ms, ticks } => {
            if let Some(ms) = interval_ms {
                settings.polling.interval_ms = ms;
                settings.validate()?;
            }
            let laser = Arc::new(connect(cli.simulate, &settings).await?);
            let result = poll(laser.clone(), &settings, ticks).await;
            close(&laser).await;
            result
        }
        Commands::Stabilize {
            quantity,
            setpoint,
            tolerance,
            max_wait,
        } => {
            let laser = connect(cli.simulate, &settings).await?;
            let result = stabilize(&laser, &settings, quantity, setpoint, tolerance, max_wait).await;
            close(&laser).await;
            result
        }
    }
}

fn transport(simulate: bool, settings: &Settings) -> Result<SharedTransport> {
    if !simulate {
        bail!("No hardware transport is linked into this binary; pass --simulate");
    }
    let sim = SimulatedBasik::new(&settings.connection.port, settings.connection.device_id)
        .with_relaxation(0.4);
    Ok(shared(sim))
}

async fn connect(simulate: bool, settings: &Settings) -> Result<BasikDriver> {
    let transport = transport(simulate, settings)?;
    let connection = &settings.connection;
    BasikDriver::open(transport, &connection.port, connection.device_id)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to {} (device {})",
                connection.port, connection.device_id
            )
        })
}

async fn close(laser: &BasikDriver) {
    if let Err(err) = laser.close().await {
        warn!(error = %err, "Failed to close device");
    }
}

fn print_table(snapshot: &PollSnapshot) {
    let rows = snapshot.table();
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    for (label, value) in rows {
        println!("{:<width$}  {}", label, value, width = width);
    }
}

async fn status(laser: &BasikDriver, settings: &Settings, json: bool) -> Result<()> {
    let mut poll = PollLoop::new(settings.polling.poll_settings());
    let snapshot = poll.tick(laser).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        let name = laser.name().await.context("Failed to read module name")?;
        let serial = laser
            .serial_number()
            .await
            .context("Failed to read serial number")?;
        println!("{} ({}) on {}", name, serial, laser.port());
        print_table(&snapshot);
    }
    Ok(())
}

async fn set(laser: &BasikDriver, property: &str, value: &str) -> Result<()> {
    let property: Property = property.parse()?;
    let message = apply_property(laser, property, value)
        .await
        .with_context(|| format!("Failed to set {}", property))?;
    println!("{}", message);
    Ok(())
}

async fn poll(laser: Arc<BasikDriver>, settings: &Settings, ticks: Option<u64>) -> Result<()> {
    let handle = PollHandle::spawn(PollLoop::new(settings.polling.poll_settings()), laser, true);
    let mut snapshots = handle.subscribe();
    let mut seen = 0u64;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = snapshots.borrow_and_update().clone();
                if let Some(snapshot) = latest {
                    println!("--- tick {} ({:.1} s)", snapshot.tick, snapshot.elapsed);
                    print_table(&snapshot);
                    seen += 1;
                }
                if ticks.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let poll = handle.shutdown().await?;
    info!(ticks = poll.ticks(), "Polling finished");
    Ok(())
}

async fn stabilize(
    laser: &BasikDriver,
    settings: &Settings,
    quantity: Quantity,
    setpoint: Option<f64>,
    tolerance: Option<f64>,
    max_wait: Option<Duration>,
) -> Result<()> {
    let mut monitor_settings = settings.stabilization.monitor_settings()?;
    monitor_settings.quantity = quantity;
    if let Some(tolerance) = tolerance {
        monitor_settings.tolerance = tolerance;
    }
    if max_wait.is_some() {
        monitor_settings.max_wait = max_wait;
    }

    if let Some(target) = setpoint {
        match quantity {
            Quantity::Wavelength => laser.set_wavelength_setpoint(target).await?,
            Quantity::Frequency => laser.set_frequency_setpoint(target).await?,
        }
        println!("{} setpoint -> {} {}", quantity, target, quantity.unit());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(true);
        }
    });

    let outcome = StabilizationMonitor::new(monitor_settings)
        .wait(laser, Some(stop_rx))
        .await
        .context("Stabilization failed")?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn discover(transport: &SharedTransport, names: &[String], ports: &[String]) -> Result<()> {
    let ports = (!ports.is_empty()).then_some(ports);
    if names.is_empty() {
        let devices = find_devices(transport, ports).await?;
        if devices.is_empty() {
            println!("No modules found");
        }
        for device in devices {
            println!("{}", device);
        }
    } else {
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        for (name, devices) in find_devices_by_names(transport, &names, ports).await? {
            println!("{}: {} found", name, devices.len());
            for device in devices {
                println!("  {}", device);
            }
        }
    }
    Ok(())
}
