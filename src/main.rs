//! CLI entry point for plate_logger
//!
//! Provides commands for:
//! - Listing serial ports and spotting the plate bridge
//! - Discovering attached plates
//! - Writing a starting setup file
//! - Logging selected channels to CSV
//!
//! # Usage
//!
//! ```bash
//! plate_logger discover
//! plate_logger setup --output bench.stp --enable-all
//! plate_logger run --log run1.csv --setup bench.stp --count 3 --period 0.5
//! plate_logger --simulate DAQC2:0,THERMO:1 run --log demo.csv --enable-all --count 10
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plate_logger::acquisition::{self, LoggerEvent};
use plate_logger::adapters::port_discovery::{self, parse_id};
use plate_logger::adapters::{SerialAdapter, SimulatedBridge, Transport};
use plate_logger::config::Settings;
use plate_logger::plate::TemperatureScale;
use plate_logger::{tracing_init, PlateLogger};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Parser)]
#[command(name = "plate_logger")]
#[command(about = "Serial data logger for measurement plates", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use a simulated bridge with these plates instead of hardware, e.g. DAQC2:0,THERMO:1
    #[arg(long, global = true, value_name = "FAMILY:ADDR,...")]
    simulate: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports and mark the bridge
    Ports,

    /// Discover attached plates
    Discover {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a setup file for the attached plates
    Setup {
        /// Setup file to write
        #[arg(long)]
        output: PathBuf,

        /// Enable every channel
        #[arg(long)]
        enable_all: bool,
    },

    /// Log selected channels to a CSV file
    Run {
        /// CSV log file
        #[arg(long)]
        log: PathBuf,

        /// Setup file to apply before logging
        #[arg(long)]
        setup: Option<PathBuf>,

        /// Number of samples to log
        #[arg(long)]
        count: Option<String>,

        /// Seconds between samples (floor-clamped to the hardware minimum)
        #[arg(long)]
        period: Option<String>,

        /// Enable every channel
        #[arg(long)]
        enable_all: bool,

        /// Temperature scale: c, f or k
        #[arg(long)]
        scale: Option<TemperatureScale>,
    },
}

#[derive(Serialize)]
struct DiscoveryReport {
    modules: Vec<plate_logger::registry::ModuleSummary>,
    min_sample_period: f64,
    fingerprint: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("Failed to load configuration")?;
    tracing_init::init_from_settings(&settings)?;

    match cli.command {
        Commands::Ports => list_ports(&settings),
        Commands::Discover { json } => {
            let logger = open_logger(&settings, cli.simulate.as_deref()).await?;
            print_discovery(&logger, json)
        }
        Commands::Setup { output, enable_all } => {
            let mut logger = open_logger(&settings, cli.simulate.as_deref()).await?;
            if enable_all {
                logger.registry_mut().select_all();
            }
            logger
                .save_setup(&output)
                .with_context(|| format!("Failed to write setup file {}", output.display()))?;
            println!("Setup written to {}", output.display());
            Ok(())
        }
        Commands::Run {
            log,
            setup,
            count,
            period,
            enable_all,
            scale,
        } => {
            let mut logger = open_logger(&settings, cli.simulate.as_deref()).await?;
            if let Some(setup) = &setup {
                logger
                    .load_setup(setup)
                    .with_context(|| format!("Setup file {} not applied", setup.display()))?;
            }
            if enable_all {
                logger.registry_mut().select_all();
            }
            if let Some(count) = &count {
                logger.set_sample_count_text(count)?;
            }
            if let Some(period) = &period {
                logger.set_sample_period_text(period);
            }
            if let Some(scale) = scale {
                logger.set_temperature_scale(scale);
            }
            run_logging(logger, &log).await
        }
    }
}

async fn open_transport(settings: &Settings, simulate: Option<&str>) -> Result<Box<dyn Transport>> {
    if let Some(spec) = simulate {
        let bridge = SimulatedBridge::from_spec(spec).context("Invalid --simulate value")?;
        return Ok(Box::new(bridge));
    }

    let port = port_discovery::select_port(&settings.serial)
        .context("Plate bridge not found; is it plugged in?")?;
    let mut adapter = SerialAdapter::from_config(port, &settings.serial);
    adapter.connect().await?;
    Ok(Box::new(adapter))
}

async fn open_logger(
    settings: &Settings,
    simulate: Option<&str>,
) -> Result<PlateLogger<Box<dyn Transport>>> {
    let transport = open_transport(settings, simulate).await?;
    println!("Discovering plates on {}...", transport.name());
    let logger = PlateLogger::discover(transport, &settings.acquisition).await?;
    if logger.registry().is_empty() {
        warn!("No plates found");
    }
    Ok(logger)
}

fn list_ports(settings: &Settings) -> Result<()> {
    let vid = parse_id(&settings.serial.vendor_id)?;
    let pid = parse_id(&settings.serial.product_id)?;
    let ports = port_discovery::available_ports()?;

    if ports.is_empty() {
        println!("No serial ports found!");
        return Ok(());
    }

    for port in &ports {
        let (port_vid, port_pid) = port.ids();
        let ids = match (port_vid, port_pid) {
            (Some(v), Some(p)) => format!("{v:04X}:{p:04X}"),
            _ => "----:----".to_string(),
        };
        let marker = if port.matches(vid, pid) { "  <- bridge" } else { "" };
        println!("{:<24} {ids}{marker}", port.name);
    }
    Ok(())
}

fn print_discovery<T: Transport>(logger: &PlateLogger<T>, json: bool) -> Result<()> {
    let registry = logger.registry();
    let report = DiscoveryReport {
        modules: registry.summaries(),
        min_sample_period: registry.min_sample_period(),
        fingerprint: registry.fingerprint(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for module in &report.modules {
        println!(
            "{}-{}: {} channels",
            module.family, module.address, module.channels
        );
    }
    println!(
        "Minimum sample period: {:.3} s",
        report.min_sample_period
    );
    println!("Fingerprint: {}", report.fingerprint.join(","));
    Ok(())
}

async fn run_logging(mut logger: PlateLogger<Box<dyn Transport>>, log: &Path) -> Result<()> {
    logger
        .select_log_file(log)
        .with_context(|| format!("Cannot create log file {}", log.display()))?;
    logger.start_logging()?;
    println!(
        "Logging {} channels, {} samples every {:.3} s (about {:.1} s)",
        logger.session().header().len(),
        logger.sample_count(),
        logger.effective_period(),
        logger.estimated_duration().as_secs_f64()
    );
    println!("Date/Time,{}", logger.session().header().join(","));

    let logger = Arc::new(Mutex::new(logger));
    let handle = acquisition::spawn(logger.clone());
    let mut events = handle.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(LoggerEvent::Sample { row, .. }) => println!("{row}"),
                Ok(LoggerEvent::Status(status)) => eprintln!("{status}"),
                Ok(LoggerEvent::Completed { rows }) => {
                    println!("Logging complete: {rows} rows written to {}", log.display());
                    break;
                }
                Ok(LoggerEvent::Stopped) => {
                    println!("Logging stopped");
                    break;
                }
                Ok(LoggerEvent::Failed(_)) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Status display fell behind"),
            },
            _ = tokio::signal::ctrl_c() => handle.stop(),
        }
    }

    handle.join().await?;
    Ok(())
}
