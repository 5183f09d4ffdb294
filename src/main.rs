//! btscan - Bluetooth device scanner
//!
//! Usage:
//!   btscan scan [--duration S] [--json]
//!   btscan watch [--interval S] [--json]
//!   btscan adapters

use anyhow::Result;
use btscan::domain::models::{ScannedDevice, Transport};
use btscan::domain::settings::{Settings, SettingsService};
use btscan::infrastructure::bluetooth::{AdapterInventory, AdvertisementSource, ScanOrchestrator};
use btscan::infrastructure::logging::init_logger;
use btscan::infrastructure::process::{ProcessRunner, TokioProcessRunner};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "btscan")]
#[command(about = "Scan for nearby BLE and classic Bluetooth devices", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Adapter to use (e.g. hci1), overrides settings
    #[arg(long, global = true)]
    adapter: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scan cycle and print the devices found
    Scan {
        /// BLE scan window in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Scan repeatedly until interrupted
    Watch {
        /// Seconds between cycles
        #[arg(short, long)]
        interval: Option<u64>,

        /// Print one JSON object per sighting
        #[arg(long)]
        json: bool,
    },

    /// List local Bluetooth adapters
    Adapters,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings_service = SettingsService::new()?;
    let settings = settings_service.get_mut();
    if cli.adapter.is_some() {
        settings.scan.adapter = cli.adapter.clone();
    }
    if cli.verbose {
        settings.log_settings.level = "debug".to_string();
    }
    let settings = settings_service.get().clone();

    let _log_guard = init_logger(&settings.log_settings)?;
    info!("Starting btscan");

    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);

    match cli.command {
        Commands::Scan { duration, json } => {
            let orchestrator = ScanOrchestrator::from_settings(&settings, ble_source(&settings), runner);
            let duration = duration
                .map(Duration::from_secs)
                .unwrap_or_else(|| orchestrator.scan_duration());
            let devices = orchestrator.scan(duration).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else {
                print_table(&devices);
            }
        }
        Commands::Watch { interval, json } => {
            let orchestrator = ScanOrchestrator::from_settings(&settings, ble_source(&settings), runner);
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.scan.scan_interval());

            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Could not listen for Ctrl-C: {}", e);
                        return;
                    }
                    info!("Interrupted, stopping");
                    cancel.cancel();
                }
            });

            orchestrator
                .scan_continuous(
                    |device| {
                        if json {
                            match serde_json::to_string(&device) {
                                Ok(line) => println!("{}", line),
                                Err(e) => warn!("Could not encode {}: {}", device.address, e),
                            }
                        } else {
                            println!("{}", format_row(&device));
                        }
                    },
                    interval,
                    &cancel,
                )
                .await;
        }
        Commands::Adapters => {
            let adapters = AdapterInventory::new(runner).list_adapters().await;
            if adapters.is_empty() {
                println!("No adapters found");
            }
            for adapter in adapters {
                println!("{:<6} {}  {}", adapter.id, adapter.address, adapter.alias);
            }
        }
    }

    Ok(())
}

#[cfg(feature = "bluetooth")]
fn ble_source(settings: &Settings) -> Arc<dyn AdvertisementSource> {
    Arc::new(btscan::infrastructure::bluetooth::BtleplugSource::new(
        settings.scan.adapter.clone(),
    ))
}

#[cfg(not(feature = "bluetooth"))]
fn ble_source(_settings: &Settings) -> Arc<dyn AdvertisementSource> {
    Arc::new(NoBleSource)
}

/// Stand-in when built without a BLE backend.
#[cfg(not(feature = "bluetooth"))]
struct NoBleSource;

#[cfg(not(feature = "bluetooth"))]
#[async_trait::async_trait]
impl AdvertisementSource for NoBleSource {
    async fn discover(
        &self,
        _window: Duration,
    ) -> btscan::Result<Vec<btscan::infrastructure::bluetooth::Advertisement>> {
        Err(btscan::ScanError::AdapterUnsupported(
            "built without the bluetooth feature".into(),
        ))
    }
}

const ROW_HEADER: (&str, &str, &str, &str, &str, &str) =
    ("ADDRESS", "TYPE", "RSSI", "NAME", "VENDOR", "CLASS");

fn format_row(device: &ScannedDevice) -> String {
    let transport = match device.transport {
        Transport::Ble => "BLE",
        Transport::Classic => "Classic",
    };
    let class = device
        .category()
        .map(|c| match c.minor {
            Some(minor) => format!("{}/{}", c.major, minor),
            None => c.major.to_string(),
        })
        .unwrap_or_default();
    format!(
        "{:<36} {:<7} {:>5} {:<24} {:<28} {}",
        device.address,
        transport,
        device.signal_strength,
        device.name.as_deref().unwrap_or("-"),
        device.vendor.as_deref().unwrap_or("-"),
        class
    )
}

fn print_table(devices: &[ScannedDevice]) {
    if devices.is_empty() {
        println!("No devices found");
        return;
    }
    let (address, kind, rssi, name, vendor, class) = ROW_HEADER;
    println!(
        "{:<36} {:<7} {:>5} {:<24} {:<28} {}",
        address, kind, rssi, name, vendor, class
    );
    for device in devices {
        println!("{}", format_row(device));
    }
    println!("\n{} devices", devices.len());
}
