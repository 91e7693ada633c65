//! zecompat - inspect and exercise the loader's handle caches
//!
//! # Usage
//!
//! ```bash
//! # Show the effective configuration and registered drivers
//! zecompat info
//!
//! # Walk drivers, devices, sub-devices and metrics
//! zecompat enumerate --metrics --format json
//!
//! # Hammer the device cache from 16 threads
//! zecompat stress --threads 16 --rounds 10000
//! ```
//!
//! There is no native driver discovery, so every command runs against the
//! null driver. Its topology comes from `[null-driver-topology]` in
//! `zecompat.toml`.

use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Instant;

use zecompat_loader::ddi::{ApiVersion, CommandQueueDesc, DeviceProperties, DriverProperties};
use zecompat_loader::{logging, Device, Driver, Session, SessionConfig, CONFIG_FILE_NAME};

#[derive(Parser)]
#[command(name = "zecompat")]
#[command(version = "0.1.0")]
#[command(about = "Loader handle-cache inspector", long_about = None)]
struct Cli {
    /// Config file (defaults to ./zecompat.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Reject objects not issued by the session
    #[arg(long, global = true)]
    validate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration and registered drivers
    Info,

    /// Enumerate drivers, devices and metrics
    Enumerate {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Include metric groups and metrics
        #[arg(long)]
        metrics: bool,
    },

    /// Resolve the same handles from many threads and check identity
    Stress {
        /// Worker threads
        #[arg(short, long, default_value = "8")]
        threads: usize,

        /// Queries per thread
        #[arg(short, long, default_value = "1000")]
        rounds: usize,

        /// Also create and destroy a command queue every round
        #[arg(long)]
        churn: bool,
    },
}

#[derive(ValueEnum, Clone, Debug)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref(), cli.validate).and_then(|config| {
        logging::init_from_config(&config).map_err(|e| e.to_string())?;
        match cli.command {
            Commands::Info => show_info(config),
            Commands::Enumerate { format, metrics } => enumerate(config, format, metrics),
            Commands::Stress { threads, rounds, churn } => stress(config, threads, rounds, churn),
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>, validate: bool) -> Result<SessionConfig, String> {
    let default_path = Path::new(CONFIG_FILE_NAME);
    let path = match path {
        Some(path) => Some(path),
        None if default_path.exists() => Some(default_path),
        None => None,
    };

    let mut config = SessionConfig::load(path).map_err(|e| e.to_string())?;
    config.null_driver = true;
    config.validation |= validate;
    Ok(config)
}

fn open_session(config: SessionConfig) -> Result<Session, String> {
    Session::from_config(config).map_err(|e| e.to_string())
}

fn show_info(config: SessionConfig) -> Result<(), String> {
    let session = open_session(config)?;
    let config = session.config();

    println!("zecompat v0.1.0");
    println!("{}", "=".repeat(60));
    println!("Validation:   {}", on_off(config.validation));
    println!("API tracing:  {}", on_off(config.trace_calls));
    println!("Log level:    {}", config.log_level.as_deref().unwrap_or("(RUST_LOG)"));
    println!();

    let topology = &config.null_driver_topology;
    println!("Null driver topology:");
    println!("  drivers:        {}", topology.drivers);
    println!("  devices:        {}", topology.devices);
    println!("  sub-devices:    {}", topology.sub_devices);
    println!("  metric groups:  {}", topology.metric_groups);
    println!("  metrics:        {}", topology.metrics);
    println!();

    println!("Registered drivers:");
    for name in session.driver_names() {
        println!("  • {}", name);
    }
    Ok(())
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

// ---------------------------------------------------------------------------
// enumerate
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct DriverReport {
    source: String,
    handle: String,
    api_version: ApiVersion,
    properties: DriverProperties,
    devices: Vec<DeviceReport>,
}

#[derive(Serialize)]
struct DeviceReport {
    handle: String,
    properties: DeviceProperties,
    sub_devices: Vec<DeviceReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    metric_groups: Vec<MetricGroupReport>,
}

#[derive(Serialize)]
struct MetricGroupReport {
    name: String,
    description: String,
    metrics: Vec<String>,
}

fn enumerate(config: SessionConfig, format: OutputFormat, metrics: bool) -> Result<(), String> {
    let session = open_session(config)?;

    let mut reports = Vec::new();
    for driver in session.drivers().map_err(|e| e.to_string())? {
        reports.push(report_driver(&session, &driver, metrics).map_err(|e| e.to_string())?);
    }

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&reports).map_err(|e| e.to_string())?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for report in &reports {
                println!(
                    "driver {} [{}] api {}.{}",
                    report.handle, report.source, report.api_version.major, report.api_version.minor
                );
                for device in &report.devices {
                    print_device(device, 1);
                }
            }
        }
    }
    Ok(())
}

fn report_driver(
    session: &Session,
    driver: &Arc<Driver>,
    metrics: bool,
) -> Result<DriverReport, zecompat_loader::ZeError> {
    let mut devices = Vec::new();
    for device in session.devices(driver)? {
        devices.push(report_device(session, &device, metrics)?);
    }
    Ok(DriverReport {
        source: driver.source().to_string(),
        handle: format!("{:#x}", driver.handle().addr()),
        api_version: driver.api_version()?,
        properties: driver.properties()?,
        devices,
    })
}

fn report_device(
    session: &Session,
    device: &Arc<Device>,
    metrics: bool,
) -> Result<DeviceReport, zecompat_loader::ZeError> {
    let mut sub_devices = Vec::new();
    for sub in session.sub_devices(device)? {
        sub_devices.push(report_device(session, &sub, metrics)?);
    }

    let mut metric_groups = Vec::new();
    if metrics {
        for group in session.metric_groups(device)? {
            let props = group.properties()?;
            let mut names = Vec::new();
            for metric in session.metrics(&group)? {
                names.push(metric.properties()?.name);
            }
            metric_groups.push(MetricGroupReport {
                name: props.name,
                description: props.description,
                metrics: names,
            });
        }
    }

    Ok(DeviceReport {
        handle: format!("{:#x}", device.handle().addr()),
        properties: device.properties()?,
        sub_devices,
        metric_groups,
    })
}

fn print_device(device: &DeviceReport, depth: usize) {
    let indent = "  ".repeat(depth);
    let props = &device.properties;
    println!(
        "{}device {} \"{}\" {:?} vendor={:#06x} id={:#06x}",
        indent, device.handle, props.name, props.device_type, props.vendor_id, props.device_id
    );
    for group in &device.metric_groups {
        println!("{}  metric group \"{}\": {}", indent, group.name, group.metrics.join(", "));
    }
    for sub in &device.sub_devices {
        print_device(sub, depth + 1);
    }
}

// ---------------------------------------------------------------------------
// stress
// ---------------------------------------------------------------------------

fn stress(config: SessionConfig, threads: usize, rounds: usize, churn: bool) -> Result<(), String> {
    if threads == 0 {
        return Err("--threads must be at least 1".to_string());
    }

    let session = open_session(config)?;
    let drivers = session.drivers().map_err(|e| e.to_string())?;

    // Reference objects, resolved once up front.
    let mut expected: Vec<Arc<Device>> = Vec::new();
    for driver in &drivers {
        expected.extend(session.devices(driver).map_err(|e| e.to_string())?);
    }
    if expected.is_empty() {
        return Err("null driver topology has no devices".to_string());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| format!("Failed to start thread pool: {}", e))?;

    println!("🚀 {} threads x {} rounds over {} device(s)...", threads, rounds, expected.len());
    let start = Instant::now();

    let mismatches: usize = pool.install(|| {
        (0..threads * rounds)
            .into_par_iter()
            .map(|i| -> Result<usize, String> {
                let driver = &drivers[i % drivers.len()];
                let devices = session.devices(driver).map_err(|e| e.to_string())?;
                let wrong = devices
                    .iter()
                    .filter(|d| !expected.iter().any(|e| Arc::ptr_eq(e, d)))
                    .count();

                if churn {
                    let queue = session
                        .create_command_queue(&devices[0], CommandQueueDesc::default())
                        .map_err(|e| e.to_string())?;
                    session.destroy_command_queue(queue).map_err(|e| e.to_string())?;
                }
                Ok(wrong)
            })
            .try_reduce(|| 0, |a, b| Ok(a + b))
    })?;

    let elapsed = start.elapsed();
    println!("Finished in {:.2?}", elapsed);
    println!();
    println!("{:<16} {:>10} {:>14} {:>10} {:>8}", "cache", "hits", "constructions", "releases", "nulls");
    println!("{}", "-".repeat(62));
    for (name, stats) in session.stats() {
        if stats.hits + stats.constructions == 0 {
            continue;
        }
        println!(
            "{:<16} {:>10} {:>14} {:>10} {:>8}",
            name, stats.hits, stats.constructions, stats.releases, stats.null_rejections
        );
    }
    println!();

    let device_constructions = session
        .stats()
        .into_iter()
        .find(|(name, _)| *name == "device")
        .map(|(_, stats)| stats.constructions)
        .unwrap_or(0);

    if mismatches > 0 || device_constructions != expected.len() as u64 {
        return Err(format!(
            "identity violated: {} mismatched lookups, {} device wrappers for {} handles",
            mismatches,
            device_constructions,
            expected.len()
        ));
    }
    println!("✓ every device handle resolved to exactly one object");
    Ok(())
}
