//! plctrend - command line front end
//!
//! Runs trends against the built-in simulated controller, shows what data
//! file discovery finds, and summarizes saved trend documents.
//!
//! Usage:
//!   plctrend simulate --duration 10 --json trend.json
//!   plctrend simulate --family logix --tags Tank_Level,Motor_Speed --csv trend.csv
//!   plctrend discover --family micrologix
//!   plctrend inspect trend.json

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use plctrend_rs::backend::{
    DiscoveryEngine, FileType, PollerEvent, SignalPattern, SimulatedDevice,
};
use plctrend_rs::config::{LoggingSettings, TrendConfig};
use plctrend_rs::session::{save_csv, SessionController, SessionEvent, TrendDocument};
use plctrend_rs::types::SeriesStats;
use plctrend_rs::ControllerFamily;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log filter when neither `RUST_LOG` nor the config sets one
const DEFAULT_LOG_FILTER: &str = "info,plctrend_rs=debug";

/// PLC tag trending engine
#[derive(Parser)]
#[command(name = "plctrend", version, about = "PLC tag trending engine")]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Trend tags on the built-in simulated controller
    Simulate {
        /// Controller family to simulate (default: from config)
        #[arg(short, long)]
        family: Option<ControllerFamily>,

        /// Comma-separated tags to trend
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Poll interval in milliseconds (100 - 60000)
        #[arg(short, long, value_name = "MS")]
        interval: Option<u64>,

        /// How long to trend, in seconds
        #[arg(short, long, default_value_t = 5)]
        duration: u64,

        /// Save the trend as a JSON document
        #[arg(long, value_name = "PATH")]
        json: Option<PathBuf>,

        /// Save the trend as CSV
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,
    },

    /// List the data files discovery finds on a simulated controller
    Discover {
        /// File-addressed family to simulate
        #[arg(short, long, default_value = "slc500")]
        family: ControllerFamily,
    },

    /// Summarize a saved trend document
    Inspect {
        /// Document to read (.json or legacy .pytrend)
        path: PathBuf,

        /// Also convert the document to CSV
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = TrendConfig::load_or_default(cli.config.as_deref());
    let _guard = init_logging(&config.logging);

    match cli.command {
        Command::Simulate {
            family,
            tags,
            interval,
            duration,
            json,
            csv,
        } => simulate(
            config,
            family,
            tags,
            interval,
            Duration::from_secs(duration),
            json.as_deref(),
            csv.as_deref(),
        ),
        Command::Discover { family } => discover(&config, family),
        Command::Inspect { path, csv } => inspect(&path, csv.as_deref()),
    }
}

fn init_logging(settings: &LoggingSettings) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(settings.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER))
    });

    let (file_layer, guard) = match &settings.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "plctrend.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}

/// Simulated controller with some moving values, plus the tags to trend by default
fn simulated_controller(family: ControllerFamily) -> (SimulatedDevice, Vec<String>) {
    if family.is_file_addressed() {
        let device = SimulatedDevice::with_default_files(family)
            .with_data_file(10, FileType::Integer, 20)
            .with_data_file(11, FileType::Float, 5)
            .with_pattern(
                "N7:0",
                SignalPattern::Counter {
                    step: 1.0,
                    min: 0.0,
                    max: 100.0,
                },
            )
            .with_pattern(
                "B3:0",
                SignalPattern::Square {
                    period: 4.0,
                    amplitude: 255.0,
                },
            )
            .with_pattern(
                "F8:0",
                SignalPattern::Sine {
                    frequency: 0.2,
                    amplitude: 50.0,
                    offset: 50.0,
                },
            );
        let tags = ["N7:0", "F8:0", "B3:0/0", "B3:0/1"];
        return (device, tags.iter().map(|t| t.to_string()).collect());
    }

    let device = SimulatedDevice::new(family)
        .with_tag("Tank_Level", "REAL")
        .with_tag("Motor_Speed", "DINT")
        .with_tag("Pump_Running", "BOOL")
        .with_tag("Program:MainProgram.Batch_Count", "DINT")
        .with_tag("Recipe", "UDT_Recipe")
        .with_pattern(
            "Tank_Level",
            SignalPattern::Sine {
                frequency: 0.05,
                amplitude: 40.0,
                offset: 50.0,
            },
        )
        .with_pattern(
            "Pump_Running",
            SignalPattern::Square {
                period: 6.0,
                amplitude: 1.0,
            },
        )
        .with_pattern(
            "Program:MainProgram.Batch_Count",
            SignalPattern::Counter {
                step: 1.0,
                min: 0.0,
                max: 1000.0,
            },
        );
    let tags = ["Tank_Level", "Motor_Speed", "Pump_Running"];
    (device, tags.iter().map(|t| t.to_string()).collect())
}

fn simulate(
    mut config: TrendConfig,
    family: Option<ControllerFamily>,
    tags: Vec<String>,
    interval: Option<u64>,
    duration: Duration,
    json: Option<&Path>,
    csv: Option<&Path>,
) -> Result<()> {
    let family = family.unwrap_or(config.connection.family);
    if let Some(ms) = interval {
        config.acquisition.interval_ms = ms;
    }
    let (device, default_tags) = simulated_controller(family);
    let tags = if tags.is_empty() { default_tags } else { tags };

    let mut session = SessionController::new(config);
    session.connect(Arc::new(device))?;
    let entries = session.discover()?.len();
    tracing::info!("Discovered {} catalog entries", entries);
    session
        .select_by_name(&tags)
        .context("Failed to select tags")?;
    session.start()?;

    let deadline = Instant::now() + duration;
    'trend: while Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
        for event in session.poll_events() {
            match event {
                SessionEvent::AutoStopped {
                    consecutive_failures,
                } => {
                    tracing::warn!(
                        "Trend stopped after {} failed cycles",
                        consecutive_failures
                    );
                    break 'trend;
                }
                SessionEvent::Poller(PollerEvent::ConnectionLost { message }) => {
                    tracing::warn!("Connection lost: {}", message);
                }
                _ => {}
            }
        }
    }
    if session.mode().is_acquiring() {
        session.stop()?;
    }

    if let Some(stats) = session.cycle_stats() {
        println!(
            "{} cycles, {:.1}% ok, avg {:.0} us, {} reads saved",
            stats.cycles,
            stats.success_rate(),
            stats.avg_cycle_us(),
            stats.reads_saved
        );
    }
    let document = session.export()?;
    print_series(&document);

    if let Some(path) = json {
        document.save_to_file(path)?;
        println!("Saved {}", path.display());
    }
    if let Some(path) = csv {
        let rows = save_csv(&document, path)?;
        println!("Saved {} rows to {}", rows, path.display());
    }
    session.disconnect();
    Ok(())
}

fn discover(config: &TrendConfig, family: ControllerFamily) -> Result<()> {
    if !family.is_file_addressed() {
        bail!("{} controllers list their tags; discovery is for data files", family);
    }
    let (device, _) = simulated_controller(family);
    let mut engine = DiscoveryEngine::new(config.discovery.options());

    let started = Instant::now();
    let files = engine.discover(&device)?;
    println!(
        "{} data files on simulated {} ({} reads, {:?})",
        files.len(),
        family,
        device.total_reads(),
        started.elapsed()
    );
    println!("{:<6} {:<10} {:>8}", "FILE", "TYPE", "ELEMENTS");
    for file in &files {
        let elements = file
            .element_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:<6} {:<10} {:>8}",
            file.label(),
            file.file_type.to_string(),
            elements
        );
    }
    Ok(())
}

fn inspect(path: &Path, csv: Option<&Path>) -> Result<()> {
    let document = TrendDocument::load_from_file(path)?;
    let meta = &document.metadata;

    println!("Document v{} ({})", document.version, document.app_name);
    println!(
        "Device:   {} {} at {} slot {}",
        meta.family, meta.device.name, meta.device.host, meta.slot
    );
    println!("Interval: {} ms", meta.sample_interval_ms);
    if let Some((start, end)) = document.time_range() {
        println!("Range:    {} .. {} ({}s)", start, end, (end - start).num_seconds());
    }
    print_series(&document);

    if let Some(out) = csv {
        let rows = save_csv(&document, out)?;
        println!("Saved {} rows to {}", rows, out.display());
    }
    Ok(())
}

fn print_series(document: &TrendDocument) {
    println!(
        "{:<36} {:>8} {:>6} {:>12} {:>12} {:>12}",
        "TAG", "POINTS", "ERRORS", "MIN", "MAX", "MEAN"
    );
    for record in &document.series {
        let mut stats = SeriesStats::new();
        for sample in &record.samples {
            stats.push(sample);
        }
        let (min, max) = stats.range().unwrap_or((f64::NAN, f64::NAN));
        println!(
            "{:<36} {:>8} {:>6} {:>12.3} {:>12.3} {:>12.3}",
            record.tag,
            record.samples.len(),
            stats.error_count,
            min,
            max,
            stats.mean()
        );
    }
}
