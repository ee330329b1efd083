//! CLI entry point for unicam.
//!
//! ```bash
//! unicam list
//! unicam info mock
//! unicam docs --format markdown --output mock.md mock
//! unicam grab mock --frames 100 --tiff --output /tmp/run
//! unicam benchmark local://mock --frames 1000 --runs 3 --mode strict
//! unicam benchmark bench --delivery callback --trigger software
//! ```

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use unicam_bin::benchmark::{self, BenchTrigger, BenchmarkOptions, Delivery, ErrorMode};
use unicam_bin::docs::{self, DocFormat};
use unicam_bin::grab::{self, GrabOptions};
use unicam_bin::{info, logging, Assignment, Session};
use unicam_core::config::UnicamConfig;
use unicam_core::property::names;
use unicam_core::remote::LocalDeviceProxy;
use unicam_core::PropertyValue;

#[derive(Parser)]
#[command(name = "unicam", version)]
#[command(about = "Unified camera tools", long_about = None)]
struct Cli {
    /// Configuration file (default: ./unicam.toml if present)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// More log output; repeat for more
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List backends, presets and plugin failures
    List,

    /// Print every property of a camera
    Info {
        /// Backend name or preset id
        camera: String,

        /// Property assignment applied before printing
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<Assignment>,
    },

    /// Generate property documentation
    Docs {
        /// Output format
        #[arg(long, value_enum, default_value_t = DocFormat::Html)]
        format: DocFormat,

        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Backends to document (default: all)
        backends: Vec<String>,
    },

    /// Record frames to disk
    Grab {
        /// Backend name or preset id
        camera: String,

        /// Number of frames to acquire
        #[arg(long, short = 'n')]
        frames: Option<u64>,

        /// Duration in seconds
        #[arg(long, short)]
        duration: Option<f64>,

        /// Exposure time in seconds
        #[arg(long, short)]
        exposure_time: Option<f64>,

        /// Output file prefix
        #[arg(long, short, default_value = "frame")]
        output: PathBuf,

        /// Write one multi-page TIFF instead of raw files
        #[arg(long, short)]
        tiff: bool,

        /// Property assignment applied before recording
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<Assignment>,
    },

    /// Measure frame rate and bandwidth through the device proxy
    Benchmark {
        /// local://<camera>, a backend name or a preset id
        address: String,

        /// Frames per run
        #[arg(long, short = 'n', default_value_t = 100)]
        frames: u64,

        /// Number of runs
        #[arg(long, short, default_value_t = 1)]
        runs: u32,

        /// What a failed read does
        #[arg(long, value_enum, default_value_t = ErrorMode::BestEffort)]
        mode: ErrorMode,

        /// Trigger source
        #[arg(long, value_enum, default_value_t = BenchTrigger::Auto)]
        trigger: BenchTrigger,

        /// Read frames or have them pushed to a callback
        #[arg(long, value_enum, default_value_t = Delivery::Grab)]
        delivery: Delivery,

        /// Exposure time in seconds
        #[arg(long, short)]
        exposure_time: Option<f64>,

        /// Property assignment applied before the first run
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<Assignment>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = UnicamConfig::load(cli.config.as_deref())?;
    logging::init(&config.log, cli.verbose)?;
    let session = Session::from_config(config)?;

    match cli.command {
        Commands::List => list(&session),
        Commands::Info { camera, set } => {
            let camera = session.open(&camera, &set).await?;
            print!("{}", info::render(&camera));
            Ok(())
        }
        Commands::Docs {
            format,
            output,
            backends,
        } => {
            let text = docs::render(format, &docs::collect(&session.registry, &backends)?)?;
            match output {
                Some(path) => std::fs::write(&path, text)
                    .with_context(|| format!("Failed to write {}", path.display())),
                None => {
                    print!("{}", text);
                    Ok(())
                }
            }
        }
        Commands::Grab {
            camera,
            frames,
            duration,
            exposure_time,
            output,
            tiff,
            set,
        } => {
            let duration = duration
                .map(Duration::try_from_secs_f64)
                .transpose()
                .context("Invalid --duration")?;
            let camera = session.open(&camera, &set).await?;
            if let Some(exposure) = exposure_time {
                camera
                    .set(names::EXPOSURE_TIME, PropertyValue::Double(exposure))
                    .await
                    .context("Invalid --exposure-time")?;
            }
            let options = GrabOptions {
                frames,
                duration,
                prefix: output,
                tiff,
            };
            let summary = grab::record(&camera, &options).await?;
            println!("Wrote {} files", summary.files.len());
            Ok(())
        }
        Commands::Benchmark {
            address,
            frames,
            runs,
            mode,
            trigger,
            delivery,
            exposure_time,
            set,
        } => {
            let name = benchmark::parse_address(&address)?;
            let camera = session.open(name, &set).await?;
            let proxy = LocalDeviceProxy::new(camera);
            let options = BenchmarkOptions {
                frames,
                runs,
                mode,
                trigger,
                delivery,
                exposure_time,
            };

            println!(
                "Benchmarking {}: {} frames x {} runs, {:?} trigger, {:?} delivery",
                name, frames, runs, trigger, delivery
            );
            let reports = benchmark::run(&proxy, &options, |index, report| {
                println!("run {}/{}: {}", index + 1, runs, report);
                if report.failures > 0 || report.lost_in_gaps > 0 {
                    println!(
                        "        {} failed reads, {} frames lost in sequence gaps",
                        report.failures, report.lost_in_gaps
                    );
                }
            })
            .await?;
            if reports.len() > 1 {
                println!("total:   {}", benchmark::total(&reports));
            }
            Ok(())
        }
    }
}

fn list(session: &Session) -> Result<()> {
    println!("Backends:");
    for entry in session.registry.entries() {
        println!(
            "  {:<16} {:<40} {}",
            entry.name,
            entry.factory.description(),
            entry.origin
        );
    }

    let presets = session.registry.preset_ids();
    if !presets.is_empty() {
        println!("Presets:");
        for id in presets {
            if let Some(preset) = session.registry.preset(&id) {
                println!("  {:<16} -> {}", preset.id, preset.backend);
            }
        }
    }

    if !session.discovery.failures.is_empty() {
        println!("Plugin failures:");
        for failure in &session.discovery.failures {
            println!("  {}: {}", failure.path.display(), failure.reason);
        }
    }
    Ok(())
}
