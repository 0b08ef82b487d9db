//! idcard-ocr - Extract identity card fields from photographs
//!
//! Prints results as JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use idcard_ocr::config::load_or_default;
use idcard_ocr::storage::default_zones_dir;
use idcard_ocr::storage::zones::export_builtin_layouts;
use idcard_ocr::IdCardProcessor;

/// Zone-based field extraction for identity cards
#[derive(Parser, Debug)]
#[command(name = "idcard-ocr")]
#[command(about = "Extract identity card fields from photographs with Tesseract OCR")]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory with zones_front.json / zones_back.json
    #[arg(long, global = true)]
    zones_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the front side fields
    Front {
        /// Image file (raw image bytes or base64 text)
        image: PathBuf,
    },
    /// Extract the back side fields
    Back {
        /// Image file (raw image bytes or base64 text)
        image: PathBuf,
    },
    /// Extract both sides and combine them
    Both {
        front: PathBuf,
        back: PathBuf,
        /// Exit with status 2 when less than this fraction (0.0-1.0) of fields was read
        #[arg(long)]
        min_rate: Option<f64>,
        /// Include the per-field outcome of each side
        #[arg(long)]
        details: bool,
    },
    /// Report the OCR engine installation status
    Check,
    /// Write the built-in zone layouts out for editing
    ExportZones {
        /// Target directory (defaults to the user zones directory)
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = load_or_default(args.config.as_deref())?;
    if let Some(dir) = args.zones_dir {
        config.zones.dir = Some(dir);
    }

    let processor = || IdCardProcessor::from_config(&config);

    match args.command {
        Command::Front { image } => {
            let bytes = read_input(&image)?;
            print_json(&processor()?.process_front(&bytes))?;
        }
        Command::Back { image } => {
            let bytes = read_input(&image)?;
            print_json(&processor()?.process_back(&bytes))?;
        }
        Command::Both {
            front,
            back,
            min_rate,
            details,
        } => {
            let front = read_input(&front)?;
            let back = read_input(&back)?;
            let report = processor()?.process_both_detailed(&front, &back);
            let passed = min_rate.map_or(true, |rate| report.result.meets_threshold(rate));

            if details {
                print_json(&report)?;
            } else {
                print_json(&report.result)?;
            }

            if !passed {
                warn!(
                    "Extraction rate {:.2} is below the required {:.2}",
                    report.result.extraction_rate,
                    min_rate.unwrap_or_default()
                );
                return Ok(ExitCode::from(2));
            }
        }
        Command::Check => {
            let status = processor()?.check_ocr_status();
            let installed = status.installed;
            print_json(&status)?;
            if !installed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::ExportZones { dir } => {
            let dir = match dir.or_else(|| config.zones.dir.clone()) {
                Some(dir) => dir,
                None => default_zones_dir()?,
            };
            for path in export_builtin_layouts(&dir)? {
                println!("{}", path.display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    info!("Reading {:?}", path);
    std::fs::read(path).with_context(|| format!("Failed to read image {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
