//! Annotated Slides - Main Application Entrypoint
//!
//! Parses command-line arguments, initializes logging and hands a
//! configuration to the library's pipeline driver.

use annotated_slides::frame_analyzer::Thresholds;
use annotated_slides::{run, Config, SkipReason};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Turns lecture recordings into PDFs of their annotated slides.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing the recordings
    #[arg(short, long, default_value = "recordings")]
    source: PathBuf,

    /// Scratch directory for extracted frames (cleared for every video)
    #[arg(long, default_value = "images")]
    frames: PathBuf,

    /// Directory to save the PDFs
    #[arg(short, long, default_value = "pdfs")]
    output: PathBuf,

    /// Seconds between sampled frames
    #[arg(short, long, default_value_t = 20)]
    interval: u64,

    /// Size change in bytes that marks a new slide state
    #[arg(long, default_value_t = 3000)]
    size_delta: u64,

    /// Size change in bytes considered noise (reported in debug logs only)
    #[arg(long, default_value_t = 2000)]
    insignificant_change: u64,

    /// Extension of the recordings to process
    #[arg(short, long, default_value_t = String::from("mp4"))]
    extension: String,

    /// Write a JSON report of frame sizes and selections per video
    #[arg(long)]
    index: bool,

    /// Logging verbosity level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Info,
    Debug,
}

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = Args::parse();

    let log_level = match args.log_level {
        LogLevel::Error => "error",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting annotated-slides...");

    let config = Config {
        source_dir: args.source,
        frame_dir: args.frames,
        output_dir: args.output,
        video_extension: args.extension,
        interval_secs: args.interval,
        thresholds: Thresholds {
            size_delta: args.size_delta,
            insignificant_change: args.insignificant_change,
        },
        generate_index: args.index,
    };

    match run(&config) {
        Ok(summary) => {
            for (video, reason) in &summary.skipped {
                let why = match reason {
                    SkipReason::NoFrames => "no frames could be decoded",
                    SkipReason::NoAnnotations => "no annotated frames were found",
                };
                warn!("Skipped {:?}: {}", video, why);
            }
            info!("Processing completed. {} PDFs written.", summary.documents.len());
        }
        Err(e) => {
            error!("Application failed: {:#}", e);
            std::process::exit(2);
        }
    }
}
