//! phash-dedup - Main Application Entrypoint
//!
//! Parses command-line arguments, initializes logging, and hands a scan
//! of one directory to the library.

use clap::Parser;
use log::{error, info};
use phash_dedup::SearchMethod;
use phash_dedup::runner::{RunOptions, run};
use std::path::PathBuf;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Finds near-duplicate images in a directory using perceptual hashes.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the images (not searched recursively)
    #[arg(short, long)]
    input: PathBuf,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with engine settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum Hamming distance (0 to 64) for two images to count as duplicates
    #[arg(short, long)]
    threshold: Option<u32>,

    /// Duplicate search strategy
    #[arg(short, long, value_enum)]
    method: Option<SearchMethod>,

    /// Include Hamming distances in the duplicate lists
    #[arg(long)]
    scores: bool,

    /// Worker threads for hashing and distance evaluation (0 or 1 = sequential)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Show progress bars
    #[arg(long)]
    progress: bool,

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

fn load_config(args: &Args) -> anyhow::Result<phash_dedup::Config> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text)?
        }
        None => phash_dedup::Config::default(),
    };
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(method) = args.method {
        config.search_method = method;
    }
    if let Some(workers) = args.workers {
        config.encode_workers = workers;
        config.distance_workers = workers;
    }
    config.with_scores |= args.scores;
    config.verbose |= args.progress;
    Ok(config)
}

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = Args::parse();

    // 1. Initialize Logger
    let log_level = match args.log_level {
        LogLevel::Error => "error",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting phash-dedup...");

    // 2. Validate input path
    if !args.input.is_dir() {
        error!("Input directory does not exist: {:?}", args.input);
        std::process::exit(1);
    }

    // 3. Build the engine configuration
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Could not load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // 4. Run the scan
    let options = RunOptions {
        input_dir: args.input,
        output: args.output,
        config,
    };
    if let Err(e) = run(options) {
        error!("Application failed: {:#}", e);
        std::process::exit(2);
    }

    info!("Processing completed successfully.");
}
