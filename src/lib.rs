pub mod audio;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod session;
pub mod storage;
pub mod upload;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, SeparateCommand, StatsCommand};
use config::AppConfig;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Separate the voices from the music in a song
#[derive(Parser)]
#[command(name = "voxsplit")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Separate songs into `<name>_voice.wav` and `<name>_music.wav`
    Separate(SeparateCommand),
    /// Show visit counters
    Stats(StatsCommand),
    /// List recent separations
    History(HistoryCommand),
}

/// Initialize logging to the console and, when configured, to a file
///
/// `RUST_LOG` takes precedence over the default `voxsplit_lib=info`.
pub fn init_tracing(log_file: Option<&Path>) {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxsplit_lib=info"))
    };

    let file_layer = log_file.and_then(|path| match File::create(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .with_filter(filter()),
        ),
        Err(e) => {
            eprintln!("Failed to create log file {:?}: {}", path, e);
            None
        }
    });

    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter()))
        .with(file_layer)
        .try_init();

    // A subscriber is already set when a test or the host installed one first
    if let Err(e) = installed {
        debug!("Keeping the existing tracing subscriber: {}", e);
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.log_file.as_deref());
    info!("Starting voxsplit...");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        match &cli.command {
            Commands::Separate(cmd) => cmd.run(&config, cli.json).await,
            Commands::Stats(cmd) => cmd.run(&config, cli.json).await.map(|_| true),
            Commands::History(cmd) => cmd.run(&config, cli.json).await.map(|_| true),
        }
    });

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{} failed: {}", e.kind(), e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
