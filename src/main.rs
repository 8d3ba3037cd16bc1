// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cli::{CaptureOptions, DirectionArg, PreviewOptions};
use lutcam::errors::AppResult;

mod cli;

#[derive(Parser)]
#[command(name = "lutcam")]
#[command(about = "Camera engine with live LUT color-filter preview and capture")]
#[command(version)]
struct Cli {
    /// Use the synthetic in-process camera instead of real devices
    #[arg(long, global = true)]
    synthetic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    Devices,

    /// List the built-in filter catalog
    Filters,

    /// Run a live preview loop
    Preview {
        /// Camera facing to open
        #[arg(short, long, value_enum)]
        direction: Option<DirectionArg>,

        /// Stop after this many seconds (0 runs until Ctrl+C)
        #[arg(short = 't', long, default_value = "0")]
        duration: u64,

        /// Save a PNG snapshot of the rendered preview every N frames
        #[arg(long)]
        snapshot_every: Option<u64>,

        /// Filter id to commit for the preview (from 'lutcam filters')
        #[arg(short, long)]
        filter: Option<i32>,

        /// Render the nine-tile filter selection grid
        #[arg(long)]
        grid: bool,
    },

    /// Take a photo
    Capture {
        /// Camera facing to open
        #[arg(short, long, value_enum)]
        direction: Option<DirectionArg>,

        /// Filter id to apply to the capture (from 'lutcam filters')
        #[arg(short, long)]
        filter: Option<i32>,

        /// Output file or directory (default: the configured output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> AppResult<()> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=lutcam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => cli::list_devices(cli.synthetic),
        Commands::Filters => cli::list_filters(),
        Commands::Preview {
            direction,
            duration,
            snapshot_every,
            filter,
            grid,
        } => cli::run_preview(PreviewOptions {
            synthetic: cli.synthetic,
            direction,
            duration,
            snapshot_every,
            filter,
            grid,
        }),
        Commands::Capture {
            direction,
            filter,
            output,
        } => cli::capture_photo(CaptureOptions {
            synthetic: cli.synthetic,
            direction,
            filter,
            output,
        }),
    }
}
