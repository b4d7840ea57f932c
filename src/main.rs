//! # Bilitidy - Bilibili Cache Consolidation CLI
//!
//! A simple CLI tool that turns the fragmented folder structure of a Bilibili
//! app cache export into a flat directory of playable .mp4 files named after
//! their episode titles.
//!
//! ## Features
//!
//! - **Two cache layouts**: Handles both split audio/video stream downloads
//!   and the older fragmented-video downloads, in current and legacy
//!   descriptor schemas
//! - **Lossless**: Delegates all stream work to FFmpeg in stream-copy mode;
//!   nothing is re-encoded
//! - **Parallel**: A fixed-size worker pool overlaps merges across episodes
//! - **Safe by default**: Source folders are only removed with `--clean`, and
//!   only after their merge succeeded
//! - **Best-effort**: One broken episode never stops the rest of the run
//! - **Signal Handling**: Graceful shutdown on SIGINT
//!
//! ## Usage
//!
//! ```bash
//! # Preview what a merge would do
//! bilitidy list /path/to/cache
//!
//! # Consolidate every episode into /path/to/cache/<title>.mp4
//! bilitidy merge /path/to/cache
//!
//! # Consolidate and remove the source folders afterwards
//! bilitidy merge /path/to/cache --clean
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bilitidy::commands::{list::ListCommand, merge::MergeCommand};

/// Bilitidy - Bilibili cache consolidation CLI
#[derive(Parser)]
#[command(
    name = "bilitidy",
    about = "Consolidates Bilibili app cache folders into playable video files",
    long_about = "Scans a cache export for per-episode folders, merges split audio/video streams or legacy video fragments into single .mp4 files named after their titles, and optionally removes the source folders.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Merge every cache unit under a directory into playable files
    Merge {
        /// Path to the cache directory to consolidate
        path: PathBuf,
        /// Remove source folders after their merge succeeds
        #[arg(long, short)]
        clean: bool,
        /// Number of parallel merge workers
        #[arg(long, short)]
        jobs: Option<usize>,
    },
    /// List cache units and what a merge would do with them
    List {
        /// Path to the cache directory to inspect
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bilitidy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Merge { path, clean, jobs } => {
            info!(
                "Starting merge command for path: {:?}, clean: {}, jobs: {:?}",
                path, clean, jobs
            );
            MergeCommand::new(path, clean, jobs).execute().await
        }
        Commands::List { path } => {
            info!("Starting list command for path: {:?}", path);
            let list_cmd = ListCommand::new(path);
            match list_cmd.execute().await {
                Ok(report) => {
                    list_cmd.print_report(&report);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
