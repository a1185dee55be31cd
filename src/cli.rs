//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use dlm_core::{DEFAULT_RETRIES, DEFAULT_THREAD_COUNT};

/// Concurrent, restartable download manager for HTTP and FTP.
///
/// Queues the given URLs on a worker pool and waits until every transfer
/// has completed or failed.
#[derive(Parser, Debug)]
#[command(name = "dlm")]
#[command(author, version, about)]
pub struct Args {
    /// Source URLs to download (http, https or ftp)
    pub urls: Vec<String>,

    /// Destination directory for downloaded files
    #[arg(short, long, default_value = ".")]
    pub dest: PathBuf,

    /// Worker count (1-64)
    #[arg(short = 't', long, default_value_t = DEFAULT_THREAD_COUNT as u8, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub threads: u8,

    /// Per-transfer network timeout in seconds
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,

    /// Maximum automatic resume attempts per transfer (0-10)
    #[arg(short, long, default_value_t = DEFAULT_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub retries: u8,

    /// Username for authenticated downloads (requires --password)
    #[arg(long, requires = "password")]
    pub username: Option<String>,

    /// Password for authenticated downloads (requires --username)
    #[arg(long, requires = "username")]
    pub password: Option<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
