//! CLI entry point for the dlm download manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use dlm_core::{Credentials, DownloadManager, DownloadRequest, PoolSettings};
use tracing::{debug, error, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    if args.urls.is_empty() {
        info!("No URLs given. Example: dlm https://example.com/disc.iso");
        return Ok(());
    }

    let settings = PoolSettings {
        thread_count: usize::from(args.threads),
        timeout: Duration::from_secs(args.timeout),
        retries: u32::from(args.retries),
        ..PoolSettings::default()
    };
    let manager = DownloadManager::start(settings)?;

    let total = args.urls.len();
    let failures = Arc::new(AtomicUsize::new(0));

    for url in &args.urls {
        let mut request = DownloadRequest::new(url, args.dest.clone());
        if let (Some(username), Some(password)) = (&args.username, &args.password) {
            request = request.credentials(Credentials::new(username.clone(), password.clone()));
        }
        let failures = Arc::clone(&failures);
        let request = request.on_complete(move |source, outcome| match outcome {
            None => info!(url = %source, "download complete"),
            Some(transfer_error) => {
                failures.fetch_add(1, Ordering::SeqCst);
                error!(url = %source, error = %transfer_error, "download failed");
            }
        });
        manager.append(request);
    }

    while manager.is_busy() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    manager.stop().await;

    let failed = failures.load(Ordering::SeqCst);
    if failed > 0 {
        anyhow::bail!("{failed} of {total} downloads failed");
    }
    info!(total, "all downloads complete");
    Ok(())
}
