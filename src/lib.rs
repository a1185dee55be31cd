//! dlm Core Library
//!
//! This library provides a concurrent, restartable download manager: a
//! fixed pool of workers drains a shared FIFO queue of download requests
//! and fetches each file over HTTP or FTP, with pause/resume of the whole
//! pool and resumable, retrying transfers of individual files.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`transfer`] - single-file transfer engine with resume and bounded
//!   auto-retry
//! - [`pool`] - worker pool: shared queue, worker state machines and the
//!   pool controller
//!
//! # Example
//!
//! ```no_run
//! use dlm_core::{DownloadManager, DownloadRequest, PoolSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = DownloadManager::start(PoolSettings::default())?;
//! manager.append(
//!     DownloadRequest::new("https://example.com/disc.iso", "./downloads")
//!         .on_complete(|url, error| match error {
//!             None => println!("{url} done"),
//!             Some(error) => eprintln!("{url} failed: {error}"),
//!         }),
//! );
//! while manager.is_busy() {
//!     tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//! }
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod pool;
pub mod transfer;

// Re-export commonly used types
pub use pool::{
    CompletionCallback, DEFAULT_THREAD_COUNT, DownloadManager, DownloadRequest, LIVENESS_ACK,
    PoolError, PoolSettings, RequestHandle, WorkerState,
};
pub use transfer::{
    Credentials, DEFAULT_RETRIES, DEFAULT_TIMEOUT, FileTransfer, ProgressCallback, TransferError,
    TransferOptions,
};
