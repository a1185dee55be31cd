//! Single-file transfer engine for HTTP and FTP.
//!
//! This module performs one file's download: remote-size resolution,
//! preemptive authentication, chunked streaming to disk, and resumable,
//! bounded-retry transfers via protocol-level range addressing.
//!
//! # Overview
//!
//! - [`FileTransfer`] - one file's transfer session (download/resume/probe)
//! - [`TransferOptions`] - filename, credentials, timeout and retry knobs
//! - [`Credentials`] - validated username/password pairing
//! - [`TransferError`] - structured failure taxonomy
//!
//! The engine has no knowledge of the worker pool; see [`crate::pool`] for
//! the concurrency layer that drives it.

mod credentials;
mod engine;
mod error;
mod filename;
mod ftp;
pub(crate) mod http;

pub use credentials::Credentials;
pub use engine::{
    DEFAULT_RETRIES, DEFAULT_TIMEOUT, FileTransfer, ProgressCallback, TransferOptions,
};
pub use error::TransferError;
