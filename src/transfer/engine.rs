//! Single-file transfer sessions with resume and bounded auto-retry.
//!
//! A [`FileTransfer`] owns everything needed to move one remote file to
//! disk: the parsed URL, the resolved local path, optional credentials and
//! the timeout/retry configuration. [`FileTransfer::download`] fetches from
//! offset zero; [`FileTransfer::resume`] continues from the bytes already
//! on disk via protocol-level range addressing (`Range` for HTTP, `REST`
//! for FTP).
//!
//! # Retry semantics
//!
//! Transient failures (timeouts, connection errors, 5xx) are retried
//! through the resume path with exponential backoff. The retry counter is
//! local to each public `download()`/`resume()` call: it starts at zero
//! and persists across the automatic resumes of that call only. Once the
//! counter reaches the configured bound the session fails with
//! [`TransferError::RetriesExhausted`].
//!
//! # Example
//!
//! ```no_run
//! use dlm_core::FileTransfer;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transfer = FileTransfer::new("https://example.com/disc.iso", Path::new("./downloads"))?;
//! let bytes = transfer.download().await?;
//! println!("fetched {bytes} bytes to {}", transfer.local_path().display());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use super::credentials::Credentials;
use super::error::TransferError;
use super::filename;
use super::{ftp, http};

/// Default per-transfer network timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default bound on automatic resume attempts.
pub const DEFAULT_RETRIES: u32 = 5;

/// Base delay before the first automatic resume.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Cap on the backoff delay.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Maximum random jitter added to each backoff delay.
const RETRY_MAX_JITTER_MS: u64 = 100;

/// Progress observer, invoked with the total bytes present locally so far
/// (the resume offset counts).
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Supported transfer protocols, decided once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Http,
    Ftp,
}

/// Optional knobs for a [`FileTransfer`].
///
/// Username and password must be supplied together or not at all;
/// [`FileTransfer::with_options`] rejects partial credentials.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Explicit local filename; defaults to the URL's last path segment,
    /// percent-decoded.
    pub local_file_name: Option<String>,
    /// Username for HTTP basic auth or FTP login.
    pub username: Option<String>,
    /// Password matching `username`.
    pub password: Option<String>,
    /// Hard bound on each network connect/read.
    pub timeout: Duration,
    /// Bound on automatic resume attempts per `download()`/`resume()` call.
    pub retries: u32,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            local_file_name: None,
            username: None,
            password: None,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }
}

/// One file's transfer session.
///
/// Knows nothing about the worker pool; the pool drives it, and callers
/// can use it standalone.
#[derive(Debug, Clone)]
pub struct FileTransfer {
    url: Url,
    protocol: Protocol,
    local_path: PathBuf,
    credentials: Option<Credentials>,
    timeout: Duration,
    retries: u32,
    client: Client,
}

impl FileTransfer {
    /// Creates a transfer session with default options.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidUrl`] for an unparseable URL,
    /// [`TransferError::UnsupportedScheme`] for anything but http/https/ftp
    /// and [`TransferError::Config`] when the URL path carries no filename.
    pub fn new(url: &str, dest_dir: impl Into<PathBuf>) -> Result<Self, TransferError> {
        Self::with_options(url, dest_dir, TransferOptions::default())
    }

    /// Creates a transfer session with explicit options.
    ///
    /// # Errors
    ///
    /// As [`FileTransfer::new`], plus [`TransferError::Config`] when only
    /// one of username/password is supplied.
    pub fn with_options(
        url: &str,
        dest_dir: impl Into<PathBuf>,
        options: TransferOptions,
    ) -> Result<Self, TransferError> {
        let credentials = Credentials::from_parts(options.username, options.password)?;
        let client = http::build_client(options.timeout)?;
        Self::from_parts(
            url,
            dest_dir.into(),
            options.local_file_name,
            credentials,
            options.timeout,
            options.retries,
            client,
        )
    }

    /// Internal constructor used by the pool so every worker shares one
    /// HTTP client. Credential pairing has already been validated.
    pub(crate) fn from_parts(
        url: &str,
        dest_dir: PathBuf,
        local_file_name: Option<String>,
        credentials: Option<Credentials>,
        timeout: Duration,
        retries: u32,
        client: Client,
    ) -> Result<Self, TransferError> {
        let parsed = Url::parse(url).map_err(|_| TransferError::invalid_url(url))?;
        let protocol = match parsed.scheme() {
            "http" | "https" => Protocol::Http,
            "ftp" => Protocol::Ftp,
            other => return Err(TransferError::unsupported_scheme(url, other)),
        };

        let file_name = match local_file_name {
            Some(name) => name,
            None => filename::filename_from_url(&parsed).ok_or_else(|| {
                TransferError::config(format!(
                    "no filename in URL path `{url}`; set local_file_name"
                ))
            })?,
        };

        Ok(Self {
            url: parsed,
            protocol,
            local_path: dest_dir.join(file_name),
            credentials,
            timeout,
            retries,
            client,
        })
    }

    /// The source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// The resolved destination path.
    #[must_use]
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// The configured resume-attempt bound.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Resolves the remote file size.
    ///
    /// HTTP issues a one-byte ranged GET; FTP issues `SIZE`. `None` means
    /// the server does not report a size, in which case resume-completeness
    /// checks degrade to "always attempt".
    ///
    /// # Errors
    ///
    /// [`TransferError::NotFound`] / [`TransferError::AuthRequired`] when
    /// the server rejects the probe, network errors otherwise.
    pub async fn remote_size(&self) -> Result<Option<u64>, TransferError> {
        match self.protocol {
            Protocol::Http => {
                http::probe_size(&self.client, &self.url, self.credentials.as_ref()).await
            }
            Protocol::Ftp => {
                ftp::probe_size(&self.url, self.credentials.as_ref(), self.timeout).await
            }
        }
    }

    /// Checks whether the remote file exists.
    ///
    /// # Errors
    ///
    /// Propagates probe failures other than not-found.
    pub async fn exists(&self) -> Result<bool, TransferError> {
        match self.remote_size().await {
            Ok(_) => Ok(true),
            Err(TransferError::NotFound { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Performs a full fetch from offset zero, truncating/creating the
    /// destination file.
    ///
    /// Returns the number of bytes present locally on completion.
    ///
    /// # Errors
    ///
    /// Non-retryable failures surface directly; transient failures are
    /// resumed up to the configured bound and then surface as
    /// [`TransferError::RetriesExhausted`].
    pub async fn download(&self) -> Result<u64, TransferError> {
        self.run(true, None).await
    }

    /// [`FileTransfer::download`] with a progress observer.
    ///
    /// # Errors
    ///
    /// As [`FileTransfer::download`].
    pub async fn download_with_progress(
        &self,
        progress: ProgressCallback,
    ) -> Result<u64, TransferError> {
        self.run(true, Some(progress)).await
    }

    /// Continues an interrupted transfer from the bytes already on disk.
    ///
    /// When the local file already holds at least the remote size this is
    /// a no-op success: no network read occurs.
    ///
    /// # Errors
    ///
    /// As [`FileTransfer::download`].
    pub async fn resume(&self) -> Result<u64, TransferError> {
        self.run(false, None).await
    }

    /// [`FileTransfer::resume`] with a progress observer.
    ///
    /// # Errors
    ///
    /// As [`FileTransfer::download`].
    pub async fn resume_with_progress(
        &self,
        progress: ProgressCallback,
    ) -> Result<u64, TransferError> {
        self.run(false, Some(progress)).await
    }

    /// The shared download/resume loop. `fresh` only applies to the first
    /// attempt; every automatic retry goes through the resume path.
    async fn run(
        &self,
        fresh: bool,
        progress: Option<ProgressCallback>,
    ) -> Result<u64, TransferError> {
        let remote_size = self.tolerant_remote_size().await?;
        let mut fresh = fresh;
        let mut attempt: u32 = 0;

        loop {
            match self.attempt(fresh, remote_size, progress.as_ref()).await {
                Ok(bytes) => return Ok(bytes),
                Err(error) if error.is_retryable() => {
                    let local = self.local_size().await;
                    if let Some(total) = remote_size
                        && local >= total
                    {
                        debug!(url = %self.url, local, "local file complete despite transfer error");
                        return Ok(local);
                    }
                    if attempt >= self.retries {
                        return Err(TransferError::retries_exhausted(
                            self.url.as_str(),
                            attempt,
                            error,
                        ));
                    }
                    attempt += 1;
                    fresh = false;
                    let delay = backoff_delay(attempt);
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    warn!(
                        url = %self.url,
                        attempt,
                        max = self.retries,
                        delay_ms,
                        error = %error,
                        "resuming after transient failure"
                    );
                    sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// One transfer attempt. A non-fresh attempt that finds the local file
    /// already complete returns without touching the network.
    async fn attempt(
        &self,
        fresh: bool,
        remote_size: Option<u64>,
        progress: Option<&ProgressCallback>,
    ) -> Result<u64, TransferError> {
        let offset = if fresh { 0 } else { self.local_size().await };
        if !fresh
            && let Some(total) = remote_size
            && offset >= total
        {
            debug!(url = %self.url, local = offset, remote = total, "already complete; nothing to transfer");
            return Ok(offset);
        }

        match self.protocol {
            Protocol::Http => {
                http::fetch(
                    &self.client,
                    &self.url,
                    self.credentials.as_ref(),
                    &self.local_path,
                    offset,
                    progress,
                )
                .await
            }
            Protocol::Ftp => {
                ftp::fetch(
                    &self.url,
                    self.credentials.as_ref(),
                    &self.local_path,
                    offset,
                    self.timeout,
                    progress.cloned(),
                )
                .await
            }
        }
    }

    /// Size probe for the retry loop: not-found and auth failures are
    /// fatal before the destination file is touched, anything else
    /// degrades to "size unknown".
    async fn tolerant_remote_size(&self) -> Result<Option<u64>, TransferError> {
        match self.remote_size().await {
            Ok(size) => Ok(size),
            Err(error @ (TransferError::NotFound { .. } | TransferError::AuthRequired { .. })) => {
                Err(error)
            }
            Err(error) => {
                debug!(url = %self.url, error = %error, "size probe failed; proceeding with unknown remote size");
                Ok(None)
            }
        }
    }

    async fn local_size(&self) -> u64 {
        tokio::fs::metadata(&self.local_path)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0)
    }
}

/// Exponential backoff with jitter: `min(base * 2^(attempt-1), cap)` plus
/// up to [`RETRY_MAX_JITTER_MS`] of random jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let scaled = RETRY_BASE_DELAY.saturating_mul(1_u32 << exponent);
    let capped = scaled.min(RETRY_MAX_DELAY);
    let jitter = rand::thread_rng().gen_range(0..=RETRY_MAX_JITTER_MS);
    capped + Duration::from_millis(jitter)
}
