//! Error types for the transfer module.
//!
//! This module defines structured errors for all transfer operations,
//! providing context-rich error messages for debugging and for the
//! per-request completion callbacks.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring a single file.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The transfer was misconfigured before any I/O took place.
    #[error("invalid transfer configuration: {reason}")]
    Config {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// The URL uses a scheme this engine cannot speak.
    #[error("unsupported scheme `{scheme}` in {url}: only http, https and ftp are handled")]
    UnsupportedScheme {
        /// The offending URL.
        url: String,
        /// The scheme that was rejected.
        scheme: String,
    },

    /// The provided URL is malformed or has no usable file component.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The remote server reports that the file does not exist.
    #[error("remote file not found at {url} (status {status})")]
    NotFound {
        /// The URL that was rejected.
        url: String,
        /// The server status code (HTTP 404/410, FTP 550).
        status: u16,
    },

    /// Authentication or authorization required to access the resource.
    #[error("authentication required for {url} (status {status})")]
    AuthRequired {
        /// The URL that requires authentication.
        url: String,
        /// The server status code (HTTP 401/403/407, FTP 530).
        status: u16,
    },

    /// Network-level error (DNS resolution, connection reset, partial read).
    #[error("network error transferring {url}: {source}")]
    Network {
        /// The URL that failed to transfer.
        url: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A connect or read exceeded the configured timeout.
    #[error("timeout transferring {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response not covered by a more specific variant.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during the transfer (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The automatic resume budget was used up without completing the file.
    #[error("retries exhausted after {attempts} resume attempts for {url}")]
    RetriesExhausted {
        /// The URL that kept failing.
        url: String,
        /// How many automatic resumes were attempted.
        attempts: u32,
        /// The error that ended the final attempt.
        #[source]
        source: Box<TransferError>,
    },
}

impl TransferError {
    /// Creates a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates an unsupported-scheme error.
    pub fn unsupported_scheme(url: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self::UnsupportedScheme {
            url: url.into(),
            scheme: scheme.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a not-found error.
    pub fn not_found(url: impl Into<String>, status: u16) -> Self {
        Self::NotFound {
            url: url.into(),
            status,
        }
    }

    /// Creates an authentication-required error.
    pub fn auth_required(url: impl Into<String>, status: u16) -> Self {
        Self::AuthRequired {
            url: url.into(),
            status,
        }
    }

    /// Creates a network error from any underlying error.
    pub fn network(
        url: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Network {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a retries-exhausted error wrapping the final failure.
    pub fn retries_exhausted(url: impl Into<String>, attempts: u32, source: TransferError) -> Self {
        Self::RetriesExhausted {
            url: url.into(),
            attempts,
            source: Box::new(source),
        }
    }

    /// Whether the retry policy may recover from this error via the resume path.
    ///
    /// Timeouts, connection-level failures and transient HTTP statuses
    /// (408, 429, 5xx) are worth resuming; everything else either cannot
    /// succeed on retry or must not be retried without operator action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

// Note on From trait implementations: we intentionally do NOT implement
// `From<reqwest::Error>` or `From<std::io::Error>` because the variants
// require context (url, path) that the source errors don't carry. The
// helper constructors are the pattern here.
