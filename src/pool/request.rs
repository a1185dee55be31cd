//! Queued download requests and their caller-facing handles.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::transfer::{Credentials, TransferError};

/// Completion callback invoked exactly once per request: `(source_url,
/// error)`, where `None` means success.
///
/// Transfer failures are routed here instead of crashing the worker. A
/// panic inside the callback, by contrast, is allowed to unwind and take
/// the worker down - callback bugs must be loud.
pub type CompletionCallback = Box<dyn Fn(&str, Option<&TransferError>) + Send + Sync>;

/// One queued unit of work: source URL, destination, optional credentials
/// and optional completion callback.
///
/// Immutable once appended. The queue owns the request until exactly one
/// worker claims it; the worker then owns it for the duration of the
/// transfer, flips the `completed` flag on success and fires the callback
/// before discarding it.
pub struct DownloadRequest {
    pub(crate) source: String,
    pub(crate) dest_dir: PathBuf,
    pub(crate) file_name: Option<String>,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) callback: Option<CompletionCallback>,
    pub(crate) completed: Arc<AtomicBool>,
}

impl DownloadRequest {
    /// Creates a request downloading `source` into `dest_dir`.
    ///
    /// The local filename defaults to the URL's last path segment,
    /// percent-decoded; override it with [`DownloadRequest::file_name`].
    #[must_use]
    pub fn new(source: impl Into<String>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest_dir: dest_dir.into(),
            file_name: None,
            credentials: None,
            callback: None,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets an explicit local filename.
    #[must_use]
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Attaches credentials for the transfer.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Attaches a completion callback.
    #[must_use]
    pub fn on_complete(
        mut self,
        callback: impl Fn(&str, Option<&TransferError>) + Send + Sync + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// The source URL.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Creates the caller-facing handle sharing this request's
    /// `completed` flag.
    pub(crate) fn handle(&self) -> RequestHandle {
        RequestHandle {
            source: self.source.clone(),
            completed: Arc::clone(&self.completed),
        }
    }

    /// Marks the request successfully completed.
    pub(crate) fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }
}

// Manual Debug: the callback is opaque.
impl fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("source", &self.source)
            .field("dest_dir", &self.dest_dir)
            .field("file_name", &self.file_name)
            .field("credentials", &self.credentials)
            .field("has_callback", &self.callback.is_some())
            .field("completed", &self.completed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Caller-facing view of an appended request, returned by
/// [`DownloadManager::append`](crate::pool::DownloadManager::append).
///
/// The `completed` flag and the completion callback are the only surfaces
/// for observing a single request's outcome; there is no synchronous
/// "wait for this one download" call.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    source: String,
    completed: Arc<AtomicBool>,
}

impl RequestHandle {
    /// The source URL of the appended request.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the request has completed successfully.
    ///
    /// Stays `false` for failed requests; observe failures through the
    /// completion callback.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}
