//! Pool controller: owns the shared queue and supervises the workers.
//!
//! [`DownloadManager::start`] spawns a fixed number of workers bound to
//! one queue and returns a cheaply cloneable handle. Cloning the handle
//! attaches to the same pool - sharing is always explicit, there is no
//! hidden global instance. Dropping every handle without calling
//! [`DownloadManager::stop`] closes the control channel and lets the
//! workers wind down on their own, so a pool never blocks process exit.
//!
//! # Example
//!
//! ```no_run
//! use dlm_core::{DownloadManager, DownloadRequest, PoolSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = DownloadManager::start(PoolSettings::default())?;
//! let handle = manager.append(DownloadRequest::new(
//!     "https://example.com/disc.iso",
//!     "./downloads",
//! ));
//! while manager.is_busy() {
//!     tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//! }
//! assert!(handle.is_completed());
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::queue::RequestQueue;
use super::request::{DownloadRequest, RequestHandle};
use super::worker::{PoolCommand, Worker, WorkerState, WorkerStateCell, WorkerTransferConfig};
use crate::transfer::{DEFAULT_RETRIES, DEFAULT_TIMEOUT, TransferError, http};

/// Liveness acknowledgement returned by a healthy pool.
pub const LIVENESS_ACK: &str = "polo";

/// Default worker count.
pub const DEFAULT_THREAD_COUNT: usize = 5;

/// Default logging namespace.
const DEFAULT_SHORT_NAME: &str = "dlm";

/// Pool configuration, immutable after [`DownloadManager::start`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Number of workers.
    pub thread_count: usize,
    /// Namespace used in worker names for diagnostics and logging.
    pub short_name: String,
    /// Per-transfer network timeout handed to every worker.
    pub timeout: Duration,
    /// Automatic resume bound handed to every worker.
    pub retries: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            thread_count: DEFAULT_THREAD_COUNT,
            short_name: DEFAULT_SHORT_NAME.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }
}

/// Errors surfaced by the pool controller.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The configured worker count is unusable.
    #[error("invalid thread_count {value}: the pool needs at least one worker")]
    InvalidThreadCount {
        /// The invalid value that was provided.
        value: usize,
    },

    /// A worker is no longer alive; the pool needs operator attention.
    #[error("worker `{name}` is no longer running")]
    WorkerDead {
        /// The dead worker's diagnostic name.
        name: String,
    },

    /// Pool construction failed below the pool layer.
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Supervision record for one spawned worker.
struct WorkerHandle {
    name: String,
    state: Arc<WorkerStateCell>,
    running: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Alive means the running flag is set and the task has not exited.
    ///
    /// A clean stop clears the flag; a panic (e.g. inside a completion
    /// callback) leaves the flag set but finishes the task, so both are
    /// checked.
    fn is_alive(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let join = self.join.lock().unwrap_or_else(PoisonError::into_inner);
        join.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

struct PoolInner {
    settings: PoolSettings,
    queue: Arc<RequestQueue>,
    control: watch::Sender<PoolCommand>,
    workers: Vec<WorkerHandle>,
}

/// Handle to a worker pool.
///
/// All operations go through a shared inner pool; `Clone` attaches another
/// handle to the same pool.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<PoolInner>,
}

impl DownloadManager {
    /// Creates the pool and starts its workers immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidThreadCount`] for a zero worker count,
    /// or a wrapped [`TransferError`] when the shared HTTP client cannot
    /// be built.
    pub fn start(settings: PoolSettings) -> Result<Self, PoolError> {
        if settings.thread_count == 0 {
            return Err(PoolError::InvalidThreadCount { value: 0 });
        }

        let client = http::build_client(settings.timeout)?;
        let transfer = WorkerTransferConfig {
            client,
            timeout: settings.timeout,
            retries: settings.retries,
        };
        let queue = Arc::new(RequestQueue::new());
        let (control, _) = watch::channel(PoolCommand::Run);

        let mut workers = Vec::with_capacity(settings.thread_count);
        for id in 0..settings.thread_count {
            let name = format!("{}.worker{id}", settings.short_name);
            let state = Arc::new(WorkerStateCell::new());
            let running = Arc::new(AtomicBool::new(true));
            let worker = Worker::new(
                name.clone(),
                Arc::clone(&queue),
                Arc::clone(&state),
                Arc::clone(&running),
                control.subscribe(),
                transfer.clone(),
            );
            let join = tokio::spawn(worker.run());
            workers.push(WorkerHandle {
                name,
                state,
                running,
                join: Mutex::new(Some(join)),
            });
        }

        info!(
            workers = settings.thread_count,
            namespace = %settings.short_name,
            "download pool started"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                settings,
                queue,
                control,
                workers,
            }),
        })
    }

    /// The settings this pool was started with.
    #[must_use]
    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    /// Appends a request at the tail of the queue.
    ///
    /// Never blocks and never fails: a saturated pool simply queues, and a
    /// request appended after [`DownloadManager::stop`] is enqueued but
    /// never claimed. Invalid requests (bad URL, unsupported scheme) are
    /// discovered by the claiming worker and reported through the
    /// request's callback.
    pub fn append(&self, request: DownloadRequest) -> RequestHandle {
        let handle = request.handle();
        debug!(url = %request.source(), "request appended");
        self.inner.queue.push(request);
        handle
    }

    /// Broadcasts a pause signal to every worker.
    ///
    /// The queue is untouched; an in-flight transfer finishes before its
    /// worker actually parks.
    pub fn pause(&self) {
        info!("pausing download pool");
        self.send(PoolCommand::Pause);
    }

    /// Broadcasts a resume signal, unparking paused workers.
    pub fn resume(&self) {
        info!("resuming download pool");
        self.send(PoolCommand::Run);
    }

    /// Signals every worker to stop, then waits for all of them to exit.
    ///
    /// In-flight transfers finish first; queued requests that were never
    /// claimed stay in the queue. Graceful shutdown, not a pause.
    pub async fn stop(&self) {
        info!("stopping download pool");
        self.send(PoolCommand::Stop);
        for worker in &self.inner.workers {
            let join = {
                let mut slot = worker.join.lock().unwrap_or_else(PoisonError::into_inner);
                slot.take()
            };
            if let Some(join) = join
                && let Err(join_error) = join.await
            {
                warn!(worker = %worker.name, error = %join_error, "worker task panicked");
            }
        }
        info!("download pool stopped");
    }

    /// Whether the pool still has work: queued requests or a worker in
    /// the middle of a transfer.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        !self.inner.queue.is_empty()
            || self
                .inner
                .workers
                .iter()
                .any(|worker| worker.state.get() == WorkerState::Downloading)
    }

    /// Number of pending (unclaimed) requests.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /// Snapshot of every worker's lifecycle state, in worker order.
    #[must_use]
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.inner
            .workers
            .iter()
            .map(|worker| worker.state.get())
            .collect()
    }

    /// Cheap heartbeat: confirms every worker is alive.
    ///
    /// A paused pool is alive and still answers. After
    /// [`DownloadManager::stop`], or when a worker task has died (e.g. a
    /// panicking completion callback), the check fails.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::WorkerDead`] naming the first dead worker.
    pub fn liveness_check(&self) -> Result<&'static str, PoolError> {
        for worker in &self.inner.workers {
            if !worker.is_alive() {
                return Err(PoolError::WorkerDead {
                    name: worker.name.clone(),
                });
            }
        }
        Ok(LIVENESS_ACK)
    }

    fn send(&self, command: PoolCommand) {
        if self.inner.control.send(command).is_err() {
            warn!(?command, "no workers listening for pool command");
        }
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("settings", &self.inner.settings)
            .field("queued", &self.inner.queue.len())
            .field("workers", &self.inner.workers.len())
            .finish()
    }
}
