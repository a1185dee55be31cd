//! Shared FIFO queue with atomic claims.
//!
//! The queue is the only resource mutated by both the pool controller and
//! every worker, so all access goes through one mutex. Claiming pops the
//! oldest request and runs the caller's `mark_claimed` hook while still
//! holding the lock, so observers combining queue length with worker
//! states (`is_busy`) never see a request that is neither queued nor
//! claimed.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use super::request::DownloadRequest;

/// Mutex-protected FIFO of pending download requests.
#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    items: Mutex<VecDeque<DownloadRequest>>,
    available: Notify,
}

impl RequestQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enqueues a request at the tail and wakes one waiting worker.
    pub(crate) fn push(&self, request: DownloadRequest) {
        self.lock().push_back(request);
        self.available.notify_one();
    }

    /// Claims the oldest request, waiting until one is available.
    ///
    /// `mark_claimed` runs under the queue lock, exactly once, for the
    /// request being returned.
    pub(crate) async fn claim(&self, mark_claimed: impl Fn()) -> DownloadRequest {
        loop {
            // Register for a wakeup before re-checking, so a push between
            // the check and the await is not lost.
            let available = self.available.notified();
            let claimed = {
                let mut items = self.lock();
                let request = items.pop_front();
                if request.is_some() {
                    mark_claimed();
                }
                request
            };
            if let Some(request) = claimed {
                return request;
            }
            available.await;
        }
    }

    /// Number of pending (unclaimed) requests.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no requests are pending.
    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DownloadRequest>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
