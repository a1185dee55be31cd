//! Worker pool: shared queue, worker state machines and the pool
//! controller.
//!
//! # Overview
//!
//! - [`DownloadManager`] - owns the queue, supervises the workers
//! - [`DownloadRequest`] / [`RequestHandle`] - one queued unit of work and
//!   its caller-facing completion view
//! - [`WorkerState`] - observable lifecycle state of each worker
//! - [`PoolSettings`] / [`PoolError`] - configuration and failures
//!
//! Control flow: `append(request)` -> queue; workers continuously claim ->
//! transfer engine `download()` -> `callback(url, error-or-none)`.

mod manager;
mod queue;
mod request;
mod worker;

pub use manager::{
    DEFAULT_THREAD_COUNT, DownloadManager, LIVENESS_ACK, PoolError, PoolSettings,
};
pub use request::{CompletionCallback, DownloadRequest, RequestHandle};
pub use worker::WorkerState;
