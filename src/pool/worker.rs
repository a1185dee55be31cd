//! Worker lifecycle state machine.
//!
//! A worker is one long-lived unit of concurrency bound to the shared
//! queue. Its loop claims a request, delegates to the transfer engine,
//! dispatches the outcome and goes back for more, obeying pool-wide
//! pause/resume/stop signals broadcast on a watch channel.
//!
//! # States
//!
//! `Init -> Running <-> Downloading`, with `Paused` and
//! `Stopping -> Stopped` as overlays. A paused worker awaits the control
//! channel (no queue polling, no busy-wait); a stop signal lets any
//! in-flight transfer finish before the loop exits. The worker never
//! transitions on its own initiative except `Running <-> Downloading`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tracing::{debug, error};

use super::queue::RequestQueue;
use super::request::DownloadRequest;
use crate::transfer::{FileTransfer, TransferError};

/// Lifecycle state of one worker, observable from the pool controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, not yet looping.
    Init,
    /// Polling the queue for work.
    Running,
    /// Executing a claimed transfer.
    Downloading,
    /// Parked on an explicit pause signal.
    Paused,
    /// Stop observed; winding down.
    Stopping,
    /// Loop exited.
    Stopped,
}

/// Pool-wide control signal broadcast to every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoolCommand {
    Run,
    Pause,
    Stop,
}

/// Atomic cell sharing one worker's state with the pool controller.
#[derive(Debug)]
pub(crate) struct WorkerStateCell(AtomicU8);

impl WorkerStateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(encode(WorkerState::Init)))
    }

    pub(crate) fn set(&self, state: WorkerState) {
        self.0.store(encode(state), Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> WorkerState {
        decode(self.0.load(Ordering::SeqCst))
    }
}

fn encode(state: WorkerState) -> u8 {
    match state {
        WorkerState::Init => 0,
        WorkerState::Running => 1,
        WorkerState::Downloading => 2,
        WorkerState::Paused => 3,
        WorkerState::Stopping => 4,
        WorkerState::Stopped => 5,
    }
}

fn decode(raw: u8) -> WorkerState {
    match raw {
        0 => WorkerState::Init,
        1 => WorkerState::Running,
        2 => WorkerState::Downloading,
        3 => WorkerState::Paused,
        4 => WorkerState::Stopping,
        _ => WorkerState::Stopped,
    }
}

/// Transfer configuration shared by every worker of one pool.
#[derive(Debug, Clone)]
pub(crate) struct WorkerTransferConfig {
    /// One HTTP client per pool, reused for connection pooling.
    pub(crate) client: Client,
    pub(crate) timeout: Duration,
    pub(crate) retries: u32,
}

/// One worker bound to the shared queue.
pub(crate) struct Worker {
    name: String,
    queue: Arc<RequestQueue>,
    state: Arc<WorkerStateCell>,
    running: Arc<AtomicBool>,
    control: watch::Receiver<PoolCommand>,
    transfer: WorkerTransferConfig,
}

impl Worker {
    pub(crate) fn new(
        name: String,
        queue: Arc<RequestQueue>,
        state: Arc<WorkerStateCell>,
        running: Arc<AtomicBool>,
        control: watch::Receiver<PoolCommand>,
        transfer: WorkerTransferConfig,
    ) -> Self {
        Self {
            name,
            queue,
            state,
            running,
            control,
            transfer,
        }
    }

    /// The worker loop. Runs until a stop signal arrives or the control
    /// channel closes (every pool handle dropped).
    pub(crate) async fn run(mut self) {
        debug!(worker = %self.name, "worker started");
        loop {
            // Copy the command out so the watch borrow is released before
            // the arms run.
            let command = *self.control.borrow_and_update();
            match command {
                PoolCommand::Stop => {
                    self.state.set(WorkerState::Stopping);
                    break;
                }
                PoolCommand::Pause => {
                    if self.park().await {
                        continue;
                    }
                    break;
                }
                PoolCommand::Run => {}
            }
            self.state.set(WorkerState::Running);

            let request = tokio::select! {
                request = self.queue.claim(|| self.state.set(WorkerState::Downloading)) => request,
                changed = self.control.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            self.process(request).await;
            self.state.set(WorkerState::Running);
        }
        self.state.set(WorkerState::Stopped);
        self.running.store(false, Ordering::SeqCst);
        debug!(worker = %self.name, "worker stopped");
    }

    /// Parks until the command changes away from `Pause`.
    ///
    /// Returns `false` when the control channel closed while parked.
    async fn park(&mut self) -> bool {
        self.state.set(WorkerState::Paused);
        debug!(worker = %self.name, "paused");
        loop {
            let command = *self.control.borrow_and_update();
            if command != PoolCommand::Pause {
                break;
            }
            if self.control.changed().await.is_err() {
                return false;
            }
        }
        debug!(worker = %self.name, "unparked");
        true
    }

    /// Executes one claimed request and dispatches the outcome.
    ///
    /// Transfer failures never kill the worker: they are logged and routed
    /// to the request's callback. A panic inside the callback itself is
    /// deliberately left to unwind.
    async fn process(&self, request: DownloadRequest) {
        debug!(worker = %self.name, url = %request.source, "processing request");
        match self.execute(&request).await {
            Ok(bytes) => {
                request.mark_completed();
                debug!(worker = %self.name, url = %request.source, bytes, "download complete");
                if let Some(callback) = &request.callback {
                    callback(&request.source, None);
                }
            }
            Err(transfer_error) => {
                error!(
                    worker = %self.name,
                    url = %request.source,
                    error = %transfer_error,
                    "download failed"
                );
                if let Some(callback) = &request.callback {
                    callback(&request.source, Some(&transfer_error));
                }
            }
        }
    }

    async fn execute(&self, request: &DownloadRequest) -> Result<u64, TransferError> {
        let transfer = FileTransfer::from_parts(
            &request.source,
            request.dest_dir.clone(),
            request.file_name.clone(),
            request.credentials.clone(),
            self.transfer.timeout,
            self.transfer.retries,
            self.transfer.client.clone(),
        )?;
        transfer.download().await
    }
}
