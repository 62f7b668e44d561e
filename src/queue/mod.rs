// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded job queue drained by a fixed worker pool.
//!
//! [`JobQueue::enqueue`] never blocks: it either buffers the job or fails at
//! once with [`SyncError::ResourceExhausted`]. Workers pull jobs first come,
//! first served and run each one in its own task, so a failing or panicking
//! job is logged and recorded without stopping the worker.
//!
//! Shutdown is two-phase: [`close`](JobQueue::close) stops intake, then
//! [`drain`](JobQueue::drain) lets workers empty the buffer within a grace
//! period before cancelling whatever is still in flight.

pub mod job;
pub mod tracker;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backpressure::QueuePressure;
use crate::error::SyncError;
use crate::sync::{SyncOutcome, SyncProtocol};

pub use job::{Job, JobId};
pub use tracker::{JobStatus, JobTracker};

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>;

pub struct JobQueue {
    sender: RwLock<Option<mpsc::Sender<Job>>>,
    receiver: SharedReceiver,
    buffered: Arc<AtomicUsize>,
    capacity: usize,
    tracker: Arc<JobTracker>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    pub fn new(capacity: usize, tracker: Arc<JobTracker>) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            sender: RwLock::new(Some(tx)),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            buffered: Arc::new(AtomicUsize::new(0)),
            capacity,
            tracker,
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs buffered and not yet picked up by a worker.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn pressure(&self) -> QueuePressure {
        QueuePressure::from_fill(self.depth(), self.capacity)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Token cancelled when drain gives up on in-flight work.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Buffer `job` without waiting.
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id, user_id = %job.user_id, platform = %job.platform))]
    pub fn enqueue(&self, job: Job) -> Result<JobId, SyncError> {
        let id = job.id;
        let platform = job.platform;
        let guard = self.sender.read();
        let Some(tx) = guard.as_ref() else {
            crate::metrics::record_enqueue(platform.as_str(), "closed");
            return Err(SyncError::ShuttingDown);
        };

        // Counted and visible as queued before a worker can pick it up.
        self.tracker.queued(id);
        let depth = self.buffered.fetch_add(1, Ordering::AcqRel) + 1;
        match tx.try_send(job) {
            Ok(()) => {
                crate::metrics::record_enqueue(platform.as_str(), "accepted");
                crate::metrics::set_queue_depth(depth);
                let pressure = QueuePressure::from_fill(depth, self.capacity);
                if pressure >= QueuePressure::Warn {
                    warn!(depth, capacity = self.capacity, %pressure, "Job queue under pressure");
                } else {
                    debug!(depth, "Job accepted");
                }
                Ok(id)
            }
            Err(TrySendError::Full(_)) => {
                self.buffered.fetch_sub(1, Ordering::AcqRel);
                self.tracker.forget(&id);
                crate::metrics::record_enqueue(platform.as_str(), "rejected");
                warn!(capacity = self.capacity, "Job queue full, rejecting");
                Err(SyncError::ResourceExhausted {
                    retry_after_secs: QueuePressure::Full.retry_after_secs(),
                })
            }
            Err(TrySendError::Closed(_)) => {
                self.buffered.fetch_sub(1, Ordering::AcqRel);
                self.tracker.forget(&id);
                crate::metrics::record_enqueue(platform.as_str(), "closed");
                Err(SyncError::ShuttingDown)
            }
        }
    }

    /// Start `count` workers running jobs through `protocol`.
    pub fn spawn_workers(&self, count: usize, protocol: Arc<SyncProtocol>) {
        let mut workers = self.workers.lock();
        for worker_id in 0..count.max(1) {
            let handle = tokio::spawn(worker_loop(
                worker_id,
                self.receiver.clone(),
                self.buffered.clone(),
                protocol.clone(),
                self.tracker.clone(),
                self.cancel.clone(),
            ));
            workers.push(handle);
        }
        info!(workers = workers.len(), capacity = self.capacity, "Job workers started");
    }

    /// Stop accepting jobs. Buffered jobs are still processed.
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            info!("Job queue closed to new work");
        }
    }

    /// Wait up to `grace` for workers to empty the queue, then cancel what
    /// is left. Returns `true` if everything finished within the grace.
    ///
    /// Closes the queue first if that has not happened yet.
    #[tracing::instrument(skip(self))]
    pub async fn drain(&self, grace: Duration) -> bool {
        self.close();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let mut joined = join_workers(handles);

        let clean = tokio::time::timeout(grace, &mut joined).await.is_ok();
        if !clean {
            warn!(?grace, "Grace period elapsed, cancelling in-flight jobs");
            self.cancel.cancel();
            // In-flight syncs observe the token at their next await point.
            if tokio::time::timeout(Duration::from_secs(5), &mut joined).await.is_err() {
                error!("Workers did not stop after cancellation");
            }
        }

        let abandoned = self.cancel_buffered().await;
        if abandoned > 0 {
            warn!(abandoned, "Queued jobs cancelled at shutdown");
        }
        crate::metrics::set_queue_depth(0);
        clean && abandoned == 0
    }

    async fn cancel_buffered(&self) -> usize {
        let mut rx = self.receiver.lock().await;
        let mut abandoned = 0;
        while let Ok(job) = rx.try_recv() {
            self.buffered.fetch_sub(1, Ordering::AcqRel);
            self.tracker.finish(job.id, JobStatus::Cancelled);
            crate::metrics::record_job_outcome(job.platform.as_str(), "cancelled");
            abandoned += 1;
        }
        abandoned
    }
}

/// Join every handle, ignoring panics (they are already contained per job).
fn join_workers(handles: Vec<JoinHandle<()>>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
    })
}

async fn worker_loop(
    worker_id: usize,
    receiver: SharedReceiver,
    buffered: Arc<AtomicUsize>,
    protocol: Arc<SyncProtocol>,
    tracker: Arc<JobTracker>,
    cancel: CancellationToken,
) {
    debug!(worker_id, "Worker started");
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = rx.recv() => job,
            }
        };
        let Some(job) = next else { break };
        let depth = buffered.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        crate::metrics::set_queue_depth(depth);
        run_job(worker_id, job, &protocol, &tracker, &cancel).await;
    }
    debug!(worker_id, "Worker stopped");
}

#[tracing::instrument(skip_all, fields(worker_id = worker_id, job_id = %job.id, user_id = %job.user_id, platform = %job.platform))]
async fn run_job(
    worker_id: usize,
    job: Job,
    protocol: &Arc<SyncProtocol>,
    tracker: &JobTracker,
    cancel: &CancellationToken,
) {
    tracker.running(job.id);

    let task = {
        let protocol = protocol.clone();
        let cancel = cancel.clone();
        let user_id = job.user_id.clone();
        let platform = job.platform;
        tokio::spawn(async move { protocol.sync_with_cancel(&user_id, platform, &cancel).await })
    };

    let status = match task.await {
        Ok(Ok(outcome)) => {
            if let SyncOutcome::Merged { added, .. } = outcome {
                debug!(added, "Job succeeded");
            }
            JobStatus::Succeeded { added: outcome.added() }
        }
        Ok(Err(SyncError::Cancelled)) => JobStatus::Cancelled,
        Ok(Err(e)) => {
            warn!(error = %e, kind = e.kind(), "Sync job failed");
            JobStatus::Failed { reason: e.to_string() }
        }
        Err(join_err) if join_err.is_panic() => {
            error!("Sync job panicked");
            JobStatus::Failed { reason: "sync task panicked".to_string() }
        }
        Err(_) => JobStatus::Cancelled,
    };

    crate::metrics::record_job_outcome(job.platform.as_str(), status.label());
    tracker.finish(job.id, status);
}
