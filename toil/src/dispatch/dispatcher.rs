use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use crate::core::job::Job;
use crate::core::queue::JobQueue;
use crate::core::store::{JobStore, StorageError};
use crate::core::CancellationToken;
use crate::dispatch::registry::HandlerRegistry;

/// Errors returned by the dispatcher.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No handler registered for a job's `job_type` tag.
    ///
    /// Policy: log and skip the job. Since claiming does not lock, the row
    /// stays eligible and will be seen again on the next poll until a handler
    /// is registered or the row is deleted externally.
    #[error("no handler registered for job type '{job_type}'")]
    UnknownJobType { job_type: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What a single dispatch pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No eligible job was found.
    Idle,
    /// The handler ran to completion.
    Completed,
    /// The handler returned an error; it was logged and the job was left in
    /// whatever state the handler put it in (possibly still locked, to be
    /// reclaimed by the reap sweep).
    HandlerFailed,
}

/// Repeatedly asks the queue for the next eligible job and invokes the
/// registered handler identified by the job's type tag.
///
/// The dispatcher never locks, deletes, or releases a job itself; that is the
/// handler's responsibility. A handler error is caught here, logged, and the
/// loop continues. To change that policy (e.g. bounded automatic retry),
/// match on [`DispatchOutcome`] and [`DispatchError`] around
/// [`process_next`](Self::process_next) instead of using [`run`](Self::run).
pub struct Dispatcher<S> {
    queue: Arc<JobQueue<S>>,
    registry: HandlerRegistry<S>,
}

impl<S: JobStore> Dispatcher<S> {
    pub fn new(queue: Arc<JobQueue<S>>, registry: HandlerRegistry<S>) -> Self {
        Self { queue, registry }
    }

    pub fn queue(&self) -> &Arc<JobQueue<S>> {
        &self.queue
    }

    /// Claim one eligible job and process it. Returns
    /// [`DispatchOutcome::Idle`] when the queue has nothing eligible; callers
    /// are responsible for their own idle back-off.
    pub async fn process_next(&self) -> Result<DispatchOutcome, DispatchError> {
        match self.queue.claim_next().await? {
            Some(job) => self.process(job).await,
            None => Ok(DispatchOutcome::Idle),
        }
    }

    /// Process a job that is already claimed. If you're implementing your own
    /// dispatch loop, this is what you should use once a job is pulled from
    /// the queue.
    #[instrument(skip_all, err, fields(job_type = %job.job_type, id = job.id, attempts = job.attempts))]
    pub async fn process(&self, job: Job) -> Result<DispatchOutcome, DispatchError> {
        let handler =
            self.registry
                .resolve(&job.job_type)
                .ok_or_else(|| DispatchError::UnknownJobType {
                    job_type: job.job_type.clone(),
                })?;

        match handler.process(&self.queue, job).await {
            Ok(()) => Ok(DispatchOutcome::Completed),
            Err(e) => {
                tracing::error!("error during job processing: {}", e);
                Ok(DispatchOutcome::HandlerFailed)
            }
        }
    }

    /// In a loop, poll the queue with `poll_interval` and process incoming
    /// jobs one-by-one. Stops cooperatively between iterations when the token
    /// is cancelled; an in-flight handler is not preempted.
    pub async fn run(&self, poll_interval: std::time::Duration, cancellation_token: CancellationToken) {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.process_next().await {
                        Ok(_) => {}
                        Err(DispatchError::UnknownJobType { job_type }) => {
                            tracing::error!("skipping job with unknown job type '{}'", job_type);
                        }
                        Err(DispatchError::Storage(e)) => {
                            tracing::error!("encountered storage error: {}", e);
                            tracing::warn!("suspending worker for 5 seconds");
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        }
                    }
                }
                _ = cancellation_token.cancelled() => {
                    tracing::debug!("shutdown requested, stopping dispatcher");
                    return;
                }
            }
        }
    }
}
