use async_trait::async_trait;
use thiserror::Error;

use crate::core::job::Job;
use crate::core::queue::JobQueue;
use crate::core::store::{JobStore, StorageError};

/// Error raised inside handler execution.
///
/// Caught at the dispatch boundary, logged, and the loop continues: the job's
/// locked state is whatever the handler left it in, to be reclaimed by the
/// reap sweep if it stays locked. Fail open, recover via timeout.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A job handler, resolved by the dispatcher from a job's `job_type` tag.
///
/// The handler owns the job's lifecycle: the dispatcher never locks, deletes,
/// or releases a job on its own. A typical handler locks the job first, does
/// its work, then deletes it on success or releases it with a new delay for a
/// retriable failure. A handler that returns an error without cleaning up
/// leaves the job to the reap sweep.
///
/// ## Example
/// ```rust
/// use async_trait::async_trait;
/// use toil::memory::MemoryStore;
/// use toil::prelude::*;
///
/// struct Echo;
///
/// #[async_trait]
/// impl JobHandler<MemoryStore> for Echo {
///     async fn process(
///         &self,
///         queue: &JobQueue<MemoryStore>,
///         job: Job,
///     ) -> Result<(), HandlerError> {
///         queue.lock(job.id).await?;
///         println!("{}", String::from_utf8_lossy(&job.payload));
///         queue.delete(&job).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobHandler<S: JobStore>: Send + Sync {
    async fn process(&self, queue: &JobQueue<S>, job: Job) -> Result<(), HandlerError>;
}
