use async_trait::async_trait;
use thiserror::Error;

use crate::core::job::{Job, JobId};
use crate::core::{Bytes, DateTime};

/// The underlying store failed to execute an operation.
///
/// Backends attach context with `anyhow::Context` and convert via `?`.
/// Never swallowed at this layer: callers of the queue operation that
/// triggered it see the failure.
#[derive(Debug, Error)]
#[error("storage error: {0}")]
pub struct StorageError(#[from] anyhow::Error);

/// Field set for a partial job row update.
///
/// Only fields that are `Some` are written. An empty update is a no-op.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub payload: Option<Bytes>,
    pub locked: Option<bool>,
    /// `Some(None)` writes NULL; `None` leaves the column alone.
    pub locked_at: Option<Option<DateTime>>,
    pub available_at: Option<DateTime>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
            && self.locked.is_none()
            && self.locked_at.is_none()
            && self.available_at.is_none()
    }

    /// Fields for taking a lock: `locked = true, locked_at = now`.
    pub fn take_lock(now: DateTime) -> Self {
        Self {
            locked: Some(true),
            locked_at: Some(Some(now)),
            ..Self::default()
        }
    }

    /// Fields for releasing a job back to the eligible pool.
    pub fn release(payload: Bytes, available_at: DateTime) -> Self {
        Self {
            payload: Some(payload),
            locked: Some(false),
            locked_at: Some(None),
            available_at: Some(available_at),
        }
    }
}

/// Durable table of job rows.
///
/// All operations are single-row or predicate-scoped, with no in-process
/// caching. Implementations must be safe under concurrent readers and writers
/// of the same table; all mutual exclusion between workers is expressed
/// through the `locked`/`locked_at` columns.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new row with `locked = false` and `attempts = 0`.
    async fn insert(
        &self,
        job_type: &str,
        payload: Bytes,
        available_at: DateTime,
        created_at: DateTime,
    ) -> Result<JobId, StorageError>;

    /// Partial update by primary key.
    ///
    /// Zero rows affected is not an error: callers must not assume the job
    /// still exists.
    async fn update(&self, id: JobId, fields: JobUpdate) -> Result<(), StorageError>;

    /// Remove a row by primary key. Deleting a nonexistent id is a silent no-op.
    async fn delete(&self, id: JobId) -> Result<(), StorageError>;

    /// Count of rows with `locked = false` and `available_at <= now`.
    async fn count_eligible(&self, now: DateTime) -> Result<u64, StorageError>;

    /// Return one eligible row, or `None` if no such row exists.
    ///
    /// Selection order among eligible rows is not part of this contract.
    /// Shipped implementations pick the lowest id as a deterministic
    /// tie-break, but callers must not rely on any ordering.
    async fn select_one_eligible(&self, now: DateTime) -> Result<Option<Job>, StorageError>;

    /// Crash-recovery sweep: for every row with `locked = true` and
    /// `locked_at <= expired_before`, set `attempts = attempts + 1`,
    /// `locked = false`, `locked_at = NULL`. Returns the number of rows
    /// reclaimed.
    ///
    /// Must be a single atomic storage-level statement, not read-then-write,
    /// so concurrent sweepers never double-increment `attempts` for the same
    /// row.
    async fn bulk_release_expired(&self, expired_before: DateTime) -> Result<u64, StorageError>;
}
