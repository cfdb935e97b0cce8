use crate::core::{Bytes, DateTime};

/// Store-assigned job identity. Immutable once assigned, never reused.
pub type JobId = i64;

/// One unit of work, as persisted in the job table.
///
/// The payload is opaque to the queue: callers supply already-serialized
/// bytes and handlers decide how to interpret them.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    /// Opaque tag naming the handler to invoke.
    pub job_type: String,
    pub payload: Bytes,
    /// Set once at push time.
    pub created_at: DateTime,
    /// Earliest moment the job may be claimed.
    pub available_at: DateTime,
    /// True while a worker holds the job.
    pub locked: bool,
    /// Non-null iff `locked` is true.
    pub locked_at: Option<DateTime>,
    /// Incremented each time a lock expires before completion. Never resets.
    pub attempts: u32,
}

impl Job {
    /// A job is eligible iff it is unlocked and its `available_at` has passed.
    pub fn is_eligible(&self, now: DateTime) -> bool {
        !self.locked && self.available_at <= now
    }
}
