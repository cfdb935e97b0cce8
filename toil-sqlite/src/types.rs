use anyhow::Context;
use sqlx::FromRow;
use toil::prelude::{Bytes, DateTime, Job};

/// Raw row shape as stored in SQLite: timestamps are epoch milliseconds.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct JobRow {
    pub(crate) id: i64,
    pub(crate) job_type: String,
    pub(crate) payload: Vec<u8>,
    pub(crate) created_at: i64,
    pub(crate) available_at: i64,
    pub(crate) locked: bool,
    pub(crate) locked_at: Option<i64>,
    pub(crate) attempts: i64,
}

impl JobRow {
    pub(crate) fn into_job(self) -> anyhow::Result<Job> {
        Ok(Job {
            id: self.id,
            job_type: self.job_type,
            payload: Bytes::from(self.payload),
            created_at: millis_to_datetime(self.created_at)?,
            available_at: millis_to_datetime(self.available_at)?,
            locked: self.locked,
            locked_at: self.locked_at.map(millis_to_datetime).transpose()?,
            attempts: u32::try_from(self.attempts).context("stored attempts out of range")?,
        })
    }
}

pub(crate) fn millis_to_datetime(millis: i64) -> anyhow::Result<DateTime> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| anyhow::anyhow!("stored timestamp out of range: {millis}"))
}
