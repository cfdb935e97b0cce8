use anyhow::Context;
use async_trait::async_trait;
use sqlx::{QueryBuilder, SqlitePool};
use toil::prelude::{Bytes, DateTime, Job, JobId, JobStore, JobUpdate, StorageError};
use tracing::instrument;

use crate::types::JobRow;

/// An implementation of the [`JobStore`] backed by SQLite.
///
/// Eligibility selection uses `ORDER BY id LIMIT 1` as a deterministic
/// tie-break; the `JobStore` contract leaves ordering unspecified.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    #[instrument(skip_all, err, ret, fields(job_type = %job_type, payload_size = payload.len()))]
    async fn insert(
        &self,
        job_type: &str,
        payload: Bytes,
        available_at: DateTime,
        created_at: DateTime,
    ) -> Result<JobId, StorageError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO toil_jobs (job_type, payload, created_at, available_at)
             VALUES (?1, ?2, ?3, ?4) RETURNING id",
        )
        .bind(job_type)
        .bind(payload.to_vec())
        .bind(created_at.timestamp_millis())
        .bind(available_at.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert job row")?;

        Ok(id)
    }

    #[instrument(skip_all, err, fields(id = id))]
    async fn update(&self, id: JobId, fields: JobUpdate) -> Result<(), StorageError> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::new("UPDATE toil_jobs SET ");
        {
            let mut set = builder.separated(", ");
            if let Some(payload) = &fields.payload {
                set.push("payload = ");
                set.push_bind_unseparated(payload.to_vec());
            }
            if let Some(locked) = fields.locked {
                set.push("locked = ");
                set.push_bind_unseparated(locked);
            }
            if let Some(locked_at) = fields.locked_at {
                set.push("locked_at = ");
                set.push_bind_unseparated(locked_at.map(|at| at.timestamp_millis()));
            }
            if let Some(available_at) = fields.available_at {
                set.push("available_at = ");
                set.push_bind_unseparated(available_at.timestamp_millis());
            }
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);

        // Zero rows affected means the job no longer exists; not an error.
        builder
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to update job row")?;

        Ok(())
    }

    #[instrument(skip_all, err, fields(id = id))]
    async fn delete(&self, id: JobId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM toil_jobs WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete job row")?;
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn count_eligible(&self, now: DateTime) -> Result<u64, StorageError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM toil_jobs WHERE locked = 0 AND available_at <= ?1",
        )
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count eligible jobs")?;

        Ok(count as u64)
    }

    #[instrument(skip_all, err)]
    async fn select_one_eligible(&self, now: DateTime) -> Result<Option<Job>, StorageError> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT id, job_type, payload, created_at, available_at, locked, locked_at, attempts
             FROM toil_jobs
             WHERE locked = 0 AND available_at <= ?1
             ORDER BY id LIMIT 1",
        )
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to select an eligible job")?;

        row.map(JobRow::into_job).transpose().map_err(Into::into)
    }

    #[instrument(skip_all, err, ret)]
    async fn bulk_release_expired(&self, expired_before: DateTime) -> Result<u64, StorageError> {
        // One conditional UPDATE, so concurrent sweepers never
        // double-increment `attempts` for the same row.
        let result = sqlx::query(
            "UPDATE toil_jobs
             SET attempts = attempts + 1, locked = 0, locked_at = NULL
             WHERE locked = 1 AND locked_at <= ?1",
        )
        .bind(expired_before.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to release expired locks")?;

        Ok(result.rows_affected())
    }
}
