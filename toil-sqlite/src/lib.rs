//! SQLite-backed [`JobStore`](toil::prelude::JobStore) implementation for `toil`.
//!
//! Timestamps are persisted as epoch milliseconds. Table provisioning is left
//! to the embedding application; [`SCHEMA_SQL`] holds the expected schema.

mod store;
mod types;

pub use store::SqliteStore;

/// Schema expected by [`SqliteStore`]. Run it once when provisioning the
/// database; the compound index backs the eligibility scans.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS toil_jobs (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    job_type     TEXT    NOT NULL,
    payload      BLOB    NOT NULL,
    created_at   INTEGER NOT NULL,
    available_at INTEGER NOT NULL,
    locked       INTEGER NOT NULL DEFAULT 0,
    locked_at    INTEGER,
    attempts     INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS toil_jobs_eligibility
    ON toil_jobs (locked, available_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use toil::prelude::*;

    async fn make_store() -> SqliteStore {
        // A single connection keeps every query on the same in-memory db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("failed to open in-memory sqlite");
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&pool)
            .await
            .expect("failed to apply schema");
        SqliteStore::with_pool(pool)
    }

    toil::generate_store_spec_tests! {
        backend = "sqlite",
        test_attr = #[tokio::test],
        setup = make_store().await
    }

    #[tokio::test]
    async fn queue_state_machine_over_sqlite() {
        let queue = JobQueue::new(make_store().await);
        let now = Utc::now();

        let id = queue
            .push_at("email", Bytes::from_static(b"hello"), Duration::zero(), now)
            .await
            .unwrap();
        assert_eq!(queue.available_jobs_at(now).await.unwrap(), 1);

        // Claim does not lock; a second claim sees the same row.
        let job = queue.claim_next_at(now).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(queue.claim_next_at(now).await.unwrap().unwrap().id, id);

        queue.lock_at(id, now).await.unwrap();
        assert!(queue.claim_next_at(now).await.unwrap().is_none());

        // Abandon the lock; the sweep inside claim reclaims it.
        let expired = now + Duration::seconds(61);
        let job = queue.claim_next_at(expired).await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);
        assert!(!job.locked);

        queue.lock_at(id, expired).await.unwrap();
        queue.delete(&job).await.unwrap();
        assert!(queue.claim_next_at(expired).await.unwrap().is_none());
        assert_eq!(queue.available_jobs_at(expired).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn release_replaces_payload_over_sqlite() {
        let queue = JobQueue::new(make_store().await);
        let now = Utc::now();

        queue
            .push_at("email", Bytes::from_static(b"v1"), Duration::zero(), now)
            .await
            .unwrap();
        let job = queue.claim_next_at(now).await.unwrap().unwrap();
        queue.lock_at(job.id, now).await.unwrap();
        queue
            .release_at(&job, Bytes::from_static(b"v2"), Duration::seconds(10), now)
            .await
            .unwrap();

        assert!(queue.claim_next_at(now).await.unwrap().is_none());
        let retried = queue
            .claim_next_at(now + Duration::seconds(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retried.payload, Bytes::from_static(b"v2"));
        assert_eq!(retried.attempts, 0);
    }
}
