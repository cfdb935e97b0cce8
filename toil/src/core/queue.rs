use tracing::instrument;

use crate::core::job::{Job, JobId};
use crate::core::store::{JobStore, JobUpdate, StorageError};
use crate::core::{Bytes, DateTime, Duration, Utc};

/// Default maximum time in seconds a job may remain locked before it is
/// considered abandoned.
pub const DEFAULT_RELEASE_TIME_SECS: i64 = 60;

/// The queue service: owns a store handle and the release-timeout policy.
///
/// Holds no job data in memory between calls; the job table is the sole
/// shared mutable resource, so any number of `JobQueue` instances (or worker
/// processes) may operate against the same store concurrently.
///
/// All time arithmetic is in UTC. Every operation has an `*_at` variant
/// taking an explicit `now`, so tests can exercise time-dependent behavior
/// without sleeping.
///
/// ### Locking model
///
/// [`claim_next`](Self::claim_next) does **not** lock the job it returns.
/// Locking is left to the handler so it can inspect the job before committing
/// to processing it. Two concurrent pollers may therefore receive the same
/// row before either locks it, and [`lock`](Self::lock) offers no
/// lock-iff-still-unlocked guarantee: re-locking an already-locked row just
/// refreshes `locked_at`. This is the documented baseline contract.
pub struct JobQueue<S> {
    store: S,
    release_time: Duration,
}

impl<S: JobStore> JobQueue<S> {
    /// Create a queue with the default release timeout of 60 seconds.
    pub fn new(store: S) -> Self {
        Self::with_release_time(store, Duration::seconds(DEFAULT_RELEASE_TIME_SECS))
    }

    pub fn with_release_time(store: S, release_time: Duration) -> Self {
        Self {
            store,
            release_time,
        }
    }

    /// Maximum time a job may remain locked before the reap sweep reclaims it.
    pub fn release_time(&self) -> Duration {
        self.release_time
    }

    /// Push a job onto the queue, eligible after `delay`.
    ///
    /// A zero delay makes the job immediately eligible. A negative delay is
    /// not rejected; it behaves like zero since `available_at <= now` already
    /// holds.
    pub async fn push(
        &self,
        job_type: &str,
        payload: Bytes,
        delay: Duration,
    ) -> Result<JobId, StorageError> {
        self.push_at(job_type, payload, delay, Utc::now()).await
    }

    #[instrument(skip_all, err, ret, fields(job_type = %job_type, payload_size = payload.len()))]
    pub async fn push_at(
        &self,
        job_type: &str,
        payload: Bytes,
        delay: Duration,
        now: DateTime,
    ) -> Result<JobId, StorageError> {
        self.store.insert(job_type, payload, now + delay, now).await
    }

    /// Reap expired locks, then return one eligible job, if any.
    ///
    /// Does not lock the returned job; see the type-level docs.
    pub async fn claim_next(&self) -> Result<Option<Job>, StorageError> {
        self.claim_next_at(Utc::now()).await
    }

    #[instrument(skip_all, err)]
    pub async fn claim_next_at(&self, now: DateTime) -> Result<Option<Job>, StorageError> {
        let reclaimed = self
            .store
            .bulk_release_expired(now - self.release_time)
            .await?;
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "reclaimed jobs with expired locks");
        }
        self.store.select_one_eligible(now).await
    }

    /// Mark a job as in-progress: `locked = true`, `locked_at = now`.
    ///
    /// Expected to be called exactly once per claim, before doing any work.
    /// Locking a job that no longer exists is a silent no-op.
    pub async fn lock(&self, id: JobId) -> Result<(), StorageError> {
        self.lock_at(id, Utc::now()).await
    }

    #[instrument(skip_all, err, fields(id = id))]
    pub async fn lock_at(&self, id: JobId, now: DateTime) -> Result<(), StorageError> {
        self.store.update(id, JobUpdate::take_lock(now)).await
    }

    /// Return a job to the eligible pool with a new payload and delay.
    ///
    /// Used by a handler that wants the job retried later without waiting for
    /// the reap timeout. The payload is replaced, which lets a handler record
    /// error context or a remaining-retries counter for the next attempt;
    /// pass `job.payload.clone()` to keep it unchanged.
    pub async fn release(
        &self,
        job: &Job,
        payload: Bytes,
        delay: Duration,
    ) -> Result<(), StorageError> {
        self.release_at(job, payload, delay, Utc::now()).await
    }

    #[instrument(skip_all, err, fields(id = job.id, job_type = %job.job_type))]
    pub async fn release_at(
        &self,
        job: &Job,
        payload: Bytes,
        delay: Duration,
        now: DateTime,
    ) -> Result<(), StorageError> {
        self.store
            .update(job.id, JobUpdate::release(payload, now + delay))
            .await
    }

    /// Remove a job from the queue. Used by a handler on success, or on
    /// terminal failure where no further retry is desired.
    ///
    /// This is the only way a row ever leaves the queue; the queue never
    /// deletes a row on its own.
    #[instrument(skip_all, err, fields(id = job.id, job_type = %job.job_type))]
    pub async fn delete(&self, job: &Job) -> Result<(), StorageError> {
        self.store.delete(job.id).await
    }

    /// Number of currently eligible jobs, for monitoring and backpressure.
    pub async fn available_jobs(&self) -> Result<u64, StorageError> {
        self.available_jobs_at(Utc::now()).await
    }

    pub async fn available_jobs_at(&self, now: DateTime) -> Result<u64, StorageError> {
        self.store.count_eligible(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn queue() -> (MemoryStore, JobQueue<MemoryStore>) {
        let store = MemoryStore::new();
        (store.clone(), JobQueue::new(store))
    }

    #[tokio::test]
    async fn push_sets_timestamps_from_delay() {
        let (store, queue) = queue();

        let id = queue
            .push_at("email", Bytes::from_static(b"a"), Duration::seconds(30), t0())
            .await
            .unwrap();

        let job = store.get(id).await.unwrap();
        assert_eq!(job.created_at, t0());
        assert_eq!(job.available_at, t0() + Duration::seconds(30));
        assert!(!job.locked);
        assert_eq!(job.locked_at, None);
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn delayed_job_is_invisible_until_available_at() {
        let (_, queue) = queue();
        let delay = Duration::seconds(30);

        queue
            .push_at("email", Bytes::new(), delay, t0())
            .await
            .unwrap();

        assert!(queue.claim_next_at(t0()).await.unwrap().is_none());
        assert!(queue
            .claim_next_at(t0() + delay - Duration::seconds(1))
            .await
            .unwrap()
            .is_none());
        assert!(queue.claim_next_at(t0() + delay).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn negative_delay_is_immediately_eligible() {
        let (_, queue) = queue();

        queue
            .push_at("email", Bytes::new(), Duration::seconds(-10), t0())
            .await
            .unwrap();

        assert!(queue.claim_next_at(t0()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn claim_does_not_lock_the_returned_job() {
        // Two pollers claiming before either locks may legally receive the
        // same row. This asserts the current contract, not mutual exclusion.
        let (_, queue) = queue();

        let id = queue
            .push_at("email", Bytes::new(), Duration::zero(), t0())
            .await
            .unwrap();

        let first = queue.claim_next_at(t0()).await.unwrap().unwrap();
        let second = queue.claim_next_at(t0()).await.unwrap().unwrap();

        assert_eq!(first.id, id);
        assert_eq!(second.id, id);
        assert!(!first.locked);
    }

    #[tokio::test]
    async fn lock_sets_locked_fields_and_hides_the_job() {
        let (store, queue) = queue();

        let id = queue
            .push_at("email", Bytes::new(), Duration::zero(), t0())
            .await
            .unwrap();
        queue.lock_at(id, t0()).await.unwrap();

        let job = store.get(id).await.unwrap();
        assert!(job.locked);
        assert_eq!(job.locked_at, Some(t0()));
        assert!(queue.claim_next_at(t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_returns_job_with_new_payload_and_delay() {
        let (store, queue) = queue();

        let id = queue
            .push_at("email", Bytes::from_static(b"v1"), Duration::zero(), t0())
            .await
            .unwrap();
        let job = queue.claim_next_at(t0()).await.unwrap().unwrap();
        queue.lock_at(id, t0()).await.unwrap();

        queue
            .release_at(&job, Bytes::from_static(b"v2"), Duration::seconds(15), t0())
            .await
            .unwrap();

        let row = store.get(id).await.unwrap();
        assert!(!row.locked);
        assert_eq!(row.locked_at, None);
        assert_eq!(row.available_at, t0() + Duration::seconds(15));
        assert_eq!(row.payload, Bytes::from_static(b"v2"));
        // Release is not an attempt; only the reap sweep increments it.
        assert_eq!(row.attempts, 0);
    }

    #[tokio::test]
    async fn delete_removes_the_row_permanently() {
        let (store, queue) = queue();

        queue
            .push_at("email", Bytes::new(), Duration::zero(), t0())
            .await
            .unwrap();
        let job = queue.claim_next_at(t0()).await.unwrap().unwrap();
        queue.lock_at(job.id, t0()).await.unwrap();
        queue.delete(&job).await.unwrap();

        assert!(store.get(job.id).await.is_none());
        assert!(queue.claim_next_at(t0()).await.unwrap().is_none());
        assert_eq!(queue.available_jobs_at(t0()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn available_jobs_tracks_eligible_count() {
        let (_, queue) = queue();

        let a = queue
            .push_at("a", Bytes::new(), Duration::zero(), t0())
            .await
            .unwrap();
        queue
            .push_at("b", Bytes::new(), Duration::zero(), t0())
            .await
            .unwrap();
        queue
            .push_at("c", Bytes::new(), Duration::seconds(60), t0())
            .await
            .unwrap();

        assert_eq!(queue.available_jobs_at(t0()).await.unwrap(), 2);

        queue.lock_at(a, t0()).await.unwrap();
        assert_eq!(queue.available_jobs_at(t0()).await.unwrap(), 1);

        assert_eq!(
            queue
                .available_jobs_at(t0() + Duration::seconds(60))
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn stale_lock_is_reaped_with_one_attempt() {
        let (store, queue) = queue();

        let id = queue
            .push_at("email", Bytes::new(), Duration::zero(), t0())
            .await
            .unwrap();
        queue.lock_at(id, t0()).await.unwrap();

        // Still within the release timeout: nothing to reclaim.
        let later = t0() + Duration::seconds(59);
        assert!(queue.claim_next_at(later).await.unwrap().is_none());

        // Past the timeout: the sweep reclaims it.
        let expired = t0() + Duration::seconds(61);
        let job = queue.claim_next_at(expired).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert!(!job.locked);
        assert_eq!(job.locked_at, None);
        assert_eq!(job.attempts, 1);

        // Reap idempotence: a second sweep with no lock changes is a no-op.
        queue.claim_next_at(expired).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn custom_release_time_is_honored() {
        let store = MemoryStore::new();
        let queue = JobQueue::with_release_time(store.clone(), Duration::seconds(5));

        let id = queue
            .push_at("email", Bytes::new(), Duration::zero(), t0())
            .await
            .unwrap();
        queue.lock_at(id, t0()).await.unwrap();

        assert!(queue
            .claim_next_at(t0() + Duration::seconds(4))
            .await
            .unwrap()
            .is_none());
        let job = queue
            .claim_next_at(t0() + Duration::seconds(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn relocking_refreshes_locked_at() {
        // No lock-iff-unlocked primitive: a second lock just moves the stamp.
        let (store, queue) = queue();

        let id = queue
            .push_at("email", Bytes::new(), Duration::zero(), t0())
            .await
            .unwrap();
        queue.lock_at(id, t0()).await.unwrap();
        queue
            .lock_at(id, t0() + Duration::seconds(10))
            .await
            .unwrap();

        let job = store.get(id).await.unwrap();
        assert_eq!(job.locked_at, Some(t0() + Duration::seconds(10)));
    }
}
