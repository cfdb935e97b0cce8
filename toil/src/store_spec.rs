//! Shared test specifications for [`JobStore`] implementations.
//!
//! These test functions can be called by any backend (memory, SQLite, etc.)
//! to ensure consistent behavior across all implementations. All of them take
//! explicit instants, so no test ever sleeps.

use crate::core::store::{JobStore, JobUpdate};
use crate::core::{Bytes, DateTime, Duration, Utc};
use chrono::TimeZone;

/// Generate all store spec test wrappers for a backend.
///
/// # Usage
///
/// ```ignore
/// // Memory example
/// toil::generate_store_spec_tests! {
///     backend = "memory",
///     test_attr = #[tokio::test],
///     setup = MemoryStore::new()
/// }
///
/// // SQLite example
/// toil::generate_store_spec_tests! {
///     backend = "sqlite",
///     test_attr = #[tokio::test],
///     setup = make_store().await
/// }
/// ```
#[macro_export]
macro_rules! generate_store_spec_tests {
    (
        backend = $backend:literal,
        test_attr = #[$test_attr:meta],
        setup = $setup:expr
    ) => {
        paste::paste! {
            #[$test_attr]
            async fn [<insert_round_trips_fields_ $backend>]() {
                $crate::store_spec::test_insert_round_trips_fields($setup).await;
            }

            #[$test_attr]
            async fn [<insert_assigns_distinct_ids_ $backend>]() {
                $crate::store_spec::test_insert_assigns_distinct_ids($setup).await;
            }

            #[$test_attr]
            async fn [<delay_gates_eligibility_ $backend>]() {
                $crate::store_spec::test_delay_gates_eligibility($setup).await;
            }

            #[$test_attr]
            async fn [<select_skips_locked_rows_ $backend>]() {
                $crate::store_spec::test_select_skips_locked_rows($setup).await;
            }

            #[$test_attr]
            async fn [<select_prefers_lowest_id_ $backend>]() {
                $crate::store_spec::test_select_prefers_lowest_id($setup).await;
            }

            #[$test_attr]
            async fn [<count_eligible_tracks_state_ $backend>]() {
                $crate::store_spec::test_count_eligible_tracks_state($setup).await;
            }

            #[$test_attr]
            async fn [<update_is_partial_ $backend>]() {
                $crate::store_spec::test_update_is_partial($setup).await;
            }

            #[$test_attr]
            async fn [<update_missing_row_is_noop_ $backend>]() {
                $crate::store_spec::test_update_missing_row_is_noop($setup).await;
            }

            #[$test_attr]
            async fn [<delete_missing_row_is_noop_ $backend>]() {
                $crate::store_spec::test_delete_missing_row_is_noop($setup).await;
            }

            #[$test_attr]
            async fn [<bulk_release_unlocks_and_increments_ $backend>]() {
                $crate::store_spec::test_bulk_release_unlocks_and_increments($setup).await;
            }

            #[$test_attr]
            async fn [<bulk_release_is_idempotent_ $backend>]() {
                $crate::store_spec::test_bulk_release_is_idempotent($setup).await;
            }

            #[$test_attr]
            async fn [<bulk_release_spares_fresh_locks_ $backend>]() {
                $crate::store_spec::test_bulk_release_spares_fresh_locks($setup).await;
            }
        }
    };
}

fn t0() -> DateTime {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub async fn test_insert_round_trips_fields<S: JobStore>(store: S) {
    let available_at = t0() + Duration::seconds(5);
    let id = store
        .insert("email", Bytes::from_static(b"payload"), available_at, t0())
        .await
        .unwrap();

    let job = store
        .select_one_eligible(available_at)
        .await
        .unwrap()
        .expect("job should be eligible at available_at");

    assert_eq!(job.id, id);
    assert_eq!(job.job_type, "email");
    assert_eq!(job.payload, Bytes::from_static(b"payload"));
    assert_eq!(job.created_at, t0());
    assert_eq!(job.available_at, available_at);
    assert!(!job.locked);
    assert_eq!(job.locked_at, None);
    assert_eq!(job.attempts, 0);
}

pub async fn test_insert_assigns_distinct_ids<S: JobStore>(store: S) {
    let a = store.insert("a", Bytes::new(), t0(), t0()).await.unwrap();
    let b = store.insert("b", Bytes::new(), t0(), t0()).await.unwrap();

    assert_ne!(a, b);
}

pub async fn test_delay_gates_eligibility<S: JobStore>(store: S) {
    let available_at = t0() + Duration::seconds(30);
    store
        .insert("email", Bytes::new(), available_at, t0())
        .await
        .unwrap();

    assert!(store.select_one_eligible(t0()).await.unwrap().is_none());
    assert!(store
        .select_one_eligible(available_at - Duration::seconds(1))
        .await
        .unwrap()
        .is_none());
    assert!(store
        .select_one_eligible(available_at)
        .await
        .unwrap()
        .is_some());
    assert!(store
        .select_one_eligible(available_at + Duration::seconds(1))
        .await
        .unwrap()
        .is_some());
}

pub async fn test_select_skips_locked_rows<S: JobStore>(store: S) {
    let id = store
        .insert("email", Bytes::new(), t0(), t0())
        .await
        .unwrap();

    store
        .update(id, JobUpdate::take_lock(t0()))
        .await
        .unwrap();

    assert!(store.select_one_eligible(t0()).await.unwrap().is_none());
    assert_eq!(store.count_eligible(t0()).await.unwrap(), 0);
}

// Lowest-id selection is an implementation choice shared by the shipped
// stores, not part of the JobStore contract.
pub async fn test_select_prefers_lowest_id<S: JobStore>(store: S) {
    let first = store.insert("a", Bytes::new(), t0(), t0()).await.unwrap();
    store.insert("b", Bytes::new(), t0(), t0()).await.unwrap();

    let job = store.select_one_eligible(t0()).await.unwrap().unwrap();
    assert_eq!(job.id, first);
}

pub async fn test_count_eligible_tracks_state<S: JobStore>(store: S) {
    let a = store.insert("a", Bytes::new(), t0(), t0()).await.unwrap();
    let b = store.insert("b", Bytes::new(), t0(), t0()).await.unwrap();
    store
        .insert("c", Bytes::new(), t0() + Duration::seconds(60), t0())
        .await
        .unwrap();

    assert_eq!(store.count_eligible(t0()).await.unwrap(), 2);

    store.update(a, JobUpdate::take_lock(t0())).await.unwrap();
    assert_eq!(store.count_eligible(t0()).await.unwrap(), 1);

    store.delete(b).await.unwrap();
    assert_eq!(store.count_eligible(t0()).await.unwrap(), 0);

    // The delayed job becomes eligible once its instant passes.
    assert_eq!(
        store
            .count_eligible(t0() + Duration::seconds(60))
            .await
            .unwrap(),
        1
    );
}

pub async fn test_update_is_partial<S: JobStore>(store: S) {
    let id = store
        .insert("email", Bytes::from_static(b"original"), t0(), t0())
        .await
        .unwrap();

    // Only the lock fields change; payload and available_at stay put.
    store.update(id, JobUpdate::take_lock(t0())).await.unwrap();
    store
        .update(
            id,
            JobUpdate {
                locked: Some(false),
                locked_at: Some(None),
                ..JobUpdate::default()
            },
        )
        .await
        .unwrap();

    let job = store.select_one_eligible(t0()).await.unwrap().unwrap();
    assert_eq!(job.payload, Bytes::from_static(b"original"));
    assert_eq!(job.available_at, t0());
    assert!(!job.locked);
    assert_eq!(job.locked_at, None);
}

pub async fn test_update_missing_row_is_noop<S: JobStore>(store: S) {
    store
        .update(4242, JobUpdate::take_lock(t0()))
        .await
        .expect("updating a missing row must not be an error");
}

pub async fn test_delete_missing_row_is_noop<S: JobStore>(store: S) {
    store
        .delete(4242)
        .await
        .expect("deleting a missing row must not be an error");
}

pub async fn test_bulk_release_unlocks_and_increments<S: JobStore>(store: S) {
    let stale = store.insert("a", Bytes::new(), t0(), t0()).await.unwrap();
    store
        .update(stale, JobUpdate::take_lock(t0()))
        .await
        .unwrap();

    let reclaimed = store.bulk_release_expired(t0()).await.unwrap();
    assert_eq!(reclaimed, 1);

    let job = store.select_one_eligible(t0()).await.unwrap().unwrap();
    assert_eq!(job.id, stale);
    assert!(!job.locked);
    assert_eq!(job.locked_at, None);
    assert_eq!(job.attempts, 1);
}

pub async fn test_bulk_release_is_idempotent<S: JobStore>(store: S) {
    let id = store.insert("a", Bytes::new(), t0(), t0()).await.unwrap();
    store.update(id, JobUpdate::take_lock(t0())).await.unwrap();

    assert_eq!(store.bulk_release_expired(t0()).await.unwrap(), 1);
    // No row remains locked past the threshold after the first sweep.
    assert_eq!(store.bulk_release_expired(t0()).await.unwrap(), 0);

    let job = store.select_one_eligible(t0()).await.unwrap().unwrap();
    assert_eq!(job.attempts, 1);
}

pub async fn test_bulk_release_spares_fresh_locks<S: JobStore>(store: S) {
    let fresh = store.insert("a", Bytes::new(), t0(), t0()).await.unwrap();
    store
        .update(fresh, JobUpdate::take_lock(t0() + Duration::seconds(30)))
        .await
        .unwrap();

    // Threshold is before the lock was taken: nothing to reclaim.
    assert_eq!(store.bulk_release_expired(t0()).await.unwrap(), 0);
    assert!(store
        .select_one_eligible(t0() + Duration::seconds(30))
        .await
        .unwrap()
        .is_none());
}
