//! In-memory job store for tests and single-process use.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::job::{Job, JobId};
use crate::core::store::{JobStore, JobUpdate, StorageError};
use crate::core::{Bytes, DateTime};

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<JobId, Job>,
    next_id: JobId,
}

/// An implementation of [`JobStore`] backed by an in-process map.
///
/// Cloning creates a new handle to the same underlying table, so a queue and
/// a test can share state. `BTreeMap` iteration order makes selection pick
/// the lowest eligible id, the same tie-break the SQLite store uses; this is
/// an implementation choice, not part of the `JobStore` contract.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a row by id, for inspection in tests.
    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.inner.read().await.rows.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.rows.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(
        &self,
        job_type: &str,
        payload: Bytes,
        available_at: DateTime,
        created_at: DateTime,
    ) -> Result<JobId, StorageError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.insert(
            id,
            Job {
                id,
                job_type: job_type.to_string(),
                payload,
                created_at,
                available_at,
                locked: false,
                locked_at: None,
                attempts: 0,
            },
        );
        Ok(id)
    }

    async fn update(&self, id: JobId, fields: JobUpdate) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        // Missing row: zero rows affected, not an error.
        if let Some(row) = inner.rows.get_mut(&id) {
            if let Some(payload) = fields.payload {
                row.payload = payload;
            }
            if let Some(locked) = fields.locked {
                row.locked = locked;
            }
            if let Some(locked_at) = fields.locked_at {
                row.locked_at = locked_at;
            }
            if let Some(available_at) = fields.available_at {
                row.available_at = available_at;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: JobId) -> Result<(), StorageError> {
        self.inner.write().await.rows.remove(&id);
        Ok(())
    }

    async fn count_eligible(&self, now: DateTime) -> Result<u64, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.rows.values().filter(|j| j.is_eligible(now)).count() as u64)
    }

    async fn select_one_eligible(&self, now: DateTime) -> Result<Option<Job>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .find(|j| j.is_eligible(now))
            .cloned())
    }

    async fn bulk_release_expired(&self, expired_before: DateTime) -> Result<u64, StorageError> {
        // Single pass under the write lock, so concurrent sweepers serialize
        // and never double-increment `attempts` for the same row.
        let mut inner = self.inner.write().await;
        let mut reclaimed = 0;
        for row in inner.rows.values_mut() {
            if row.locked && row.locked_at.is_some_and(|at| at <= expired_before) {
                row.attempts += 1;
                row.locked = false;
                row.locked_at = None;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}
