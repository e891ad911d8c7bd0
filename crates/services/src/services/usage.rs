//! Hourly edit-quota store behind a narrow seam.
//!
//! The orchestrator only needs `count` and `increment` keyed by
//! (user, hour bucket); persistence stays out of the edit pipeline and tests
//! run against the in-memory fake.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::models::ai_usage::AiUsage;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UsageStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Edit count recorded for the user in the given hour bucket.
    async fn count(&self, user_id: Uuid, bucket: DateTime<Utc>) -> Result<i64, UsageStoreError>;

    /// Record one edit, returning the new count.
    async fn increment(&self, user_id: Uuid, bucket: DateTime<Utc>)
    -> Result<i64, UsageStoreError>;
}

/// SQLite-backed store used in production.
#[derive(Clone)]
pub struct SqliteUsageStore {
    pool: SqlitePool,
}

impl SqliteUsageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStore for SqliteUsageStore {
    async fn count(&self, user_id: Uuid, bucket: DateTime<Utc>) -> Result<i64, UsageStoreError> {
        Ok(AiUsage::current_count(&self.pool, user_id, bucket).await?)
    }

    async fn increment(
        &self,
        user_id: Uuid,
        bucket: DateTime<Utc>,
    ) -> Result<i64, UsageStoreError> {
        Ok(AiUsage::increment(&self.pool, user_id, bucket).await?)
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryUsageStore {
    counts: Mutex<HashMap<(Uuid, DateTime<Utc>), i64>>,
}

impl InMemoryUsageStore {
    pub fn with_count(user_id: Uuid, bucket: DateTime<Utc>, count: i64) -> Self {
        let store = Self::default();
        store
            .counts
            .lock()
            .expect("usage store lock")
            .insert((user_id, bucket), count);
        store
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn count(&self, user_id: Uuid, bucket: DateTime<Utc>) -> Result<i64, UsageStoreError> {
        Ok(*self
            .counts
            .lock()
            .expect("usage store lock")
            .get(&(user_id, bucket))
            .unwrap_or(&0))
    }

    async fn increment(
        &self,
        user_id: Uuid,
        bucket: DateTime<Utc>,
    ) -> Result<i64, UsageStoreError> {
        let mut counts = self.counts.lock().expect("usage store lock");
        let entry = counts.entry((user_id, bucket)).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }
}
