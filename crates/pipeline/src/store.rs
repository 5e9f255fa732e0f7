//! Persistence of per-video results.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{Duration, Utc};
use posewatch_core::types::{Timestamp, VideoProcessingResult};
use posewatch_db::repositories::VideoProcessingResultRepo;
use posewatch_db::DbPool;

/// Errors from the result store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Upsert keyed by `video_filename`.
pub trait ResultStore: Send + Sync {
    /// Insert `result`, or overwrite the existing row for the same filename
    /// and refresh its timestamp.
    fn upsert(
        &self,
        result: &VideoProcessingResult,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// [`ResultStore`] writing to a PostgreSQL table.
///
/// The table is created on the first upsert unless [`Self::ensure_table`]
/// already succeeded. A failed attempt is repeated on the next upsert.
pub struct PgResultStore {
    pool: DbPool,
    table: String,
    table_ready: AtomicBool,
}

impl PgResultStore {
    /// `table` must already be a validated identifier.
    pub fn new(pool: DbPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
            table_ready: AtomicBool::new(false),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_table_ready(&self) -> bool {
        self.table_ready.load(Ordering::Acquire)
    }

    /// Create the result table if needed.
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        VideoProcessingResultRepo::ensure_table(&self.pool, &self.table).await?;
        if !self.table_ready.swap(true, Ordering::AcqRel) {
            tracing::info!(table = %self.table, "Result table ready");
        }
        Ok(())
    }
}

impl ResultStore for PgResultStore {
    async fn upsert(&self, result: &VideoProcessingResult) -> Result<(), StoreError> {
        if !self.is_table_ready() {
            self.ensure_table().await?;
        }
        let row = VideoProcessingResultRepo::upsert(&self.pool, &self.table, result).await?;
        tracing::debug!(
            id = row.id,
            file = %row.video_filename,
            processed_at = %row.processed_at,
            "Result row written"
        );
        Ok(())
    }
}

/// A stored result together with its write time.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    pub result: VideoProcessingResult,
    pub processed_at: Timestamp,
}

/// Process-local [`ResultStore`]. Write times strictly increase, even for
/// writes within the same clock tick.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    inner: Mutex<InMemoryState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    rows: HashMap<String, StoredResult>,
    last_write: Option<Timestamp>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, video_filename: &str) -> Option<StoredResult> {
        self.lock().rows.get(video_filename).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ResultStore for InMemoryResultStore {
    async fn upsert(&self, result: &VideoProcessingResult) -> Result<(), StoreError> {
        let mut state = self.lock();
        let now = Utc::now();
        let processed_at = match state.last_write {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        state.last_write = Some(processed_at);
        state.rows.insert(
            result.video_filename.clone(),
            StoredResult {
                result: result.clone(),
                processed_at,
            },
        );
        Ok(())
    }
}
