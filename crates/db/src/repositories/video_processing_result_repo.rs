//! Repository for the processing result table.
//!
//! The table name is configurable, so it is interpolated into every query.
//! Callers must pass an identifier that has already been validated (see
//! `WatcherConfig::validate`).

use posewatch_core::types::VideoProcessingResult;
use sqlx::PgPool;

use crate::models::video_processing_result::VideoProcessingResultRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, video_filename, duration_seconds, resolution, codec, frame_rate, \
                       corrupted, pose_file_path, processed_at";

/// Provides data access for per-video processing results.
pub struct VideoProcessingResultRepo;

impl VideoProcessingResultRepo {
    /// Create the result table if it does not exist yet.
    pub async fn ensure_table(pool: &PgPool, table: &str) -> Result<(), sqlx::Error> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id               BIGSERIAL PRIMARY KEY,
                video_filename   TEXT NOT NULL UNIQUE,
                duration_seconds DOUBLE PRECISION NOT NULL DEFAULT 0,
                resolution       TEXT NOT NULL DEFAULT 'N/A',
                codec            TEXT NOT NULL DEFAULT 'N/A',
                frame_rate       TEXT NOT NULL DEFAULT '0.00',
                corrupted        BOOLEAN,
                pose_file_path   TEXT NOT NULL DEFAULT 'N/A',
                processed_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
             )"
        );
        sqlx::query(&ddl).execute(pool).await?;
        Ok(())
    }

    /// Insert a result, or overwrite every mutable field of the existing row
    /// with the same `video_filename` and refresh `processed_at`.
    ///
    /// Runs in its own transaction. On failure the transaction is rolled
    /// back and the error returned to the caller.
    pub async fn upsert(
        pool: &PgPool,
        table: &str,
        result: &VideoProcessingResult,
    ) -> Result<VideoProcessingResultRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO {table} \
                (video_filename, duration_seconds, resolution, codec, frame_rate, corrupted, pose_file_path) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (video_filename) DO UPDATE \
             SET duration_seconds = EXCLUDED.duration_seconds, \
                 resolution = EXCLUDED.resolution, \
                 codec = EXCLUDED.codec, \
                 frame_rate = EXCLUDED.frame_rate, \
                 corrupted = EXCLUDED.corrupted, \
                 pose_file_path = EXCLUDED.pose_file_path, \
                 processed_at = NOW() \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let row = sqlx::query_as::<_, VideoProcessingResultRow>(&query)
            .bind(&result.video_filename)
            .bind(result.duration_seconds)
            .bind(&result.resolution)
            .bind(&result.codec)
            .bind(&result.frame_rate)
            .bind(result.corrupted)
            .bind(&result.pose_file_path)
            .fetch_one(&mut *tx)
            .await;

        match row {
            Ok(row) => {
                tx.commit().await?;
                Ok(row)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        error = %rollback_err,
                        file = %result.video_filename,
                        "Rollback after failed upsert also failed"
                    );
                }
                Err(e)
            }
        }
    }

    /// Find the result row for a filename.
    pub async fn find_by_filename(
        pool: &PgPool,
        table: &str,
        video_filename: &str,
    ) -> Result<Option<VideoProcessingResultRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {table} WHERE video_filename = $1");
        sqlx::query_as::<_, VideoProcessingResultRow>(&query)
            .bind(video_filename)
            .fetch_optional(pool)
            .await
    }

    /// Number of rows in the table.
    pub async fn count(pool: &PgPool, table: &str) -> Result<i64, sqlx::Error> {
        let query = format!("SELECT COUNT(*) FROM {table}");
        let (count,): (i64,) = sqlx::query_as(&query).fetch_one(pool).await?;
        Ok(count)
    }
}
