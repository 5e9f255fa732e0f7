//! Stored processing result for one video.
//!
//! Maps to the configurable result table created by
//! [`VideoProcessingResultRepo::ensure_table`](crate::repositories::VideoProcessingResultRepo::ensure_table).

use posewatch_core::types::{Timestamp, VideoProcessingResult};
use serde::Serialize;
use sqlx::FromRow;

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// A row from the result table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VideoProcessingResultRow {
    pub id: DbId,
    pub video_filename: String,
    pub duration_seconds: f64,
    pub resolution: String,
    pub codec: String,
    pub frame_rate: String,
    pub corrupted: Option<bool>,
    pub pose_file_path: String,
    /// Server time of the latest insert or update.
    pub processed_at: Timestamp,
}

impl VideoProcessingResultRow {
    /// The in-memory result this row was written from.
    pub fn to_result(&self) -> VideoProcessingResult {
        VideoProcessingResult {
            video_filename: self.video_filename.clone(),
            duration_seconds: self.duration_seconds,
            resolution: self.resolution.clone(),
            codec: self.codec.clone(),
            frame_rate: self.frame_rate.clone(),
            corrupted: self.corrupted,
            pose_file_path: self.pose_file_path.clone(),
        }
    }
}
