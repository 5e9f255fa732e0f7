use serde::Serialize;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Sentinel stored in text columns whose value could not be determined.
pub const NOT_AVAILABLE: &str = "N/A";

/// Frame rate recorded when the stream did not report one.
pub const DEFAULT_FRAME_RATE: &str = "0.00";

/// Everything recorded about one video file, keyed by its base name.
///
/// Built incrementally by metadata extraction, the corruption check and the
/// pose extraction pass, then handed to a result store exactly once per
/// processing attempt. The store assigns `processed_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoProcessingResult {
    pub video_filename: String,
    pub duration_seconds: f64,
    /// `"<width> x <height>"` or [`NOT_AVAILABLE`].
    pub resolution: String,
    pub codec: String,
    /// Two-decimal frame rate, e.g. `"29.97"`.
    pub frame_rate: String,
    /// `None` until the corruption check has run.
    pub corrupted: Option<bool>,
    pub pose_file_path: String,
}

impl VideoProcessingResult {
    /// A result carrying only the filename, every other field at its default.
    pub fn new(video_filename: impl Into<String>) -> Self {
        Self {
            video_filename: video_filename.into(),
            duration_seconds: 0.0,
            resolution: NOT_AVAILABLE.to_string(),
            codec: NOT_AVAILABLE.to_string(),
            frame_rate: DEFAULT_FRAME_RATE.to_string(),
            corrupted: None,
            pose_file_path: NOT_AVAILABLE.to_string(),
        }
    }
}
