//! Best-effort metadata extraction.
//!
//! [`probe_metadata`] never fails: every sub-step records what it could into
//! a [`MetadataBuilder`] and the builder is always turned into a
//! [`VideoProcessingResult`], so persistence receives a value even when the
//! file is unreadable.

use std::path::Path;

use crate::types::{VideoProcessingResult, DEFAULT_FRAME_RATE, NOT_AVAILABLE};
use crate::video::{StreamInspector, StreamProperties, VideoSource};

/// Accumulates optional metadata fields for one file.
#[derive(Debug, Clone, Default)]
pub struct MetadataBuilder {
    video_filename: String,
    frame_rate: Option<f64>,
    duration_seconds: Option<f64>,
    resolution: Option<(i32, i32)>,
    codec: Option<String>,
}

impl MetadataBuilder {
    pub fn new(video_filename: impl Into<String>) -> Self {
        Self {
            video_filename: video_filename.into(),
            ..Default::default()
        }
    }

    /// Record frame rate, derived duration and resolution from stream properties.
    pub fn stream_properties(&mut self, props: &StreamProperties) -> &mut Self {
        self.frame_rate = Some(props.fps);
        self.duration_seconds = Some(duration_seconds(props.frame_count, props.fps));
        self.resolution = Some((props.width, props.height));
        self
    }

    pub fn codec(&mut self, codec: impl Into<String>) -> &mut Self {
        self.codec = Some(codec.into());
        self
    }

    /// Produce a result, substituting defaults for every field not recorded.
    pub fn build(&self) -> VideoProcessingResult {
        let mut result = VideoProcessingResult::new(self.video_filename.clone());
        result.duration_seconds = self.duration_seconds.unwrap_or(0.0);
        result.frame_rate = self
            .frame_rate
            .map(|fps| format!("{fps:.2}"))
            .unwrap_or_else(|| DEFAULT_FRAME_RATE.to_string());
        result.resolution = self
            .resolution
            .map(|(w, h)| format!("{w} x {h}"))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        result.codec = self
            .codec
            .clone()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        result
    }
}

/// `frame_count / fps`, or 0 when the frame rate is unknown.
pub fn duration_seconds(frame_count: i64, fps: f64) -> f64 {
    if fps > 0.0 && frame_count > 0 {
        frame_count as f64 / fps
    } else {
        0.0
    }
}

/// Extract filename, duration, resolution, frame rate and codec for `path`.
pub async fn probe_metadata<V, S>(path: &Path, source: &V, inspector: &S) -> VideoProcessingResult
where
    V: VideoSource,
    S: StreamInspector,
{
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mut builder = MetadataBuilder::new(&filename);

    match source.properties(path).await {
        Ok(props) => {
            tracing::info!(
                file = %filename,
                fps = format_args!("{:.2}", props.fps),
                duration_secs = format_args!("{:.2}", duration_seconds(props.frame_count, props.fps)),
                resolution = format_args!("{} x {}", props.width, props.height),
                "Read stream properties"
            );
            builder.stream_properties(&props);
        }
        Err(e) => {
            tracing::error!(file = %filename, error = %e, "Failed to read stream properties");
        }
    }

    match inspector.codec(path).await {
        Ok(codec) => {
            tracing::info!(file = %filename, codec = %codec, "Detected codec");
            builder.codec(codec);
        }
        Err(e) => {
            tracing::error!(file = %filename, error = %e, "Failed to extract codec");
        }
    }

    builder.build()
}
