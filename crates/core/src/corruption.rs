//! Single-sample corruption screen.
//!
//! A file is corrupted when its stream cannot be opened or its first frame
//! cannot be decoded. This is a cheap guard before pose extraction, not an
//! integrity scan.

use std::path::Path;

use futures::StreamExt;

use crate::video::VideoSource;

/// Decode exactly one frame from `path` and classify the file.
pub async fn is_corrupted<V: VideoSource>(path: &Path, source: &V) -> bool {
    let mut frames = match source.frames(path).await {
        Ok(frames) => frames,
        Err(e) => {
            tracing::info!(
                path = %path.display(),
                error = %e,
                "Failed to open video, it may be corrupted or unsupported"
            );
            return true;
        }
    };

    match frames.next().await {
        Some(Ok(frame)) if !frame.is_empty() => {
            tracing::info!(path = %path.display(), "Video opened and first frame decoded");
            false
        }
        Some(Ok(_)) => {
            tracing::info!(path = %path.display(), "First frame is empty, video may be corrupted");
            true
        }
        Some(Err(e)) => {
            tracing::info!(
                path = %path.display(),
                error = %e,
                "Unable to read frames, video may be corrupted"
            );
            true
        }
        None => {
            tracing::info!(path = %path.display(), "Video has no frames, treating as corrupted");
            true
        }
    }
}
