//! Pose extraction pass and sidecar artifact.
//!
//! Frames are decoded in order and sent one at a time to a
//! [`PoseEstimator`]. The position of each entry in the sidecar is its frame
//! index, so inference is strictly sequential within a video.

use std::future::Future;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::VideoError;
use crate::types::NOT_AVAILABLE;
use crate::video::{Frame, VideoSource};

/// Suffix appended to the video's file stem to name its sidecar.
pub const SIDECAR_SUFFIX: &str = "_pose.json";

/// Keypoints of one detected person, each as `[x, y, confidence]`.
pub type PersonKeypoints = Vec<[f32; 3]>;

/// Pose data for one frame as written to the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    /// Zero-based frame index in decode order.
    pub frame: usize,
    /// One entry per detected person.
    pub keypoints: Vec<PersonKeypoints>,
}

/// Errors that abort a pose extraction pass.
#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("video error: {0}")]
    Video(#[from] VideoError),

    #[error("failed to serialize pose data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write pose sidecar: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque frame → keypoints inference capability.
///
/// Frames are handed over by value; the pass has no use for a frame once it
/// has been sent for inference.
pub trait PoseEstimator: Send + Sync {
    fn estimate(
        &self,
        frame: Frame,
    ) -> impl Future<Output = Result<Vec<PersonKeypoints>, PoseError>> + Send;
}

/// `<output_dir>/<video stem>_pose.json`.
pub fn sidecar_path(video_path: &Path, output_dir: &Path) -> PathBuf {
    let stem = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(format!("{stem}{SIDECAR_SUFFIX}"))
}

/// Run pose estimation over every frame of `path` and write the sidecar.
///
/// Returns the sidecar path, or [`NOT_AVAILABLE`] if any step failed. A
/// failed pass never leaves a sidecar behind.
pub async fn extract_poses<V, P>(
    path: &Path,
    source: &V,
    estimator: &P,
    output_dir: &Path,
) -> String
where
    V: VideoSource,
    P: PoseEstimator,
{
    match run_pose_pass(path, source, estimator, output_dir).await {
        Ok(sidecar) => {
            tracing::info!(
                path = %path.display(),
                sidecar = %sidecar.display(),
                "Pose detection finished"
            );
            sidecar.display().to_string()
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Unable to perform pose detection");
            NOT_AVAILABLE.to_string()
        }
    }
}

/// Fallible core of [`extract_poses`].
pub async fn run_pose_pass<V, P>(
    path: &Path,
    source: &V,
    estimator: &P,
    output_dir: &Path,
) -> Result<PathBuf, PoseError>
where
    V: VideoSource,
    P: PoseEstimator,
{
    let mut frames = source.frames(path).await?.enumerate();
    let mut pose_data = Vec::new();

    while let Some((index, frame)) = frames.next().await {
        let frame = frame?;
        let keypoints = estimator.estimate(frame).await?;
        pose_data.push(PoseFrame {
            frame: index,
            keypoints,
        });
    }
    tracing::debug!(path = %path.display(), frames = pose_data.len(), "Decoded all frames");

    let sidecar = sidecar_path(path, output_dir);
    write_sidecar(&sidecar, &pose_data).await?;
    Ok(sidecar)
}

/// Write the sidecar through a temporary file so readers never observe a
/// partially written artifact.
async fn write_sidecar(sidecar: &Path, pose_data: &[PoseFrame]) -> Result<(), PoseError> {
    let json = serde_json::to_vec_pretty(pose_data)?;
    let tmp = sidecar.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json).await?;
    if let Err(e) = tokio::fs::rename(&tmp, sidecar).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
