//! Single-file ingestion.
//!
//! A file goes through fingerprint, dedup check, metadata extraction,
//! corruption check, pose extraction, persistence and dedup mark, in that
//! order.
//! Whatever happens, [`Pipeline::handle_file`] then moves it out of the
//! input directory.

use std::panic::AssertUnwindSafe;
use std::path::Path;

use futures::FutureExt;
use posewatch_core::config::WatcherConfig;
use posewatch_core::corruption::is_corrupted;
use posewatch_core::hashing::fingerprint_file;
use posewatch_core::lifecycle::{relocate, RelocationPolicy};
use posewatch_core::metadata::probe_metadata;
use posewatch_core::pose::{extract_poses, PoseEstimator};
use posewatch_core::video::{StreamInspector, VideoSource};

use crate::dedup::DedupStore;
use crate::store::ResultStore;

/// Step at which an attempt was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fingerprint,
    DedupCheck,
    Persist,
    /// A panic escaped one of the processing steps.
    Unexpected,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Fingerprint => "fingerprint",
            Self::DedupCheck => "dedup_check",
            Self::Persist => "persist",
            Self::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

/// How one processing attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// The fingerprint was already marked; nothing was processed.
    Skipped { fingerprint: String },
    /// A result row was written. `marked` is false when the dedup mark
    /// could not be stored, in which case the file will be reprocessed if it
    /// shows up again.
    Processed { corrupted: bool, marked: bool },
    /// The attempt stopped at `stage`; no result row and no dedup mark.
    Failed { stage: Stage, error: String },
}

impl FileOutcome {
    /// Whether the attempt reached a final state (skip or persisted result).
    pub fn completed(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Everything needed to process one file, borrowed from the caller.
pub struct Pipeline<'a, V, S, P, D, R> {
    config: &'a WatcherConfig,
    video: &'a V,
    inspector: &'a S,
    estimator: &'a P,
    dedup: &'a D,
    store: &'a R,
    policy: RelocationPolicy,
}

impl<'a, V, S, P, D, R> Pipeline<'a, V, S, P, D, R>
where
    V: VideoSource,
    S: StreamInspector,
    P: PoseEstimator,
    D: DedupStore,
    R: ResultStore,
{
    pub fn new(
        config: &'a WatcherConfig,
        video: &'a V,
        inspector: &'a S,
        estimator: &'a P,
        dedup: &'a D,
        store: &'a R,
    ) -> Self {
        Self {
            config,
            video,
            inspector,
            estimator,
            dedup,
            store,
            policy: config.relocation_policy(),
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        self.config
    }

    /// Process `path`, then relocate it according to the relocation policy.
    ///
    /// Relocation failures are logged; the file then stays in the input
    /// directory and is picked up again by the next scan.
    pub async fn handle_file(&self, path: &Path) -> FileOutcome {
        let outcome = self.process_file(path).await;

        let dest_dir = self
            .policy
            .destination(&self.config.processed_folder, outcome.completed());
        match relocate(path, dest_dir).await {
            Ok(moved_to) => {
                tracing::info!(
                    path = %path.display(),
                    moved_to = %moved_to.display(),
                    "Moved file"
                );
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    dest_dir = %dest_dir.display(),
                    error = %e,
                    "Failed to move file"
                );
            }
        }

        outcome
    }

    /// Run every processing step for `path`. Never panics and never
    /// returns an error: failures are reported as [`FileOutcome::Failed`].
    pub async fn process_file(&self, path: &Path) -> FileOutcome {
        match AssertUnwindSafe(self.attempt(path)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let error = panic_message(payload.as_ref());
                tracing::error!(path = %path.display(), error = %error, "Processing panicked");
                FileOutcome::Failed {
                    stage: Stage::Unexpected,
                    error,
                }
            }
        }
    }

    async fn attempt(&self, path: &Path) -> FileOutcome {
        let fingerprint = match fingerprint_file(path).await {
            Ok(fp) => fp,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to fingerprint file");
                return failed(Stage::Fingerprint, e);
            }
        };

        match self.dedup.exists(&fingerprint).await {
            Ok(true) => {
                tracing::info!(
                    path = %path.display(),
                    fingerprint = %fingerprint,
                    "Already processed, skipping"
                );
                return FileOutcome::Skipped { fingerprint };
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Dedup lookup failed");
                return failed(Stage::DedupCheck, e);
            }
        }

        tracing::info!(path = %path.display(), fingerprint = %fingerprint, "Processing file");

        let mut result = probe_metadata(path, self.video, self.inspector).await;

        let corrupted = is_corrupted(path, self.video).await;
        result.corrupted = Some(corrupted);

        if corrupted {
            tracing::warn!(path = %path.display(), "Video appears corrupted, skipping pose detection");
        } else {
            result.pose_file_path =
                extract_poses(path, self.video, self.estimator, &self.config.pose_data_folder)
                    .await;
        }

        if let Err(e) = self.store.upsert(&result).await {
            tracing::error!(
                file = %result.video_filename,
                error = %e,
                "Failed to store processing result"
            );
            return failed(Stage::Persist, e);
        }
        tracing::info!(file = %result.video_filename, "Stored processing result");

        let marked = match self.dedup.mark(&fingerprint).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    fingerprint = %fingerprint,
                    error = %e,
                    "Failed to mark file as processed"
                );
                false
            }
        };

        FileOutcome::Processed { corrupted, marked }
    }
}

fn failed(stage: Stage, error: impl std::fmt::Display) -> FileOutcome {
    FileOutcome::Failed {
        stage,
        error: error.to_string(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
