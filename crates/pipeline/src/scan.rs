//! The scan loop: list the input directory, feed each candidate to the
//! pipeline one at a time, sleep, repeat.

use std::path::{Path, PathBuf};

use posewatch_core::pose::PoseEstimator;
use posewatch_core::video::{StreamInspector, VideoSource};
use tokio_util::sync::CancellationToken;

use crate::dedup::DedupStore;
use crate::ingest::{FileOutcome, Pipeline};
use crate::store::ResultStore;

/// Tally of one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Files whose result was persisted, corrupted ones included.
    pub processed: usize,
    pub skipped: usize,
    /// Subset of `processed` classified as corrupted.
    pub corrupted: usize,
    pub failed: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::Processed { corrupted, .. } => {
                self.processed += 1;
                if *corrupted {
                    self.corrupted += 1;
                }
            }
            FileOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

/// Drives a [`Pipeline`] over the input directory.
pub struct Scanner<'a, V, S, P, D, R> {
    pipeline: Pipeline<'a, V, S, P, D, R>,
}

impl<'a, V, S, P, D, R> Scanner<'a, V, S, P, D, R>
where
    V: VideoSource,
    S: StreamInspector,
    P: PoseEstimator,
    D: DedupStore,
    R: ResultStore,
{
    pub fn new(pipeline: Pipeline<'a, V, S, P, D, R>) -> Self {
        Self { pipeline }
    }

    /// Scan until `cancel` fires. Cancellation is observed while idle and
    /// between files; a file in flight is always finished first.
    pub async fn run(&self, cancel: CancellationToken) {
        let config = self.pipeline.config();
        let interval = config.scan_interval();
        tracing::info!(
            input = %config.input_folder.display(),
            interval_secs = interval.as_secs_f64(),
            "Scan loop started"
        );

        loop {
            let report = self.run_cycle(&cancel).await;
            if report.total() > 0 {
                tracing::info!(
                    processed = report.processed,
                    skipped = report.skipped,
                    corrupted = report.corrupted,
                    failed = report.failed,
                    "Scan cycle finished"
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scan loop stopping");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// One Scanning pass over the input directory.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();

        let candidates = match self.list_candidates().await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(
                    input = %self.pipeline.config().input_folder.display(),
                    error = %e,
                    "Failed to list input directory"
                );
                return report;
            }
        };

        for path in candidates {
            if cancel.is_cancelled() {
                tracing::info!("Cancellation requested, leaving remaining files for later");
                break;
            }
            let outcome = self.pipeline.handle_file(&path).await;
            if let FileOutcome::Failed { stage, error } = &outcome {
                tracing::warn!(path = %path.display(), %stage, error = %error, "File attempt failed");
            }
            report.record(&outcome);
        }

        report
    }

    /// Regular files in the input directory with a supported extension, in
    /// directory-listing order.
    pub async fn list_candidates(&self) -> std::io::Result<Vec<PathBuf>> {
        let config = self.pipeline.config();
        list_candidates(&config.input_folder, |name| config.is_supported(name)).await
    }
}

async fn list_candidates(
    dir: &Path,
    is_supported: impl Fn(&str) -> bool,
) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut candidates = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !is_supported(&name.to_string_lossy()) {
            continue;
        }
        match entry.file_type().await {
            Ok(ft) if ft.is_file() => candidates.push(entry.path()),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Could not stat entry");
            }
        }
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use posewatch_core::hashing::sha256_hex;
    use posewatch_core::pose::PoseFrame;
    use posewatch_core::types::NOT_AVAILABLE;

    use super::*;
    use crate::dedup::InMemoryDedupStore;
    use crate::store::InMemoryResultStore;
    use crate::test_helpers::*;

    const CLIP1: FakeClip = FakeClip::Good {
        frames: 10,
        fps: 5.0,
        width: 640,
        height: 480,
    };

    #[tokio::test]
    async fn candidates_are_filtered_by_extension_and_type() {
        let ws = Workspace::new();
        ws.add_input("a.mp4", b"a");
        ws.add_input("B.AVI", b"b");
        ws.add_input("notes.txt", b"c");
        std::fs::create_dir(ws.input("folder.mp4")).expect("mkdir");

        let video = FakeVideo::default();
        let dedup = InMemoryDedupStore::new();
        let store = InMemoryResultStore::new();
        let estimator = CountingEstimator::default();
        let inspector = FakeInspector(None);
        let scanner = Scanner::new(Pipeline::new(
            &ws.config, &video, &inspector, &estimator, &dedup, &store,
        ));

        let mut names: Vec<String> = scanner
            .list_candidates()
            .await
            .expect("list")
            .iter()
            .map(|p| p.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["B.AVI", "a.mp4"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_name_is_processed_and_relocated() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let ws = Workspace::new();
        let name = OsStr::from_bytes(b"caf\xe9.mp4");
        let path = ws.config.input_folder.join(name);
        std::fs::write(&path, b"latin-1 name").expect("write input");

        let video = FakeVideo::default().with(&name.to_string_lossy(), CLIP1);
        let inspector = FakeInspector(Some("h264"));
        let estimator = CountingEstimator::default();
        let dedup = InMemoryDedupStore::new();
        let store = InMemoryResultStore::new();
        let scanner = Scanner::new(Pipeline::new(
            &ws.config, &video, &inspector, &estimator, &dedup, &store,
        ));

        let report = scanner.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.processed, 1);
        assert!(!path.exists());
        assert!(ws.config.processed_folder.join(name).exists());
        assert!(dedup.contains(&sha256_hex(b"latin-1 name")));
    }

    #[tokio::test]
    async fn end_to_end_cycle_with_good_and_bad_clip() {
        let ws = Workspace::new();
        ws.add_input("clip1.mp4", b"clip one bytes");
        ws.add_input("bad.mp4", b"bad bytes");

        let video = FakeVideo::default().with("clip1.mp4", CLIP1);
        let inspector = FakeInspector(Some("h264"));
        let estimator = CountingEstimator::default();
        let dedup = InMemoryDedupStore::new();
        let store = InMemoryResultStore::new();
        let scanner = Scanner::new(Pipeline::new(
            &ws.config, &video, &inspector, &estimator, &dedup, &store,
        ));

        let report = scanner.run_cycle(&CancellationToken::new()).await;

        assert_eq!(
            report,
            CycleReport {
                processed: 2,
                skipped: 0,
                corrupted: 1,
                failed: 0,
            }
        );

        let clip = store.get("clip1.mp4").expect("clip1 row").result;
        assert_eq!(clip.duration_seconds, 2.0);
        assert_eq!(clip.resolution, "640 x 480");
        assert_eq!(clip.frame_rate, "5.00");
        assert_eq!(clip.corrupted, Some(false));
        assert_eq!(
            clip.pose_file_path,
            ws.pose("clip1_pose.json").display().to_string()
        );
        let frames: Vec<PoseFrame> = serde_json::from_slice(
            &std::fs::read(ws.pose("clip1_pose.json")).expect("sidecar"),
        )
        .expect("json");
        assert_eq!(frames.len(), 10);

        let bad = store.get("bad.mp4").expect("bad row").result;
        assert_eq!(bad.corrupted, Some(true));
        assert_eq!(bad.pose_file_path, NOT_AVAILABLE);

        assert!(ws.processed("clip1.mp4").exists());
        assert!(ws.processed("bad.mp4").exists());
        assert!(dedup.contains(&sha256_hex(b"clip one bytes")));
        assert!(dedup.contains(&sha256_hex(b"bad bytes")));

        let again = scanner.run_cycle(&CancellationToken::new()).await;
        assert_eq!(again.total(), 0);
    }

    #[tokio::test]
    async fn resubmitted_content_is_skipped_under_a_new_name() {
        let ws = Workspace::new();
        ws.add_input("clip1.mp4", b"identical");

        let video = FakeVideo::default()
            .with("clip1.mp4", CLIP1)
            .with("copy.mp4", CLIP1);
        let inspector = FakeInspector(Some("h264"));
        let estimator = CountingEstimator::default();
        let dedup = InMemoryDedupStore::new();
        let store = InMemoryResultStore::new();
        let scanner = Scanner::new(Pipeline::new(
            &ws.config, &video, &inspector, &estimator, &dedup, &store,
        ));

        scanner.run_cycle(&CancellationToken::new()).await;
        ws.add_input("copy.mp4", b"identical");
        let report = scanner.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(estimator.calls(), 10);
        assert!(store.get("copy.mp4").is_none());
        assert!(ws.processed("copy.mp4").exists());
    }

    #[tokio::test]
    async fn failures_are_counted_and_files_still_leave_input() {
        let ws = Workspace::new();
        ws.add_input("a.mp4", b"a");
        ws.add_input("b.mp4", b"b");

        let video = FakeVideo::default().with("a.mp4", CLIP1).with("b.mp4", CLIP1);
        let inspector = FakeInspector(Some("h264"));
        let estimator = CountingEstimator::default();
        let dedup = InMemoryDedupStore::new();
        let scanner = Scanner::new(Pipeline::new(
            &ws.config,
            &video,
            &inspector,
            &estimator,
            &dedup,
            &UnreachableStore,
        ));

        let report = scanner.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.failed, 2);
        assert!(dedup.is_empty());
        assert!(ws.processed("a.mp4").exists());
        assert!(ws.processed("b.mp4").exists());
    }

    #[tokio::test]
    async fn relocation_failure_leaves_file_for_the_next_cycle() {
        let ws = Workspace::new();
        let path = ws.add_input("a.mp4", b"a");
        std::fs::remove_dir(&ws.config.processed_folder).expect("remove processed dir");

        let video = FakeVideo::default().with("a.mp4", CLIP1);
        let inspector = FakeInspector(Some("h264"));
        let estimator = CountingEstimator::default();
        let dedup = InMemoryDedupStore::new();
        let store = InMemoryResultStore::new();
        let scanner = Scanner::new(Pipeline::new(
            &ws.config, &video, &inspector, &estimator, &dedup, &store,
        ));

        let first = scanner.run_cycle(&CancellationToken::new()).await;
        assert_eq!(first.processed, 1);
        assert!(path.exists());
        assert!(dedup.contains(&sha256_hex(b"a")));
        assert!(store.get("a.mp4").is_some());

        std::fs::create_dir(&ws.config.processed_folder).expect("recreate processed dir");
        let second = scanner.run_cycle(&CancellationToken::new()).await;
        assert_eq!(
            second,
            CycleReport {
                processed: 0,
                skipped: 1,
                corrupted: 0,
                failed: 0,
            }
        );
        assert_eq!(estimator.calls(), 10);
        assert!(!path.exists());
        assert!(ws.processed("a.mp4").exists());
    }

    #[tokio::test]
    async fn cancelled_cycle_leaves_files_in_place() {
        let ws = Workspace::new();
        let path = ws.add_input("a.mp4", b"a");

        let video = FakeVideo::default().with("a.mp4", CLIP1);
        let inspector = FakeInspector(Some("h264"));
        let estimator = CountingEstimator::default();
        let dedup = InMemoryDedupStore::new();
        let store = InMemoryResultStore::new();
        let scanner = Scanner::new(Pipeline::new(
            &ws.config, &video, &inspector, &estimator, &dedup, &store,
        ));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = scanner.run_cycle(&cancel).await;

        assert_eq!(report.total(), 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn missing_input_directory_ends_cycle_quietly() {
        let ws = Workspace::new();
        std::fs::remove_dir(&ws.config.input_folder).expect("rmdir");

        let video = FakeVideo::default();
        let inspector = FakeInspector(None);
        let estimator = CountingEstimator::default();
        let dedup = InMemoryDedupStore::new();
        let store = InMemoryResultStore::new();
        let scanner = Scanner::new(Pipeline::new(
            &ws.config, &video, &inspector, &estimator, &dedup, &store,
        ));

        let report = scanner.run_cycle(&CancellationToken::new()).await;
        assert_eq!(report, CycleReport::default());
    }

    #[tokio::test]
    async fn run_returns_once_cancelled() {
        let ws = Workspace::new();
        ws.add_input("clip1.mp4", b"clip");

        let video = FakeVideo::default().with("clip1.mp4", CLIP1);
        let inspector = FakeInspector(Some("h264"));
        let estimator = CountingEstimator::default();
        let dedup = InMemoryDedupStore::new();
        let store = InMemoryResultStore::new();
        let scanner = Scanner::new(Pipeline::new(
            &ws.config, &video, &inspector, &estimator, &dedup, &store,
        ));

        let cancel = CancellationToken::new();
        let stopper = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                cancel.cancel();
            }
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(scanner.run(cancel.clone()), stopper);
        })
        .await
        .expect("scan loop should stop after cancellation");

        assert!(store.get("clip1.mp4").is_some());
        assert!(ws.processed("clip1.mp4").exists());
    }
}
