//! Per-file ingestion pipeline and the directory scan loop.
//!
//! - [`dedup`]: content-fingerprint gate (Redis or in-memory).
//! - [`store`]: result persistence (PostgreSQL or in-memory).
//! - [`ingest`]: fingerprint, dedup check, metadata, corruption check, pose
//!   extraction, persistence and relocation for a single file.
//! - [`scan`]: the Idle/Scanning loop that feeds files to [`ingest`].

pub mod dedup;
pub mod ingest;
pub mod scan;
pub mod store;

pub use dedup::{DedupError, DedupStore, InMemoryDedupStore, RedisDedupStore, RedisSettings};
pub use ingest::{FileOutcome, Pipeline, Stage};
pub use scan::{CycleReport, Scanner};
pub use store::{InMemoryResultStore, PgResultStore, ResultStore, StoreError};

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::stream::{self, StreamExt};
    use posewatch_core::config::WatcherConfig;
    use posewatch_core::error::VideoError;
    use posewatch_core::pose::{PersonKeypoints, PoseError, PoseEstimator};
    use posewatch_core::types::VideoProcessingResult;
    use posewatch_core::video::{Frame, FrameStream, StreamInspector, StreamProperties, VideoSource};
    use tempfile::TempDir;

    use crate::dedup::{DedupError, DedupStore};
    use crate::store::{ResultStore, StoreError};

    /// Scripted content of a fake video file, looked up by base name.
    #[derive(Debug, Clone, Copy)]
    pub enum FakeClip {
        Good {
            frames: usize,
            fps: f64,
            width: u32,
            height: u32,
        },
        /// Neither properties nor frames can be read.
        Unreadable,
    }

    #[derive(Default)]
    pub struct FakeVideo {
        clips: HashMap<String, FakeClip>,
        pub property_calls: AtomicUsize,
        pub frame_calls: AtomicUsize,
    }

    impl FakeVideo {
        pub fn with(mut self, name: &str, clip: FakeClip) -> Self {
            self.clips.insert(name.to_string(), clip);
            self
        }

        pub fn touched(&self) -> usize {
            self.property_calls.load(Ordering::SeqCst) + self.frame_calls.load(Ordering::SeqCst)
        }

        fn clip(&self, path: &Path) -> FakeClip {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.clips.get(&name).copied().unwrap_or(FakeClip::Unreadable)
        }
    }

    impl VideoSource for FakeVideo {
        async fn properties(&self, path: &Path) -> Result<StreamProperties, VideoError> {
            self.property_calls.fetch_add(1, Ordering::SeqCst);
            match self.clip(path) {
                FakeClip::Good {
                    frames,
                    fps,
                    width,
                    height,
                } => Ok(StreamProperties {
                    frame_count: frames as i64,
                    fps,
                    width: width as i32,
                    height: height as i32,
                }),
                FakeClip::Unreadable => Err(VideoError::NoVideoStream(path.display().to_string())),
            }
        }

        async fn frames(&self, path: &Path) -> Result<FrameStream, VideoError> {
            self.frame_calls.fetch_add(1, Ordering::SeqCst);
            match self.clip(path) {
                FakeClip::Good {
                    frames,
                    width,
                    height,
                    ..
                } => {
                    let len = width as usize * height as usize * 3;
                    let items: Vec<Result<Frame, VideoError>> = (0..frames)
                        .map(|_| {
                            Ok(Frame {
                                width,
                                height,
                                data: vec![0; len],
                            })
                        })
                        .collect();
                    Ok(stream::iter(items).boxed())
                }
                FakeClip::Unreadable => Ok(stream::empty().boxed()),
            }
        }
    }

    /// Returns a fixed codec, or fails when `None`.
    pub struct FakeInspector(pub Option<&'static str>);

    impl StreamInspector for FakeInspector {
        async fn codec(&self, path: &Path) -> Result<String, VideoError> {
            match self.0 {
                Some(codec) => Ok(codec.to_string()),
                None => Err(VideoError::ExecutionFailed {
                    exit_code: Some(1),
                    stderr: format!("{}: Invalid data found", path.display()),
                }),
            }
        }
    }

    /// Estimator behaviour for one test.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub enum EstimatorMode {
        #[default]
        OnePerson,
        Fail,
        Panic,
    }

    #[derive(Default)]
    pub struct CountingEstimator {
        pub mode: EstimatorMode,
        pub calls: AtomicUsize,
    }

    impl CountingEstimator {
        pub fn new(mode: EstimatorMode) -> Self {
            Self {
                mode,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PoseEstimator for CountingEstimator {
        async fn estimate(&self, _frame: Frame) -> Result<Vec<PersonKeypoints>, PoseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                EstimatorMode::OnePerson => Ok(vec![vec![[10.0, 20.0, 0.9]; 17]]),
                EstimatorMode::Fail => Err(PoseError::Inference("model unavailable".into())),
                EstimatorMode::Panic => panic!("estimator blew up"),
            }
        }
    }

    /// Dedup store whose every call fails.
    pub struct UnreachableDedup;

    fn redis_down() -> DedupError {
        DedupError::Redis(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection refused",
        )))
    }

    impl DedupStore for UnreachableDedup {
        async fn exists(&self, _fingerprint: &str) -> Result<bool, DedupError> {
            Err(redis_down())
        }

        async fn mark(&self, _fingerprint: &str) -> Result<(), DedupError> {
            Err(redis_down())
        }
    }

    /// Result store whose every upsert fails.
    pub struct UnreachableStore;

    impl ResultStore for UnreachableStore {
        async fn upsert(&self, _result: &VideoProcessingResult) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    /// Scratch directories plus a config pointing at them.
    pub struct Workspace {
        _dir: TempDir,
        pub config: WatcherConfig,
    }

    impl Workspace {
        pub fn new() -> Self {
            Self::build(false)
        }

        pub fn with_failed_folder() -> Self {
            Self::build(true)
        }

        fn build(dead_letter: bool) -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let root = dir.path();
            let config = WatcherConfig {
                input_folder: root.join("input"),
                pose_data_folder: root.join("pose"),
                processed_folder: root.join("processed"),
                scan_interval_sec: 0.05,
                model_path: "yolo11n-pose.pt".into(),
                supported_file_formats: vec![".mp4".into(), ".avi".into()],
                db_table_name: "video_processing_results".into(),
                failed_folder: dead_letter.then(|| root.join("failed")),
            };
            for d in [
                &config.input_folder,
                &config.pose_data_folder,
                &config.processed_folder,
            ] {
                std::fs::create_dir_all(d).expect("create dir");
            }
            if let Some(failed) = &config.failed_folder {
                std::fs::create_dir_all(failed).expect("create dir");
            }
            Self { _dir: dir, config }
        }

        /// Drop a file with `contents` into the input directory.
        pub fn add_input(&self, name: &str, contents: &[u8]) -> PathBuf {
            let path = self.config.input_folder.join(name);
            std::fs::write(&path, contents).expect("write input");
            path
        }

        pub fn input(&self, name: &str) -> PathBuf {
            self.config.input_folder.join(name)
        }

        pub fn processed(&self, name: &str) -> PathBuf {
            self.config.processed_folder.join(name)
        }

        pub fn pose(&self, name: &str) -> PathBuf {
            self.config.pose_data_folder.join(name)
        }
    }
}
