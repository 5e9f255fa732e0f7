//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod video_processing_result_repo;

pub use video_processing_result_repo::VideoProcessingResultRepo;
