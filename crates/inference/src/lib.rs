//! Client for the pose inference service.
//!
//! The model runs out of process behind a small HTTP API; this crate wraps
//! it with [`reqwest`] and exposes it as a
//! [`PoseEstimator`](posewatch_core::pose::PoseEstimator).

pub mod api;

pub use api::{PoseServiceApi, PoseServiceConfig, PoseServiceError};
