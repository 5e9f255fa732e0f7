//! Domain logic for the posewatch ingestion worker.
//!
//! Everything in this crate is free of database and key-value store access:
//! configuration parsing, content fingerprinting, video probing through
//! `ffprobe`/`ffmpeg`, corruption screening, pose extraction against an
//! abstract estimator, and file relocation.

pub mod config;
pub mod corruption;
pub mod error;
pub mod ffmpeg;
pub mod hashing;
pub mod lifecycle;
pub mod metadata;
pub mod pose;
pub mod types;
pub mod video;
