//! Row types.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row.

pub mod video_processing_result;
