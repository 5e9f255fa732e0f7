//! Watcher configuration loaded from a JSON file.
//!
//! The file must define every key in [`REQUIRED_KEYS`]; startup aborts if
//! any is absent. Connection settings for the stores live in environment
//! variables and are parsed by the crates that own those connections.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::lifecycle::RelocationPolicy;

/// Keys that must be present in the configuration file.
pub const REQUIRED_KEYS: [&str; 7] = [
    "input_folder",
    "pose_data_folder",
    "processed_folder",
    "scan_interval_sec",
    "model_path",
    "supported_file_formats",
    "db_table_name",
];

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Plain, unquoted SQL identifier. The table name is interpolated into
/// queries so nothing else is accepted.
static TABLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid regex"));

/// Errors that make the configuration unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    #[error("invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Immutable watcher configuration, built once at startup and passed by
/// reference to every component that needs it.
#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    /// Directory scanned for new videos.
    pub input_folder: PathBuf,
    /// Directory receiving `<stem>_pose.json` sidecars.
    pub pose_data_folder: PathBuf,
    /// Directory receiving every file selected for an attempt.
    pub processed_folder: PathBuf,
    /// Idle time between two scans, in seconds.
    pub scan_interval_sec: f64,
    /// Model identifier forwarded to the pose inference service.
    pub model_path: String,
    /// Accepted file name suffixes, e.g. `[".mp4", ".avi"]`.
    pub supported_file_formats: Vec<String>,
    /// Result table name.
    pub db_table_name: String,
    /// Optional dead-letter directory. When set, files whose attempt did not
    /// complete are moved here instead of `processed_folder`.
    #[serde(default)]
    pub failed_folder: Option<PathBuf>,
}

impl WatcherConfig {
    /// Read and validate the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate configuration from a JSON document.
    ///
    /// All missing keys are reported together, not just the first one.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;

        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| value.get(**key).is_none())
            .map(|key| (*key).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys(missing));
        }

        let mut config: Self = serde_json::from_value(value)?;
        config.supported_file_formats = config
            .supported_file_formats
            .iter()
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.scan_interval_sec.is_finite() || self.scan_interval_sec <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "scan_interval_sec",
                reason: format!("must be a positive number, got {}", self.scan_interval_sec),
            });
        }
        if self.supported_file_formats.is_empty() {
            return Err(ConfigError::Invalid {
                key: "supported_file_formats",
                reason: "must list at least one extension".into(),
            });
        }
        if self.model_path.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "model_path",
                reason: "must not be empty".into(),
            });
        }
        if !TABLE_NAME_RE.is_match(&self.db_table_name) {
            return Err(ConfigError::Invalid {
                key: "db_table_name",
                reason: format!("`{}` is not a plain SQL identifier", self.db_table_name),
            });
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs_f64(self.scan_interval_sec)
    }

    /// Whether `file_name` ends with one of the supported extensions,
    /// compared case-insensitively.
    pub fn is_supported(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.supported_file_formats
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
    }

    pub fn relocation_policy(&self) -> RelocationPolicy {
        match &self.failed_folder {
            Some(dir) => RelocationPolicy::DeadLetter {
                failed_folder: dir.clone(),
            },
            None => RelocationPolicy::Always,
        }
    }

    /// Create every directory the worker writes to or scans.
    pub async fn ensure_directories(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.input_folder).await?;
        tokio::fs::create_dir_all(&self.pose_data_folder).await?;
        tokio::fs::create_dir_all(&self.processed_folder).await?;
        if let Some(dir) = &self.failed_folder {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}
