//! `posewatch-worker` -- watches a directory for videos, extracts poses and
//! records per-file metadata.
//!
//! # Environment variables
//!
//! | Variable            | Default                 | Description                         |
//! |---------------------|-------------------------|-------------------------------------|
//! | `POSEWATCH_CONFIG`  | `config.json`           | JSON configuration file             |
//! | `REDIS_HOST`        | `localhost`             | Dedup store host                    |
//! | `REDIS_PORT`        | `6379`                  | Dedup store port                    |
//! | `DATABASE_URL`      | --                      | Overrides the `POSTGRES_*` settings |
//! | `POSTGRES_HOST`     | `localhost`             |                                     |
//! | `POSTGRES_PORT`     | `5432`                  |                                     |
//! | `POSTGRES_DB`       | `pose_data`             |                                     |
//! | `POSTGRES_USER`     | `pose_user`             |                                     |
//! | `POSTGRES_PASSWORD` | `pose_pass`             |                                     |
//! | `POSE_SERVICE_URL`  | `http://localhost:8000` | Pose inference service              |
//! | `POSE_CONFIDENCE`   | `0.25`                  | Detection confidence threshold      |
//! | `LOG_FORMAT`        | `text`                  | `text` or `json`                    |

use anyhow::Context;
use posewatch_core::config::WatcherConfig;
use posewatch_core::video::{FfmpegVideoSource, FfprobeInspector};
use posewatch_inference::{PoseServiceApi, PoseServiceConfig};
use posewatch_pipeline::{Pipeline, PgResultStore, RedisDedupStore, RedisSettings, Scanner};
use posewatch_worker::{config_path, init_tracing, shutdown_signal, LogFormat};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());

    let path = config_path();
    let config = WatcherConfig::load(&path)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    config
        .ensure_directories()
        .await
        .context("failed to create working directories")?;
    tracing::info!(
        config = %path.display(),
        input = %config.input_folder.display(),
        processed = %config.processed_folder.display(),
        pose_data = %config.pose_data_folder.display(),
        "Configuration loaded"
    );

    // --- Relational store ---
    let db_settings = posewatch_db::DatabaseSettings::from_env();
    let pool = posewatch_db::connect_lazy(&db_settings).context("invalid database settings")?;
    if let Err(e) = posewatch_db::health_check(&pool).await {
        tracing::warn!(
            error = %e,
            "PostgreSQL not reachable yet, results will fail to persist until it is"
        );
    }
    let store = PgResultStore::new(pool, config.db_table_name.clone());
    if let Err(e) = store.ensure_table().await {
        tracing::warn!(
            table = %store.table(),
            error = %e,
            "Result table not created yet, retrying on the next write"
        );
    }

    // --- Dedup store ---
    let redis_settings = RedisSettings::from_env();
    let dedup = RedisDedupStore::new(&redis_settings)
        .with_context(|| format!("invalid Redis address {}", redis_settings.url()))?;
    tracing::info!(host = %redis_settings.host, port = redis_settings.port, "Dedup store configured");

    // --- Pose inference ---
    let estimator = PoseServiceApi::new(PoseServiceConfig::from_env(config.model_path.clone()));
    match estimator.health().await {
        Ok(()) => tracing::info!(url = %estimator.config().api_url, "Pose service reachable"),
        Err(e) => tracing::warn!(
            url = %estimator.config().api_url,
            error = %e,
            "Pose service not reachable yet, pose extraction will fail until it is"
        ),
    }

    let video = FfmpegVideoSource;
    let inspector = FfprobeInspector;
    let scanner = Scanner::new(Pipeline::new(
        &config, &video, &inspector, &estimator, &dedup, &store,
    ));

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    scanner.run(cancel).await;
    tracing::info!("Worker stopped");
    Ok(())
}
