//! PostgreSQL access for processing results.
//!
//! - [`models`]: row types mapped with `sqlx::FromRow`.
//! - [`repositories`]: query functions, one zero-sized repo per table.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

pub mod models;
pub mod repositories;

pub type DbPool = sqlx::PgPool;

/// The worker processes one file at a time, so a small pool is plenty.
const MAX_CONNECTIONS: u32 = 5;

/// Upper bound on waiting for a connection, so a database outage fails a
/// single file quickly instead of stalling the scan loop.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Full URL; takes precedence over the individual fields when set.
    pub url: Option<String>,
}

impl DatabaseSettings {
    /// Load settings from environment variables with defaults.
    ///
    /// | Env Var             | Default     |
    /// |---------------------|-------------|
    /// | `DATABASE_URL`      | unset       |
    /// | `POSTGRES_HOST`     | `localhost` |
    /// | `POSTGRES_PORT`     | `5432`      |
    /// | `POSTGRES_DB`       | `pose_data` |
    /// | `POSTGRES_USER`     | `pose_user` |
    /// | `POSTGRES_PASSWORD` | `pose_pass` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        Self {
            host: get("POSTGRES_HOST", "localhost"),
            port: lookup("POSTGRES_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: get("POSTGRES_DB", "pose_data"),
            user: get("POSTGRES_USER", "pose_user"),
            password: get("POSTGRES_PASSWORD", "pose_pass"),
            url: lookup("DATABASE_URL").filter(|u| !u.is_empty()),
        }
    }

    /// Connection options for these settings.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        match &self.url {
            Some(url) => url.parse(),
            None => Ok(PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .database(&self.database)
                .username(&self.user)
                .password(&self.password)),
        }
    }
}

/// Build a pool for [`DatabaseSettings`] without opening a connection.
///
/// Connections are established on first use, so an unreachable server
/// surfaces as a per-query error instead of a startup failure. Only a
/// malformed `DATABASE_URL` is rejected here.
pub fn connect_lazy(settings: &DatabaseSettings) -> Result<DbPool, sqlx::Error> {
    Ok(PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_lazy_with(settings.connect_options()?))
}

/// Round-trip a trivial query to verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
