//! Content-addressed dedup gate.
//!
//! Maps a file fingerprint to a "processed" marker. Only the existence of a
//! key matters; the marker value carries no meaning.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

/// Value stored under every marked fingerprint.
pub const PROCESSED_MARKER: &str = "processed";

/// Errors from the dedup store.
#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Key-existence store consulted before, and updated after, processing a file.
pub trait DedupStore: Send + Sync {
    /// Whether `fingerprint` has already been marked processed.
    fn exists(&self, fingerprint: &str) -> impl Future<Output = Result<bool, DedupError>> + Send;

    /// Mark `fingerprint` processed.
    fn mark(&self, fingerprint: &str) -> impl Future<Output = Result<(), DedupError>> + Send;
}

/// Redis connection settings loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
}

impl RedisSettings {
    /// Load settings from environment variables with defaults.
    ///
    /// | Env Var      | Default     |
    /// |--------------|-------------|
    /// | `REDIS_HOST` | `localhost` |
    /// | `REDIS_PORT` | `6379`      |
    pub fn from_env() -> Self {
        let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".into());
        let port = std::env::var("REDIS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(6379);
        Self { host, port }
    }

    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// [`DedupStore`] backed by Redis `EXISTS` / `SET`.
///
/// No connection is made until the first call. If Redis is down then, the
/// call fails and the next one tries again. Once established, the connection
/// manager reconnects on its own after a dropped connection.
pub struct RedisDedupStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisDedupStore {
    /// Only a malformed URL is an error here.
    pub fn new(settings: &RedisSettings) -> Result<Self, DedupError> {
        let client = redis::Client::open(settings.url())?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.initialized()
    }

    async fn conn(&self) -> Result<ConnectionManager, DedupError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new(self.client.clone()).await?;
                tracing::info!("Connected to Redis");
                Ok::<_, DedupError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

impl DedupStore for RedisDedupStore {
    async fn exists(&self, fingerprint: &str) -> Result<bool, DedupError> {
        let mut conn = self.conn().await?;
        let found: bool = conn.exists(fingerprint).await?;
        Ok(found)
    }

    async fn mark(&self, fingerprint: &str) -> Result<(), DedupError> {
        let mut conn = self.conn().await?;
        let () = conn.set(fingerprint, PROCESSED_MARKER).await?;
        Ok(())
    }
}

/// Process-local [`DedupStore`]; marks are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    marked: Mutex<HashSet<String>>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `fingerprints` already marked.
    pub fn with_marked<I, S>(fingerprints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            marked: Mutex::new(fingerprints.into_iter().map(Into::into).collect()),
        }
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.lock().contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // The set is always left consistent, so a poisoned lock is still usable.
        self.marked.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DedupStore for InMemoryDedupStore {
    async fn exists(&self, fingerprint: &str) -> Result<bool, DedupError> {
        Ok(self.contains(fingerprint))
    }

    async fn mark(&self, fingerprint: &str) -> Result<(), DedupError> {
        self.lock().insert(fingerprint.to_string());
        Ok(())
    }
}
