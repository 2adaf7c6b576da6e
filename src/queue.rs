// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable pending-update queues.
//!
//! Each storage location owns one key-value queue. The sweeper only needs
//! four operations from it, captured by [`QueueStore`]; [`QueueConnector`]
//! turns a location identifier into a store.
//!
//! # SQLite Adapter
//!
//! [`SqliteQueueConnector`] keeps one SQLite database per location under a
//! root directory:
//!
//! ```text
//! <root_dir>/
//! ├── 10.0.0.1_8123.db     # location "10.0.0.1:8123"
//! └── 10.0.0.2_8123.db     # location "10.0.0.2:8123"
//! ```
//!
//! A database that does not exist means the location is not mounted here:
//! the connector reports [`SweepError::Unavailable`] and never creates it.
//! Writers create databases with [`SqliteQueueStore::create`].
//!
//! # SQLite Busy Handling
//!
//! The object server writes new entries while the sweeper drains them, so
//! SQLITE_BUSY/SQLITE_LOCKED is expected under load. Every statement goes
//! through [`execute_with_retry`] with capped exponential backoff.

use crate::error::{Result, SweepError};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Type alias for boxed async queue results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Key-value queue owned by one storage location.
///
/// Errors from any method are connectivity or storage failures; an absent key
/// is `Ok(None)` from [`get`](Self::get), never an error.
pub trait QueueStore: Send + Sync + 'static {
    /// Keys in `[start, end)`, in key order, at most `limit` of them.
    fn range_keys<'a>(&'a self, start: &'a str, end: &'a str, limit: usize)
        -> BoxFuture<'a, Vec<String>>;

    /// Load the blob stored under `key`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Vec<u8>>>;

    /// Store `value` under `key`, overwriting any existing blob.
    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, ()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()>;
}

/// Opens the queue of a storage location.
pub trait QueueConnector: Send + Sync + 'static {
    type Store: QueueStore;

    /// Connect to the queue of `location`.
    ///
    /// Returns [`SweepError::Unavailable`] when the location cannot be reached.
    fn connect<'a>(&'a self, location: &'a str) -> BoxFuture<'a, Arc<Self::Store>>;

    /// Release every open connection. Called once on shutdown.
    fn close_all(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

const SQLITE_RETRY_MAX_ATTEMPTS: u32 = 5;
const SQLITE_RETRY_BASE_DELAY_MS: u64 = 10;
const SQLITE_RETRY_MAX_DELAY_MS: u64 = 500;

/// Check if an error is a retryable SQLite busy/locked error
pub(crate) fn is_sqlite_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            // SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            if let Some(code) = db_err.code() {
                return code == "5" || code == "6";
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
        _ => false,
    }
}

/// Check if an error means the database itself is gone or unreachable.
fn is_connectivity_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

/// Execute a database operation with retry on SQLITE_BUSY/SQLITE_LOCKED
async fn execute_with_retry<F, Fut, T>(
    operation_name: &str,
    mut f: F,
) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    let mut delay_ms = SQLITE_RETRY_BASE_DELAY_MS;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts, "SQLite operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if is_sqlite_busy_error(&e) && attempts < SQLITE_RETRY_MAX_ATTEMPTS => {
                warn!(
                    operation = operation_name,
                    attempts,
                    max_attempts = SQLITE_RETRY_MAX_ATTEMPTS,
                    delay_ms,
                    "SQLite busy, retrying"
                );
                crate::metrics::queue_retries_total(operation_name);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(SQLITE_RETRY_MAX_DELAY_MS);
            }
            Err(e) => {
                if is_sqlite_busy_error(&e) {
                    warn!(
                        operation = operation_name,
                        attempts, "SQLite busy, max retries exceeded"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// SQLite-backed queue for one location.
pub struct SqliteQueueStore {
    pool: SqlitePool,
    location: String,
    path: String,
}

impl SqliteQueueStore {
    /// Create (or open) a queue database at `path`.
    ///
    /// Used by writers and tests. The sweeper itself goes through
    /// [`SqliteQueueConnector`], which refuses to create missing databases.
    pub async fn create(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        Self::open_with(&path_str, &path_str, true, wal_mode).await
    }

    async fn open_with(location: &str, path: &str, create: bool, wal_mode: bool) -> Result<Self> {
        let mode = if create { "rwc" } else { "rw" };
        let journal = if wal_mode {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };

        let options = format!("sqlite://{}?mode={}", path, mode)
            .parse::<SqliteConnectOptions>()
            .map_err(|e| SweepError::Config(format!("Invalid SQLite path: {}", e)))?
            .journal_mode(journal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(create);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| SweepError::unavailable(location, e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        debug!(location = %location, path = %path, "Opened queue store");

        Ok(Self {
            pool,
            location: location.to_string(),
            path: path.to_string(),
        })
    }

    /// Location this store belongs to.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Get database path (for diagnostics).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of queued entries in the pending-update namespace.
    pub async fn pending_count(&self) -> Result<u64> {
        let pool = &self.pool;
        let (count,): (i64,) = execute_with_retry("queue_count", || async move {
            sqlx::query_as("SELECT COUNT(*) FROM pending WHERE key >= ? AND key < ?")
                .bind(crate::entry::ASYNC_PENDING_START)
                .bind(crate::entry::ASYNC_PENDING_END)
                .fetch_one(pool)
                .await
        })
        .await
        .map_err(|e| self.map_err(e))?;
        Ok(count.max(0) as u64)
    }

    /// Force flush WAL to main database (for clean shutdown).
    pub async fn checkpoint(&self) -> Result<()> {
        let pool = &self.pool;
        execute_with_retry("queue_checkpoint", || async move {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(pool)
                .await
        })
        .await?;
        debug!(location = %self.location, "WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint WAL and close the pool.
    pub async fn close(&self) {
        if let Err(e) = self.checkpoint().await {
            warn!(location = %self.location, error = %e, "Failed to checkpoint WAL on close");
        }
        self.pool.close().await;
        debug!(location = %self.location, "Queue store closed");
    }

    fn map_err(&self, e: sqlx::Error) -> SweepError {
        if is_connectivity_error(&e) {
            SweepError::unavailable(&self.location, e.to_string())
        } else {
            SweepError::Queue(e)
        }
    }
}

impl QueueStore for SqliteQueueStore {
    fn range_keys<'a>(
        &'a self,
        start: &'a str,
        end: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let pool = &self.pool;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            execute_with_retry("queue_range", || async move {
                sqlx::query_scalar::<_, String>(
                    "SELECT key FROM pending WHERE key >= ? AND key < ? ORDER BY key LIMIT ?",
                )
                .bind(start)
                .bind(end)
                .bind(limit)
                .fetch_all(pool)
                .await
            })
            .await
            .map_err(|e| self.map_err(e))
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let pool = &self.pool;
            execute_with_retry("queue_get", || async move {
                sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM pending WHERE key = ?")
                    .bind(key)
                    .fetch_optional(pool)
                    .await
            })
            .await
            .map_err(|e| self.map_err(e))
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let pool = &self.pool;
            let now = chrono::Utc::now().timestamp_millis();
            let value = &value;
            execute_with_retry("queue_put", || async move {
                sqlx::query(
                    r#"
                    INSERT INTO pending (key, value, updated_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(key)
                .bind(value.as_slice())
                .bind(now)
                .execute(pool)
                .await
            })
            .await
            .map_err(|e| self.map_err(e))?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let pool = &self.pool;
            execute_with_retry("queue_delete", || async move {
                sqlx::query("DELETE FROM pending WHERE key = ?")
                    .bind(key)
                    .execute(pool)
                    .await
            })
            .await
            .map_err(|e| self.map_err(e))?;
            Ok(())
        })
    }
}

/// Map a location identifier to a database file name.
///
/// `host:port` locations contain characters that do not belong in paths.
pub fn location_file_name(location: &str) -> String {
    let safe: String = location
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '_',
            c => c,
        })
        .collect();
    format!("{}.db", safe)
}

/// Opens one [`SqliteQueueStore`] per location under a root directory.
///
/// Stores are cached for the life of the connector.
pub struct SqliteQueueConnector {
    root_dir: PathBuf,
    wal_mode: bool,
    stores: RwLock<HashMap<String, Arc<SqliteQueueStore>>>,
}

impl SqliteQueueConnector {
    pub fn new(root_dir: impl Into<PathBuf>, wal_mode: bool) -> Self {
        Self {
            root_dir: root_dir.into(),
            wal_mode,
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Database path for `location`.
    pub fn path_for(&self, location: &str) -> PathBuf {
        self.root_dir.join(location_file_name(location))
    }

    /// Number of cached connections.
    pub async fn open_count(&self) -> usize {
        self.stores.read().await.len()
    }
}

impl QueueConnector for SqliteQueueConnector {
    type Store = SqliteQueueStore;

    fn connect<'a>(&'a self, location: &'a str) -> BoxFuture<'a, Arc<SqliteQueueStore>> {
        Box::pin(async move {
            if let Some(store) = self.stores.read().await.get(location) {
                return Ok(Arc::clone(store));
            }

            let path = self.path_for(location);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(SweepError::unavailable(
                    location,
                    format!("queue database {} not found", path.display()),
                ));
            }

            let path_str = path.to_string_lossy().to_string();
            let store =
                Arc::new(SqliteQueueStore::open_with(location, &path_str, false, self.wal_mode).await?);

            let mut stores = self.stores.write().await;
            // Another worker may have raced us here; keep the first connection.
            let store = stores
                .entry(location.to_string())
                .or_insert(store)
                .clone();
            Ok(store)
        })
    }

    fn close_all(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let stores: Vec<_> = self.stores.write().await.drain().collect();
            let count = stores.len();
            for (_, store) in stores {
                store.close().await;
            }
            if count > 0 {
                info!(count, "Closed queue stores");
            }
        })
    }
}
