//! Database connection pool and schema bootstrap.
//!
//! Shared SQLite connection pool used by all queue operations. The queue
//! table is the only shared mutable resource; every status transition goes
//! through a conditional update so arbitrary concurrent callers stay safe.

pub mod queue;

use crate::config::QueueOptions;
use crate::error::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// One table, `queue`. One row per submission generation; the store-assigned
/// AUTOINCREMENT index is the global insertion order and is never reused.
/// Bootstrap is check-then-create, not a migration system.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS queue (
    "index"       INTEGER PRIMARY KEY AUTOINCREMENT,
    key           TEXT NOT NULL,
    status        TEXT NOT NULL,
    requestUri    TEXT NOT NULL,
    params        TEXT,
    estimatedTime INTEGER,
    startTime     INTEGER
);
CREATE INDEX IF NOT EXISTS idx_queue_key ON queue (key);
CREATE INDEX IF NOT EXISTS idx_queue_status ON queue (status);
"#;

/// Database handle. Owns the connection pool and the queue options.
pub struct Db {
    pool: SqlitePool,
    options: QueueOptions,
}

impl Db {
    /// Connect with default queue options, creating the database file and
    /// schema if absent.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(url, QueueOptions::default()).await
    }

    /// Connect to SQLite at `url` (e.g. `sqlite://queue.db`) and ensure the
    /// schema exists.
    pub async fn connect_with(url: &str, options: QueueOptions) -> Result<Self> {
        let connect = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect)
            .await?;
        let db = Self { pool, options };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub async fn in_memory() -> Result<Self> {
        Self::in_memory_with(QueueOptions::default()).await
    }

    pub async fn in_memory_with(options: QueueOptions) -> Result<Self> {
        // Each new connection to :memory: is a separate database, so pin
        // the pool to one connection that never expires.
        let connect = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(connect)
            .await?;
        let db = Self { pool, options };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Idempotently create the queue table and its secondary indexes.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Simple health check — run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    /// The connection pool, for external inspection of the queue table.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
