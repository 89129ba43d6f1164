//! Persistence layer for the Archivist archive index
//!
//! This crate owns every SQL statement the system runs. The scan engine and
//! the query layer both go through [`ArchiveDb`].
//!
//! ```rust,ignore
//! use archivist_db::{ArchiveDb, Result};
//!
//! let db = ArchiveDb::open("~/.archivist/archivist.sqlite3").await?;
//!
//! // Sync engine writes
//! let stats = db.apply_sync_write(&write).await?;
//!
//! // Web layer reads
//! let page = db.list_posts("alice", 0, 20).await?;
//! ```

mod error;
mod schema;
mod types;

// Method implementations organized by table
mod posts;
mod users;

pub use error::{DbError, Result};
pub use types::*;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Writers from another process (CLI scan while the server sweeps) wait this long for the lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 5;

/// Handle to the archive index database.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct ArchiveDb {
    pool: SqlitePool,
}

impl ArchiveDb {
    /// Open the index at `path`, creating the file, its parent directory and
    /// the tables as needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
            _ => {}
        }

        let db = Self::connect(path, true).await?;
        db.ensure_schema().await?;
        info!(path = %path.display(), "Archive index ready");
        Ok(db)
    }

    /// Like [`ArchiveDb::open`] but refuses to create a new file.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DbError::not_found(format!(
                "no archive index at {}",
                path.display()
            )));
        }

        let db = Self::connect(path, false).await?;
        db.ensure_schema().await?;
        Ok(db)
    }

    async fn connect(path: &Path, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map(|pool| Self { pool })
            .map_err(DbError::from)
    }

    /// Raw pool access for tests and one-off maintenance.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for pooled connections to shut down. Other clones become unusable.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Stored timestamps are UTC milliseconds.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(chrono::Utc::now)
    }
}
