//! SQLite pool for the job database.
//!
//! File databases run in WAL mode with a busy timeout on every pooled
//! connection, so progress upserts from several workers queue up instead of
//! failing with `SQLITE_BUSY`. Migrations from `migrations/` run on open.
//!
//! ```no_run
//! use linkdrop_core::store::{Database, JobRepository};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repository = JobRepository::new(Database::new(Path::new("jobs.db")).await?);
//! let jobs = repository.load_all().await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use thiserror::Error;
use tracing::{debug, instrument};

/// SQLite locks the whole file, so a handful of connections is plenty.
const MAX_CONNECTIONS: u32 = 4;

/// How long a connection waits on a locked database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors opening the job database.
#[derive(Error, Debug)]
pub enum DbError {
    /// The database could not be opened or configured.
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    /// The schema could not be brought up to date.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Migrated connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the job database at `db_path`, creating it when missing.
    ///
    /// # Errors
    ///
    /// [`DbError::Connection`] when the file cannot be opened,
    /// [`DbError::Migration`] when the schema cannot be applied.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Self::migrated(pool).await
    }

    /// Opens a private in-memory database.
    ///
    /// The pool holds exactly one connection; a second one would see a
    /// different, empty database.
    ///
    /// # Errors
    ///
    /// Same as [`Database::new`].
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("job database ready");
        Ok(Self { pool })
    }

    /// Underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns `true` when the database runs in WAL mode.
    ///
    /// # Errors
    ///
    /// [`DbError::Connection`] if the pragma query fails.
    pub async fn is_wal_enabled(&self) -> Result<bool, DbError> {
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.eq_ignore_ascii_case("wal"))
    }

    /// Waits for every connection to close.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
