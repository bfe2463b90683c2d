//! SQLite persistence for job records.
//!
//! Every committed transition and every progress checkpoint upserts the
//! record. An upsert never replaces a row with an older snapshot: the
//! `updated_at` guard makes late writes from a slower task no-ops.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;
use thiserror::Error;
use tracing::instrument;

use super::Database;
use crate::job::{JobId, JobRecord, JobStatus, NotifyState, NotifyStatus};

/// Errors from job persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be turned back into a record.
    #[error("corrupt job row {id}: {reason}")]
    Corrupt {
        /// Row id as stored.
        id: String,
        /// What failed to decode.
        reason: String,
    },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Row shape of the `jobs` table.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    source_url: String,
    target_dir: String,
    file_name: Option<String>,
    saved_path: Option<String>,
    status: String,
    bytes_downloaded: i64,
    total_bytes: Option<i64>,
    attempts: i64,
    error_message: Option<String>,
    notify_status: String,
    notify_message: Option<String>,
    notify_requested_at: Option<String>,
    notify_completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn into_record(self) -> Result<JobRecord> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let id = JobId::from_str(&self.id).map_err(|e| corrupt(e.to_string()))?;
        let status = JobStatus::from_str(&self.status).map_err(&corrupt)?;
        let notify_status = NotifyStatus::from_str(&self.notify_status).map_err(&corrupt)?;
        let created_at = parse_timestamp(&self.created_at).map_err(&corrupt)?;
        let updated_at = parse_timestamp(&self.updated_at).map_err(&corrupt)?;
        let requested_at = self
            .notify_requested_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(&corrupt)?;
        let completed_at = self
            .notify_completed_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(&corrupt)?;

        let mut record = JobRecord::new(self.source_url, PathBuf::from(self.target_dir), created_at);
        record.id = id;
        record.file_name = self.file_name;
        record.bytes_downloaded = u64::try_from(self.bytes_downloaded).unwrap_or(0);
        record.total_bytes = self.total_bytes.and_then(|t| u64::try_from(t).ok());
        record.attempts = u32::try_from(self.attempts).unwrap_or(0);
        record.error_message = self.error_message;
        record.notify = NotifyState {
            status: notify_status,
            message: self.notify_message,
            requested_at,
            completed_at,
        };
        record.updated_at = updated_at;
        Ok(record.restore(status, self.saved_path.map(PathBuf::from)))
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{raw}': {e}"))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Job table access.
#[derive(Debug, Clone)]
pub struct JobRepository {
    db: Database,
}

impl JobRepository {
    /// Creates a repository over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts or updates a record unless the stored row is newer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the statement fails.
    #[instrument(skip(self, record), fields(job_id = %record.id, status = %record.status()))]
    pub async fn upsert(&self, record: &JobRecord) -> Result<()> {
        sqlx::query(
            r"INSERT INTO jobs (
                  id, source_url, target_dir, file_name, saved_path, status,
                  bytes_downloaded, total_bytes, attempts, error_message,
                  notify_status, notify_message, notify_requested_at, notify_completed_at,
                  created_at, updated_at
              ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(id) DO UPDATE SET
                  file_name = excluded.file_name,
                  saved_path = excluded.saved_path,
                  status = excluded.status,
                  bytes_downloaded = excluded.bytes_downloaded,
                  total_bytes = excluded.total_bytes,
                  attempts = excluded.attempts,
                  error_message = excluded.error_message,
                  notify_status = excluded.notify_status,
                  notify_message = excluded.notify_message,
                  notify_requested_at = excluded.notify_requested_at,
                  notify_completed_at = excluded.notify_completed_at,
                  updated_at = excluded.updated_at
              WHERE excluded.updated_at >= jobs.updated_at",
        )
        .bind(record.id.to_string())
        .bind(&record.source_url)
        .bind(record.target_dir.to_string_lossy().into_owned())
        .bind(record.file_name.as_deref())
        .bind(record.saved_path().map(|p| p.to_string_lossy().into_owned()))
        .bind(record.status().as_str())
        .bind(to_i64(record.bytes_downloaded))
        .bind(record.total_bytes.map(to_i64))
        .bind(i64::from(record.attempts))
        .bind(record.error_message.as_deref())
        .bind(record.notify.status.as_str())
        .bind(record.notify.message.as_deref())
        .bind(record.notify.requested_at.map(format_timestamp))
        .bind(record.notify.completed_at.map(format_timestamp))
        .bind(format_timestamp(record.created_at))
        .bind(format_timestamp(record.updated_at))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Deletes a record; returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the statement fails.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn delete(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Loads one record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] or [`StoreError::Corrupt`].
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn get(&self, id: JobId) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;
        row.map(JobRow::into_record).transpose()
    }

    /// Loads every record, oldest first.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] or [`StoreError::Corrupt`] for the first bad row.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r"SELECT * FROM jobs
              ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(JobRow::into_record).collect()
    }
}
