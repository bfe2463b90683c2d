//! Append-only audit trail of job lifecycle events.
//!
//! The engine emits one [`AuditEvent`] per committed transition, one when a
//! job is created and one per removal (before the record leaves the active
//! set). Sinks are best effort: a failing sink is logged and never affects
//! the job.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::job::{JobId, JobStatus, Transition};

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// Job submitted.
    Created,
    /// Status changed.
    Transition,
    /// Job removed from the active set.
    Removed,
}

/// One audit line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub event: AuditEventKind,
    /// Job concerned.
    pub job_id: JobId,
    /// Status before, absent on creation.
    pub from: Option<JobStatus>,
    /// Status after, absent on removal.
    pub to: Option<JobStatus>,
}

impl AuditEvent {
    /// Event for a newly created job.
    #[must_use]
    pub fn created(job_id: JobId, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            event: AuditEventKind::Created,
            job_id,
            from: None,
            to: Some(JobStatus::Queued),
        }
    }

    /// Event for a committed transition.
    #[must_use]
    pub fn transition(transition: &Transition) -> Self {
        Self {
            timestamp: transition.at,
            event: AuditEventKind::Transition,
            job_id: transition.job_id,
            from: Some(transition.from),
            to: Some(transition.to),
        }
    }

    /// Event for a removal from `status`.
    #[must_use]
    pub fn removed(job_id: JobId, status: JobStatus, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            event: AuditEventKind::Removed,
            job_id,
            from: Some(status),
            to: None,
        }
    }
}

/// An audit event could not be stored.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Writing the log file failed.
    #[error("failed to append audit event to {}: {source}", path.display())]
    Io {
        /// Log file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The event could not be encoded.
    #[error("failed to encode audit event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one event.
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Appends events as JSON lines to a file.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    // Serializes appends so lines never interleave.
    lock: tokio::sync::Mutex<()>,
}

impl JsonlAuditSink {
    /// Creates a sink writing to `path`; the file is created on first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Log file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let io_err = |source| AuditError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(&line).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events in order.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Discards events.
#[derive(Debug, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _event: &AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_jsonl_sink_appends_one_object_per_line() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonlAuditSink::new(temp_dir.path().join("jobs.jsonl"));
        let id = JobId::new();
        let now = Utc::now();

        sink.record(&AuditEvent::created(id, now)).await.unwrap();
        sink.record(&AuditEvent::removed(id, JobStatus::Canceled, now))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "created");
        assert_eq!(first["job_id"], id.to_string());
        assert_eq!(first["to"], "queued");
        assert!(first["from"].is_null());

        let second: AuditEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.event, AuditEventKind::Removed);
        assert_eq!(second.from, Some(JobStatus::Canceled));
        assert_eq!(second.to, None);
    }

    #[tokio::test]
    async fn test_jsonl_sink_reports_unwritable_path() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonlAuditSink::new(temp_dir.path().join("missing").join("jobs.jsonl"));
        let err = sink
            .record(&AuditEvent::created(JobId::new(), Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Io { .. }));
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        let id = JobId::new();
        let transition = Transition {
            job_id: id,
            from: JobStatus::Queued,
            to: JobStatus::Running,
            at: Utc::now(),
        };
        sink.record(&AuditEvent::created(id, transition.at)).await.unwrap();
        sink.record(&AuditEvent::transition(&transition)).await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].from, Some(JobStatus::Queued));
        assert_eq!(events[1].to, Some(JobStatus::Running));
    }
}
