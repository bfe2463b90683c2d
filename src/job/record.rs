//! Job record types and status definitions.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::JobCommand;

/// Opaque job identifier, generated once at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a free worker.
    Queued,
    /// Claimed by a worker and transferring.
    Running,
    /// Parked at a checkpoint; resumable.
    Paused,
    /// File fully written and moved into place.
    Success,
    /// Gave up after a permanent error or exhausted retries.
    Failed,
    /// Stopped by an explicit command.
    Canceled,
}

impl JobStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Queued,
        Self::Running,
        Self::Paused,
        Self::Success,
        Self::Failed,
        Self::Canceled,
    ];

    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Returns true for `success`, `failed` and `canceled`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("invalid job status: {s}")),
        }
    }
}

/// Status of the post-download library rescan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyStatus {
    /// No notifier call has been made.
    #[default]
    NotRequested,
    /// Call in flight.
    Requesting,
    /// Notifier accepted the rescan.
    Success,
    /// Notifier call failed; the download itself is unaffected.
    Failed,
}

impl NotifyStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequested => "not_requested",
            Self::Requesting => "requesting",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for NotifyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NotifyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_requested" => Ok(Self::NotRequested),
            "requesting" => Ok(Self::Requesting),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid notify status: {s}")),
        }
    }
}

/// Notification sub-state, tracked independently of the job status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyState {
    /// Current notifier call status.
    pub status: NotifyStatus,
    /// Message returned by the notifier, or the failure reason.
    pub message: Option<String>,
    /// When the call was issued.
    pub requested_at: Option<DateTime<Utc>>,
    /// When the call finished.
    pub completed_at: Option<DateTime<Utc>>,
}

/// One user-submitted download.
///
/// Records handed out by the engine are owned snapshots; mutating a copy has
/// no effect on the engine. `status`, `saved_path` and the pending command are
/// only changed through the transition methods in [`super::state`], which keep
/// `saved_path` set exactly when the status is `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Stable identifier.
    pub id: JobId,
    /// Original link as submitted.
    pub source_url: String,
    /// Canonical destination directory inside an allow-listed root.
    pub target_dir: PathBuf,
    /// Sanitized, collision-free file name once the first response arrives.
    pub file_name: Option<String>,
    /// Bytes durably written so far.
    pub bytes_downloaded: u64,
    /// Size reported by the resolver or the source, once known.
    pub total_bytes: Option<u64>,
    /// Number of transfer attempts in the current run.
    pub attempts: u32,
    /// Last error message.
    pub error_message: Option<String>,
    /// Library rescan sub-state.
    pub notify: NotifyState,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time; never moves backwards.
    pub updated_at: DateTime<Utc>,
    pub(super) status: JobStatus,
    pub(super) saved_path: Option<PathBuf>,
    #[serde(skip)]
    pub(super) pending_command: Option<JobCommand>,
}

impl JobRecord {
    /// Creates a `queued` record.
    #[must_use]
    pub fn new(source_url: impl Into<String>, target_dir: impl Into<PathBuf>, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            source_url: source_url.into(),
            target_dir: target_dir.into(),
            file_name: None,
            bytes_downloaded: 0,
            total_bytes: None,
            attempts: 0,
            error_message: None,
            notify: NotifyState::default(),
            created_at: now,
            updated_at: now,
            status: JobStatus::Queued,
            saved_path: None,
            pending_command: None,
        }
    }

    /// Rebuilds a record from persisted columns.
    ///
    /// A `saved_path` is only kept when `status` is `success`.
    #[must_use]
    pub(crate) fn restore(mut self, status: JobStatus, saved_path: Option<PathBuf>) -> Self {
        self.status = status;
        self.saved_path = if status == JobStatus::Success {
            saved_path
        } else {
            None
        };
        self.pending_command = None;
        self
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Absolute path of the finished file; present only on `success`.
    #[must_use]
    pub fn saved_path(&self) -> Option<&Path> {
        self.saved_path.as_deref()
    }

    /// Command accepted but not yet observed by a worker or the scheduler.
    #[must_use]
    pub fn pending_command(&self) -> Option<JobCommand> {
        self.pending_command
    }

    /// Progress in percent, clamped to `[0, 100]`.
    ///
    /// Without a known non-zero total this is 0 until the job succeeds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percent(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => {
                (self.bytes_downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
            }
            _ if self.status == JobStatus::Success => 100.0,
            _ => 0.0,
        }
    }

    /// Path of the in-progress partial file, once a file name is known.
    #[must_use]
    pub fn partial_path(&self) -> Option<PathBuf> {
        self.file_name
            .as_ref()
            .map(|name| self.target_dir.join(format!("{name}{PARTIAL_SUFFIX}")))
    }

    /// Refreshes `updated_at` without letting it move backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Suffix appended to the file name while bytes are still arriving.
pub const PARTIAL_SUFFIX: &str = ".part";

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> JobRecord {
        JobRecord::new("https://1fichier.com/?abc", "/downloads", Utc::now())
    }

    #[test]
    fn test_job_status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_notify_status_parse() {
        assert_eq!(
            "not_requested".parse::<NotifyStatus>().unwrap(),
            NotifyStatus::NotRequested
        );
        assert!("pending".parse::<NotifyStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<_> = JobStatus::ALL.into_iter().filter(JobStatus::is_terminal).collect();
        assert_eq!(
            terminal,
            vec![JobStatus::Success, JobStatus::Failed, JobStatus::Canceled]
        );
    }

    #[test]
    fn test_job_id_parse_and_display() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_new_record_is_queued_without_saved_path() {
        let job = record();
        assert_eq!(job.status(), JobStatus::Queued);
        assert!(job.saved_path().is_none());
        assert_eq!(job.notify.status, NotifyStatus::NotRequested);
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn test_progress_percent_unknown_total_is_zero() {
        let mut job = record();
        assert!(job.progress_percent().abs() < f64::EPSILON);
        job.bytes_downloaded = 500;
        assert!(job.progress_percent().abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_percent_known_total() {
        let mut job = record();
        job.total_bytes = Some(1_000);
        job.bytes_downloaded = 250;
        assert!((job.progress_percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_percent_clamped() {
        let mut job = record();
        job.total_bytes = Some(100);
        job.bytes_downloaded = 150;
        assert!((job.progress_percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut job = record();
        let original = job.updated_at;
        job.touch(original - Duration::seconds(10));
        assert_eq!(job.updated_at, original);
        job.touch(original + Duration::seconds(10));
        assert!(job.updated_at > original);
    }

    #[test]
    fn test_partial_path_requires_file_name() {
        let mut job = record();
        assert!(job.partial_path().is_none());
        job.file_name = Some("movie.mkv".to_string());
        assert_eq!(
            job.partial_path().unwrap(),
            PathBuf::from("/downloads/movie.mkv.part")
        );
    }

    #[test]
    fn test_restore_drops_saved_path_unless_success() {
        let job = record().restore(JobStatus::Failed, Some(PathBuf::from("/downloads/a.bin")));
        assert!(job.saved_path().is_none());
        let job = record().restore(JobStatus::Success, Some(PathBuf::from("/downloads/a.bin")));
        assert_eq!(job.saved_path(), Some(Path::new("/downloads/a.bin")));
    }
}
