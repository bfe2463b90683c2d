//! Drives one claimed job until it succeeds, fails, pauses or is canceled.
//!
//! Each attempt resolves the source, re-checks the destination, opens (or
//! reopens) the partial file at its last checkpoint and streams into it.
//! Failed attempts go through the retry policy; pause and stop are observed
//! around every network call, inside the stream and during backoff.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::fs::File;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{Inner, JobEntry, remove_file_if_exists};
use crate::config::ValidationError;
use crate::download::filename::{
    choose_filename, filename_from_url, reserve_partial_file, resolve_unique_path,
};
use crate::download::{
    DownloadError, FailureType, RetryDecision, TransferOutcome, TransferResponse, classify_error,
    looks_like_html, open_partial, restart_partial, retry_after_delay,
};
use crate::job::{JobCommand, JobRecord, JobStatus, NotifyStatus, PARTIAL_SUFFIX, Transition};
use crate::resolver::{ResolveError, ResolvedLink};

/// Why one attempt did not finish.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Transfer(#[from] DownloadError),

    #[error(transparent)]
    Destination(#[from] ValidationError),
}

impl AttemptError {
    fn failure_type(&self) -> FailureType {
        match self {
            Self::Resolve(e) if e.is_transient() => FailureType::Transient,
            Self::Resolve(_) | Self::Destination(_) => FailureType::Permanent,
            Self::Transfer(e) => classify_error(e),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transfer(e) => retry_after_delay(e),
            _ => None,
        }
    }
}

/// How one attempt ended without an error.
enum AttemptEnd {
    Completed(PathBuf),
    Interrupted,
}

/// How the whole run ended.
enum RunEnd {
    Completed(PathBuf),
    Interrupted,
    Failed(String),
}

/// Runs a claimed job; the permit is released when the run is over.
#[instrument(skip_all, fields(job_id = %claimed.job_id))]
pub(super) async fn run(
    inner: Arc<Inner>,
    entry: Arc<JobEntry>,
    claimed: Transition,
    permit: OwnedSemaphorePermit,
) {
    let _permit = permit;

    let record = entry.snapshot();
    inner.record_transition(&entry, &record, &claimed).await;
    // A command accepted between the claim and now.
    if let Some(command) = record.pending_command() {
        entry.signal.raise(command);
    }
    info!(
        source_url = %record.source_url,
        resume_from = record.bytes_downloaded,
        "job started"
    );

    let worker = Worker {
        inner: &inner,
        entry: &entry,
    };
    let end = worker.drive().await;
    worker.finish(end).await;
}

struct Worker<'a> {
    inner: &'a Arc<Inner>,
    entry: &'a Arc<JobEntry>,
}

impl Worker<'_> {
    async fn drive(&self) -> RunEnd {
        let policy = &self.inner.config.retry;
        let mut attempt: u32 = 0;
        let mut last_delay = Duration::ZERO;

        loop {
            attempt += 1;
            let record = self.entry.modify(|record| {
                record.attempts = attempt;
                record.touch(Utc::now());
            });
            self.inner.persist(self.entry, &record).await;

            let err = match self.attempt().await {
                Ok(AttemptEnd::Completed(path)) => return RunEnd::Completed(path),
                Ok(AttemptEnd::Interrupted) => return RunEnd::Interrupted,
                Err(err) => err,
            };

            let failure = err.failure_type();
            match policy.should_retry(failure, attempt) {
                RetryDecision::Retry { delay, .. } => {
                    let retry_after = err.retry_after();
                    let delay = delay.max(retry_after.unwrap_or_default()).max(last_delay);
                    last_delay = delay;

                    let message = err.to_string();
                    self.entry.modify(|record| {
                        record.error_message = Some(message);
                        record.touch(Utc::now());
                    });
                    info!(
                        attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = retry_after == Some(delay),
                        error = %err,
                        "retrying download"
                    );

                    tokio::select! {
                        biased;
                        _ = self.entry.signal.raised() => return RunEnd::Interrupted,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt, reason = %reason, "not retrying");
                    let message = match failure {
                        FailureType::Permanent => err.to_string(),
                        _ => format!("download failed after {attempt} attempts: {err}"),
                    };
                    return RunEnd::Failed(message);
                }
            }
        }
    }

    async fn attempt(&self) -> Result<AttemptEnd, AttemptError> {
        let signal = &self.entry.signal;
        let record = self.entry.snapshot();

        let link = tokio::select! {
            biased;
            _ = signal.raised() => return Ok(AttemptEnd::Interrupted),
            link = self.inner.resolver.resolve(&record.source_url) => link?,
        };
        debug!(
            resolver = self.inner.resolver.name(),
            direct_url = %link.url,
            "link resolved"
        );
        self.learn_total(&link.url, link.total_bytes)?;

        self.inner
            .config
            .folders
            .resolve_destination(&record.target_dir)
            .await?;

        let known = partial_of(&record);
        let record = self.entry.snapshot();

        // The previous run wrote every byte but stopped before the rename.
        if let Some((name, path)) = &known
            && let Some(total) = record.total_bytes
            && record.bytes_downloaded == total
            && tokio::fs::metadata(path)
                .await
                .is_ok_and(|meta| meta.len() == total)
        {
            debug!(bytes = total, "partial file already complete");
            return self.finalize(&link, &record, name, path, total).await;
        }

        let mut existing = match known {
            Some((name, path)) => {
                let (file, offset) = open_partial(&path, record.bytes_downloaded).await?;
                Some((name, path, file, offset))
            }
            None => None,
        };
        let offset = existing.as_ref().map_or(0, |(_, _, _, offset)| *offset);

        let opened = tokio::select! {
            biased;
            _ = signal.raised() => return Ok(AttemptEnd::Interrupted),
            opened = self.inner.client.open(&link.url, offset) => opened,
        };

        // Nothing past the checkpoint: either the partial already holds the
        // whole file, or it outgrew the source and must be fetched again.
        if let Err(DownloadError::RangeNotSatisfiable { total_bytes, .. }) = &opened
            && let Some((name, path, mut file, _)) = existing.take()
        {
            let whole = total_bytes.or(record.total_bytes).is_none_or(|total| total == offset);
            if whole {
                drop(file);
                debug!(bytes = offset, "source has nothing past the checkpoint");
                return self.complete_partial(&link, &name, &path, offset).await;
            }
            info!(discarded_bytes = offset, "partial larger than source, restarting from zero");
            restart_partial(&mut file, &path).await?;
            self.entry.modify(|record| {
                record.bytes_downloaded = 0;
                record.touch(Utc::now());
            });
        }
        let response = opened?;

        let (name, path, file) = match existing {
            Some((name, path, mut file, offset)) => {
                if !response.resumed && offset > 0 {
                    info!(
                        discarded_bytes = offset,
                        "source ignored range request, restarting from zero"
                    );
                    restart_partial(&mut file, &path).await?;
                }
                (name, path, file)
            }
            None => self.reserve(&record, &link, &response).await?,
        };

        let start = response.offset;
        self.entry.modify(|record| {
            record.bytes_downloaded = start;
            record.touch(Utc::now());
        });
        let expected = self.learn_total(&link.url, response.total_bytes)?;
        debug!(offset = start, total_bytes = ?expected, "transfer opened");

        let inner = Arc::clone(self.inner);
        let entry = Arc::clone(self.entry);
        let outcome = self
            .inner
            .client
            .stream_to_file(response, file, &path, expected, signal, move |bytes| {
                let snapshot = entry.modify(|record| {
                    record.bytes_downloaded = bytes;
                    record.touch(Utc::now());
                });
                inner.persist_detached(&entry, snapshot);
            })
            .await?;

        match outcome {
            TransferOutcome::Completed { bytes } => {
                self.complete_partial(&link, &name, &path, bytes).await
            }
            TransferOutcome::Interrupted { bytes, command } => {
                debug!(bytes, command = command.as_str(), "transfer interrupted");
                Ok(AttemptEnd::Interrupted)
            }
        }
    }

    /// Checks a fully written partial file and moves it into place.
    async fn complete_partial(
        &self,
        link: &ResolvedLink,
        name: &str,
        path: &Path,
        bytes: u64,
    ) -> Result<AttemptEnd, AttemptError> {
        if looks_like_html(path, bytes).await? {
            remove_file_if_exists(path).await;
            return Err(DownloadError::html_page(&link.url).into());
        }
        let record = self.entry.modify(|record| {
            record.total_bytes.get_or_insert(bytes);
            record.bytes_downloaded = bytes;
            record.touch(Utc::now());
        });
        self.finalize(link, &record, name, path, bytes).await
    }

    /// Records a size reported by the source; returns the known total.
    ///
    /// A size that disagrees with one learned earlier is an error.
    fn learn_total(&self, url: &str, reported: Option<u64>) -> Result<Option<u64>, DownloadError> {
        let mut conflict = None;
        let record = self.entry.modify(|record| match (record.total_bytes, reported) {
            (Some(known), Some(reported)) if known != reported => conflict = Some(known),
            (None, Some(reported)) => {
                record.total_bytes = Some(reported);
                record.touch(Utc::now());
            }
            _ => {}
        });
        match (conflict, reported) {
            (Some(known), Some(reported)) => Err(DownloadError::size_changed(url, known, reported)),
            _ => Ok(record.total_bytes),
        }
    }

    /// Picks the file name on the first run and creates its partial file.
    async fn reserve(
        &self,
        record: &JobRecord,
        link: &ResolvedLink,
        response: &TransferResponse,
    ) -> Result<(String, PathBuf, File), DownloadError> {
        let source_name = Url::parse(&record.source_url)
            .ok()
            .as_ref()
            .and_then(filename_from_url);
        let wanted = choose_filename([
            response.disposition_name.as_deref(),
            link.suggested_name.as_deref(),
            response.url_name.as_deref(),
            source_name.as_deref(),
        ]);

        let (name, file) = reserve_partial_file(&record.target_dir, &wanted)
            .await
            .map_err(|e| DownloadError::io(record.target_dir.join(&wanted), e))?;
        let path = record.target_dir.join(format!("{name}{PARTIAL_SUFFIX}"));
        debug!(file_name = %name, "reserved file name");

        let snapshot = self.entry.modify(|record| {
            record.file_name = Some(name.clone());
            record.touch(Utc::now());
        });
        self.inner.persist(self.entry, &snapshot).await;
        Ok((name, path, file))
    }

    /// Moves the partial file onto a free final name.
    async fn finalize(
        &self,
        link: &ResolvedLink,
        record: &JobRecord,
        name: &str,
        partial: &Path,
        bytes: u64,
    ) -> Result<AttemptEnd, AttemptError> {
        let final_path = resolve_unique_path(&record.target_dir, name).await;
        tokio::fs::rename(partial, &final_path)
            .await
            .map_err(|e| DownloadError::io(&final_path, e))?;

        if let Some(saved_name) = final_path.file_name().and_then(|n| n.to_str())
            && saved_name != name
        {
            let saved_name = saved_name.to_string();
            self.entry.modify(|record| record.file_name = Some(saved_name));
        }
        debug!(
            direct_url = %link.url,
            saved_path = %final_path.display(),
            bytes,
            "file finalized"
        );
        Ok(AttemptEnd::Completed(final_path))
    }

    /// Commits the run's outcome and runs its follow-ups.
    async fn finish(&self, end: RunEnd) {
        let now = Utc::now();
        let committed = match end {
            RunEnd::Completed(path) => self.entry.update(|record| record.complete(path, now)),
            RunEnd::Failed(message) => self.entry.update(|record| record.fail(message, now)),
            RunEnd::Interrupted => self.entry.update(|record| {
                let to = match record.pending_command() {
                    Some(JobCommand::Stop) => JobStatus::Canceled,
                    _ => JobStatus::Paused,
                };
                record.transition(JobStatus::Running, to, now)
            }),
        };

        let (transition, record) = match committed {
            Ok(committed) => committed,
            Err(e) => {
                warn!(error = %e, "failed to commit job outcome");
                return;
            }
        };
        self.inner
            .record_transition(self.entry, &record, &transition)
            .await;

        match transition.to {
            JobStatus::Success => {
                info!(
                    bytes = record.bytes_downloaded,
                    saved_path = ?record.saved_path(),
                    "download complete"
                );
                if let Some(path) = record.saved_path() {
                    self.notify(path.to_path_buf()).await;
                }
            }
            JobStatus::Failed => {
                warn!(
                    attempts = record.attempts,
                    error = record.error_message.as_deref().unwrap_or_default(),
                    "download failed"
                );
            }
            JobStatus::Canceled => {
                if let Some(path) = record.partial_path() {
                    remove_file_if_exists(&path).await;
                }
                info!(bytes = record.bytes_downloaded, "download canceled");
            }
            JobStatus::Paused => info!(bytes = record.bytes_downloaded, "download paused"),
            JobStatus::Queued | JobStatus::Running => {}
        }
    }

    /// Asks the library to rescan; the outcome never changes the job status.
    async fn notify(&self, saved_path: PathBuf) {
        let Some(notifier) = &self.inner.notifier else {
            return;
        };

        let requested = self.entry.modify(|record| {
            let now = Utc::now();
            record.notify.status = NotifyStatus::Requesting;
            record.notify.requested_at = Some(now);
            record.touch(now);
        });
        self.inner.persist(self.entry, &requested).await;

        let (status, message) = match notifier.notify(&saved_path).await {
            Ok(message) => {
                info!(outcome = %message, "library rescan requested");
                (NotifyStatus::Success, message)
            }
            Err(e) => {
                warn!(error = %e, "library rescan failed");
                (NotifyStatus::Failed, e.to_string())
            }
        };

        let done = self.entry.modify(|record| {
            let now = Utc::now();
            record.notify.status = status;
            record.notify.message = Some(message);
            record.notify.completed_at = Some(now);
            record.touch(now);
        });
        self.inner.persist(self.entry, &done).await;
    }
}

/// File name and partial path of a job that already reserved its name.
fn partial_of(record: &JobRecord) -> Option<(String, PathBuf)> {
    let name = record.file_name.clone()?;
    let path = record.target_dir.join(format!("{name}{PARTIAL_SUFFIX}"));
    Some((name, path))
}
