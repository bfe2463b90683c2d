//! Job engine: the public job operations, the scheduler and the workers.
//!
//! The engine owns every [`JobRecord`] behind a per-job mutex and hands out
//! immutable snapshots only. A fixed-size semaphore bounds how many workers
//! run at once; jobs beyond the bound stay `queued` until a permit frees up.
//!
//! # Example
//!
//! ```no_run
//! use linkdrop_core::config::EngineConfig;
//! use linkdrop_core::engine::JobEngine;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load(Path::new("linkdrop.toml"))?;
//! let engine = JobEngine::builder(config).build().await?;
//!
//! let job = engine.submit("https://1fichier.com/?abc123", None).await?;
//! let mut updates = engine.subscribe(job.id)?;
//! updates.wait_for(|record| record.status().is_terminal()).await?;
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod scheduler;
mod worker;

use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditEvent, AuditSink, JsonlAuditSink, NoopAuditSink};
use crate::config::{EngineConfig, ValidationError};
use crate::download::TransferClient;
use crate::job::{
    CommandEffect, CommandError, JobCommand, JobId, JobRecord, JobSignal, JobStatus, Transition,
};
use crate::notify::{LibraryRescanNotifier, Notifier, NotifyError};
use crate::resolver::{ResolveError, Resolver, resolver_from_config};
use crate::store::{Database, DbError, JobRepository, StoreError};

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The URL or destination was rejected; no job was created.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No job has this id.
    #[error("job {0} not found")]
    NotFound(JobId),

    /// The command does not apply to the job's current state.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Persisted jobs could not be loaded at startup.
    #[error("failed to load persisted jobs: {0}")]
    Persistence(#[from] StoreError),

    /// The job database could not be opened.
    #[error("failed to open job database: {0}")]
    Database(#[from] DbError),

    /// The transfer HTTP client could not be built.
    #[error("failed to build transfer client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// The configured resolver could not be built.
    #[error("failed to build resolver: {0}")]
    Resolver(#[from] ResolveError),

    /// The configured notifier could not be built.
    #[error("failed to build notifier: {0}")]
    Notifier(#[from] NotifyError),

    /// The engine no longer accepts jobs.
    #[error("engine is shutting down")]
    ShuttingDown,
}

impl EngineError {
    /// Returns true for state conflicts (terminal job, pending command, lost race).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Command(e) if e.is_conflict())
    }
}

/// One job as held by the engine.
///
/// Writes go through the mutex so only one writer changes the record at a
/// time; every committed change is published on the watch channel, which is
/// where readers take their snapshots from.
pub(crate) struct JobEntry {
    record: Mutex<JobRecord>,
    published: watch::Sender<JobRecord>,
    signal: JobSignal,
    // Orders repository writes against removal; `true` once the row is gone.
    removed: tokio::sync::Mutex<bool>,
}

impl JobEntry {
    fn new(record: JobRecord) -> Self {
        let (published, _rx) = watch::channel(record.clone());
        Self {
            record: Mutex::new(record),
            published,
            signal: JobSignal::new(),
            removed: tokio::sync::Mutex::new(false),
        }
    }

    fn snapshot(&self) -> JobRecord {
        self.published.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<JobRecord> {
        self.published.subscribe()
    }

    /// Applies a state-machine operation; nothing is published when it fails.
    fn update<T>(
        &self,
        op: impl FnOnce(&mut JobRecord) -> Result<T, CommandError>,
    ) -> Result<(T, JobRecord), CommandError> {
        let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        let value = op(&mut record)?;
        let snapshot = record.clone();
        self.published.send_replace(snapshot.clone());
        Ok((value, snapshot))
    }

    /// Changes bookkeeping fields that never affect the status.
    fn modify(&self, op: impl FnOnce(&mut JobRecord)) -> JobRecord {
        let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut record);
        let snapshot = record.clone();
        self.published.send_replace(snapshot.clone());
        snapshot
    }
}

/// State shared by the engine handle, the scheduler and the workers.
pub(crate) struct Inner {
    config: EngineConfig,
    client: TransferClient,
    resolver: Arc<dyn Resolver>,
    notifier: Option<Arc<dyn Notifier>>,
    audit: Arc<dyn AuditSink>,
    repository: Option<JobRepository>,
    jobs: DashMap<JobId, Arc<JobEntry>>,
    permits: Arc<Semaphore>,
    wake: Notify,
    shutting_down: AtomicBool,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn entry(&self, id: JobId) -> Result<Arc<JobEntry>, EngineError> {
        self.jobs
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::NotFound(id))
    }

    async fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event).await {
            warn!(job_id = %event.job_id, error = %e, "failed to record audit event");
        }
    }

    /// Upserts a snapshot unless the job was removed meanwhile.
    async fn persist(&self, entry: &JobEntry, record: &JobRecord) {
        let Some(repository) = &self.repository else {
            return;
        };
        let removed = entry.removed.lock().await;
        if *removed {
            return;
        }
        if let Err(e) = repository.upsert(record).await {
            warn!(job_id = %record.id, error = %e, "failed to persist job");
        }
    }

    /// Persists from synchronous progress callbacks.
    fn persist_detached(self: &Arc<Self>, entry: &Arc<JobEntry>, record: JobRecord) {
        if self.repository.is_none() {
            return;
        }
        let inner = Arc::clone(self);
        let entry = Arc::clone(entry);
        tokio::spawn(async move {
            inner.persist(&entry, &record).await;
        });
    }

    async fn record_transition(&self, entry: &JobEntry, record: &JobRecord, transition: &Transition) {
        info!(
            job_id = %transition.job_id,
            from = %transition.from,
            to = %transition.to,
            "job transition"
        );
        self.audit(AuditEvent::transition(transition)).await;
        self.persist(entry, record).await;
    }

    /// Audits the removal, deletes the row, takes the job out of the active
    /// set and discards any partial file.
    ///
    /// Returns `None` when another caller already removed the job.
    async fn forget(&self, id: JobId, entry: &Arc<JobEntry>) -> Option<JobRecord> {
        let mut removed = entry.removed.lock().await;
        if *removed {
            return None;
        }
        *removed = true;
        let record = entry.snapshot();
        self.audit(AuditEvent::removed(record.id, record.status(), Utc::now()))
            .await;
        if let Some(repository) = &self.repository
            && let Err(e) = repository.delete(record.id).await
        {
            warn!(job_id = %record.id, error = %e, "failed to delete persisted job");
        }
        self.jobs.remove_if(&id, |_, held| Arc::ptr_eq(held, entry));
        drop(removed);

        if record.status() != JobStatus::Success {
            discard_partial(&record).await;
        }
        info!(job_id = %record.id, status = %record.status(), "job removed");
        Some(record)
    }

    /// Loads persisted jobs; jobs left running by a crash come back paused.
    async fn restore(&self) -> Result<(), EngineError> {
        let Some(repository) = &self.repository else {
            return Ok(());
        };
        let records = repository.load_all().await?;
        let total = records.len();
        let mut interrupted = 0usize;

        for record in records {
            if record.status() == JobStatus::Running {
                let now = Utc::now();
                let mut parked = record.restore(JobStatus::Paused, None);
                parked.touch(now);
                let transition = Transition {
                    job_id: parked.id,
                    from: JobStatus::Running,
                    to: JobStatus::Paused,
                    at: parked.updated_at,
                };
                let entry = Arc::new(JobEntry::new(parked.clone()));
                self.jobs.insert(parked.id, Arc::clone(&entry));
                self.record_transition(&entry, &parked, &transition).await;
                interrupted += 1;
            } else {
                self.jobs.insert(record.id, Arc::new(JobEntry::new(record)));
            }
        }

        if total > 0 {
            info!(restored = total, interrupted, "restored persisted jobs");
        }
        Ok(())
    }
}

/// Deletes a job's partial file if one exists.
async fn discard_partial(record: &JobRecord) {
    let Some(path) = record.partial_path() else {
        return;
    };
    remove_file_if_exists(&path).await;
}

async fn remove_file_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial file"),
    }
}

/// Assembles a [`JobEngine`] with optional adapter overrides.
///
/// Anything not set explicitly is built from the [`EngineConfig`]: the
/// resolver from `[resolver]`, the notifier from `[notifier]`, the audit
/// sink and database from `[storage]`.
pub struct JobEngineBuilder {
    config: EngineConfig,
    resolver: Option<Arc<dyn Resolver>>,
    notifier: Option<Arc<dyn Notifier>>,
    audit: Option<Arc<dyn AuditSink>>,
    repository: Option<JobRepository>,
    dispatch: bool,
}

impl JobEngineBuilder {
    /// Overrides the resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Overrides the notifier.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Overrides the audit sink.
    #[must_use]
    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Uses an already opened repository instead of `storage.database_path`.
    #[must_use]
    pub fn repository(mut self, repository: JobRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Whether the scheduler starts claiming jobs (default `true`).
    ///
    /// Without dispatch the engine only serves inspection and housekeeping
    /// operations over the restored jobs.
    #[must_use]
    pub fn dispatch(mut self, dispatch: bool) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Builds the engine, restores persisted jobs and starts the scheduler.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if an adapter or the database cannot be set up, or
    /// if persisted jobs cannot be loaded.
    pub async fn build(self) -> Result<JobEngine, EngineError> {
        let Self {
            config,
            resolver,
            notifier,
            audit,
            repository,
            dispatch,
        } = self;

        let client = TransferClient::new(config.transfer).map_err(EngineError::HttpClient)?;
        let resolver = match resolver {
            Some(resolver) => resolver,
            None => resolver_from_config(&config.resolver)?,
        };
        let notifier: Option<Arc<dyn Notifier>> = match (notifier, &config.notifier) {
            (Some(notifier), _) => Some(notifier),
            (None, Some(settings)) => Some(Arc::new(LibraryRescanNotifier::new(settings)?)),
            (None, None) => None,
        };
        let audit: Arc<dyn AuditSink> = match (audit, &config.storage.audit_log_path) {
            (Some(audit), _) => audit,
            (None, Some(path)) => Arc::new(JsonlAuditSink::new(path.clone())),
            (None, None) => Arc::new(NoopAuditSink),
        };
        let repository = match (repository, &config.storage.database_path) {
            (Some(repository), _) => Some(repository),
            (None, Some(path)) => Some(JobRepository::new(Database::new(path).await?)),
            (None, None) => None,
        };

        info!(
            max_concurrent_jobs = config.max_concurrent_jobs,
            resolver = resolver.name(),
            notifier = notifier.is_some(),
            persistent = repository.is_some(),
            "starting job engine"
        );

        let inner = Arc::new(Inner {
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            config,
            client,
            resolver,
            notifier,
            audit,
            repository,
            jobs: DashMap::new(),
            wake: Notify::new(),
            shutting_down: AtomicBool::new(false),
            scheduler: Mutex::new(None),
        });
        inner.restore().await?;

        if dispatch {
            let handle = tokio::spawn(scheduler::run(Arc::clone(&inner)));
            *inner
                .scheduler
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(handle);
            inner.wake.notify_one();
        }

        Ok(JobEngine { inner })
    }
}

/// Handle to the job engine. Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEngine")
            .field("jobs", &self.inner.jobs.len())
            .field("max_concurrent_jobs", &self.inner.config.max_concurrent_jobs)
            .finish_non_exhaustive()
    }
}

impl JobEngine {
    /// Starts building an engine around `config`.
    #[must_use]
    pub fn builder(config: EngineConfig) -> JobEngineBuilder {
        JobEngineBuilder {
            config,
            resolver: None,
            notifier: None,
            audit: None,
            repository: None,
            dispatch: true,
        }
    }

    /// The validated configuration the engine runs with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Validates and queues a download.
    ///
    /// `destination` defaults to the configured default destination; a
    /// relative destination is taken relative to it.
    ///
    /// # Errors
    ///
    /// [`EngineError::Validation`] when the URL or destination is rejected (no
    /// job is created), [`EngineError::ShuttingDown`] after [`JobEngine::shutdown`].
    #[instrument(skip(self, destination), fields(url = %url))]
    pub async fn submit(
        &self,
        url: &str,
        destination: Option<&Path>,
    ) -> Result<JobRecord, EngineError> {
        if self.inner.is_shutting_down() {
            return Err(EngineError::ShuttingDown);
        }
        let folders = &self.inner.config.folders;
        let source = self.inner.config.sources.check(url)?;
        let target_dir = folders
            .resolve_destination(destination.unwrap_or_else(|| folders.default_destination()))
            .await?;

        let now = Utc::now();
        let record = JobRecord::new(source.as_str(), target_dir, now);
        let entry = Arc::new(JobEntry::new(record.clone()));

        self.inner.audit(AuditEvent::created(record.id, now)).await;
        self.inner.jobs.insert(record.id, Arc::clone(&entry));
        self.inner.persist(&entry, &record).await;
        info!(
            job_id = %record.id,
            target_dir = %record.target_dir.display(),
            "job queued"
        );
        self.inner.wake.notify_one();
        Ok(record)
    }

    /// Snapshot of every job, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .inner
            .jobs
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        records.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        records
    }

    /// Snapshot of one job.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for an unknown id.
    pub fn get(&self, id: JobId) -> Result<JobRecord, EngineError> {
        Ok(self.inner.entry(id)?.snapshot())
    }

    /// Receives a snapshot after every committed change of one job.
    ///
    /// The channel closes once the job is removed and its worker has exited.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for an unknown id.
    pub fn subscribe(&self, id: JobId) -> Result<watch::Receiver<JobRecord>, EngineError> {
        Ok(self.inner.entry(id)?.subscribe())
    }

    /// Asks a running job to park at its next checkpoint.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], or [`EngineError::Command`] when the job is
    /// terminal, not running, or already has a pending command.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn pause(&self, id: JobId) -> Result<JobRecord, EngineError> {
        self.command(id, JobCommand::Pause).await
    }

    /// Requeues a paused job; it continues from its last checkpoint.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], or [`EngineError::Command`] when the job is
    /// not paused or already has a pending command.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn resume(&self, id: JobId) -> Result<JobRecord, EngineError> {
        self.command(id, JobCommand::Resume).await
    }

    /// Cancels a job. Queued and paused jobs are canceled at once; a running
    /// job stops at its next checkpoint.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], or [`EngineError::Command`] when the job is
    /// terminal or already has a pending command.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn stop(&self, id: JobId) -> Result<JobRecord, EngineError> {
        self.command(id, JobCommand::Stop).await
    }

    async fn command(&self, id: JobId, command: JobCommand) -> Result<JobRecord, EngineError> {
        let entry = self.inner.entry(id)?;
        let (effect, snapshot) = entry.update(|record| record.request(command, Utc::now()))?;

        match effect {
            CommandEffect::Applied(transition) => {
                self.inner
                    .record_transition(&entry, &snapshot, &transition)
                    .await;
                if transition.to == JobStatus::Canceled {
                    discard_partial(&snapshot).await;
                }
            }
            CommandEffect::Pending(JobCommand::Resume) => {
                debug!("resume pending");
                self.inner.wake.notify_one();
            }
            CommandEffect::Pending(pending) => {
                debug!(command = pending.as_str(), "command pending");
                entry.signal.raise(pending);
            }
        }
        Ok(snapshot)
    }

    /// Removes a job from any state, stopping it first if it is not terminal.
    ///
    /// Waits for a running job's worker to observe the stop.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for an unknown id.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn remove(&self, id: JobId) -> Result<JobRecord, EngineError> {
        let entry = self.inner.entry(id)?;

        match entry.update(|record| record.force_stop(Utc::now())) {
            Ok((CommandEffect::Applied(transition), snapshot)) => {
                self.inner
                    .record_transition(&entry, &snapshot, &transition)
                    .await;
            }
            Ok((CommandEffect::Pending(command), _)) => {
                entry.signal.raise(command);
                let mut updates = entry.subscribe();
                if updates
                    .wait_for(|record| record.status().is_terminal())
                    .await
                    .is_err()
                {
                    debug!("job channel closed while waiting for stop");
                }
            }
            Err(CommandError::Terminal { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        self.inner
            .forget(id, &entry)
            .await
            .ok_or(EngineError::NotFound(id))
    }

    /// Removes every terminal job and returns how many were removed.
    #[instrument(skip(self))]
    pub async fn clean_completed(&self) -> usize {
        // Terminal states are absorbing, so the filter cannot go stale.
        let terminal: Vec<(JobId, Arc<JobEntry>)> = self
            .inner
            .jobs
            .iter()
            .filter(|entry| entry.value().snapshot().status().is_terminal())
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut removed = 0;
        for (id, entry) in terminal {
            if self.inner.forget(id, &entry).await.is_some() {
                removed += 1;
            }
        }
        info!(removed, "cleaned terminal jobs");
        removed
    }

    /// Stops dispatching, pauses every running job and waits for all workers
    /// to park. Paused jobs stay persisted and can be resumed after a restart.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();

        let scheduler = self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = scheduler
            && let Err(e) = handle.await
        {
            warn!(error = %e, "scheduler task failed");
        }

        let running: Vec<Arc<JobEntry>> = self
            .inner
            .jobs
            .iter()
            .filter(|entry| entry.value().snapshot().status() == JobStatus::Running)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let now = Utc::now();
        for entry in running {
            match entry.update(|record| record.request(JobCommand::Pause, now)) {
                Ok((CommandEffect::Pending(command), _)) => entry.signal.raise(command),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "job not paused for shutdown"),
            }
        }

        // Every worker holds a permit until it exits.
        let all = u32::try_from(self.inner.config.max_concurrent_jobs).unwrap_or(u32::MAX);
        match self.inner.permits.acquire_many(all).await {
            Ok(_permits) => self.inner.permits.close(),
            Err(_) => debug!("worker semaphore already closed"),
        }
        info!("job engine stopped");
    }
}
