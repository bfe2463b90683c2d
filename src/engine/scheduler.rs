//! Dispatch loop handing claimable jobs to workers within the concurrency bound.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{Inner, JobEntry, worker};
use crate::job::{JobId, Transition};

/// Runs until shutdown.
///
/// A permit is taken before a job is claimed, so a claimed job always has a
/// worker slot. Without claimable work the loop parks on the wake signal,
/// which `submit`, `resume` and shutdown raise.
pub(super) async fn run(inner: Arc<Inner>) {
    debug!(
        max_concurrent_jobs = inner.config.max_concurrent_jobs,
        "scheduler started"
    );

    loop {
        if inner.is_shutting_down() {
            break;
        }

        let permit = tokio::select! {
            permit = Arc::clone(&inner.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("worker semaphore closed");
                    break;
                }
            },
            () = inner.wake.notified() => continue,
        };

        if inner.is_shutting_down() {
            break;
        }

        match claim_next(&inner) {
            Some((entry, claimed)) => {
                tokio::spawn(worker::run(Arc::clone(&inner), entry, claimed, permit));
            }
            None => {
                drop(permit);
                inner.wake.notified().await;
            }
        }
    }

    debug!("scheduler stopped");
}

/// Claims the oldest claimable job.
fn claim_next(inner: &Inner) -> Option<(Arc<JobEntry>, Transition)> {
    let mut candidates: Vec<(DateTime<Utc>, JobId, Arc<JobEntry>)> = inner
        .jobs
        .iter()
        .filter_map(|item| {
            let record = item.value().snapshot();
            record
                .is_claimable()
                .then(|| (record.created_at, record.id, Arc::clone(item.value())))
        })
        .collect();
    candidates.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    for (_, id, entry) in candidates {
        // Stale from the previous run; commands for the new run arrive after the claim.
        entry.signal.clear();
        match entry.update(|record| record.claim(Utc::now())) {
            Ok((claimed, _)) => return Some((entry, claimed)),
            Err(e) => debug!(job_id = %id, error = %e, "claim lost"),
        }
    }
    None
}
