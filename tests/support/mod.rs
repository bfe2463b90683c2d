//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod range_server;
pub mod socket_guard;

use std::path::Path;
use std::time::Duration;

use linkdrop_core::{
    EngineConfig, FolderPolicy, JobEngine, JobId, JobRecord, JobStatus, RetryPolicy, SourcePolicy,
    TransferConfig,
};

/// Upper bound for any single wait in these tests.
pub const WAIT_LIMIT: Duration = Duration::from_secs(20);

/// Engine configuration for localhost servers with short timeouts.
pub fn test_config(root: &Path, max_attempts: u32) -> EngineConfig {
    let folders = FolderPolicy::new(vec![root.to_path_buf()], None).unwrap();
    let mut config = EngineConfig::new(folders);
    config.sources = SourcePolicy::new(
        vec!["http".to_string()],
        vec!["127.0.0.1".to_string()],
        2048,
    );
    config.transfer = TransferConfig {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_millis(400),
        flush_interval_bytes: 64 * 1024,
        flush_interval: Duration::from_millis(50),
    };
    config.retry = RetryPolicy::fixed(max_attempts, Duration::from_millis(50));
    config
}

/// Deterministic, non-repeating-per-KiB body of `len` bytes.
pub fn body_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

/// Waits until the job's snapshot satisfies `predicate`.
pub async fn wait_for_job<F>(engine: &JobEngine, id: JobId, predicate: F) -> JobRecord
where
    F: Fn(&JobRecord) -> bool,
{
    let mut updates = engine.subscribe(id).unwrap();
    let record = tokio::time::timeout(WAIT_LIMIT, updates.wait_for(|record| predicate(record)))
        .await
        .expect("timed out waiting for job")
        .expect("job channel closed");
    record.clone()
}

/// Waits until the job reaches `status`.
pub async fn wait_for_status(engine: &JobEngine, id: JobId, status: JobStatus) -> JobRecord {
    wait_for_job(engine, id, |record| record.status() == status).await
}

/// Waits until the job reaches any terminal status.
pub async fn wait_for_terminal(engine: &JobEngine, id: JobId) -> JobRecord {
    wait_for_job(engine, id, |record| record.status().is_terminal()).await
}

/// Lists file names in `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
