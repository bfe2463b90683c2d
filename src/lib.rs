//! Linkdrop Core Library
//!
//! A resumable download job engine: operators submit file-host links, and
//! the engine resolves them, streams the files into allow-listed folders,
//! survives stalls and restarts, and tells a media library to rescan.
//!
//! # Architecture
//!
//! - [`config`] - TOML settings validated into an immutable [`EngineConfig`]
//! - [`job`] - Job records, lifecycle state machine, cancellation signal
//! - [`download`] - Streaming transfer client, retry policy, file naming
//! - [`resolver`] - Link resolution adapters
//! - [`notify`] - Library rescan adapter
//! - [`audit`] - Append-only lifecycle event sinks
//! - [`store`] - SQLite persistence for job records
//! - [`engine`] - Public job operations, scheduler and workers

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod audit;
pub mod config;
pub mod download;
pub mod engine;
pub mod job;
pub mod notify;
pub mod resolver;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use audit::{AuditEvent, AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use config::{ConfigError, EngineConfig, FolderPolicy, SourcePolicy, ValidationError};
pub use download::{DownloadError, FailureType, RetryPolicy, TransferClient, TransferConfig};
pub use engine::{EngineError, JobEngine, JobEngineBuilder};
pub use job::{JobCommand, JobId, JobRecord, JobStatus, NotifyStatus};
pub use notify::{LibraryRescanNotifier, Notifier, NotifyError};
pub use resolver::{DirectResolver, FileHostResolver, ResolveError, ResolvedLink, Resolver};
pub use store::{Database, JobRepository};
