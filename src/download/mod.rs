//! HTTP transfer primitives for streaming files to disk.
//!
//! This module provides the pieces a job worker composes into one download:
//! a streaming client with stall detection and range resume, retry
//! classification with backoff, and filename selection with collision-free
//! reservation.
//!
//! # Features
//!
//! - Streaming transfers (memory-efficient for large files)
//! - Resume from the last durable checkpoint via `Range` requests
//! - Restart from zero when a source ignores the range
//! - Filename extraction from Content-Disposition headers
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use linkdrop_core::download::{TransferClient, TransferConfig, open_partial};
//! use linkdrop_core::job::JobSignal;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TransferClient::new(TransferConfig::default())?;
//! let path = Path::new("./downloads/file.iso.part");
//! let (file, offset) = open_partial(path, 0).await?;
//! let response = client.open("https://example.com/file.iso", offset).await?;
//! let total = response.total_bytes;
//! let outcome = client
//!     .stream_to_file(response, file, path, total, &JobSignal::new(), |_| {})
//!     .await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
pub(crate) mod filename;
mod retry;

pub use client::{
    TransferClient, TransferConfig, TransferOutcome, TransferResponse, USER_AGENT, looks_like_html,
    open_partial, restart_partial,
};
pub use constants::{CONNECT_TIMEOUT_SECS, FLUSH_INTERVAL, FLUSH_INTERVAL_BYTES, READ_TIMEOUT_SECS};
pub use error::DownloadError;
pub use filename::DEFAULT_FILE_NAME;
pub use retry::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES,
    FailureType, RetryDecision, RetryPolicy, classify_error, classify_http_status,
    parse_retry_after, retry_after_delay,
};
