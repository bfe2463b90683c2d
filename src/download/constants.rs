//! Constants for the download module (timeouts, flush cadence).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default stall window: an attempt fails if no bytes arrive for this long.
pub const READ_TIMEOUT_SECS: u64 = 60;

/// Flush to disk at least every this many bytes (4 MiB).
pub const FLUSH_INTERVAL_BYTES: u64 = 4 * 1024 * 1024;

/// Flush to disk at least this often while bytes are arriving.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(1000);

/// Write buffer in front of the partial file (256 KiB).
pub const WRITE_BUFFER_BYTES: usize = 256 * 1024;

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Files below this size are sniffed for an HTML error page.
pub const HTML_SNIFF_LIMIT: u64 = 1024;
