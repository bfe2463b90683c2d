//! Error types for the download module.
//!
//! This module defines structured errors for transfer attempts, providing
//! context-rich messages that end up verbatim on failed job records.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can end a transfer attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, reset, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The connection could not be established within the connect timeout.
    #[error("timeout connecting to {url}")]
    ConnectTimeout {
        /// The URL that timed out.
        url: String,
    },

    /// No bytes arrived within the read timeout.
    #[error("download stalled: no data from {url} for {idle_secs}s")]
    Stalled {
        /// The URL that stalled.
        url: String,
        /// Configured stall window in seconds.
        idle_secs: u64,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// File system error while writing the destination.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The stream ended before the announced size was reached.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Incomplete {
        /// Partial file that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// The source reported a different size than previously learned.
    #[error("source size changed for {url}: expected {expected_bytes} bytes, server reports {reported_bytes}")]
    SizeChanged {
        /// The URL being downloaded.
        url: String,
        /// Size learned earlier.
        expected_bytes: u64,
        /// Size in the latest response.
        reported_bytes: u64,
    },

    /// A partial response started somewhere other than the requested offset.
    #[error("range mismatch from {url}: requested offset {requested}, server sent {served}")]
    RangeMismatch {
        /// The URL being downloaded.
        url: String,
        /// Offset asked for.
        requested: u64,
        /// First byte in the response.
        served: u64,
    },

    /// The source has no bytes at or past a resume offset (HTTP 416).
    #[error("range not satisfiable from {url}: requested offset {offset}")]
    RangeNotSatisfiable {
        /// The URL being downloaded.
        url: String,
        /// Offset asked for.
        offset: u64,
        /// Full size from `Content-Range: bytes */N`, when sent.
        total_bytes: Option<u64>,
    },

    /// The link resolved to a web page instead of a file.
    #[error("{url} resolved to an HTML page, not a file")]
    HtmlPage {
        /// The URL that returned HTML.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a connect timeout error.
    pub fn connect_timeout(url: impl Into<String>) -> Self {
        Self::ConnectTimeout { url: url.into() }
    }

    /// Creates a stall error.
    pub fn stalled(url: impl Into<String>, idle_secs: u64) -> Self {
        Self::Stalled {
            url: url.into(),
            idle_secs,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a short-read error.
    pub fn incomplete(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Incomplete {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a size mismatch error.
    pub fn size_changed(url: impl Into<String>, expected_bytes: u64, reported_bytes: u64) -> Self {
        Self::SizeChanged {
            url: url.into(),
            expected_bytes,
            reported_bytes,
        }
    }

    /// Creates a range mismatch error.
    pub fn range_mismatch(url: impl Into<String>, requested: u64, served: u64) -> Self {
        Self::RangeMismatch {
            url: url.into(),
            requested,
            served,
        }
    }

    /// Creates a range-not-satisfiable error for a resume at `offset`.
    pub fn range_not_satisfiable(
        url: impl Into<String>,
        offset: u64,
        total_bytes: Option<u64>,
    ) -> Self {
        Self::RangeNotSatisfiable {
            url: url.into(),
            offset,
            total_bytes,
        }
    }

    /// Creates an HTML response error.
    pub fn html_page(url: impl Into<String>) -> Self {
        Self::HtmlPage { url: url.into() }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path the source error does not carry.
