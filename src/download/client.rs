//! Transfer stream reader.
//!
//! [`TransferClient`] performs one streaming GET per attempt against a
//! resolved direct URL. The connect timeout bounds connection setup and the
//! read timeout is the stall detector: an attempt fails when no bytes arrive
//! within the window, regardless of how long the transfer has been running.
//!
//! Bytes are appended to the job's partial file and flushed to disk at a
//! bounded cadence. Every flush is a checkpoint reported to the caller, and
//! the job signal is checked after each chunk write.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE, RETRY_AFTER};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{
    CONNECT_TIMEOUT_SECS, FLUSH_INTERVAL, FLUSH_INTERVAL_BYTES, HTML_SNIFF_LIMIT,
    READ_TIMEOUT_SECS, WRITE_BUFFER_BYTES,
};
use super::error::DownloadError;
use super::filename::{filename_from_url, parse_content_disposition};
use crate::job::{JobCommand, JobSignal};

/// User-Agent sent with every transfer request.
pub const USER_AGENT: &str = concat!("linkdrop/", env!("CARGO_PKG_VERSION"));

/// Timeouts and flush cadence for transfer attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Connection setup limit.
    pub connect_timeout: Duration,
    /// Stall window between received bytes.
    pub read_timeout: Duration,
    /// Flush after this many unflushed bytes.
    pub flush_interval_bytes: u64,
    /// Flush after this much time with unflushed bytes.
    pub flush_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            flush_interval_bytes: FLUSH_INTERVAL_BYTES,
            flush_interval: FLUSH_INTERVAL,
        }
    }
}

/// An open response, ready to be streamed.
#[derive(Debug)]
pub struct TransferResponse {
    response: reqwest::Response,
    url: String,
    /// True when the server honoured the range request.
    pub resumed: bool,
    /// Offset the body starts at.
    pub offset: u64,
    /// Full size of the file when the server reported it.
    pub total_bytes: Option<u64>,
    /// Name from `Content-Disposition`, unsanitized.
    pub disposition_name: Option<String>,
    /// Last path segment of the final (post-redirect) URL.
    pub url_name: Option<String>,
}

/// How a transfer attempt ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The stream reached its end and the size matches.
    Completed {
        /// Total bytes in the file.
        bytes: u64,
    },
    /// A pause or stop was observed at a chunk boundary.
    Interrupted {
        /// Bytes durably written.
        bytes: u64,
        /// Command that interrupted the stream.
        command: JobCommand,
    },
}

/// HTTP client for streaming transfers with stall detection and range resume.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct TransferClient {
    client: Client,
    config: TransferConfig,
}

impl TransferClient {
    /// Creates a client with the given timeouts and flush cadence.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the TLS backend cannot be initialized.
    pub fn new(config: TransferConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            // Byte offsets must match what lands on disk.
            .gzip(false)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, config })
    }

    /// Returns the configured timeouts.
    #[must_use]
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Sends the GET request, asking for `offset..` when `offset > 0`.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::ConnectTimeout`] / [`DownloadError::Stalled`] when the
    ///   server does not answer in time
    /// - [`DownloadError::HttpStatus`] for non-success responses
    /// - [`DownloadError::HtmlPage`] for `text/html` responses
    /// - [`DownloadError::RangeMismatch`] when a partial response starts elsewhere
    #[instrument(skip(self), fields(url = %url))]
    pub async fn open(&self, url: &str, offset: u64) -> Result<TransferResponse, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.get(parsed);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let header_window = self.config.connect_timeout + self.config.read_timeout;
        let response = tokio::time::timeout(header_window, request.send())
            .await
            .map_err(|_| DownloadError::stalled(url, self.config.read_timeout.as_secs()))?
            .map_err(|e| self.map_send_error(url, e))?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
            let total_bytes = header_str(&response, CONTENT_RANGE).and_then(unsatisfied_range_total);
            return Err(DownloadError::range_not_satisfiable(url, offset, total_bytes));
        }
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        let is_html = header_str(&response, CONTENT_TYPE)
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("text/html"));
        if is_html {
            return Err(DownloadError::html_page(url));
        }

        let content_length = header_str(&response, CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok());
        let (resumed, total_bytes) = if status.as_u16() == 206 && offset > 0 {
            let range = header_str(&response, CONTENT_RANGE).and_then(parse_content_range);
            match range {
                Some((start, _)) if start != offset => {
                    return Err(DownloadError::range_mismatch(url, offset, start));
                }
                Some((_, Some(total))) => (true, Some(total)),
                _ => (true, content_length.map(|len| offset.saturating_add(len))),
            }
        } else {
            (false, content_length)
        };

        let disposition_name =
            header_str(&response, CONTENT_DISPOSITION).and_then(parse_content_disposition);
        let url_name = filename_from_url(response.url());

        debug!(
            status = status.as_u16(),
            resumed,
            total_bytes,
            "transfer response received"
        );

        Ok(TransferResponse {
            response,
            url: url.to_string(),
            resumed,
            offset: if resumed { offset } else { 0 },
            total_bytes,
            disposition_name,
            url_name,
        })
    }

    /// Streams the response body into `file`, which must be positioned at
    /// `response.offset`.
    ///
    /// `on_checkpoint` receives the durable byte count after every flush.
    /// The byte count passed to it never decreases within one call.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Stalled`] when no bytes arrive within the read timeout
    /// - [`DownloadError::Network`] when the connection breaks
    /// - [`DownloadError::Io`] when the destination cannot be written
    /// - [`DownloadError::Incomplete`] when the stream ends short of `expected_total`
    #[instrument(skip_all, fields(url = %response.url, offset = response.offset))]
    pub async fn stream_to_file<F>(
        &self,
        response: TransferResponse,
        file: File,
        path: &Path,
        expected_total: Option<u64>,
        signal: &JobSignal,
        mut on_checkpoint: F,
    ) -> Result<TransferOutcome, DownloadError>
    where
        F: FnMut(u64) + Send,
    {
        let TransferResponse {
            response,
            url,
            offset,
            ..
        } = response;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
        let mut stream = response.bytes_stream();
        let mut written = offset;
        let mut unflushed: u64 = 0;
        let mut last_flush = Instant::now();

        loop {
            let next = tokio::select! {
                biased;
                command = signal.raised() => {
                    checkpoint(&mut writer, path).await?;
                    on_checkpoint(written);
                    debug!(bytes = written, %command, "transfer interrupted");
                    return Ok(TransferOutcome::Interrupted { bytes: written, command });
                }
                next = tokio::time::timeout(self.config.read_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    checkpoint(&mut writer, path).await?;
                    on_checkpoint(written);
                    return Err(if e.is_timeout() {
                        DownloadError::stalled(url, self.config.read_timeout.as_secs())
                    } else {
                        DownloadError::network(url, e)
                    });
                }
                Err(_) => {
                    checkpoint(&mut writer, path).await?;
                    on_checkpoint(written);
                    return Err(DownloadError::stalled(
                        url,
                        self.config.read_timeout.as_secs(),
                    ));
                }
            };

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(path, e))?;
            written += chunk.len() as u64;
            unflushed += chunk.len() as u64;

            if unflushed >= self.config.flush_interval_bytes
                || last_flush.elapsed() >= self.config.flush_interval
            {
                checkpoint(&mut writer, path).await?;
                on_checkpoint(written);
                unflushed = 0;
                last_flush = Instant::now();
            }

            if let Some(command) = signal.current() {
                checkpoint(&mut writer, path).await?;
                on_checkpoint(written);
                debug!(bytes = written, %command, "transfer interrupted");
                return Ok(TransferOutcome::Interrupted {
                    bytes: written,
                    command,
                });
            }
        }

        checkpoint(&mut writer, path).await?;
        on_checkpoint(written);

        if let Some(total) = expected_total
            && total != written
        {
            return Err(DownloadError::incomplete(path, total, written));
        }

        Ok(TransferOutcome::Completed { bytes: written })
    }

    fn map_send_error(&self, url: &str, error: reqwest::Error) -> DownloadError {
        if error.is_connect() && error.is_timeout() {
            DownloadError::connect_timeout(url)
        } else if error.is_timeout() {
            DownloadError::stalled(url, self.config.read_timeout.as_secs())
        } else {
            DownloadError::network(url, error)
        }
    }
}

/// Opens the partial file at `path` for appending from the last checkpoint.
///
/// The file is created when missing and truncated to `min(len, checkpoint)`,
/// so bytes written after the last flush are discarded. Returns the handle
/// positioned at its end and the offset to resume from.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] on filesystem failures.
pub async fn open_partial(path: &Path, checkpoint: u64) -> Result<(File, u64), DownloadError> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| DownloadError::io(path, e))?
        .len();
    let offset = len.min(checkpoint);
    file.set_len(offset)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    file.seek(std::io::SeekFrom::Start(offset))
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    Ok((file, offset))
}

/// Truncates `file` to zero for a restart when the source ignored the range.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] on filesystem failures.
pub async fn restart_partial(file: &mut File, path: &Path) -> Result<(), DownloadError> {
    file.set_len(0)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    file.seek(std::io::SeekFrom::Start(0))
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    Ok(())
}

/// Returns true when a small finished file is really an HTML error page.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] when the file cannot be read.
pub async fn looks_like_html(path: &Path, len: u64) -> Result<bool, DownloadError> {
    if len >= HTML_SNIFF_LIMIT {
        return Ok(false);
    }
    let mut head = Vec::new();
    File::open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?
        .read_to_end(&mut head)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let head = String::from_utf8_lossy(&head).to_ascii_lowercase();
    Ok(head.contains("<html") || head.contains("<!doctype html"))
}

async fn checkpoint(writer: &mut BufWriter<File>, path: &Path) -> Result<(), DownloadError> {
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    writer
        .get_ref()
        .sync_data()
        .await
        .map_err(|e| DownloadError::io(path, e))
}

fn header_str(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<&str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Parses `bytes start-end/total` into `(start, total)`; total is `None` for `*`.
fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let total = total.trim().parse::<u64>().ok();
    Some((start, total))
}

/// Total size from a 416 `Content-Range: bytes */N`.
fn unsatisfied_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    rest.strip_prefix("*/")?.trim().parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn test_config() -> TransferConfig {
        TransferConfig {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_millis(300),
            flush_interval_bytes: 64 * 1024,
            flush_interval: Duration::from_millis(50),
        }
    }

    async fn download(
        client: &TransferClient,
        url: &str,
        dest: &Path,
        checkpoint: u64,
        signal: &JobSignal,
    ) -> (Result<TransferOutcome, DownloadError>, Vec<u64>) {
        let (mut file, offset) = open_partial(dest, checkpoint).await.unwrap();
        let response = match client.open(url, offset).await {
            Ok(response) => response,
            Err(e) => return (Err(e), Vec::new()),
        };
        if !response.resumed {
            restart_partial(&mut file, dest).await.unwrap();
        }
        let total = response.total_bytes;
        let mut checkpoints = Vec::new();
        let result = client
            .stream_to_file(response, file, dest, total, signal, |b| checkpoints.push(b))
            .await;
        (result, checkpoints)
    }

    // ==================== Content-Range Tests ====================

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("bytes 100-199/1000"), Some((100, Some(1000))));
        assert_eq!(parse_content_range("bytes 5-9/*"), Some((5, None)));
        assert_eq!(unsatisfied_range_total("bytes */1000"), Some(1000));
        assert_eq!(unsatisfied_range_total("bytes 0-9/1000"), None);
        assert_eq!(parse_content_range("items 1-2/3"), None);
        assert_eq!(parse_content_range("bytes */1000"), None);
    }

    // ==================== Partial File Tests ====================

    #[tokio::test]
    async fn test_open_partial_truncates_to_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("a.bin.part");
        std::fs::write(&dest, b"0123456789").unwrap();

        let (_file, offset) = open_partial(&dest, 4).await.unwrap();
        assert_eq!(offset, 4);
        assert_eq!(std::fs::read(&dest).unwrap(), b"0123");
    }

    #[tokio::test]
    async fn test_open_partial_never_skips_ahead_of_file() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("a.bin.part");
        std::fs::write(&dest, b"012").unwrap();

        let (_file, offset) = open_partial(&dest, 100).await.unwrap();
        assert_eq!(offset, 3);
    }

    #[tokio::test]
    async fn test_looks_like_html_only_for_small_files() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("page");
        std::fs::write(&dest, b"<!DOCTYPE html><html><body>gone</body></html>").unwrap();
        assert!(looks_like_html(&dest, 46).await.unwrap());
        assert!(!looks_like_html(&dest, HTML_SNIFF_LIMIT).await.unwrap());
    }

    // ==================== Streaming Tests ====================

    #[tokio::test]
    async fn test_transfer_full_body_reports_checkpoints() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        Mock::given(method("GET"))
            .and(path("/movie.mkv"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&mock_server)
            .await;

        let client = TransferClient::new(test_config()).unwrap();
        let dest = temp_dir.path().join("movie.mkv.part");
        let url = format!("{}/movie.mkv", mock_server.uri());

        let (result, checkpoints) = download(&client, &url, &dest, 0, &JobSignal::new()).await;

        assert_eq!(
            result.unwrap(),
            TransferOutcome::Completed {
                bytes: body.len() as u64
            }
        );
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(checkpoints.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(checkpoints.last().copied(), Some(body.len() as u64));
    }

    #[tokio::test]
    async fn test_transfer_resumes_with_range() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(header("range", "bytes=4-"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 4-9/10")
                    .set_body_bytes(b"456789"),
            )
            .mount(&mock_server)
            .await;

        let client = TransferClient::new(test_config()).unwrap();
        let dest = temp_dir.path().join("file.bin.part");
        std::fs::write(&dest, b"0123").unwrap();
        let url = format!("{}/file.bin", mock_server.uri());

        let (result, _) = download(&client, &url, &dest, 4, &JobSignal::new()).await;

        assert_eq!(result.unwrap(), TransferOutcome::Completed { bytes: 10 });
        assert_eq!(std::fs::read(&dest).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_transfer_restarts_when_range_ignored() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789"))
            .mount(&mock_server)
            .await;

        let client = TransferClient::new(test_config()).unwrap();
        let dest = temp_dir.path().join("file.bin.part");
        std::fs::write(&dest, b"0123").unwrap();
        let url = format!("{}/file.bin", mock_server.uri());

        let (result, _) = download(&client, &url, &dest, 4, &JobSignal::new()).await;

        assert_eq!(result.unwrap(), TransferOutcome::Completed { bytes: 10 });
        // No duplicated prefix
        assert_eq!(std::fs::read(&dest).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_transfer_range_mismatch_is_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 0-9/10")
                    .set_body_bytes(b"0123456789"),
            )
            .mount(&mock_server)
            .await;

        let client = TransferClient::new(test_config()).unwrap();
        let url = format!("{}/file.bin", mock_server.uri());
        let err = client.open(&url, 4).await.unwrap_err();
        assert!(matches!(err, DownloadError::RangeMismatch { requested: 4, served: 0, .. }));
        drop(temp_dir);
    }

    #[tokio::test]
    async fn test_open_past_end_reports_unsatisfiable_range() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(header("Range", "bytes=10-"))
            .respond_with(ResponseTemplate::new(416).insert_header("Content-Range", "bytes */10"))
            .mount(&mock_server)
            .await;

        let client = TransferClient::new(test_config()).unwrap();
        let url = format!("{}/file.bin", mock_server.uri());
        let err = client.open(&url, 10).await.unwrap_err();
        assert!(matches!(
            err,
            DownloadError::RangeNotSatisfiable {
                offset: 10,
                total_bytes: Some(10),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_transfer_http_error_carries_status() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&mock_server)
            .await;

        let client = TransferClient::new(test_config()).unwrap();
        let url = format!("{}/busy", mock_server.uri());
        match client.open(&url, 0).await {
            Err(DownloadError::HttpStatus {
                status,
                retry_after,
                ..
            }) => {
                assert_eq!(status, 429);
                assert_eq!(retry_after.as_deref(), Some("7"));
            }
            other => panic!("Expected HttpStatus error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transfer_rejects_html() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html; charset=utf-8"),
            )
            .mount(&mock_server)
            .await;

        let client = TransferClient::new(test_config()).unwrap();
        let url = format!("{}/landing", mock_server.uri());
        let err = client.open(&url, 0).await.unwrap_err();
        assert!(matches!(err, DownloadError::HtmlPage { .. }));
    }

    #[tokio::test]
    async fn test_transfer_stall_is_detected() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"data")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let client = TransferClient::new(test_config()).unwrap();
        let url = format!("{}/slow", mock_server.uri());
        let started = std::time::Instant::now();
        let err = client.open(&url, 0).await.unwrap_err();
        assert!(
            matches!(err, DownloadError::Stalled { .. }),
            "expected stall, got {err:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_transfer_observes_raised_signal() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&mock_server)
            .await;

        let client = TransferClient::new(test_config()).unwrap();
        let dest = temp_dir.path().join("file.bin.part");
        let url = format!("{}/file.bin", mock_server.uri());
        let signal = JobSignal::new();
        signal.raise(JobCommand::Stop);

        let (result, checkpoints) = download(&client, &url, &dest, 0, &signal).await;

        match result.unwrap() {
            TransferOutcome::Interrupted { bytes, command } => {
                assert_eq!(command, JobCommand::Stop);
                assert_eq!(checkpoints.last().copied(), Some(bytes));
            }
            other => panic!("expected interruption, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transfer_short_body_is_incomplete() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"01234"))
            .mount(&mock_server)
            .await;

        let client = TransferClient::new(test_config()).unwrap();
        let dest = temp_dir.path().join("file.bin.part");
        let url = format!("{}/file.bin", mock_server.uri());

        let (file, _) = open_partial(&dest, 0).await.unwrap();
        let response = client.open(&url, 0).await.unwrap();
        let err = client
            .stream_to_file(response, file, &dest, Some(10), &JobSignal::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DownloadError::Incomplete {
                expected_bytes: 10,
                actual_bytes: 5,
                ..
            }
        ));
    }
}
