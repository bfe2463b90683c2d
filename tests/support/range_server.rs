//! Minimal HTTP/1.1 file server with `Range: bytes=N-` support and throttling.
//!
//! wiremock answers in one piece, so paced transfers, mid-body stalls and
//! resume offsets are exercised against this instead.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// How the server answers.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Answer `Range` requests with 206; otherwise always send the whole body with 200.
    pub support_ranges: bool,
    /// Bytes per write.
    pub chunk_size: usize,
    /// Pause after every write.
    pub chunk_delay: Duration,
    /// Stop sending (but keep the connection open) once this many body bytes went out.
    pub stall_after: Option<usize>,
    /// `Content-Type` header value.
    pub content_type: &'static str,
    /// Sent as `Content-Disposition: attachment; filename="..."`.
    pub file_name: Option<&'static str>,
    /// Never reveal the size: no `Content-Length`, `*` as the `Content-Range` total.
    pub hide_length: bool,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            chunk_size: 16 * 1024,
            chunk_delay: Duration::ZERO,
            stall_after: None,
            content_type: "application/octet-stream",
            file_name: None,
            hide_length: false,
        }
    }
}

/// Handle to a running server.
#[derive(Debug, Clone)]
pub struct RangeServer {
    /// Download URL.
    pub url: String,
    requests: Arc<Mutex<Vec<Option<u64>>>>,
}

impl RangeServer {
    /// Range start of every request in arrival order; `None` for requests without `Range`.
    pub fn requested_offsets(&self) -> Vec<Option<u64>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Starts a server for `body` on an ephemeral localhost port.
///
/// The accept loop runs on a detached thread until the test process exits.
pub fn start(body: Vec<u8>, options: ServeOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let body = Arc::new(body);

    let log = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let body = Arc::clone(&body);
            let options = options.clone();
            let log = Arc::clone(&log);
            thread::spawn(move || handle(stream, &body, &options, &log));
        }
    });

    RangeServer {
        url: format!("http://127.0.0.1:{port}/files/blob.bin"),
        requests,
    }
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    options: &ServeOptions,
    log: &Mutex<Vec<Option<u64>>>,
) {
    let Some(range_start) = read_request(&stream) else {
        return;
    };
    log.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(range_start);

    let total = body.len();
    if options.support_ranges
        && let Some(start) = range_start
        && usize::try_from(start).map_or(true, |start| start >= total)
    {
        let mut head = "HTTP/1.1 416 Range Not Satisfiable\r\n".to_string();
        if !options.hide_length {
            head.push_str(&format!("Content-Range: bytes */{total}\r\n"));
        }
        head.push_str("Content-Length: 0\r\nConnection: close\r\n\r\n");
        let _ = stream.write_all(head.as_bytes());
        return;
    }

    let start = match range_start {
        Some(start) if options.support_ranges => usize::try_from(start).unwrap_or(total).min(total),
        _ => 0,
    };
    let partial = options.support_ranges && range_start.is_some();

    let size = if options.hide_length {
        "*".to_string()
    } else {
        total.to_string()
    };
    let mut head = if partial {
        format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {start}-{}/{size}\r\n",
            total.saturating_sub(1)
        )
    } else {
        "HTTP/1.1 200 OK\r\n".to_string()
    };
    if !options.hide_length {
        head.push_str(&format!("Content-Length: {}\r\n", total - start));
    }
    head.push_str(&format!(
        "Content-Type: {}\r\nConnection: close\r\n",
        options.content_type
    ));
    if options.support_ranges {
        head.push_str("Accept-Ranges: bytes\r\n");
    }
    if let Some(name) = options.file_name {
        head.push_str(&format!("Content-Disposition: attachment; filename=\"{name}\"\r\n"));
    }
    head.push_str("\r\n");
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }

    let mut sent = 0usize;
    for chunk in body[start..].chunks(options.chunk_size.max(1)) {
        let chunk = match options.stall_after {
            Some(limit) if sent >= limit => {
                // Hold the connection open without sending anything.
                thread::sleep(Duration::from_secs(30));
                return;
            }
            Some(limit) => &chunk[..chunk.len().min(limit - sent)],
            None => chunk,
        };
        if stream.write_all(chunk).and_then(|()| stream.flush()).is_err() {
            return;
        }
        sent += chunk.len();
        if !options.chunk_delay.is_zero() {
            thread::sleep(options.chunk_delay);
        }
    }
    if let Some(limit) = options.stall_after
        && sent >= limit
        && sent < total - start
    {
        thread::sleep(Duration::from_secs(30));
    }
}

/// Reads the request head; returns the `Range` start if one was sent.
fn read_request(stream: &TcpStream) -> Option<Option<u64>> {
    let mut reader = BufReader::new(stream);
    let mut range = None;
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    if line.is_empty() {
        return None;
    }
    loop {
        line.clear();
        if reader.read_line(&mut line).ok()? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("range") {
            range = value
                .trim()
                .strip_prefix("bytes=")
                .and_then(|bounds| bounds.split('-').next())
                .and_then(|start| start.parse::<u64>().ok());
        }
    }
    Some(range)
}
