//! File host resolver - exchanges a share link for a direct download token URL.
//!
//! The [`FileHostResolver`] calls `POST {api_base}/v1/download/get_token.cgi`
//! with a bearer API key and `{"url": <source>}`. The host answers with the
//! direct URL in `url` (or `link`), optionally a file name (`filename` or
//! `name`) and a `size`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ResolveError, ResolvedLink, Resolver};
use crate::download::USER_AGENT;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;
const TOKEN_PATH: &str = "/v1/download/get_token.cgi";

// ==================== API Response Types ====================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    status: Option<String>,
    message: Option<String>,
    url: Option<String>,
    link: Option<String>,
    filename: Option<String>,
    name: Option<String>,
    /// Sometimes a number, sometimes a numeric string.
    size: Option<Value>,
}

impl TokenResponse {
    fn size(&self) -> Option<u64> {
        match self.size.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

// ==================== FileHostResolver ====================

/// Resolves share links through the file host token API.
pub struct FileHostResolver {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl FileHostResolver {
    /// Creates a resolver against `api_base`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Client`] if HTTP client construction fails.
    pub fn new(api_base: &str, api_key: &str) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS + READ_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ResolveError::Client {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}{TOKEN_PATH}", api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }
}

impl std::fmt::Debug for FileHostResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHostResolver")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for FileHostResolver {
    fn name(&self) -> &'static str {
        "file-host"
    }

    #[tracing::instrument(skip(self), fields(resolver = "file-host"))]
    async fn resolve(&self, source_url: &str) -> Result<ResolvedLink, ResolveError> {
        debug!(endpoint = %self.endpoint, "requesting download token");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "url": source_url }))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "file host API request failed");
                ResolveError::unavailable(source_url, &format!("cannot reach file host API: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            debug!(status = code, "file host API error");
            return Err(match code {
                401 | 403 => ResolveError::rejected(source_url, &format!("API key refused (HTTP {code})")),
                404 => ResolveError::rejected(source_url, "file not found on host"),
                408 | 429 => ResolveError::unavailable(source_url, &format!("file host throttled the request (HTTP {code})")),
                c if c >= 500 => ResolveError::unavailable(source_url, &format!("file host API returned HTTP {c}")),
                c => ResolveError::rejected(source_url, &format!("file host API returned HTTP {c}")),
            });
        }

        let body = response.json::<TokenResponse>().await.map_err(|e| {
            warn!(error = %e, "failed to parse file host response JSON");
            ResolveError::invalid_response(source_url, "response is not valid JSON")
        })?;

        if body
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("KO"))
        {
            let reason = body.message.as_deref().unwrap_or("file host reported an error");
            return Err(ResolveError::rejected(source_url, reason));
        }

        let size = body.size();
        let Some(url) = body.url.or(body.link).filter(|u| !u.trim().is_empty()) else {
            return Err(ResolveError::invalid_response(
                source_url,
                "no download URL in response",
            ));
        };

        let mut link = ResolvedLink::new(url);
        if let Some(name) = body.filename.or(body.name).filter(|n| !n.trim().is_empty()) {
            link = link.with_name(name);
        }
        if let Some(size) = size {
            link = link.with_total_bytes(size);
        }
        debug!(
            suggested_name = ?link.suggested_name,
            total_bytes = ?link.total_bytes,
            "link resolved"
        );
        Ok(link)
    }
}
