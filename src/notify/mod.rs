//! Post-download notification: ask the media library to rescan.
//!
//! The engine calls its [`Notifier`] at most once per successful job and
//! records the outcome in the job's notify sub-state. A failed rescan never
//! changes the job's own status.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::NotifierConfig;
use crate::download::USER_AGENT;

const REQUEST_TIMEOUT_SECS: u64 = 20;

/// A rescan request failed.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// The library server could not be reached.
    #[error("library server unreachable: {reason}")]
    Unreachable {
        /// Transport failure.
        reason: String,
    },

    /// The library server rejected the request.
    #[error("library rescan failed with HTTP {status}")]
    HttpStatus {
        /// Response status.
        status: u16,
    },

    /// The configured base URL cannot carry the refresh path.
    #[error("invalid library server URL: {url}")]
    InvalidUrl {
        /// Configured base URL.
        url: String,
    },

    /// The HTTP client could not be built.
    #[error("notifier client construction failed: {reason}")]
    Client {
        /// Builder failure.
        reason: String,
    },
}

/// Capability to announce a finished file.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Requests a rescan for `saved_path`; returns a human-readable success message.
    async fn notify(&self, saved_path: &Path) -> Result<String, NotifyError>;
}

/// Refreshes a media library section (or all sections) over HTTP.
pub struct LibraryRescanNotifier {
    client: Client,
    base_url: String,
    token: String,
    section_id: Option<String>,
}

impl LibraryRescanNotifier {
    /// Creates a notifier from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Client`] if HTTP client construction fails.
    pub fn new(config: &NotifierConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| NotifyError::Client {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            section_id: config.section_id.clone(),
        })
    }

    fn section(&self) -> &str {
        self.section_id.as_deref().unwrap_or("all")
    }

    fn refresh_url(&self) -> Result<Url, NotifyError> {
        let raw = format!("{}/library/sections/{}/refresh", self.base_url, self.section());
        let mut url = Url::parse(&raw).map_err(|_| NotifyError::InvalidUrl {
            url: self.base_url.clone(),
        })?;
        url.query_pairs_mut().append_pair("X-Plex-Token", &self.token);
        Ok(url)
    }
}

impl std::fmt::Debug for LibraryRescanNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryRescanNotifier")
            .field("base_url", &self.base_url)
            .field("section_id", &self.section_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Notifier for LibraryRescanNotifier {
    #[instrument(skip(self), fields(section = self.section()))]
    async fn notify(&self, saved_path: &Path) -> Result<String, NotifyError> {
        let url = self.refresh_url()?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| NotifyError::Unreachable {
                reason: transport_reason(e),
            })?;

        let status = response.status();
        debug!(status = status.as_u16(), "library rescan response");
        if !status.is_success() {
            return Err(NotifyError::HttpStatus {
                status: status.as_u16(),
            });
        }

        Ok(match &self.section_id {
            Some(id) => format!("library section {id} refresh requested"),
            None => "all library sections refresh requested".to_string(),
        })
    }
}

/// Describes a transport failure without the request URL, which carries the token.
fn transport_reason(error: reqwest::Error) -> String {
    let error = error.without_url();
    let mut reason = error.to_string();
    let mut source = std::error::Error::source(&error);
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    reason
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::{
        should_skip_socket_bound_test, start_mock_server_or_skip,
    };
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn config(base_url: String, section_id: Option<&str>) -> NotifierConfig {
        NotifierConfig {
            base_url,
            token: "plex-token".to_string(),
            section_id: section_id.map(str::to_string),
        }
    }

    #[test]
    fn test_refresh_url_defaults_to_all_sections() {
        let notifier =
            LibraryRescanNotifier::new(&config("http://plex.local:32400/".to_string(), None))
                .unwrap();
        let url = notifier.refresh_url().unwrap();
        assert_eq!(
            url.as_str(),
            "http://plex.local:32400/library/sections/all/refresh?X-Plex-Token=plex-token"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let notifier =
            LibraryRescanNotifier::new(&config("http://plex.local".to_string(), Some("3")))
                .unwrap();
        assert!(!format!("{notifier:?}").contains("plex-token"));
    }

    #[tokio::test]
    async fn test_notify_success_names_section() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/library/sections/2/refresh"))
            .and(query_param("X-Plex-Token", "plex-token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let notifier =
            LibraryRescanNotifier::new(&config(mock_server.uri(), Some("2"))).unwrap();
        let message = notifier.notify(Path::new("/srv/movies/a.mkv")).await.unwrap();
        assert!(message.contains("section 2"), "{message}");
    }

    #[tokio::test]
    async fn test_notify_http_error_is_reported() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/library/sections/all/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let notifier = LibraryRescanNotifier::new(&config(mock_server.uri(), None)).unwrap();
        let err = notifier.notify(Path::new("/srv/a.mkv")).await.unwrap_err();
        assert!(matches!(err, NotifyError::HttpStatus { status: 401 }));
    }

    #[tokio::test]
    async fn test_unreachable_server_message_omits_token() {
        if should_skip_socket_bound_test() {
            return;
        }
        // Reserve a port, then free it so nothing is listening there.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let notifier =
            LibraryRescanNotifier::new(&config(format!("http://127.0.0.1:{port}"), None)).unwrap();
        let err = notifier.notify(Path::new("/srv/a.mkv")).await.unwrap_err();

        assert!(matches!(err, NotifyError::Unreachable { .. }));
        let message = err.to_string();
        assert!(message.starts_with("library server unreachable"), "{message}");
        assert!(!message.contains("plex-token"), "{message}");
        assert!(!message.contains("X-Plex-Token"), "{message}");
    }
}
