//! Link resolution: turning a submitted file host link into a direct URL.
//!
//! # Architecture
//!
//! - [`Resolver`] - Async trait every resolver implements
//! - [`ResolvedLink`] - Direct URL plus the hints the host returned
//! - [`FileHostResolver`] - File host token API client
//! - [`DirectResolver`] - Passthrough used when no API key is configured
//!
//! Resolvers are consumed as `Arc<dyn Resolver>` by the job engine, so tests
//! can substitute canned implementations without network access.

mod direct;
mod error;
mod file_host;

pub use direct::DirectResolver;
pub use error::ResolveError;
pub use file_host::FileHostResolver;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ResolverConfig;

/// A direct, usually time-limited, download URL for a source link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// The URL to stream from.
    pub url: String,
    /// File name suggested by the host.
    pub suggested_name: Option<String>,
    /// Size reported by the host.
    pub total_bytes: Option<u64>,
}

impl ResolvedLink {
    /// Creates a resolved link with no hints.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            suggested_name: None,
            total_bytes: None,
        }
    }

    /// Sets the suggested file name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.suggested_name = Some(name.into());
        self
    }

    /// Sets the reported size.
    #[must_use]
    pub fn with_total_bytes(mut self, total: u64) -> Self {
        self.total_bytes = Some(total);
        self
    }
}

/// Trait that all resolvers implement.
///
/// # Object Safety
///
/// This trait uses `async_trait` to support dynamic dispatch via `Arc<dyn Resolver>`.
/// Rust 2024 native async traits are not object-safe, so `async_trait` is required.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Returns the resolver's name (e.g., "direct", "file-host").
    fn name(&self) -> &str;

    /// Resolves `source_url` into a direct download URL.
    ///
    /// Errors carry their own transient/permanent classification.
    async fn resolve(&self, source_url: &str) -> Result<ResolvedLink, ResolveError>;
}

/// Builds the resolver for a configuration: the file host API when a key is
/// configured, passthrough otherwise.
///
/// # Errors
///
/// Returns [`ResolveError::Client`] when the HTTP client cannot be built.
pub fn resolver_from_config(config: &ResolverConfig) -> Result<Arc<dyn Resolver>, ResolveError> {
    match &config.api_key {
        Some(key) => Ok(Arc::new(FileHostResolver::new(&config.api_base, key)?)),
        None => Ok(Arc::new(DirectResolver::new())),
    }
}
