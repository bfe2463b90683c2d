//! Direct link resolver - passthrough for links that are already downloadable.
//!
//! The [`DirectResolver`] returns the source link unchanged. It is used when
//! no file host API key is configured.

use async_trait::async_trait;

use super::{ResolveError, ResolvedLink, Resolver};

/// A resolver that passes links through unchanged.
#[derive(Debug)]
pub struct DirectResolver;

impl DirectResolver {
    /// Creates a new `DirectResolver`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for DirectResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for DirectResolver {
    fn name(&self) -> &'static str {
        "direct"
    }

    #[tracing::instrument(skip(self), fields(resolver = "direct"))]
    async fn resolve(&self, source_url: &str) -> Result<ResolvedLink, ResolveError> {
        Ok(ResolvedLink::new(source_url))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_resolver_name() {
        let resolver = DirectResolver::new();
        assert_eq!(resolver.name(), "direct");
    }

    #[tokio::test]
    async fn test_direct_resolver_passes_link_through() {
        let resolver = DirectResolver::new();
        let link = resolver
            .resolve("https://1fichier.com/?abc123")
            .await
            .unwrap();
        assert_eq!(link.url, "https://1fichier.com/?abc123");
        assert!(link.suggested_name.is_none());
        assert!(link.total_bytes.is_none());
    }
}
