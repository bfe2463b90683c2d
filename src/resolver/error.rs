//! Error types for link resolution.
//!
//! Every error knows whether retrying could help: throttling, server errors
//! and unreachable APIs are transient, everything else fails the job at once.

use thiserror::Error;

/// Errors that can occur while turning a source link into a direct URL.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The file host refused the link (unknown file, bad key, removed upload).
    #[error("link rejected for '{input}': {reason}")]
    Rejected {
        /// The link being resolved.
        input: String,
        /// What the host reported.
        reason: String,
    },

    /// The host could not be reached or asked to come back later.
    #[error("resolver unavailable for '{input}': {reason}")]
    Unavailable {
        /// The link being resolved.
        input: String,
        /// Why the call failed.
        reason: String,
    },

    /// The host answered with something that is not a usable resolution.
    #[error("unexpected resolver response for '{input}': {reason}")]
    InvalidResponse {
        /// The link being resolved.
        input: String,
        /// What was wrong with the answer.
        reason: String,
    },

    /// The resolver's HTTP client could not be built.
    #[error("resolver client construction failed: {reason}")]
    Client {
        /// Builder failure.
        reason: String,
    },
}

impl ResolveError {
    /// Creates a `Rejected` error.
    #[must_use]
    pub fn rejected(input: &str, reason: &str) -> Self {
        Self::Rejected {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates an `Unavailable` error.
    #[must_use]
    pub fn unavailable(input: &str, reason: &str) -> Self {
        Self::Unavailable {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates an `InvalidResponse` error.
    #[must_use]
    pub fn invalid_response(input: &str, reason: &str) -> Self {
        Self::InvalidResponse {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true when a later attempt may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
