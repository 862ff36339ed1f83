//! Domain error types for access resolution.

use thiserror::Error;

use crate::model::RelationKind;

/// Domain-specific errors for access resolution.
///
/// "Unknown key" is not an error: fetchers report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The graph fetcher failed to answer for a key.
    #[error("failed to fetch parents of {kind} '{key}': {message}")]
    FetchFailed {
        kind: RelationKind,
        key: String,
        message: String,
    },

    /// The graph fetcher did not answer within the configured timeout.
    #[error("timed out fetching parents of {kind} '{key}' after {timeout_ms}ms")]
    FetchTimeout {
        kind: RelationKind,
        key: String,
        timeout_ms: u64,
    },

    /// A relationship change could not be routed to a cache.
    #[error("invalid relationship change: {message}")]
    InvalidChange { message: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
