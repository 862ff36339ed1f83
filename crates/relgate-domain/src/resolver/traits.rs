//! The upstream graph the resolver caches.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::error::{DomainError, DomainResult};
use crate::model::RelationKind;

/// Source of authoritative parent sets.
///
/// For a product the parents are categories; for a category they are groups.
#[async_trait]
pub trait GraphFetcher: Send + Sync {
    /// Fetches the immediate parents of `key`.
    ///
    /// Returns `Ok(None)` when the upstream does not know the key. Errors
    /// are reserved for failures to get an answer at all.
    async fn fetch_parents(&self, kind: RelationKind, key: &str)
        -> DomainResult<Option<Vec<String>>>;
}

/// Fetches with an upper bound on how long the upstream may take.
pub(crate) async fn fetch_bounded<F>(
    fetcher: &F,
    kind: RelationKind,
    key: &str,
    limit: Duration,
) -> DomainResult<Option<Vec<String>>>
where
    F: GraphFetcher + ?Sized,
{
    match timeout(limit, fetcher.fetch_parents(kind, key)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(DomainError::FetchTimeout {
            kind,
            key: key.to_string(),
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
