//! Configuration for access resolution and cache warm-up.

use std::time::Duration;

/// Configuration for the access resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Upper bound on a single graph fetch. A timeout counts as a fetch failure.
    pub fetch_timeout: Duration,
    /// Maximum number of warm-up fetches in flight at once.
    pub max_concurrent_fetches: usize,
    /// Whether a product rule may fetch a product missing from the cache.
    ///
    /// The fetched categories are used for that check only and are not cached.
    pub lazy_product_fetch: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            max_concurrent_fetches: 16,
            lazy_product_fetch: true,
        }
    }
}

impl ResolverConfig {
    /// Sets the per-fetch timeout.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Sets the warm-up concurrency limit. Zero is treated as one.
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max;
        self
    }

    /// Enables or disables product read-through on a cache miss.
    pub fn with_lazy_product_fetch(mut self, enabled: bool) -> Self {
        self.lazy_product_fetch = enabled;
        self
    }
}
