//! Access resolution over the relationship cache.
//!
//! - `traits`         - the [`GraphFetcher`] seam to the upstream catalog
//! - `static_fetcher` - a fixed in-memory fetcher
//! - `rules`          - the active rule list and warm-up
//! - `access`         - [`AccessService`]: `set_access` / `has_access`

mod access;
mod config;
mod rules;
mod static_fetcher;
mod traits;

#[cfg(test)]
mod tests;

pub use access::AccessService;
pub use config::ResolverConfig;
pub use rules::{referenced_keys, warm_up, RuleSet, WarmupFailure, WarmupReport};
pub use static_fetcher::StaticGraphFetcher;
pub use traits::GraphFetcher;
