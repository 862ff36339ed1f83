//! The active rule list and cache warm-up on installation.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::cache::RelationshipCache;
use crate::error::DomainError;
use crate::model::{AccessEntry, RelationKind};

use super::config::ResolverConfig;
use super::traits::{fetch_bounded, GraphFetcher};

/// The ordered list of access rules, replaced wholesale.
///
/// Readers take an `Arc` snapshot, so a resolver sees either the old list or
/// the new one, never a mix.
#[derive(Debug)]
pub struct RuleSet {
    rules: RwLock<Arc<[AccessEntry]>>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// The current rules.
    pub fn snapshot(&self) -> Arc<[AccessEntry]> {
        Arc::clone(&self.rules.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces every rule and returns the installed list.
    pub fn replace(&self, rules: Vec<AccessEntry>) -> Arc<[AccessEntry]> {
        let installed: Arc<[AccessEntry]> = Arc::from(rules);
        *self.rules.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&installed);
        installed
    }
}

/// A warm-up fetch that did not produce an answer.
#[derive(Debug)]
pub struct WarmupFailure {
    pub kind: RelationKind,
    pub key: String,
    pub error: DomainError,
}

/// What a rule installation did to the relationship cache.
#[derive(Debug, Default)]
pub struct WarmupReport {
    /// Distinct category/product keys referenced by the rules.
    pub referenced: usize,
    /// Categories of referenced products that no rule names directly.
    pub derived: usize,
    /// Keys that were already populated and were not fetched.
    pub already_cached: usize,
    /// Keys populated from a fetched parent list.
    pub populated: usize,
    /// Keys the upstream did not know, cached as empty.
    pub unknown: Vec<(RelationKind, String)>,
    /// Keys left unpopulated because the fetch failed.
    pub failures: Vec<WarmupFailure>,
}

impl WarmupReport {
    /// True when every referenced and derived key is now populated.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Distinct (kind, key) pairs referenced by category and product rules.
pub fn referenced_keys(rules: &[AccessEntry]) -> BTreeSet<(RelationKind, String)> {
    rules
        .iter()
        .filter_map(|rule| rule.rule_type.relation_kind().map(|kind| (kind, rule)))
        .flat_map(|(kind, rule)| rule.allowed.iter().map(move |key| (kind, key.clone())))
        .collect()
}

/// Categories reached through the product keys in `products`, minus `exclude`.
///
/// Products that are not populated contribute nothing.
fn derived_categories(
    cache: &RelationshipCache,
    products: impl IntoIterator<Item = String>,
    exclude: &BTreeSet<(RelationKind, String)>,
) -> BTreeSet<(RelationKind, String)> {
    products
        .into_iter()
        .filter_map(|product| cache.get(RelationKind::Product, &product))
        .flat_map(|categories| {
            categories
                .iter()
                .map(|category| (RelationKind::Category, category.clone()))
                .collect::<Vec<_>>()
        })
        .filter(|key| !exclude.contains(key))
        .collect()
}

/// Fetches and populates every referenced key not already in the cache,
/// then every category those products belong to.
///
/// Fetches run concurrently up to `max_concurrent_fetches`. Unknown keys
/// are cached as empty sets; failed fetches leave the key unpopulated and
/// are reported, never raised.
pub async fn warm_up<F>(
    cache: &RelationshipCache,
    fetcher: &F,
    rules: &[AccessEntry],
    config: &ResolverConfig,
) -> WarmupReport
where
    F: GraphFetcher + ?Sized,
{
    let referenced = referenced_keys(rules);
    let mut report = WarmupReport {
        referenced: referenced.len(),
        ..Default::default()
    };
    populate_missing(cache, fetcher, referenced.iter().cloned(), config, &mut report).await;

    let products = referenced
        .iter()
        .filter(|(kind, _)| *kind == RelationKind::Product)
        .map(|(_, key)| key.clone());
    let derived = derived_categories(cache, products, &referenced);
    report.derived = derived.len();
    populate_missing(cache, fetcher, derived, config, &mut report).await;

    report
}

async fn populate_missing<F>(
    cache: &RelationshipCache,
    fetcher: &F,
    keys: impl IntoIterator<Item = (RelationKind, String)>,
    config: &ResolverConfig,
    report: &mut WarmupReport,
) where
    F: GraphFetcher + ?Sized,
{
    let mut missing = Vec::new();
    for (kind, key) in keys {
        if cache.is_populated(kind, &key) {
            report.already_cached += 1;
        } else {
            missing.push((kind, key));
        }
    }

    let results: Vec<_> = stream::iter(missing)
        .map(|(kind, key)| async move {
            let result = fetch_bounded(fetcher, kind, &key, config.fetch_timeout).await;
            (kind, key, result)
        })
        .buffer_unordered(config.max_concurrent_fetches.max(1))
        .collect()
        .await;

    for (kind, key, result) in results {
        match result {
            Ok(Some(parents)) => {
                if cache.populate_if_absent(kind, key.clone(), parents) {
                    report.populated += 1;
                } else {
                    report.already_cached += 1;
                }
            }
            Ok(None) => {
                debug!(%kind, key = %key, "Upstream does not know key, caching empty parent set");
                if cache.populate_if_absent(kind, key.clone(), Vec::<String>::new()) {
                    report.unknown.push((kind, key));
                } else {
                    report.already_cached += 1;
                }
            }
            Err(error) => {
                warn!(%kind, key = %key, error = %error, "Warm-up fetch failed, key left uncached");
                report.failures.push(WarmupFailure { kind, key, error });
            }
        }
    }
}
