//! Path access resolution.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::cache::{ParentSet, RelationshipCache};
use crate::ingest::ChangeIngestor;
use crate::model::{AccessEntry, RelationKind, RuleType, User};

use super::config::ResolverConfig;
use super::rules::{warm_up, RuleSet, WarmupReport};
use super::traits::{fetch_bounded, GraphFetcher};

/// Resolves whether a user may access a path.
///
/// Owns the active [`RuleSet`] and shares the [`RelationshipCache`] with a
/// [`ChangeIngestor`] obtained from [`AccessService::ingestor`].
///
/// # Resolution
///
/// The first rule whose path equals the query decides. No rule means
/// access is allowed. Group rules compare the user's groups directly;
/// category rules go through the category cache; product rules go through
/// the product cache and then the category cache.
///
/// A category missing from the cache grants nothing and is never fetched
/// at query time. A product missing from the cache may be fetched (see
/// [`ResolverConfig::lazy_product_fetch`]); the answer is not cached.
pub struct AccessService<F> {
    cache: Arc<RelationshipCache>,
    fetcher: Arc<F>,
    rules: RuleSet,
    config: ResolverConfig,
}

impl<F> std::fmt::Debug for AccessService<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessService")
            .field("cache", &self.cache)
            .field("rules", &self.rules.snapshot().len())
            .field("config", &self.config)
            .finish()
    }
}

impl<F> AccessService<F>
where
    F: GraphFetcher + 'static,
{
    /// Creates a service with an empty cache and default configuration.
    pub fn new(fetcher: Arc<F>) -> Self {
        Self::with_config(
            fetcher,
            Arc::new(RelationshipCache::default()),
            ResolverConfig::default(),
        )
    }

    /// Creates a service over an existing cache.
    pub fn with_config(
        fetcher: Arc<F>,
        cache: Arc<RelationshipCache>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            cache,
            fetcher,
            rules: RuleSet::new(),
            config,
        }
    }

    pub fn cache(&self) -> &Arc<RelationshipCache> {
        &self.cache
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The currently installed rules.
    pub fn rules(&self) -> Arc<[AccessEntry]> {
        self.rules.snapshot()
    }

    /// An ingestor that patches this service's cache.
    pub fn ingestor(&self) -> ChangeIngestor {
        ChangeIngestor::new(Arc::clone(&self.cache))
    }

    /// Replaces all rules, then warms the cache for the keys they reference
    /// and for the categories of every referenced product.
    ///
    /// The new rules are visible to resolvers before warm-up starts. Fetch
    /// failures are logged and returned in the report; they never prevent
    /// the rules from being installed.
    #[instrument(skip_all, fields(rules = rules.len()))]
    pub async fn set_access(&self, rules: Vec<AccessEntry>) -> WarmupReport {
        let installed = self.rules.replace(rules);
        let report = warm_up(&*self.cache, &*self.fetcher, &installed, &self.config).await;

        info!(
            referenced = report.referenced,
            derived = report.derived,
            already_cached = report.already_cached,
            populated = report.populated,
            unknown = report.unknown.len(),
            failed = report.failures.len(),
            "Installed access rules"
        );
        debug!(
            products = ?self.cache.snapshot(RelationKind::Product),
            categories = ?self.cache.snapshot(RelationKind::Category),
            "Relationship cache after warm-up"
        );
        report
    }

    /// Returns whether `user` may access `path`.
    ///
    /// Always yields a definite answer; lookup problems deny through the
    /// affected key only.
    pub async fn has_access(&self, user: &User, path: &str) -> bool {
        let rules = self.rules.snapshot();
        let Some(rule) = rules.iter().find(|rule| rule.path == path) else {
            debug!(path, "No access rule for path, allowing");
            return true;
        };

        let allowed = match rule.rule_type {
            RuleType::Group => user.groups.iter().any(|group| rule.allowed.contains(group)),
            RuleType::Category => rule
                .allowed
                .iter()
                .any(|category| self.category_grants(category, user)),
            RuleType::Product => self.any_product_grants(&rule.allowed, user).await,
        };

        debug!(path, rule_type = ?rule.rule_type, allowed, "Resolved access");
        allowed
    }

    fn category_grants(&self, category: &str, user: &User) -> bool {
        self.cache
            .get(RelationKind::Category, category)
            .is_some_and(|groups| intersects(&groups, user))
    }

    async fn any_product_grants(&self, products: &[String], user: &User) -> bool {
        for product in products {
            if let Some(categories) = self.product_categories(product).await {
                if categories
                    .iter()
                    .any(|category| self.category_grants(category, user))
                {
                    return true;
                }
            }
        }
        false
    }

    async fn product_categories(&self, product: &str) -> Option<ParentSet> {
        if let Some(categories) = self.cache.get(RelationKind::Product, product) {
            return Some(categories);
        }
        if !self.config.lazy_product_fetch {
            return None;
        }

        match fetch_bounded(
            &*self.fetcher,
            RelationKind::Product,
            product,
            self.config.fetch_timeout,
        )
        .await
        {
            Ok(Some(categories)) => Some(Arc::new(categories.into_iter().collect::<HashSet<_>>())),
            Ok(None) => None,
            Err(error) => {
                warn!(product, error = %error, "Product read-through failed, denying via product");
                None
            }
        }
    }
}

fn intersects(groups: &HashSet<String>, user: &User) -> bool {
    user.groups.iter().any(|group| groups.contains(group))
}
