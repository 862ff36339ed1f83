//! Relationship cache: product → categories and category → groups.
//!
//! The cache is a materialized view of the upstream catalog graph. Keys are
//! populated on demand (rule warm-up, or explicitly by callers) and then
//! patched incrementally by relationship-change events.
//!
//! # States
//!
//! A key is either **unpopulated** (never fetched, `get` returns `None`) or
//! **populated** with a possibly empty parent set. The two are never
//! conflated: an unknown upstream key is cached as an empty set.
//!
//! # Concurrency
//!
//! Each kind lives in its own `DashMap`. Parent sets are stored behind `Arc`
//! and updated copy-on-write under the entry lock, so a reader holding a set
//! always sees it whole, either before or after a change.
//!
//! # Pending changes
//!
//! Changes for unpopulated keys are dropped unless a retention window is
//! configured. With a window, they are buffered per key and replayed in
//! arrival order when the key is populated. Buffering and population both
//! take the key's map entry, so a change cannot fall between them.
//!
//! # Example
//!
//! ```rust,ignore
//! use relgate_domain::cache::{CacheConfig, RelationshipCache};
//! use relgate_domain::model::{RelationKind, RelationshipChange};
//!
//! let cache = RelationshipCache::new(CacheConfig::default());
//! cache.populate(RelationKind::Category, "balls", ["group-a-1", "group-b"]);
//! cache.apply_change(&RelationshipChange::delete(RelationKind::Category, "balls", "group-b"));
//!
//! let groups = cache.get(RelationKind::Category, "balls").unwrap();
//! assert!(!groups.contains("group-b"));
//! ```

#[cfg(test)]
mod cache_proptest;

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::model::{ChangeAction, RelationKind, RelationshipChange};

/// A populated parent set.
pub type ParentSet = Arc<HashSet<String>>;

/// Configuration for the relationship cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long changes for unpopulated keys are kept for replay.
    ///
    /// `None` drops such changes immediately.
    pub pending_retention: Option<Duration>,
    /// Upper bound on buffered changes per key; the oldest is evicted first.
    pub max_pending_per_key: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pending_retention: None,
            max_pending_per_key: 64,
        }
    }
}

impl CacheConfig {
    /// Buffers changes for unpopulated keys for up to `retention`.
    pub fn with_pending_retention(mut self, retention: Duration) -> Self {
        self.pending_retention = Some(retention);
        self
    }

    /// Sets the per-key buffer bound.
    pub fn with_max_pending_per_key(mut self, max: usize) -> Self {
        self.max_pending_per_key = max;
        self
    }
}

/// What happened to a change handed to [`RelationshipCache::apply_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The key was populated and its set now reflects the change.
    Applied,
    /// The key was unpopulated; the change is held for replay.
    Buffered,
    /// The key was unpopulated and no retention window is configured.
    Dropped,
}

#[derive(Debug, Clone)]
struct PendingChange {
    parent: String,
    action: ChangeAction,
    received_at: Instant,
}

/// Concurrent product → categories and category → groups cache.
///
/// Entries never expire and are never evicted.
pub struct RelationshipCache {
    products: DashMap<String, ParentSet>,
    categories: DashMap<String, ParentSet>,
    pending: DashMap<(RelationKind, String), VecDeque<PendingChange>>,
    config: CacheConfig,
}

impl std::fmt::Debug for RelationshipCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipCache")
            .field("config", &self.config)
            .field("products", &self.products.len())
            .field("categories", &self.categories.len())
            .field("pending_keys", &self.pending.len())
            .finish()
    }
}

impl Default for RelationshipCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl RelationshipCache {
    /// Creates an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            products: DashMap::new(),
            categories: DashMap::new(),
            pending: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn map(&self, kind: RelationKind) -> &DashMap<String, ParentSet> {
        match kind {
            RelationKind::Product => &self.products,
            RelationKind::Category => &self.categories,
        }
    }

    /// Returns the parent set of `key`, or `None` if it was never populated.
    ///
    /// Never triggers a fetch.
    ///
    /// # Metrics
    ///
    /// Records `relgate_cache_hits_total` / `relgate_cache_misses_total`,
    /// labelled by kind.
    pub fn get(&self, kind: RelationKind, key: &str) -> Option<ParentSet> {
        let result = self.map(kind).get(key).map(|entry| Arc::clone(entry.value()));
        if result.is_some() {
            metrics::counter!("relgate_cache_hits_total", "kind" => kind.as_str()).increment(1);
        } else {
            metrics::counter!("relgate_cache_misses_total", "kind" => kind.as_str()).increment(1);
        }
        result
    }

    /// Returns whether `key` has been populated (possibly with an empty set).
    pub fn is_populated(&self, kind: RelationKind, key: &str) -> bool {
        self.map(kind).contains_key(key)
    }

    /// Inserts or overwrites the full parent set for `key`.
    ///
    /// Buffered changes for the key, if any, are replayed on top of
    /// `parents` in arrival order. Returns the number replayed.
    pub fn populate<I, S>(&self, kind: RelationKind, key: impl Into<String>, parents: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let mut set: HashSet<String> = parents.into_iter().map(Into::into).collect();

        // Hold the entry so a concurrent change can't be buffered after the replay.
        let entry = self.map(kind).entry(key.clone());
        let replayed = self.replay_pending(kind, &key, &mut set);
        entry.insert(Arc::new(set));

        if replayed > 0 {
            tracing::debug!(%kind, key = %key, replayed, "Replayed buffered changes on populate");
        }
        replayed
    }

    /// Populates `key` only if it is still unpopulated.
    ///
    /// Returns `false` when another writer populated it first; the existing
    /// set, including any changes applied since, is left untouched.
    pub fn populate_if_absent<I, S>(&self, kind: RelationKind, key: impl Into<String>, parents: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        match self.map(kind).entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                let mut set: HashSet<String> = parents.into_iter().map(Into::into).collect();
                let replayed = self.replay_pending(kind, &key, &mut set);
                vacant.insert(Arc::new(set));
                if replayed > 0 {
                    tracing::debug!(%kind, key = %key, replayed, "Replayed buffered changes on populate");
                }
                true
            }
        }
    }

    /// Applies one add/delete edge change.
    ///
    /// A populated key gets a new set swapped in; an unpopulated key is
    /// buffered or dropped according to [`CacheConfig::pending_retention`].
    ///
    /// # Metrics
    ///
    /// Records `relgate_changes_applied_total`, `relgate_changes_buffered_total`
    /// or `relgate_changes_dropped_total`.
    pub fn apply_change(&self, change: &RelationshipChange) -> ApplyOutcome {
        let outcome = match self.map(change.kind).entry(change.item.clone()) {
            Entry::Occupied(mut occupied) => {
                if let Some(next) = patched(occupied.get(), &change.parent, change.action) {
                    occupied.insert(Arc::new(next));
                }
                ApplyOutcome::Applied
            }
            Entry::Vacant(vacant) => {
                let outcome = self.buffer(change);
                drop(vacant);
                outcome
            }
        };

        match outcome {
            ApplyOutcome::Applied => metrics::counter!("relgate_changes_applied_total").increment(1),
            ApplyOutcome::Buffered => {
                metrics::counter!("relgate_changes_buffered_total").increment(1)
            }
            ApplyOutcome::Dropped => metrics::counter!("relgate_changes_dropped_total").increment(1),
        }
        outcome
    }

    fn buffer(&self, change: &RelationshipChange) -> ApplyOutcome {
        let Some(retention) = self.config.pending_retention else {
            return ApplyOutcome::Dropped;
        };
        if self.config.max_pending_per_key == 0 {
            return ApplyOutcome::Dropped;
        }

        let mut queue = self
            .pending
            .entry((change.kind, change.item.clone()))
            .or_default();
        queue.retain(|pending| pending.received_at.elapsed() <= retention);
        while queue.len() >= self.config.max_pending_per_key {
            queue.pop_front();
        }
        queue.push_back(PendingChange {
            parent: change.parent.clone(),
            action: change.action,
            received_at: Instant::now(),
        });
        ApplyOutcome::Buffered
    }

    fn replay_pending(&self, kind: RelationKind, key: &str, set: &mut HashSet<String>) -> usize {
        let Some((_, queue)) = self.pending.remove(&(kind, key.to_string())) else {
            return 0;
        };
        let Some(retention) = self.config.pending_retention else {
            return 0;
        };

        let mut replayed = 0;
        for pending in queue
            .into_iter()
            .filter(|pending| pending.received_at.elapsed() <= retention)
        {
            apply_to_set(set, &pending.parent, pending.action);
            replayed += 1;
        }
        replayed
    }

    /// Discards buffered changes older than the retention window.
    ///
    /// Returns the number of keys whose buffers became empty and were removed.
    pub fn prune_pending(&self) -> usize {
        let Some(retention) = self.config.pending_retention else {
            let keys = self.pending.len();
            self.pending.clear();
            return keys;
        };

        let before = self.pending.len();
        self.pending.retain(|_, queue| {
            queue.retain(|pending| pending.received_at.elapsed() <= retention);
            !queue.is_empty()
        });
        before.saturating_sub(self.pending.len())
    }

    /// Number of keys with buffered changes.
    pub fn pending_keys(&self) -> usize {
        self.pending.len()
    }

    /// Number of populated keys of `kind`.
    pub fn len(&self, kind: RelationKind) -> usize {
        self.map(kind).len()
    }

    /// A sorted copy of every populated key of `kind`, for diagnostics.
    pub fn snapshot(&self, kind: RelationKind) -> BTreeMap<String, BTreeSet<String>> {
        self.map(kind)
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().cloned().collect()))
            .collect()
    }
}

/// Returns the patched set, or `None` if the change is a no-op.
fn patched(current: &HashSet<String>, parent: &str, action: ChangeAction) -> Option<HashSet<String>> {
    let present = current.contains(parent);
    match (action, present) {
        (ChangeAction::Add, true) | (ChangeAction::Delete, false) => None,
        _ => {
            let mut next = current.clone();
            apply_to_set(&mut next, parent, action);
            Some(next)
        }
    }
}

fn apply_to_set(set: &mut HashSet<String>, parent: &str, action: ChangeAction) {
    match action {
        ChangeAction::Add => {
            set.insert(parent.to_string());
        }
        ChangeAction::Delete => {
            set.remove(parent);
        }
    }
}

/// Registers relationship cache metric descriptions.
///
/// Call once during startup, after installing a metrics recorder.
///
/// # Metrics Registered
///
/// - `relgate_cache_hits_total` - Lookups that found a populated key
/// - `relgate_cache_misses_total` - Lookups of unpopulated keys
/// - `relgate_changes_applied_total` - Changes applied to populated keys
/// - `relgate_changes_buffered_total` - Changes held for unpopulated keys
/// - `relgate_changes_dropped_total` - Changes discarded for unpopulated keys
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "relgate_cache_hits_total",
        "Total number of relationship cache hits"
    );
    metrics::describe_counter!(
        "relgate_cache_misses_total",
        "Total number of relationship cache misses"
    );
    metrics::describe_counter!(
        "relgate_changes_applied_total",
        "Relationship changes applied to populated keys"
    );
    metrics::describe_counter!(
        "relgate_changes_buffered_total",
        "Relationship changes buffered for unpopulated keys"
    );
    metrics::describe_counter!(
        "relgate_changes_dropped_total",
        "Relationship changes dropped for unpopulated keys"
    );
}
