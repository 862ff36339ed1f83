//! Change ingestion: applies relationship-change events to the cache.
//!
//! A single consumer drains an ordered stream of events and applies them
//! one at a time, in arrival order. Resolvers keep reading the cache while
//! this runs; each change swaps one key's parent set atomically.
//!
//! Events whose `type` or `action` is not recognised are logged and
//! skipped. When the stream ends the task finishes quietly and the cache
//! keeps its last state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::cache::{ApplyOutcome, RelationshipCache};
use crate::model::{RawRelationshipChange, RelationshipChange};

/// Buffered changes are pruned after this many events.
const PRUNE_INTERVAL_EVENTS: u64 = 1024;

/// Counters for one ingestor.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub applied: AtomicU64,
    pub buffered: AtomicU64,
    pub dropped: AtomicU64,
    pub malformed: AtomicU64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: ApplyOutcome) {
        let counter = match outcome {
            ApplyOutcome::Applied => &self.applied,
            ApplyOutcome::Buffered => &self.buffered,
            ApplyOutcome::Dropped => &self.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStatsSnapshot {
    pub applied: u64,
    pub buffered: u64,
    pub dropped: u64,
    pub malformed: u64,
}

impl IngestStatsSnapshot {
    /// Every event seen, routable or not.
    pub fn total(&self) -> u64 {
        self.applied + self.buffered + self.dropped + self.malformed
    }
}

/// Applies relationship changes to a shared [`RelationshipCache`].
#[derive(Debug, Clone)]
pub struct ChangeIngestor {
    cache: Arc<RelationshipCache>,
    stats: Arc<IngestStats>,
}

impl ChangeIngestor {
    pub fn new(cache: Arc<RelationshipCache>) -> Self {
        Self {
            cache,
            stats: Arc::new(IngestStats::default()),
        }
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.stats.snapshot()
    }

    /// Routes and applies one wire event. Returns `None` if it was malformed.
    pub fn apply(&self, raw: RawRelationshipChange) -> Option<ApplyOutcome> {
        match RelationshipChange::try_from(raw.clone()) {
            Ok(change) => Some(self.apply_change(&change)),
            Err(error) => {
                warn!(
                    item = %raw.item,
                    parent = %raw.parent,
                    kind = %raw.kind,
                    action = %raw.action,
                    error = %error,
                    "Ignoring unroutable relationship change"
                );
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Applies one typed change.
    pub fn apply_change(&self, change: &RelationshipChange) -> ApplyOutcome {
        let outcome = self.cache.apply_change(change);
        debug!(
            kind = %change.kind,
            item = %change.item,
            parent = %change.parent,
            action = ?change.action,
            outcome = ?outcome,
            "Applied relationship change"
        );
        self.stats.record(outcome);
        outcome
    }

    /// Drains `changes` in order until the stream ends.
    pub async fn run<S>(self, changes: S) -> IngestStatsSnapshot
    where
        S: Stream<Item = RawRelationshipChange>,
    {
        futures::pin_mut!(changes);
        let mut seen: u64 = 0;

        while let Some(raw) = changes.next().await {
            self.apply(raw);
            seen += 1;
            if seen % PRUNE_INTERVAL_EVENTS == 0 {
                self.cache.prune_pending();
            }
        }

        let stats = self.stats.snapshot();
        info!(
            applied = stats.applied,
            buffered = stats.buffered,
            dropped = stats.dropped,
            malformed = stats.malformed,
            "Relationship change stream ended"
        );
        stats
    }

    /// Runs the ingestor on its own task.
    pub fn spawn<S>(self, changes: S) -> IngestorHandle
    where
        S: Stream<Item = RawRelationshipChange> + Send + 'static,
    {
        IngestorHandle {
            task: tokio::spawn(self.run(changes)),
        }
    }

    /// Runs the ingestor on its own task, fed by a bounded channel.
    ///
    /// The stream ends once every sender has been dropped.
    pub fn spawn_channel(
        self,
        capacity: usize,
    ) -> (mpsc::Sender<RawRelationshipChange>, IngestorHandle) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let changes = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|change| (change, receiver))
        });
        (sender, self.spawn(changes))
    }
}

/// A running ingestor task.
#[derive(Debug)]
pub struct IngestorHandle {
    task: JoinHandle<IngestStatsSnapshot>,
}

impl IngestorHandle {
    /// Waits for the change stream to end.
    pub async fn join(self) -> Result<IngestStatsSnapshot, JoinError> {
        self.task.await
    }

    /// Stops applying further changes; the cache keeps its current state.
    pub fn abort(&self) {
        self.task.abort();
    }
}
