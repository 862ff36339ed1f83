//! Runs a configured scenario: install rules, check, stream changes, check again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use relgate_domain::ingest::IngestStatsSnapshot;
use relgate_domain::resolver::WarmupReport;
use relgate_domain::{AccessService, RelationshipCache, StaticGraphFetcher, User};

use crate::config::{AccessCheck, ServerConfig};

/// Capacity of the channel between the scenario and the ingestor.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// The decision for one configured check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub path: String,
    pub groups: Vec<String>,
    pub allowed: bool,
}

/// Everything a scenario run produced.
#[derive(Debug)]
pub struct ScenarioReport {
    pub warmup: WarmupReport,
    pub before: Vec<CheckOutcome>,
    pub after: Vec<CheckOutcome>,
    pub ingest: IngestStatsSnapshot,
}

/// Runs the scenario described by `config`.
///
/// An empty catalog falls back to the built-in demonstration catalog.
pub async fn run(config: &ServerConfig) -> anyhow::Result<ScenarioReport> {
    let fetcher = if config.catalog.is_empty() {
        info!("No catalog configured, using the demonstration catalog");
        StaticGraphFetcher::with_catalog_defaults()
    } else {
        config.catalog.to_fetcher()
    };

    let cache = Arc::new(RelationshipCache::new(config.cache.to_cache_config()));
    let service = AccessService::with_config(
        Arc::new(fetcher),
        cache,
        config.resolver.to_resolver_config(),
    );

    let warmup = service.set_access(config.rules.clone()).await;
    let before = run_checks(&service, &config.checks, "before changes").await;

    let (sender, handle) = service.ingestor().spawn_channel(CHANGE_CHANNEL_CAPACITY);
    for scheduled in &config.changes {
        if scheduled.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(scheduled.delay_ms)).await;
        }
        sender
            .send(scheduled.event.clone())
            .await
            .context("change ingestor stopped before the change stream ended")?;
    }
    drop(sender);
    let ingest = handle.join().await.context("change ingestor task failed")?;

    let after = run_checks(&service, &config.checks, "after changes").await;

    Ok(ScenarioReport {
        warmup,
        before,
        after,
        ingest,
    })
}

async fn run_checks(
    service: &AccessService<StaticGraphFetcher>,
    checks: &[AccessCheck],
    phase: &str,
) -> Vec<CheckOutcome> {
    let mut outcomes = Vec::with_capacity(checks.len());
    for check in checks {
        let user = User::new(check.groups.iter().cloned());
        let allowed = service.has_access(&user, &check.path).await;
        info!(phase, path = %check.path, groups = ?check.groups, allowed, "Access check");
        outcomes.push(CheckOutcome {
            path: check.path.clone(),
            groups: check.groups.clone(),
            allowed,
        });
    }
    outcomes
}
