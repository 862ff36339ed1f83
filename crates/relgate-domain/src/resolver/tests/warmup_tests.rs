//! Warm-up behaviour of `set_access`.

use std::sync::Arc;
use std::time::Duration;

use super::mocks::{create_service, create_service_with, MockGraphFetcher};
use crate::cache::CacheConfig;
use crate::error::DomainError;
use crate::model::{AccessEntry, RelationKind, RelationshipChange, RuleType, User};
use crate::resolver::{AccessService, ResolverConfig};
use crate::RelationshipCache;

#[tokio::test]
async fn test_every_referenced_key_is_populated_after_set_access() {
    let (_, service) = create_service().await;
    let rules = vec![
        AccessEntry::new("/c", RuleType::Category, ["balls", "toys", "ghost"]),
        AccessEntry::new("/p", RuleType::Product, ["soccerBall", "teddyBear", "phantom"]),
        AccessEntry::new("/g", RuleType::Group, ["group-b"]),
    ];

    let report = service.set_access(rules).await;

    assert!(report.is_complete());
    assert_eq!(report.referenced, 6);
    // "sport" is reached only through "soccerBall".
    assert_eq!(report.derived, 1);
    assert_eq!(report.populated, 4);
    assert_eq!(report.unknown.len(), 3);
    assert!(report
        .unknown
        .contains(&(RelationKind::Category, "sport".to_string())));
    let cache = service.cache();
    for key in ["balls", "toys", "ghost"] {
        assert!(cache.is_populated(RelationKind::Category, key), "{key}");
    }
    for key in ["soccerBall", "teddyBear", "phantom"] {
        assert!(cache.is_populated(RelationKind::Product, key), "{key}");
    }
    // Group rule keys are not cache keys.
    assert!(!cache.is_populated(RelationKind::Category, "group-b"));
}

#[tokio::test]
async fn test_unknown_keys_are_cached_empty_and_not_refetched() {
    let (fetcher, service) = create_service().await;
    let rules = vec![AccessEntry::new("/c", RuleType::Category, ["ghost"])];

    let report = service.set_access(rules.clone()).await;
    assert_eq!(
        report.unknown,
        vec![(RelationKind::Category, "ghost".to_string())]
    );
    let calls = fetcher.calls();

    service.set_access(rules).await;
    assert!(!service.has_access(&User::new(["group-b"]), "/c").await);

    assert_eq!(fetcher.calls(), calls);
    assert!(service
        .cache()
        .get(RelationKind::Category, "ghost")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_duplicate_keys_across_rules_are_fetched_once() {
    let (fetcher, service) = create_service().await;

    service
        .set_access(vec![
            AccessEntry::new("/a", RuleType::Category, ["toys"]),
            AccessEntry::new("/b", RuleType::Category, ["toys", "toys"]),
        ])
        .await;

    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_fetch_failure_is_reported_and_rules_still_installed() {
    let (fetcher, service) = create_service().await;
    fetcher.fail_on(RelationKind::Category, "toys").await;

    let report = service
        .set_access(vec![
            AccessEntry::new("/c", RuleType::Category, ["toys", "balls"]),
            AccessEntry::new("/g", RuleType::Group, ["group-a-1"]),
        ])
        .await;

    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.kind, RelationKind::Category);
    assert_eq!(failure.key, "toys");
    assert!(matches!(failure.error, DomainError::FetchFailed { .. }));

    assert_eq!(service.rules().len(), 2);
    assert!(!service.cache().is_populated(RelationKind::Category, "toys"));
    assert!(service.cache().is_populated(RelationKind::Category, "balls"));
    assert!(!service.has_access(&User::new(["group-b"]), "/g").await);
}

#[tokio::test]
async fn test_failed_key_is_retried_on_next_installation() {
    let (fetcher, service) = create_service().await;
    fetcher.fail_on(RelationKind::Category, "toys").await;
    let rules = vec![AccessEntry::new("/c", RuleType::Category, ["toys"])];
    service.set_access(rules.clone()).await;

    fetcher.heal(RelationKind::Category, "toys").await;
    let report = service.set_access(rules).await;

    assert!(report.is_complete());
    assert_eq!(report.populated, 1);
    assert!(service.has_access(&User::new(["group-c"]), "/c").await);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_fetch_times_out_without_blocking_others() {
    let (fetcher, service) = create_service_with(
        ResolverConfig::default().with_fetch_timeout(Duration::from_millis(100)),
    )
    .await;
    fetcher.stall_on(RelationKind::Category, "toys").await;

    let report = service
        .set_access(vec![AccessEntry::new("/c", RuleType::Category, ["toys", "balls"])])
        .await;

    assert_eq!(report.populated, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0].error,
        DomainError::FetchTimeout { timeout_ms: 100, .. }
    ));
}

#[tokio::test]
async fn test_single_fetch_slot_still_warms_everything() {
    let (fetcher, service) =
        create_service_with(ResolverConfig::default().with_max_concurrent_fetches(0)).await;

    let report = service
        .set_access(vec![
            AccessEntry::new("/c", RuleType::Category, ["toys", "balls"]),
            AccessEntry::new("/p", RuleType::Product, ["soccerBall", "teddyBear"]),
        ])
        .await;

    assert!(report.is_complete());
    assert_eq!(report.populated, 4);
    assert_eq!(report.derived, 1);
    assert_eq!(fetcher.calls(), 5);
}

#[tokio::test]
async fn test_warmup_replays_changes_buffered_before_population() {
    let fetcher = Arc::new(MockGraphFetcher::with_catalog().await);
    let cache = Arc::new(RelationshipCache::new(
        CacheConfig::default().with_pending_retention(Duration::from_secs(60)),
    ));
    let service =
        AccessService::with_config(Arc::clone(&fetcher), cache, ResolverConfig::default());

    // Arrives before any rule references "toys".
    service
        .ingestor()
        .apply_change(&RelationshipChange::delete(RelationKind::Category, "toys", "group-c"));

    service
        .set_access(vec![AccessEntry::new("/c", RuleType::Category, ["toys"])])
        .await;

    assert!(!service.has_access(&User::new(["group-c"]), "/c").await);
    assert!(service.has_access(&User::new(["group-b"]), "/c").await);
}

#[tokio::test]
async fn test_without_retention_early_changes_are_lost() {
    let (_, service) = create_service().await;

    service
        .ingestor()
        .apply_change(&RelationshipChange::delete(RelationKind::Category, "toys", "group-c"));
    service
        .set_access(vec![AccessEntry::new("/c", RuleType::Category, ["toys"])])
        .await;

    assert!(service.has_access(&User::new(["group-c"]), "/c").await);
}

#[tokio::test]
async fn test_product_categories_are_fetched_after_products() {
    let (fetcher, service) = create_service().await;

    let report = service
        .set_access(vec![AccessEntry::new("/p", RuleType::Product, ["teddyBear"])])
        .await;

    assert!(report.is_complete());
    assert_eq!(report.derived, 1);
    assert_eq!(report.populated, 2);
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(
        service
            .cache()
            .snapshot(RelationKind::Category)
            .get("toys")
            .map(|groups| groups.len()),
        Some(2)
    );
}

#[tokio::test]
async fn test_failed_product_fetch_derives_no_categories() {
    let (fetcher, service) = create_service().await;
    fetcher.fail_on(RelationKind::Product, "teddyBear").await;

    let report = service
        .set_access(vec![AccessEntry::new("/p", RuleType::Product, ["teddyBear"])])
        .await;

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.derived, 0);
    assert!(!service.cache().is_populated(RelationKind::Category, "toys"));
}

#[tokio::test]
async fn test_derived_category_failure_is_reported() {
    let (fetcher, service) = create_service().await;
    fetcher.fail_on(RelationKind::Category, "toys").await;

    let report = service
        .set_access(vec![AccessEntry::new("/p", RuleType::Product, ["teddyBear"])])
        .await;

    assert!(!report.is_complete());
    assert_eq!(report.failures[0].key, "toys");
    assert!(!service.has_access(&User::new(["group-c"]), "/p").await);
}
