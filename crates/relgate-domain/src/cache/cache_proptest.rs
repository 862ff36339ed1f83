//! Property-based tests for the relationship cache.

use std::collections::HashSet;

use proptest::prelude::*;

use super::RelationshipCache;
use crate::model::{ChangeAction, RelationKind, RelationshipChange};

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn parents_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("group-[a-e]", 0..6)
}

fn action_strategy() -> impl Strategy<Value = ChangeAction> {
    prop_oneof![Just(ChangeAction::Add), Just(ChangeAction::Delete)]
}

proptest! {
    #[test]
    fn test_populate_is_idempotent(key in key_strategy(), parents in parents_strategy()) {
        let cache = RelationshipCache::default();

        cache.populate(RelationKind::Category, key.clone(), parents.clone());
        let first = cache.snapshot(RelationKind::Category);
        cache.populate(RelationKind::Category, key.clone(), parents);
        let second = cache.snapshot(RelationKind::Category);

        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_last_change_for_a_parent_wins(
        key in key_strategy(),
        parents in parents_strategy(),
        actions in prop::collection::vec(action_strategy(), 1..10),
    ) {
        let cache = RelationshipCache::default();
        cache.populate(RelationKind::Product, key.clone(), parents);

        for action in &actions {
            cache.apply_change(&RelationshipChange::new(
                RelationKind::Product,
                key.clone(),
                "edge",
                *action,
            ));
        }

        let categories = cache.get(RelationKind::Product, &key).unwrap();
        let expected = matches!(actions.last(), Some(ChangeAction::Add));
        prop_assert_eq!(categories.contains("edge"), expected);
    }

    #[test]
    fn test_changes_match_sequential_set_model(
        parents in parents_strategy(),
        changes in prop::collection::vec(("group-[a-e]", action_strategy()), 0..20),
    ) {
        let cache = RelationshipCache::default();
        cache.populate(RelationKind::Category, "toys", parents.clone());
        let mut model: HashSet<String> = parents.into_iter().collect();

        for (parent, action) in changes {
            cache.apply_change(&RelationshipChange::new(
                RelationKind::Category,
                "toys",
                parent.clone(),
                action,
            ));
            match action {
                ChangeAction::Add => { model.insert(parent); }
                ChangeAction::Delete => { model.remove(&parent); }
            }
        }

        let groups = cache.get(RelationKind::Category, "toys").unwrap();
        prop_assert_eq!(&*groups, &model);
    }
}
