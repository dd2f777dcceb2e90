//! Property tests for the shard registry and aggregating view
//!
//! Random upsert/remove streams across several shards are checked against a
//! plain per-shard map model.

use proptest::prelude::*;
use shardcache_storage::{fold_name, index_keys, sort_key, ShardRegistry};
use shardcache_test_utils::generators::{arb_entity_event, arb_role};
use shardcache_test_utils::{Capabilities, Entity, EntityKind, GatewayEvent, Snowflake};
use std::collections::{BTreeMap, HashMap, HashSet};

const SHARDS: u32 = 3;

type Model = BTreeMap<u32, HashMap<Snowflake, Entity>>;

fn build(events: &[GatewayEvent]) -> (ShardRegistry, Model) {
    let registry = ShardRegistry::new();
    let mut model: Model = BTreeMap::new();
    for shard in 0..SHARDS {
        registry.on_shard_ready(shard, Capabilities::all());
        model.insert(shard, HashMap::new());
    }
    for event in events {
        match event {
            GatewayEvent::EntityUpserted { shard, entity } => {
                if let Some(members) = model.get_mut(shard) {
                    members.insert(entity.id, entity.clone());
                }
            }
            GatewayEvent::EntityRemoved { shard, id, .. } => {
                if let Some(members) = model.get_mut(shard) {
                    members.remove(id);
                }
            }
            _ => {}
        }
        registry.apply(event.clone());
    }
    (registry, model)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: the view resolves every id to the lowest shard holding it.
    #[test]
    fn prop_view_get_prefers_lowest_shard(
        events in prop::collection::vec(arb_entity_event(SHARDS), 0..96),
    ) {
        let (registry, model) = build(&events);
        let view = registry.view(EntityKind::Member);

        let ids: HashSet<Snowflake> = model.values().flat_map(|m| m.keys().copied()).collect();
        for id in ids {
            let expected = model.values().find_map(|members| members.get(&id));
            let actual = view.get(id);
            prop_assert_eq!(actual.as_deref(), expected);
        }
        prop_assert_eq!(view.len(), model.values().map(HashMap::len).sum::<usize>());
    }

    /// Property: each shard's prefix index holds exactly its stored members,
    /// and every indexed key finds its member again.
    #[test]
    fn prop_prefix_index_tracks_store(
        events in prop::collection::vec(arb_entity_event(SHARDS), 0..96),
    ) {
        let (registry, model) = build(&events);

        for (shard, members) in &model {
            let cache = registry.stores_for(*shard).unwrap();
            let entities = cache.entities(EntityKind::Member);
            let index = entities.prefix().unwrap();

            let expected: HashSet<Snowflake> = members.keys().copied().collect();
            prop_assert_eq!(index.ids(), expected);

            let key_count: usize = members
                .values()
                .map(|m| index_keys(&m.name, m.nickname.as_deref()).len())
                .sum();
            prop_assert_eq!(index.len(), key_count);

            for member in members.values() {
                for key in index_keys(&member.name, member.nickname.as_deref()) {
                    prop_assert!(index.query(&key, usize::MAX).contains(&member.id));
                }
            }
        }
    }

    /// Property: a merged prefix query equals the union of shard-local linear
    /// scans when unbounded, and never exceeds its limit.
    #[test]
    fn prop_view_prefix_matches_linear_scan(
        events in prop::collection::vec(arb_entity_event(SHARDS), 0..96),
        prefix in "[a-dA-D]{1,2}",
        limit in 1usize..12,
    ) {
        let (registry, model) = build(&events);
        let view = registry.view(EntityKind::Member);
        let folded = fold_name(&prefix);

        let expected: HashSet<Snowflake> = model
            .values()
            .flat_map(|members| members.values())
            .filter(|m| {
                fold_name(&m.name).starts_with(&folded)
                    || m.nickname.as_deref().is_some_and(|n| fold_name(n).starts_with(&folded))
            })
            .map(|m| m.id)
            .collect();

        let all: HashSet<Snowflake> = view.query_prefix(&prefix, usize::MAX).into_iter().collect();
        prop_assert_eq!(&all, &expected);

        let limited = view.query_prefix(&prefix, limit);
        prop_assert_eq!(limited.len(), expected.len().min(limit));
        let distinct: HashSet<Snowflake> = limited.iter().copied().collect();
        prop_assert_eq!(distinct.len(), limited.len());
    }

    /// Property: display order across shards is strictly increasing by
    /// (position, id) and independent of which shard holds a role.
    #[test]
    fn prop_sorted_roles_across_shards(
        placements in prop::collection::vec((0u32..SHARDS, arb_role()), 0..48),
    ) {
        let registry = ShardRegistry::new();
        for shard in 0..SHARDS {
            registry.on_shard_ready(shard, Capabilities::all());
        }
        let mut seen = HashSet::new();
        for (shard, role) in placements {
            // keep ids unique across shards so the ordering is total
            if seen.insert(role.id) {
                registry.on_entity_upserted(shard, role);
            }
        }

        let sorted = registry.view(EntityKind::Role).as_sorted_list();
        prop_assert_eq!(sorted.len(), seen.len());
        for pair in sorted.windows(2) {
            prop_assert!(sort_key(pair[0].as_ref()) < sort_key(pair[1].as_ref()));
        }
    }
}
