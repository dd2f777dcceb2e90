//! Read-only view that merges every live shard's store of one kind.
//!
//! Each call takes one snapshot of the live shard list and visits shards in
//! ascending shard id. Per-shard state is whatever that shard held when it
//! was visited; there is no global snapshot across shards.

use crate::registry::{ShardCache, ShardRegistry};
use crate::store::sort_key;
use shardcache_core::{Entity, EntityKind, Snowflake};
use std::collections::HashSet;
use std::sync::Arc;

/// Aggregated read API for one entity kind.
#[derive(Clone)]
pub struct AggregatingView {
    registry: ShardRegistry,
    kind: EntityKind,
}

impl AggregatingView {
    pub fn new(registry: ShardRegistry, kind: EntityKind) -> Self {
        Self { registry, kind }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// First hit in ascending shard order.
    ///
    /// An id normally lives on one shard. During reconnects a stale duplicate
    /// can sit on a second shard; the lowest shard id wins, every time.
    pub fn get(&self, id: Snowflake) -> Option<Arc<Entity>> {
        self.registry
            .snapshot()
            .iter()
            .find_map(|cache| cache.entities(self.kind).store().get(id))
    }

    /// Union of every shard's name matches, in shard order.
    pub fn by_name(&self, name: &str, ignore_case: bool) -> Vec<Arc<Entity>> {
        self.registry
            .snapshot()
            .iter()
            .flat_map(|cache| cache.entities(self.kind).store().by_name(name, ignore_case))
            .collect()
    }

    /// Up to `limit` distinct ids matching `prefix` across shards.
    ///
    /// Every shard is asked for up to `limit` matches and the truncation to
    /// `limit` happens only on the merged result, so a shard with few
    /// matches is never crowded out before merging.
    pub fn query_prefix(&self, prefix: &str, limit: usize) -> Vec<Snowflake> {
        self.merged_prefix_hits(prefix, limit)
            .into_iter()
            .map(|(_, id)| id)
            .collect()
    }

    /// [`query_prefix`](Self::query_prefix) resolved to snapshots from the
    /// shard that matched.
    pub fn query_prefix_entities(&self, prefix: &str, limit: usize) -> Vec<Arc<Entity>> {
        self.merged_prefix_hits(prefix, limit)
            .into_iter()
            .filter_map(|(cache, id)| cache.entities(self.kind).store().get(id))
            .collect()
    }

    /// Round-robin merge of per-shard hits, deduplicated, then truncated.
    fn merged_prefix_hits(&self, prefix: &str, limit: usize) -> Vec<(Arc<ShardCache>, Snowflake)> {
        if limit == 0 {
            return Vec::new();
        }
        let per_shard: Vec<(Arc<ShardCache>, Vec<Snowflake>)> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|cache| {
                let hits = cache.entities(self.kind).query_prefix(prefix, limit);
                (cache, hits)
            })
            .collect();

        let longest = per_shard.iter().map(|(_, hits)| hits.len()).max().unwrap_or(0);
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for round in 0..longest {
            for (cache, hits) in &per_shard {
                if let Some(id) = hits.get(round) {
                    if seen.insert(*id) {
                        merged.push((Arc::clone(cache), *id));
                    }
                }
            }
        }
        merged.truncate(limit);
        merged
    }

    /// Full copy of every snapshot, shard by shard. O(total entities) per call.
    pub fn as_list(&self) -> Vec<Arc<Entity>> {
        self.iter().collect()
    }

    /// Full copy ordered by `(position, id)` across all shards.
    pub fn as_sorted_list(&self) -> Vec<Arc<Entity>> {
        let mut list = self.as_list();
        list.sort_by_key(|entity| sort_key(entity.as_ref()));
        list
    }

    /// Lazily stream snapshots; a shard's store is copied only when the
    /// iterator reaches it.
    pub fn iter(&self) -> impl Iterator<Item = Arc<Entity>> {
        let kind = self.kind;
        self.registry
            .snapshot()
            .into_iter()
            .flat_map(move |cache| cache.entities(kind).list())
    }

    /// Total snapshots across live shards.
    pub fn len(&self) -> usize {
        self.registry.entity_count(self.kind)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
