//! Shard registry: the set of live shards and the stores each one owns.
//!
//! Each live shard maps to one `Arc<ShardCache>`. Teardown swaps that entry
//! out of the map instead of clearing stores in place, so a reader that
//! already holds the `Arc` keeps a complete pre-teardown view and every
//! later reader sees the shard as absent.

use crate::prefix::{index_keys, PrefixIndex};
use crate::store::{EntityStore, KeyedStore, OrderedKeyedStore};
use crate::view::AggregatingView;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use shardcache_core::{
    Capabilities, Entity, EntityKind, GatewayEvent, ShardId, Snowflake, Timestamp,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Store (and prefix index, where the kind has one) for one kind on one shard.
///
/// Gateway events and transport responses both write here. Every write holds
/// `writer` across the store update and the matching index update, so the
/// index is always re-keyed from the snapshot it actually holds.
pub struct EntityCache {
    kind: EntityKind,
    store: Box<dyn EntityStore<Entity>>,
    prefix: Option<PrefixIndex>,
    writer: Mutex<()>,
}

impl EntityCache {
    fn new(kind: EntityKind) -> Self {
        let store: Box<dyn EntityStore<Entity>> = if kind.is_ordered() {
            Box::new(OrderedKeyedStore::new())
        } else {
            Box::new(KeyedStore::new())
        };
        Self {
            kind,
            store,
            prefix: kind.is_prefix_indexed().then(PrefixIndex::new),
            writer: Mutex::new(()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn store(&self) -> &dyn EntityStore<Entity> {
        self.store.as_ref()
    }

    pub fn prefix(&self) -> Option<&PrefixIndex> {
        self.prefix.as_ref()
    }

    /// Insert or replace a snapshot and re-key the prefix index from the
    /// replaced snapshot's names to the new ones.
    pub(crate) fn upsert(&self, entity: Arc<Entity>) -> Option<Arc<Entity>> {
        let _writer = self.writer.lock();
        let previous = self.store.put(Arc::clone(&entity));
        if let Some(prefix) = &self.prefix {
            let old = previous
                .as_deref()
                .map(|prev| index_keys(&prev.name, prev.nickname.as_deref()))
                .unwrap_or_default();
            let new = index_keys(&entity.name, entity.nickname.as_deref());
            prefix.replace(entity.id, &old, &new);
        }
        previous
    }

    /// Remove a snapshot and every prefix key it was indexed under.
    pub(crate) fn remove(&self, id: Snowflake) -> Option<Arc<Entity>> {
        let _writer = self.writer.lock();
        let previous = self.store.remove(id)?;
        if let Some(prefix) = &self.prefix {
            let old = index_keys(&previous.name, previous.nickname.as_deref());
            prefix.replace(id, &old, &[]);
        }
        Some(previous)
    }

    /// Up to `limit` ids matching `prefix`; empty for kinds without an index.
    pub fn query_prefix(&self, prefix: &str, limit: usize) -> Vec<Snowflake> {
        match &self.prefix {
            Some(index) => index.query(prefix, limit),
            None => Vec::new(),
        }
    }

    /// Like [`query_prefix`](Self::query_prefix), resolved to snapshots.
    ///
    /// Ids removed between the index read and the store read are skipped.
    pub fn query_prefix_entities(&self, prefix: &str, limit: usize) -> Vec<Arc<Entity>> {
        self.query_prefix(prefix, limit)
            .into_iter()
            .filter_map(|id| self.store.get(id))
            .collect()
    }

    /// Full listing, in display order for ordered kinds.
    pub fn list(&self) -> Vec<Arc<Entity>> {
        if self.kind.is_ordered() {
            self.store.as_sorted_list()
        } else {
            self.store.as_list()
        }
    }
}

/// Everything one live shard has cached.
pub struct ShardCache {
    shard: ShardId,
    capabilities: Capabilities,
    ready_at: Timestamp,
    members: EntityCache,
    roles: EntityCache,
    channels: EntityCache,
}

impl ShardCache {
    fn new(shard: ShardId, capabilities: Capabilities) -> Self {
        Self {
            shard,
            capabilities,
            ready_at: Utc::now(),
            members: EntityCache::new(EntityKind::Member),
            roles: EntityCache::new(EntityKind::Role),
            channels: EntityCache::new(EntityKind::Channel),
        }
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Capabilities announced when the shard became ready.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn ready_at(&self) -> Timestamp {
        self.ready_at
    }

    pub fn entities(&self, kind: EntityKind) -> &EntityCache {
        match kind {
            EntityKind::Member => &self.members,
            EntityKind::Role => &self.roles,
            EntityKind::Channel => &self.channels,
        }
    }
}

/// Registry of live shards, cheap to clone and share.
///
/// Written by the entity-event context and by transport completions, read
/// from anywhere.
#[derive(Clone, Default)]
pub struct ShardRegistry {
    shards: Arc<RwLock<BTreeMap<ShardId, Arc<ShardCache>>>>,
}

impl ShardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create empty stores for `shard`.
    ///
    /// A shard that was already live starts over with empty stores.
    pub fn on_shard_ready(&self, shard: ShardId, capabilities: Capabilities) -> Arc<ShardCache> {
        let cache = Arc::new(ShardCache::new(shard, capabilities));
        let replaced = self.shards.write().insert(shard, Arc::clone(&cache));
        tracing::info!(
            shard,
            capabilities = capabilities.bits(),
            resumed = replaced.is_some(),
            "Shard ready"
        );
        cache
    }

    /// Drop every store `shard` owned. Returns false if it was not live.
    pub fn on_shard_gone(&self, shard: ShardId) -> bool {
        let removed = self.shards.write().remove(&shard);
        match removed {
            Some(_) => {
                tracing::info!(shard, "Shard gone, cache discarded");
                true
            }
            None => {
                tracing::warn!(shard, "Teardown for unknown shard ignored");
                false
            }
        }
    }

    /// Apply an upsert. Returns false if `shard` is not live.
    pub fn on_entity_upserted(&self, shard: ShardId, entity: Entity) -> bool {
        let Some(cache) = self.stores_for(shard) else {
            tracing::warn!(shard, id = %entity.id, kind = %entity.kind, "Upsert for unknown shard dropped");
            return false;
        };
        tracing::trace!(shard, id = %entity.id, kind = %entity.kind, "Entity upserted");
        cache.entities(entity.kind).upsert(Arc::new(entity));
        true
    }

    /// Apply a removal. Returns the removed snapshot, if any.
    pub fn on_entity_removed(
        &self,
        shard: ShardId,
        kind: EntityKind,
        id: Snowflake,
    ) -> Option<Arc<Entity>> {
        let Some(cache) = self.stores_for(shard) else {
            tracing::warn!(shard, %id, %kind, "Removal for unknown shard dropped");
            return None;
        };
        tracing::trace!(shard, %id, %kind, "Entity removed");
        cache.entities(kind).remove(id)
    }

    /// Dispatch one gateway event to the matching `on_*` operation.
    pub fn apply(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::ShardReady {
                shard,
                capabilities,
            } => {
                self.on_shard_ready(shard, capabilities);
            }
            GatewayEvent::ShardGone { shard } => {
                self.on_shard_gone(shard);
            }
            GatewayEvent::EntityUpserted { shard, entity } => {
                self.on_entity_upserted(shard, entity);
            }
            GatewayEvent::EntityRemoved { shard, kind, id } => {
                self.on_entity_removed(shard, kind, id);
            }
        }
    }

    /// Store fetched snapshots into `shard` and hand them back as `Arc`s.
    ///
    /// If the shard went away meanwhile, nothing is cached but the snapshots
    /// are still returned to the caller.
    pub(crate) fn absorb(&self, shard: ShardId, entities: Vec<Entity>) -> Vec<Arc<Entity>> {
        let cache = self.stores_for(shard);
        if cache.is_none() && !entities.is_empty() {
            tracing::warn!(shard, count = entities.len(), "Fetched entities for unknown shard not cached");
        }
        entities
            .into_iter()
            .map(|entity| {
                let entity = Arc::new(entity);
                if let Some(cache) = &cache {
                    cache.entities(entity.kind).upsert(Arc::clone(&entity));
                }
                entity
            })
            .collect()
    }

    pub fn stores_for(&self, shard: ShardId) -> Option<Arc<ShardCache>> {
        self.shards.read().get(&shard).cloned()
    }

    pub fn capabilities(&self, shard: ShardId) -> Option<Capabilities> {
        self.shards.read().get(&shard).map(|cache| cache.capabilities())
    }

    pub fn is_live(&self, shard: ShardId) -> bool {
        self.shards.read().contains_key(&shard)
    }

    /// Live shard ids, ascending.
    pub fn all_shards(&self) -> Vec<ShardId> {
        self.shards.read().keys().copied().collect()
    }

    /// Live shard caches, ascending by shard id.
    pub fn snapshot(&self) -> Vec<Arc<ShardCache>> {
        self.shards.read().values().cloned().collect()
    }

    /// Total cached entities of `kind` across live shards.
    pub fn entity_count(&self, kind: EntityKind) -> usize {
        self.snapshot()
            .iter()
            .map(|cache| cache.entities(kind).store().len())
            .sum()
    }

    /// Read-only view of `kind` across every live shard.
    pub fn view(&self, kind: EntityKind) -> AggregatingView {
        AggregatingView::new(self.clone(), kind)
    }
}
