//! Unordered keyed store with exact and case-insensitive name indices.

use super::{fold_name, sort_key, EntityStore};
use parking_lot::RwLock;
use shardcache_core::{CacheEntity, Snowflake};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

type NameIndex = HashMap<String, HashSet<Snowflake>>;

/// State guarded by a store's lock.
///
/// Every id in `by_name`, `by_folded_name` and `order` is a key of
/// `entries`. Violations are programming errors and abort loudly.
#[derive(Debug)]
pub(super) struct StoreCore<T> {
    pub(super) entries: HashMap<Snowflake, Arc<T>>,
    by_name: NameIndex,
    by_folded_name: NameIndex,
    /// Present only for ordered stores.
    pub(super) order: Option<BTreeSet<(i32, Snowflake)>>,
}

impl<T: CacheEntity> StoreCore<T> {
    pub(super) fn new(ordered: bool) -> Self {
        Self {
            entries: HashMap::new(),
            by_name: HashMap::new(),
            by_folded_name: HashMap::new(),
            order: ordered.then(BTreeSet::new),
        }
    }

    pub(super) fn put(&mut self, entity: Arc<T>) -> Option<Arc<T>> {
        let previous = self.entries.insert(entity.id(), Arc::clone(&entity));
        if let Some(previous) = &previous {
            self.unlink(previous.as_ref());
        }
        self.link(entity.as_ref());
        previous
    }

    pub(super) fn remove(&mut self, id: Snowflake) -> Option<Arc<T>> {
        let previous = self.entries.remove(&id)?;
        self.unlink(previous.as_ref());
        Some(previous)
    }

    pub(super) fn get(&self, id: Snowflake) -> Option<Arc<T>> {
        self.entries.get(&id).cloned()
    }

    pub(super) fn by_name(&self, name: &str, ignore_case: bool) -> Vec<Arc<T>> {
        let bucket = if ignore_case {
            self.by_folded_name.get(&fold_name(name))
        } else {
            self.by_name.get(name)
        };
        let Some(bucket) = bucket else {
            return Vec::new();
        };
        let mut found: Vec<Arc<T>> = bucket
            .iter()
            .map(|id| Arc::clone(&self.entries[id]))
            .collect();
        found.sort_by_key(|entity| entity.id());
        found
    }

    pub(super) fn as_list(&self) -> Vec<Arc<T>> {
        self.entries.values().cloned().collect()
    }

    fn link(&mut self, entity: &T) {
        let id = entity.id();
        self.by_name
            .entry(entity.name().to_owned())
            .or_default()
            .insert(id);
        self.by_folded_name
            .entry(fold_name(entity.name()))
            .or_default()
            .insert(id);
        if let Some(order) = &mut self.order {
            order.insert(sort_key(entity));
        }
    }

    fn unlink(&mut self, entity: &T) {
        let id = entity.id();
        detach(&mut self.by_name, entity.name(), id);
        detach(&mut self.by_folded_name, &fold_name(entity.name()), id);
        if let Some(order) = &mut self.order {
            let removed = order.remove(&sort_key(entity));
            assert!(removed, "order index lost entity {}", id);
        }
    }
}

fn detach(index: &mut NameIndex, key: &str, id: Snowflake) {
    let Some(bucket) = index.get_mut(key) else {
        panic!("name index has no bucket {:?} for entity {}", key, id);
    };
    assert!(bucket.remove(&id), "name index bucket {:?} lost entity {}", key, id);
    if bucket.is_empty() {
        index.remove(key);
    }
}

/// Per-shard `id -> snapshot` store for one entity kind.
///
/// Mutations take the store's write lock once; reads take the read lock
/// only long enough to copy out `Arc` handles.
#[derive(Debug)]
pub struct KeyedStore<T> {
    inner: RwLock<StoreCore<T>>,
}

impl<T: CacheEntity> KeyedStore<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreCore::new(false)),
        }
    }

    /// Ids currently stored, ascending.
    pub fn ids(&self) -> Vec<Snowflake> {
        let mut ids: Vec<Snowflake> = self.inner.read().entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Drop every snapshot.
    pub fn clear(&self) {
        *self.inner.write() = StoreCore::new(false);
    }
}

impl<T: CacheEntity> Default for KeyedStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CacheEntity> EntityStore<T> for KeyedStore<T> {
    fn put(&self, entity: Arc<T>) -> Option<Arc<T>> {
        self.inner.write().put(entity)
    }

    fn remove(&self, id: Snowflake) -> Option<Arc<T>> {
        self.inner.write().remove(id)
    }

    fn get(&self, id: Snowflake) -> Option<Arc<T>> {
        self.inner.read().get(id)
    }

    fn by_name(&self, name: &str, ignore_case: bool) -> Vec<Arc<T>> {
        self.inner.read().by_name(name, ignore_case)
    }

    fn as_list(&self) -> Vec<Arc<T>> {
        self.inner.read().as_list()
    }

    fn len(&self) -> usize {
        self.inner.read().entries.len()
    }
}
