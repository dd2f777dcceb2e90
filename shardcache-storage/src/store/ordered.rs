//! Keyed store that also maintains display order.

use super::keyed::StoreCore;
use super::EntityStore;
use parking_lot::RwLock;
use shardcache_core::{CacheEntity, Snowflake};
use std::sync::Arc;

/// Keyed store for entities whose display order matters (roles, channels).
///
/// Keeps a `(position, id)` index next to the primary map, updated in the
/// same critical section. Positions need not be contiguous or unique; equal
/// positions fall back to the identifier, so older entities sort first.
#[derive(Debug)]
pub struct OrderedKeyedStore<T> {
    inner: RwLock<StoreCore<T>>,
}

impl<T: CacheEntity> OrderedKeyedStore<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreCore::new(true)),
        }
    }
}

impl<T: CacheEntity> Default for OrderedKeyedStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CacheEntity> EntityStore<T> for OrderedKeyedStore<T> {
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

    fn as_sorted_list(&self) -> Vec<Arc<T>> {
        let core = self.inner.read();
        match &core.order {
            Some(order) => order
                .iter()
                .map(|(_, id)| Arc::clone(&core.entries[id]))
                .collect(),
            None => Vec::new(),
        }
    }
}
