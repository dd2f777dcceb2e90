//! Per-shard keyed entity stores.
//!
//! Both store flavours keep the primary `id -> snapshot` map and the name
//! indices inside one lock, so a mutation updates every structure in a
//! single critical section. Reads copy what they need out of that lock and
//! never hand out references into live state.

mod keyed;
mod ordered;

pub use keyed::KeyedStore;
pub use ordered::OrderedKeyedStore;

use shardcache_core::{CacheEntity, Snowflake};
use std::sync::Arc;

/// Case-folded form of a name, as used by case-insensitive lookups and the
/// prefix index.
pub fn fold_name(name: &str) -> String {
    name.chars().flat_map(char::to_lowercase).collect()
}

/// Display order key: position first, then identifier (older first).
///
/// Identifiers are unique within a store, so this is a total order.
pub fn sort_key<T: CacheEntity + ?Sized>(entity: &T) -> (i32, Snowflake) {
    (entity.position(), entity.id())
}

/// Operations shared by every keyed store.
///
/// Implementations must be thread-safe. All returned collections are
/// snapshots: later mutations never show through them.
pub trait EntityStore<T: CacheEntity>: Send + Sync {
    /// Insert or replace the snapshot for `entity.id()`. Returns the replaced snapshot.
    fn put(&self, entity: Arc<T>) -> Option<Arc<T>>;

    /// Remove a snapshot. `None` means the id was not present.
    fn remove(&self, id: Snowflake) -> Option<Arc<T>>;

    /// Point lookup.
    fn get(&self, id: Snowflake) -> Option<Arc<T>>;

    /// All snapshots whose name equals `name`, sorted by id.
    fn by_name(&self, name: &str, ignore_case: bool) -> Vec<Arc<T>>;

    /// Copy of every snapshot, in no particular order.
    fn as_list(&self) -> Vec<Arc<T>>;

    /// Number of stored snapshots.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every snapshot ordered by `(position, id)` ascending.
    fn as_sorted_list(&self) -> Vec<Arc<T>> {
        let mut list = self.as_list();
        list.sort_by_key(|entity| sort_key(entity.as_ref()));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_name_lowercases_unicode() {
        assert_eq!(fold_name("AnNa"), "anna");
        assert_eq!(fold_name("ÉLODIE"), "élodie");
        assert_eq!(fold_name(""), "");
    }
}
