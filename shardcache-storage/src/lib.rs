//! Shardcache Storage - Per-Shard Entity Caches
//!
//! Keyed stores, the prefix index, the shard registry that owns them, the
//! aggregating read view across shards, and the retrieval layer that falls
//! back to the transport when the cache cannot answer.
//!
//! # Concurrency
//!
//! Stores and indices are written by the single context that applies
//! gateway events and read from anywhere. Every read copies `Arc` handles
//! out of a short critical section, so results stay valid while the cache
//! keeps changing underneath them.

pub mod cache;
pub mod prefix;
pub mod registry;
pub mod store;
pub mod view;

pub use cache::{
    CacheStats, ConsistencyPolicy, Retrieval, RetrievalTask, Retriever, TaskState,
};
pub use prefix::{index_keys, PrefixIndex};
pub use registry::{EntityCache, ShardCache, ShardRegistry};
pub use store::{fold_name, sort_key, EntityStore, KeyedStore, OrderedKeyedStore};
pub use view::AggregatingView;
