//! Retrieval layer: read-through access with explicit freshness rules.
//!
//! Synchronous reads go straight to the [`ShardRegistry`](crate::ShardRegistry)
//! and its views. Reads that may need the remote side go through a
//! [`Retriever`], which answers from the cache only when the
//! [`ConsistencyPolicy`] says the shard keeps that kind current, and otherwise
//! hands back a [`RetrievalTask`] resolved by the transport.
//!
//! # Example
//!
//! ```ignore
//! let retriever = Retriever::with_defaults(registry.clone(), transport);
//!
//! // Any cached copy will do
//! let member = retriever.retrieve(shard, EntityKind::Member, id, false)?;
//!
//! // Force a refresh unless the shard keeps the roster current
//! let member = retriever
//!     .retrieve(shard, EntityKind::Member, id, true)?
//!     .into_result()
//!     .await?;
//! ```

pub mod policy;
pub mod retriever;
pub mod stats;
pub mod task;

pub use policy::ConsistencyPolicy;
pub use retriever::{Retrieval, Retriever};
pub use stats::CacheStats;
pub use task::{RetrievalTask, TaskState};
