//! Transport collaborator interface.
//!
//! The gateway/HTTP layer is outside this workspace. The cache only needs
//! an on-demand fetch primitive from it; entity mutations arrive separately
//! as [`GatewayEvent`](crate::GatewayEvent)s.

use crate::{Entity, EntityKind, ShardId, Snowflake, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a fetch asks the remote side for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchRequest {
    /// A single entity by id.
    ById(Snowflake),
    /// Several entities by id (chunked request). Ids are already deduplicated.
    ByIds(Vec<Snowflake>),
    /// Entities whose name or nickname starts with `prefix`, at most `limit`.
    ByPrefix { prefix: String, limit: usize },
}

impl FetchRequest {
    /// Number of ids named by the request, or `None` for prefix searches.
    pub fn id_count(&self) -> Option<usize> {
        match self {
            FetchRequest::ById(_) => Some(1),
            FetchRequest::ByIds(ids) => Some(ids.len()),
            FetchRequest::ByPrefix { .. } => None,
        }
    }
}

/// On-demand fetch primitive provided by the transport.
///
/// Implementations must be thread-safe. The cache never retries; retry and
/// rate-limit policy belong to the implementation. A request still pending
/// one `retrieval_timeout` after its deadline is dropped.
///
/// # Example
/// ```ignore
/// struct GatewayChunker { /* ... */ }
///
/// #[async_trait]
/// impl EntityTransport for GatewayChunker {
///     async fn fetch(&self, shard: ShardId, kind: EntityKind, request: FetchRequest)
///         -> Result<Vec<Entity>, TransportError> {
///         // Send a member chunk request on `shard` and collect the chunks
///     }
/// }
/// ```
#[async_trait]
pub trait EntityTransport: Send + Sync + 'static {
    /// Fetch entities of `kind` through `shard`.
    ///
    /// # Returns
    /// * `Ok(entities)` - Whatever the remote side returned; may be a subset
    /// * `Err(TransportError::NotFound)` - The remote side reports no such entity
    /// * `Err(TransportError::Failure)` - Any other failure, propagated opaquely
    async fn fetch(
        &self,
        shard: ShardId,
        kind: EntityKind,
        request: FetchRequest,
    ) -> Result<Vec<Entity>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_request_id_count() {
        assert_eq!(FetchRequest::ById(Snowflake::new(1)).id_count(), Some(1));
        assert_eq!(
            FetchRequest::ByIds(vec![Snowflake::new(1), Snowflake::new(2)]).id_count(),
            Some(2)
        );
        let prefix = FetchRequest::ByPrefix {
            prefix: "an".to_string(),
            limit: 10,
        };
        assert_eq!(prefix.id_count(), None);
    }
}
