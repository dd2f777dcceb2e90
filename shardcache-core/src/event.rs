//! Events pushed by the gateway transport into the cache.

use crate::{Capabilities, Entity, EntityKind, ShardId, Snowflake};
use serde::{Deserialize, Serialize};

/// One cache mutation delivered by a shard's connection.
///
/// Events for a single shard arrive in delivery order and are applied in
/// that order. There is no ordering across shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GatewayEvent {
    /// The shard finished connecting with the given feeds enabled.
    ShardReady {
        shard: ShardId,
        capabilities: Capabilities,
    },
    /// The shard disconnected; everything it cached is discarded.
    ShardGone { shard: ShardId },
    /// An entity was created or replaced.
    EntityUpserted { shard: ShardId, entity: Entity },
    /// An entity was deleted.
    EntityRemoved {
        shard: ShardId,
        kind: EntityKind,
        id: Snowflake,
    },
}

impl GatewayEvent {
    /// Shard the event is addressed to.
    pub fn shard(&self) -> ShardId {
        match self {
            GatewayEvent::ShardReady { shard, .. }
            | GatewayEvent::ShardGone { shard }
            | GatewayEvent::EntityUpserted { shard, .. }
            | GatewayEvent::EntityRemoved { shard, .. } => *shard,
        }
    }
}
