//! Entity snapshot record and the facets the cache reads from it

use crate::{EntityKind, Snowflake, Timestamp};
use serde::{Deserialize, Serialize};

/// Facets of an entity the cache layer depends on.
///
/// Everything else about an entity is opaque to the cache. Implementations
/// must be immutable snapshots: an update is a new value, never a mutation.
pub trait CacheEntity: Send + Sync + 'static {
    /// Primary key.
    fn id(&self) -> Snowflake;

    /// Display name used by the name and prefix indices.
    fn name(&self) -> &str;

    /// Optional secondary name; indexed alongside the name when present.
    fn nickname(&self) -> Option<&str> {
        None
    }

    /// Explicit display position. Only ordered stores read this.
    fn position(&self) -> i32 {
        0
    }
}

/// Immutable entity snapshot as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Snowflake,
    pub kind: EntityKind,
    /// Guild the entity belongs to, used for shard routing
    pub guild_id: Option<Snowflake>,
    pub name: String,
    pub nickname: Option<String>,
    pub position: Option<i32>,
    /// Kind-specific fields, interpreted only by the application layer
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Entity {
    pub fn new(kind: EntityKind, id: Snowflake, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            guild_id: None,
            name: name.into(),
            nickname: None,
            position: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn member(id: impl Into<Snowflake>, name: impl Into<String>) -> Self {
        Self::new(EntityKind::Member, id.into(), name)
    }

    pub fn role(id: impl Into<Snowflake>, name: impl Into<String>, position: i32) -> Self {
        Self::new(EntityKind::Role, id.into(), name).with_position(position)
    }

    pub fn channel(id: impl Into<Snowflake>, name: impl Into<String>, position: i32) -> Self {
        Self::new(EntityKind::Channel, id.into(), name).with_position(position)
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn with_position(mut self, position: i32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Nickname when set, otherwise the name.
    pub fn effective_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.name)
    }

    /// Creation time embedded in the identifier.
    pub fn created_at(&self) -> Timestamp {
        self.id.timestamp()
    }
}

impl CacheEntity for Entity {
    fn id(&self) -> Snowflake {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    fn position(&self) -> i32 {
        self.position.unwrap_or_default()
    }
}
