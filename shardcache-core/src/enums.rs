//! Enum and flag types for cached entities

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTITY KINDS
// ============================================================================

/// Entity kind discriminator.
///
/// The cache layer is kind-agnostic; the kind only selects which store a
/// snapshot lands in and which capability keeps that store current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Member,
    Role,
    Channel,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Member, EntityKind::Role, EntityKind::Channel];

    /// Kinds whose display order matters and which keep a `(position, id)` order.
    pub fn is_ordered(self) -> bool {
        matches!(self, EntityKind::Role | EntityKind::Channel)
    }

    /// Kinds searchable by name prefix.
    pub fn is_prefix_indexed(self) -> bool {
        matches!(self, EntityKind::Member)
    }
}

// ============================================================================
// CAPABILITIES
// ============================================================================

bitflags! {
    /// Optional data feeds negotiated when a shard connects.
    ///
    /// Bit positions match the gateway's intent bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Guild structure: roles, channels and their updates
        const GUILDS = 1 << 0;
        /// Full member roster sync and member add/remove/update events
        const GUILD_MEMBERS = 1 << 1;
        /// Presence updates
        const GUILD_PRESENCES = 1 << 8;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::empty()
    }
}

// Manual serde implementation for Capabilities (bitflags 2.x + serde)
impl Serialize for Capabilities {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Capabilities {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Self::from_bits(bits).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid Capabilities bits: {:#010x}", bits))
        })
    }
}

// ============================================================================
// STRING CONVERSIONS
// ============================================================================

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            EntityKind::Member => "Member",
            EntityKind::Role => "Role",
            EntityKind::Channel => "Channel",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "member" => Ok(EntityKind::Member),
            "role" => Ok(EntityKind::Role),
            "channel" => Ok(EntityKind::Channel),
            _ => Err(format!("Invalid EntityKind: {}", s)),
        }
    }
}
