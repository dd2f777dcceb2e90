//! Capability-based freshness rules.

use crate::registry::ShardRegistry;
use shardcache_core::{Capabilities, EntityKind, ShardId};
use std::collections::BTreeMap;

/// Decides whether a shard's cache for a kind is complete and current.
///
/// A kind's store is only kept fully synchronised when the shard connected
/// with that kind's required capabilities. Without them the store holds
/// whatever was observed incidentally and must not be treated as a roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyPolicy {
    requirements: BTreeMap<EntityKind, Capabilities>,
}

impl Default for ConsistencyPolicy {
    fn default() -> Self {
        Self {
            requirements: BTreeMap::from([
                (EntityKind::Member, Capabilities::GUILD_MEMBERS),
                (EntityKind::Role, Capabilities::GUILDS),
                (EntityKind::Channel, Capabilities::GUILDS),
            ]),
        }
    }
}

impl ConsistencyPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the capabilities required to keep `kind` current.
    pub fn with_requirement(mut self, kind: EntityKind, required: Capabilities) -> Self {
        self.requirements.insert(kind, required);
        self
    }

    /// Capabilities `kind` needs. Kinds without an entry need none.
    pub fn required(&self, kind: EntityKind) -> Capabilities {
        self.requirements
            .get(&kind)
            .copied()
            .unwrap_or_else(Capabilities::empty)
    }

    /// Whether a shard connected with `active` keeps `kind` current.
    pub fn is_fresh_with(&self, active: Capabilities, kind: EntityKind) -> bool {
        active.contains(self.required(kind))
    }

    /// Whether `shard` keeps `kind` current. False for shards that are not live.
    pub fn is_fresh(&self, registry: &ShardRegistry, shard: ShardId, kind: EntityKind) -> bool {
        registry
            .capabilities(shard)
            .is_some_and(|active| self.is_fresh_with(active, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_requirements() {
        let policy = ConsistencyPolicy::default();
        assert_eq!(policy.required(EntityKind::Member), Capabilities::GUILD_MEMBERS);
        assert_eq!(policy.required(EntityKind::Role), Capabilities::GUILDS);

        assert!(policy.is_fresh_with(Capabilities::GUILDS, EntityKind::Channel));
        assert!(!policy.is_fresh_with(Capabilities::GUILDS, EntityKind::Member));
        assert!(policy.is_fresh_with(
            Capabilities::GUILDS | Capabilities::GUILD_MEMBERS,
            EntityKind::Member
        ));
    }

    #[test]
    fn test_override_requirement() {
        let policy = ConsistencyPolicy::new().with_requirement(
            EntityKind::Member,
            Capabilities::GUILD_MEMBERS | Capabilities::GUILD_PRESENCES,
        );
        assert!(!policy.is_fresh_with(Capabilities::GUILD_MEMBERS, EntityKind::Member));

        let relaxed =
            ConsistencyPolicy::new().with_requirement(EntityKind::Member, Capabilities::empty());
        assert!(relaxed.is_fresh_with(Capabilities::empty(), EntityKind::Member));
    }

    #[test]
    fn test_is_fresh_reads_registry() {
        let registry = ShardRegistry::new();
        registry.on_shard_ready(0, Capabilities::GUILDS);
        registry.on_shard_ready(1, Capabilities::GUILDS | Capabilities::GUILD_MEMBERS);

        let policy = ConsistencyPolicy::default();
        assert!(!policy.is_fresh(&registry, 0, EntityKind::Member));
        assert!(policy.is_fresh(&registry, 1, EntityKind::Member));
        assert!(!policy.is_fresh(&registry, 7, EntityKind::Role));

        registry.on_shard_gone(1);
        assert!(!policy.is_fresh(&registry, 1, EntityKind::Member));
    }
}
