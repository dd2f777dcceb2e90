//! Shardcache Test Utilities
//!
//! Shared test infrastructure for the shardcache workspace:
//! - A scriptable mock transport
//! - Proptest generators for identifiers, names and entities
//! - Fixtures for common shard layouts
//! - Assertions for retrieval results
//! - Tracing setup for tests

pub use shardcache_core::{
    CacheConfig, Capabilities, Entity, EntityKind, EntityTransport, FetchRequest, GatewayEvent,
    RetrievalError, ShardId, Snowflake, TransportError,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// One fetch the mock transport received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFetch {
    pub shard: ShardId,
    pub kind: EntityKind,
    pub request: FetchRequest,
}

#[derive(Debug, Default)]
struct MockState {
    entities: BTreeMap<(ShardId, Snowflake), Entity>,
    delay: Option<Duration>,
    failure: Option<String>,
    requests: Vec<RecordedFetch>,
}

/// In-memory transport answering from a scripted entity table.
///
/// - `ById` returns the entity or `TransportError::NotFound`
/// - `ByIds` returns whichever ids are known (possibly none)
/// - `ByPrefix` returns entities whose name or nickname starts with the
///   prefix, case-insensitively, in id order
///
/// An optional delay is slept with `tokio::time::sleep`, so paused-clock
/// tests control it exactly.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `entity` fetchable through `shard`.
    pub fn insert(&self, shard: ShardId, entity: Entity) {
        self.state.lock().entities.insert((shard, entity.id), entity);
    }

    /// Delay every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Fail every request with `TransportError::Failure`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.state.lock().failure = Some(reason.into());
    }

    /// Go back to answering normally.
    pub fn recover(&self) {
        self.state.lock().failure = None;
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedFetch> {
        self.state.lock().requests.clone()
    }

    fn answer(
        &self,
        shard: ShardId,
        kind: EntityKind,
        request: &FetchRequest,
    ) -> Result<Vec<Entity>, TransportError> {
        let state = self.state.lock();
        if let Some(reason) = &state.failure {
            return Err(TransportError::Failure {
                reason: reason.clone(),
            });
        }
        let lookup = |id: &Snowflake| {
            state
                .entities
                .get(&(shard, *id))
                .filter(|entity| entity.kind == kind)
                .cloned()
        };
        match request {
            FetchRequest::ById(id) => lookup(id)
                .map(|entity| vec![entity])
                .ok_or(TransportError::NotFound),
            FetchRequest::ByIds(ids) => Ok(ids.iter().filter_map(lookup).collect()),
            FetchRequest::ByPrefix { prefix, limit } => {
                let prefix = prefix.to_lowercase();
                let matches = |name: &str| name.to_lowercase().starts_with(&prefix);
                Ok(state
                    .entities
                    .iter()
                    .filter(|((owner, _), entity)| *owner == shard && entity.kind == kind)
                    .map(|(_, entity)| entity)
                    .filter(|entity| {
                        matches(&entity.name) || entity.nickname.as_deref().is_some_and(matches)
                    })
                    .take(*limit)
                    .cloned()
                    .collect())
            }
        }
    }
}

#[async_trait]
impl EntityTransport for MockTransport {
    async fn fetch(
        &self,
        shard: ShardId,
        kind: EntityKind,
        request: FetchRequest,
    ) -> Result<Vec<Entity>, TransportError> {
        let delay = {
            let mut state = self.state.lock();
            state.requests.push(RecordedFetch {
                shard,
                kind,
                request: request.clone(),
            });
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.answer(shard, kind, &request)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for shardcache types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a snowflake from a small id space, so collisions happen.
    pub fn arb_snowflake() -> impl Strategy<Value = Snowflake> {
        (0u64..256).prop_map(Snowflake::new)
    }

    /// Generate a short mixed-case name over a narrow alphabet.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[a-dA-D]{1,6}"
    }

    pub fn arb_entity_kind() -> impl Strategy<Value = EntityKind> {
        prop_oneof![
            Just(EntityKind::Member),
            Just(EntityKind::Role),
            Just(EntityKind::Channel),
        ]
    }

    pub fn arb_capabilities() -> impl Strategy<Value = Capabilities> {
        prop_oneof![
            Just(Capabilities::empty()),
            Just(Capabilities::GUILDS),
            Just(Capabilities::GUILDS | Capabilities::GUILD_MEMBERS),
            Just(Capabilities::all()),
        ]
    }

    /// Generate a member with an optional nickname.
    pub fn arb_member() -> impl Strategy<Value = Entity> {
        (arb_snowflake(), arb_name(), proptest::option::of(arb_name())).prop_map(
            |(id, name, nickname)| {
                let member = Entity::member(id, name);
                match nickname {
                    Some(nickname) => member.with_nickname(nickname),
                    None => member,
                }
            },
        )
    }

    /// Generate a role with a small position range, so ties happen.
    pub fn arb_role() -> impl Strategy<Value = Entity> {
        (arb_snowflake(), arb_name(), -3i32..4)
            .prop_map(|(id, name, position)| Entity::role(id, name, position))
    }

    /// Generate an entity mutation event for one of `shards` shards.
    pub fn arb_entity_event(shards: ShardId) -> impl Strategy<Value = GatewayEvent> {
        let shards = shards.max(1);
        prop_oneof![
            3 => (0..shards, arb_member())
                .prop_map(|(shard, entity)| GatewayEvent::EntityUpserted { shard, entity }),
            1 => (0..shards, arb_snowflake()).prop_map(|(shard, id)| GatewayEvent::EntityRemoved {
                shard,
                kind: EntityKind::Member,
                id,
            }),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities and configurations for common scenarios.

    use super::*;

    /// Configuration with short limits so edge cases are cheap to reach.
    pub fn small_config() -> CacheConfig {
        CacheConfig::default()
            .with_max_batch_size(4)
            .with_max_prefix_limit(10)
            .with_retrieval_timeout(Duration::from_secs(10))
    }

    /// Events readying shards `0..count` with `capabilities`.
    pub fn shards_ready(count: ShardId, capabilities: Capabilities) -> Vec<GatewayEvent> {
        (0..count)
            .map(|shard| GatewayEvent::ShardReady {
                shard,
                capabilities,
            })
            .collect()
    }

    /// Member `100` "Ann" on shard 0 and member `200` "Anna" on shard 1.
    pub fn ann_and_anna() -> Vec<GatewayEvent> {
        vec![
            GatewayEvent::EntityUpserted {
                shard: 0,
                entity: Entity::member(100u64, "Ann"),
            },
            GatewayEvent::EntityUpserted {
                shard: 1,
                entity: Entity::member(200u64, "Anna"),
            },
        ]
    }

    /// A role hierarchy with a position tie between ids 20 and 30.
    pub fn role_ladder() -> Vec<Entity> {
        vec![
            Entity::role(30u64, "helpers", 1),
            Entity::role(10u64, "admins", 2),
            Entity::role(20u64, "mods", 1),
            Entity::role(5u64, "everyone", 0),
        ]
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for retrieval outcomes.

    use super::*;
    use std::borrow::Borrow;

    /// Assert the ids of `entities` equal `expected` as a set.
    #[track_caller]
    pub fn assert_same_ids<E: Borrow<Entity>>(entities: &[E], expected: &[u64]) {
        let mut actual: Vec<u64> = entities.iter().map(|e| e.borrow().id.get()).collect();
        let mut expected = expected.to_vec();
        actual.sort_unstable();
        expected.sort_unstable();
        assert_eq!(actual, expected, "entity id sets differ");
    }

    /// Assert a retrieval result is a timeout.
    #[track_caller]
    pub fn assert_timeout<T: std::fmt::Debug>(result: &Result<T, RetrievalError>) {
        match result {
            Err(RetrievalError::Timeout { .. }) => {}
            other => panic!("Expected Timeout, got: {:?}", other),
        }
    }

    /// Assert a retrieval result is a remote not-found for `kind`.
    #[track_caller]
    pub fn assert_remote_not_found<T: std::fmt::Debug>(
        result: &Result<T, RetrievalError>,
        kind: EntityKind,
    ) {
        match result {
            Err(RetrievalError::RemoteNotFound { kind: k, .. }) if *k == kind => {}
            other => panic!("Expected RemoteNotFound for {}, got: {:?}", kind, other),
        }
    }
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-friendly tracing subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to debug for the shardcache crates. Output
/// goes through the test harness writer so it only shows for failing tests.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("shardcache_storage=debug,shardcache_core=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
