//! Read-through retrieval over the shard registry.
//!
//! Routes each request to the cache or the transport based on the
//! [`ConsistencyPolicy`], and absorbs every transport response into the
//! registry before the waiting task resolves.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use shardcache_core::{
    shard_for_guild, CacheConfig, Entity, EntityKind, EntityTransport, FetchRequest,
    RetrievalError, ShardId, Snowflake, TransportError,
};
use tokio::time::Instant;

use super::policy::ConsistencyPolicy;
use super::stats::{CacheStats, StatsRecorder};
use super::task::RetrievalTask;
use crate::registry::{ShardCache, ShardRegistry};

/// Outcome of a retrieval call.
#[derive(Debug)]
pub enum Retrieval<T> {
    /// Answered from the cache; no task was created.
    Cached(T),
    /// Dispatched to the transport.
    Pending(RetrievalTask<T>),
}

impl<T: Clone + Send + Sync + 'static> Retrieval<T> {
    pub fn is_cached(&self) -> bool {
        matches!(self, Retrieval::Cached(_))
    }

    /// The task, when one was created.
    pub fn task(&self) -> Option<&RetrievalTask<T>> {
        match self {
            Retrieval::Cached(_) => None,
            Retrieval::Pending(task) => Some(task),
        }
    }

    /// Resolve to the value, waiting on the task if there is one.
    pub async fn into_result(self) -> Result<T, RetrievalError> {
        match self {
            Retrieval::Cached(value) => Ok(value),
            Retrieval::Pending(task) => task.wait().await,
        }
    }
}

/// Read-through cache front end.
///
/// # Type Parameters
///
/// - `X`: The transport used on cache misses
///
/// # Panics
///
/// Methods that dispatch to the transport spawn onto the current Tokio
/// runtime and panic when called outside one.
pub struct Retriever<X: EntityTransport> {
    registry: ShardRegistry,
    transport: Arc<X>,
    policy: ConsistencyPolicy,
    config: CacheConfig,
    stats: Arc<StatsRecorder>,
}

impl<X: EntityTransport> Retriever<X> {
    pub fn new(
        registry: ShardRegistry,
        transport: Arc<X>,
        policy: ConsistencyPolicy,
        config: CacheConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            policy,
            config,
            stats: Arc::new(StatsRecorder::default()),
        }
    }

    /// Create a retriever with the default policy and configuration.
    pub fn with_defaults(registry: ShardRegistry, transport: Arc<X>) -> Self {
        Self::new(
            registry,
            transport,
            ConsistencyPolicy::default(),
            CacheConfig::default(),
        )
    }

    pub fn registry(&self) -> &ShardRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &X {
        &self.transport
    }

    pub fn policy(&self) -> &ConsistencyPolicy {
        &self.policy
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Whether `shard`'s cache of `kind` is complete and current.
    pub fn is_fresh(&self, shard: ShardId, kind: EntityKind) -> bool {
        self.policy.is_fresh(&self.registry, shard, kind)
    }

    /// Shard that owns `guild_id` under the configured shard total.
    pub fn shard_for_guild(&self, guild_id: Snowflake) -> ShardId {
        shard_for_guild(guild_id, self.config.shard_total)
    }

    /// Fetch one entity, optionally forcing a refresh.
    ///
    /// - `update == false`: any cached copy on any shard is returned as is.
    /// - `update == true`: the cache is used only when `shard` keeps `kind`
    ///   current, otherwise the transport is always asked.
    ///
    /// A transport answer that does not contain `id` resolves the task as
    /// [`RetrievalError::RemoteNotFound`].
    pub fn retrieve(
        &self,
        shard: ShardId,
        kind: EntityKind,
        id: Snowflake,
        update: bool,
    ) -> Result<Retrieval<Arc<Entity>>, RetrievalError> {
        let cached = if update {
            self.fresh_stores(shard, kind)
                .and_then(|cache| cache.entities(kind).store().get(id))
        } else {
            self.registry.view(kind).get(id)
        };
        if let Some(entity) = cached {
            self.stats.record_hit();
            return Ok(Retrieval::Cached(entity));
        }

        self.stats.record_miss();
        self.require_live(shard)?;
        let task = self.dispatch(shard, kind, FetchRequest::ById(id), move |response| {
            response
                .map_err(|error| error.into_retrieval(kind, Some(id)))?
                .into_iter()
                .find(|entity| entity.id == id && entity.kind == kind)
                .ok_or(RetrievalError::RemoteNotFound { kind, id: Some(id) })
        });
        Ok(Retrieval::Pending(task))
    }

    /// Fetch several entities at once.
    ///
    /// Duplicate ids are dropped first and the batch is rejected before any
    /// work if it is still larger than `max_batch_size`. The result holds
    /// only the ids that resolved, in request order; unresolved ids are
    /// omitted, never represented by placeholders.
    pub fn retrieve_batch(
        &self,
        shard: ShardId,
        kind: EntityKind,
        ids: &[Snowflake],
    ) -> Result<Retrieval<Vec<Arc<Entity>>>, RetrievalError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let ids: Vec<Snowflake> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        let max = self.config.max_batch_size;
        if ids.len() > max {
            return Err(RetrievalError::BatchTooLarge {
                requested: ids.len(),
                max,
            });
        }
        if ids.is_empty() {
            return Ok(Retrieval::Cached(Vec::new()));
        }

        if let Some(cache) = self.fresh_stores(shard, kind) {
            let store = cache.entities(kind).store();
            let found: Vec<Arc<Entity>> = ids.iter().filter_map(|id| store.get(*id)).collect();
            self.stats.record_hit();
            return Ok(Retrieval::Cached(found));
        }

        self.stats.record_miss();
        self.require_live(shard)?;
        let wanted = ids.clone();
        let task = self.dispatch(shard, kind, FetchRequest::ByIds(ids), move |response| {
            let entities = match response {
                Ok(entities) => entities,
                Err(TransportError::NotFound) => return Ok(Vec::new()),
                Err(error) => return Err(error.into_retrieval(kind, None)),
            };
            let mut by_id: HashMap<Snowflake, Arc<Entity>> = entities
                .into_iter()
                .filter(|entity| entity.kind == kind)
                .map(|entity| (entity.id, entity))
                .collect();
            Ok(wanted.iter().filter_map(|id| by_id.remove(id)).collect())
        });
        Ok(Retrieval::Pending(task))
    }

    /// Search `kind` on `shard` by name or nickname prefix.
    ///
    /// A shard that keeps `kind` current answers from its prefix index;
    /// otherwise the transport is asked and at most `limit` entities are
    /// returned.
    pub fn retrieve_prefix(
        &self,
        shard: ShardId,
        kind: EntityKind,
        prefix: &str,
        limit: usize,
    ) -> Result<Retrieval<Vec<Arc<Entity>>>, RetrievalError> {
        if prefix.is_empty() {
            return Err(RetrievalError::InvalidPrefix {
                reason: "prefix must not be empty".to_string(),
            });
        }
        if !kind.is_prefix_indexed() {
            return Err(RetrievalError::InvalidPrefix {
                reason: format!("{} is not searchable by name", kind),
            });
        }
        let max = self.config.max_prefix_limit;
        if limit == 0 || limit > max {
            return Err(RetrievalError::InvalidLimit { limit, max });
        }

        if let Some(cache) = self.fresh_stores(shard, kind) {
            self.stats.record_hit();
            return Ok(Retrieval::Cached(
                cache.entities(kind).query_prefix_entities(prefix, limit),
            ));
        }

        self.stats.record_miss();
        self.require_live(shard)?;
        let request = FetchRequest::ByPrefix {
            prefix: prefix.to_owned(),
            limit,
        };
        let task = self.dispatch(shard, kind, request, move |response| match response {
            Ok(entities) => Ok(entities
                .into_iter()
                .filter(|entity| entity.kind == kind)
                .take(limit)
                .collect()),
            Err(TransportError::NotFound) => Ok(Vec::new()),
            Err(error) => Err(error.into_retrieval(kind, None)),
        });
        Ok(Retrieval::Pending(task))
    }

    /// The complete cached list of `kind` on `shard`.
    ///
    /// Fails with [`RetrievalError::StaleCapabilityDenied`] when the shard
    /// connected without the capabilities that keep `kind` complete; a
    /// partial list is never returned in its place.
    pub fn cached_complete(
        &self,
        shard: ShardId,
        kind: EntityKind,
    ) -> Result<Vec<Arc<Entity>>, RetrievalError> {
        let cache = self.require_live(shard)?;
        if !self.policy.is_fresh_with(cache.capabilities(), kind) {
            let required = self.policy.required(kind);
            tracing::debug!(shard, %kind, required = required.bits(), "Complete listing denied");
            return Err(RetrievalError::StaleCapabilityDenied {
                shard,
                kind,
                required,
            });
        }
        Ok(cache.entities(kind).list())
    }

    /// Stores of `shard` if it is live and keeps `kind` current.
    fn fresh_stores(&self, shard: ShardId, kind: EntityKind) -> Option<Arc<ShardCache>> {
        self.registry
            .stores_for(shard)
            .filter(|cache| self.policy.is_fresh_with(cache.capabilities(), kind))
    }

    fn require_live(&self, shard: ShardId) -> Result<Arc<ShardCache>, RetrievalError> {
        self.registry
            .stores_for(shard)
            .ok_or(RetrievalError::ShardUnavailable { shard })
    }

    /// Spawn one transport fetch and return the task it resolves.
    ///
    /// The deadline fails the task but does not abandon the request: a late
    /// response is still absorbed into the registry for later callers. The
    /// late response gets one more `retrieval_timeout` to arrive; after that
    /// the fetch future is dropped.
    fn dispatch<T, F>(
        &self,
        shard: ShardId,
        kind: EntityKind,
        request: FetchRequest,
        finish: F,
    ) -> RetrievalTask<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Result<Vec<Arc<Entity>>, TransportError>) -> Result<T, RetrievalError>
            + Send
            + 'static,
    {
        let timeout = self.config.retrieval_timeout;
        let deadline = Instant::now() + timeout;
        let task = RetrievalTask::new(deadline);

        let handle = task.clone();
        let registry = self.registry.clone();
        let transport = Arc::clone(&self.transport);
        let stats = Arc::clone(&self.stats);

        stats.record_fetch();
        tracing::debug!(shard, %kind, ids = ?request.id_count(), "Dispatching fetch");
        tracing::trace!(shard, %kind, ?request, "Fetch request");

        tokio::spawn(async move {
            let mut fetch = transport.fetch(shard, kind, request);
            let response = tokio::select! {
                biased;
                response = &mut fetch => response,
                _ = tokio::time::sleep_until(deadline) => {
                    if handle.fail(RetrievalError::Timeout { after: timeout }) {
                        stats.record_timeout();
                        tracing::debug!(shard, %kind, ?timeout, "Retrieval timed out");
                    }
                    match tokio::time::timeout(timeout, fetch).await {
                        Ok(late) => {
                            tracing::debug!(shard, %kind, ok = late.is_ok(), "Late fetch response");
                            late
                        }
                        Err(_) => {
                            tracing::warn!(shard, %kind, ?timeout, "Late fetch abandoned");
                            return;
                        }
                    }
                }
            };

            if let Err(error) = &response {
                tracing::debug!(shard, %kind, error = %error, "Fetch failed");
            }
            let response = response.map(|entities| registry.absorb(shard, entities));
            handle.complete(finish(response));
        });

        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TaskState;
    use shardcache_core::Capabilities;
    use shardcache_test_utils::MockTransport;
    use std::time::Duration;

    const ALL: Capabilities = Capabilities::all();

    fn setup(
        capabilities: Capabilities,
    ) -> (ShardRegistry, Arc<MockTransport>, Retriever<MockTransport>) {
        let registry = ShardRegistry::new();
        registry.on_shard_ready(0, capabilities);
        let transport = Arc::new(MockTransport::new());
        let retriever = Retriever::with_defaults(registry.clone(), Arc::clone(&transport));
        (registry, transport, retriever)
    }

    fn id(raw: u64) -> Snowflake {
        Snowflake::new(raw)
    }

    #[tokio::test]
    async fn test_cached_hit_needs_no_task() {
        let (registry, transport, retriever) = setup(Capabilities::GUILDS);
        registry.on_entity_upserted(0, Entity::member(1u64, "ann"));

        let retrieval = retriever.retrieve(0, EntityKind::Member, id(1), false).unwrap();
        assert!(retrieval.is_cached());
        assert!(retrieval.task().is_none());
        assert_eq!(retrieval.into_result().await.unwrap().name, "ann");
        assert!(transport.requests().is_empty());
        assert_eq!(retriever.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_fresh_update_uses_cache() {
        let (registry, transport, retriever) = setup(ALL);
        registry.on_entity_upserted(0, Entity::member(1u64, "ann"));

        let retrieval = retriever.retrieve(0, EntityKind::Member, id(1), true).unwrap();
        assert!(retrieval.is_cached());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_miss_fetches_and_caches() {
        let (registry, transport, retriever) = setup(Capabilities::GUILDS);
        transport.insert(0, Entity::member(5u64, "remote"));

        let retrieval = retriever.retrieve(0, EntityKind::Member, id(5), false).unwrap();
        let entity = retrieval.into_result().await.unwrap();
        assert_eq!(entity.name, "remote");
        assert_eq!(
            registry.view(EntityKind::Member).get(id(5)).unwrap().name,
            "remote"
        );

        let stats = retriever.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.fetches, 1);
    }

    #[tokio::test]
    async fn test_remote_not_found_is_a_failure() {
        let (_, _, retriever) = setup(Capabilities::GUILDS);
        let retrieval = retriever.retrieve(0, EntityKind::Member, id(9), false).unwrap();
        let task = retrieval.task().unwrap().clone();

        let error = retrieval.into_result().await.unwrap_err();
        assert_eq!(
            error,
            RetrievalError::RemoteNotFound {
                kind: EntityKind::Member,
                id: Some(id(9)),
            }
        );
        assert_eq!(task.state(), TaskState::Failed);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let (_, transport, retriever) = setup(Capabilities::GUILDS);
        transport.fail_with("gateway closed");

        let error = retriever
            .retrieve(0, EntityKind::Role, id(1), true)
            .unwrap()
            .into_result()
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            RetrievalError::RemoteFailure { reason } if reason == "gateway closed"
        ));
    }

    #[tokio::test]
    async fn test_dispatch_needs_live_shard() {
        let (_, _, retriever) = setup(ALL);
        let error = retriever
            .retrieve(4, EntityKind::Member, id(1), false)
            .unwrap_err();
        assert_eq!(error, RetrievalError::ShardUnavailable { shard: 4 });
    }

    #[tokio::test]
    async fn test_batch_rejects_oversize_after_dedup() {
        let registry = ShardRegistry::new();
        registry.on_shard_ready(0, Capabilities::GUILDS);
        let transport = Arc::new(MockTransport::new());
        let retriever = Retriever::new(
            registry,
            Arc::clone(&transport),
            ConsistencyPolicy::default(),
            CacheConfig::default().with_max_batch_size(2),
        );

        let ok = retriever.retrieve_batch(0, EntityKind::Member, &[id(1), id(1), id(2)]);
        assert!(ok.is_ok());

        let error = retriever
            .retrieve_batch(0, EntityKind::Member, &[id(1), id(2), id(3)])
            .unwrap_err();
        assert_eq!(
            error,
            RetrievalError::BatchTooLarge {
                requested: 3,
                max: 2
            }
        );
    }

    #[tokio::test]
    async fn test_batch_empty_and_fresh() {
        let (registry, transport, retriever) = setup(ALL);
        registry.on_entity_upserted(0, Entity::member(1u64, "ann"));

        let empty = retriever.retrieve_batch(0, EntityKind::Member, &[]).unwrap();
        assert!(empty.is_cached());
        assert!(empty.into_result().await.unwrap().is_empty());

        let fresh = retriever
            .retrieve_batch(0, EntityKind::Member, &[id(1), id(2)])
            .unwrap();
        assert!(fresh.is_cached());
        let found = fresh.into_result().await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_prefix_validation() {
        let (_, _, retriever) = setup(ALL);
        assert!(matches!(
            retriever.retrieve_prefix(0, EntityKind::Member, "", 10),
            Err(RetrievalError::InvalidPrefix { .. })
        ));
        assert!(matches!(
            retriever.retrieve_prefix(0, EntityKind::Role, "mo", 10),
            Err(RetrievalError::InvalidPrefix { .. })
        ));
        assert_eq!(
            retriever
                .retrieve_prefix(0, EntityKind::Member, "a", 0)
                .unwrap_err(),
            RetrievalError::InvalidLimit { limit: 0, max: 100 }
        );
        assert_eq!(
            retriever
                .retrieve_prefix(0, EntityKind::Member, "a", 101)
                .unwrap_err(),
            RetrievalError::InvalidLimit {
                limit: 101,
                max: 100
            }
        );
    }

    #[tokio::test]
    async fn test_prefix_fresh_uses_index() {
        let (registry, transport, retriever) = setup(ALL);
        registry.on_entity_upserted(0, Entity::member(1u64, "Ann"));
        registry.on_entity_upserted(0, Entity::member(2u64, "bob").with_nickname("Annie"));

        let found = retriever
            .retrieve_prefix(0, EntityKind::Member, "an", 10)
            .unwrap()
            .into_result()
            .await
            .unwrap();
        let mut ids: Vec<u64> = found.iter().map(|e| e.id.get()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cached_complete_requires_capability() {
        let (registry, _, retriever) = setup(Capabilities::GUILDS);
        registry.on_entity_upserted(0, Entity::role(1u64, "mods", 1));
        registry.on_entity_upserted(0, Entity::member(2u64, "ann"));

        assert_eq!(retriever.cached_complete(0, EntityKind::Role).unwrap().len(), 1);
        assert_eq!(
            retriever.cached_complete(0, EntityKind::Member).unwrap_err(),
            RetrievalError::StaleCapabilityDenied {
                shard: 0,
                kind: EntityKind::Member,
                required: Capabilities::GUILD_MEMBERS,
            }
        );
        assert_eq!(
            retriever.cached_complete(3, EntityKind::Role).unwrap_err(),
            RetrievalError::ShardUnavailable { shard: 3 }
        );
    }

    #[test]
    fn test_shard_for_guild_uses_configured_total() {
        let retriever = Retriever::new(
            ShardRegistry::new(),
            Arc::new(MockTransport::new()),
            ConsistencyPolicy::default(),
            CacheConfig::default().with_shard_total(4),
        );
        let guild = Snowflake::new(6 << 22);
        assert_eq!(retriever.shard_for_guild(guild), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fails_task() {
        let (_, transport, retriever) = setup(Capabilities::GUILDS);
        transport.insert(0, Entity::member(1u64, "slow"));
        transport.set_delay(Duration::from_secs(30));

        let retrieval = retriever.retrieve(0, EntityKind::Member, id(1), false).unwrap();
        let error = retrieval.into_result().await.unwrap_err();
        assert_eq!(
            error,
            RetrievalError::Timeout {
                after: Duration::from_secs(10)
            }
        );
        assert_eq!(retriever.stats().timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_after_grace_is_dropped() {
        let (registry, transport, retriever) = setup(Capabilities::GUILDS);
        transport.insert(0, Entity::member(1u64, "glacial"));
        transport.set_delay(Duration::from_secs(25));

        let retrieval = retriever.retrieve(0, EntityKind::Member, id(1), false).unwrap();
        let task = retrieval.task().unwrap().clone();
        assert!(retrieval.into_result().await.is_err());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(task.state(), TaskState::Failed);
        assert!(registry.view(EntityKind::Member).get(id(1)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_within_grace_is_cached() {
        let (registry, transport, retriever) = setup(Capabilities::GUILDS);
        transport.insert(0, Entity::member(1u64, "tardy"));
        transport.set_delay(Duration::from_secs(15));

        let retrieval = retriever.retrieve(0, EntityKind::Member, id(1), false).unwrap();
        assert!(retrieval.into_result().await.is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            registry.view(EntityKind::Member).get(id(1)).unwrap().name,
            "tardy"
        );
    }
}
