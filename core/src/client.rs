use offgrid_proto::{AttemptId, Document, EnqueuedEffect, FetchPolicy, FetchResult, IdsMap, Operation, OperationContext};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::{
    cache::{CacheOptions, InMemoryCache, NormalizedCache},
    callback::OfflineCallback,
    discard::DiscardCondition,
    driver::{OutboxDriver, RetryPolicy},
    error::{ConfigError, LinkError, MutationError, QueryError, StorageError},
    ids::{default_client_id_predicate, ClientIdPredicate},
    link::{create_network_link, HydrationGate, Link, LinkChain, Response, ResultOrigin},
    network::NetworkStatus,
    offline_link::OfflineLink,
    storage::{MemoryStorage, Persistor, Storage},
    store::{EffectHandles, OfflineStore, PendingMutation, StoreConfig},
    update::{fold_result, CacheUpdates, MutationUpdater},
};

pub const DEFAULT_KEY_PREFIX: &str = "offgrid";

#[derive(Clone)]
pub struct OfflineConfig {
    pub discard_condition: DiscardCondition,
    pub callback: Option<OfflineCallback>,
    pub storage: Arc<dyn Storage>,
    pub key_prefix: String,
    pub retry: RetryPolicy,
    pub is_client_id: ClientIdPredicate,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            discard_condition: DiscardCondition::default(),
            callback: None,
            storage: Arc::new(MemoryStorage::new()),
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            retry: RetryPolicy::default(),
            is_client_id: default_client_id_predicate(),
        }
    }
}

#[derive(Clone, Default)]
pub struct OfflineClientOptions {
    /// Send everything straight through the chain without queueing or persistence.
    pub disable_offline: bool,
    /// Links placed in front of the offline link.
    pub offline_links: Vec<Arc<dyn Link>>,
    /// The transport at the end of the chain.
    pub online_link: Option<Arc<dyn Link>>,
    /// Replaces the default composition. The hydration gate is still put in front.
    pub link: Option<LinkChain>,
    pub cache: CacheOptions,
    pub mutation_cache_updates: CacheUpdates,
    pub offline: OfflineConfig,
    /// Connectivity handle. Keep a clone to report changes.
    pub network: NetworkStatus,
}

impl OfflineClientOptions {
    pub fn new(online_link: Arc<dyn Link>) -> Self { Self { online_link: Some(online_link), ..Default::default() } }

    pub fn disable_offline(mut self, disable: bool) -> Self {
        self.disable_offline = disable;
        self
    }

    pub fn offline_link(mut self, link: Arc<dyn Link>) -> Self {
        self.offline_links.push(link);
        self
    }

    pub fn cache_updates(mut self, updates: CacheUpdates) -> Self {
        self.mutation_cache_updates = updates;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.offline.storage = storage;
        self
    }

    pub fn callback(mut self, callback: OfflineCallback) -> Self {
        self.offline.callback = Some(callback);
        self
    }

    pub fn discard_condition(mut self, condition: DiscardCondition) -> Self {
        self.offline.discard_condition = condition;
        self
    }

    pub fn retry(mut self, initial_backoff: Duration, max_backoff: Duration) -> Self {
        self.offline.retry = RetryPolicy { initial_backoff, max_backoff };
        self
    }

    pub fn network(mut self, network: NetworkStatus) -> Self {
        self.network = network;
        self
    }

    /// Decides which data ids in an optimistic response were generated locally.
    pub fn client_id_predicate(mut self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.offline.is_client_id = Arc::new(predicate);
        self
    }
}

/// Optimistic data, fixed or computed from the variables at enqueue time.
#[derive(Clone)]
pub enum OptimisticResponse {
    Static(Value),
    Computed(Arc<dyn Fn(&Value) -> Value + Send + Sync>),
}

impl OptimisticResponse {
    pub fn evaluate(&self, variables: &Value) -> Value {
        match self {
            OptimisticResponse::Static(value) => value.clone(),
            OptimisticResponse::Computed(f) => f(variables),
        }
    }
}

#[derive(Clone)]
pub struct MutationOptions {
    pub document: Document,
    pub variables: Value,
    pub optimistic_response: Option<OptimisticResponse>,
    pub update: Option<MutationUpdater>,
    pub fetch_policy: FetchPolicy,
    pub context: OperationContext,
}

impl MutationOptions {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            variables: Value::Object(Default::default()),
            optimistic_response: None,
            update: None,
            fetch_policy: FetchPolicy::default(),
            context: OperationContext::default(),
        }
    }

    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    pub fn optimistic(mut self, data: Value) -> Self {
        self.optimistic_response = Some(OptimisticResponse::Static(data));
        self
    }

    pub fn optimistic_fn(mut self, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.optimistic_response = Some(OptimisticResponse::Computed(Arc::new(f)));
        self
    }

    pub fn update(mut self, update: MutationUpdater) -> Self {
        self.update = Some(update);
        self
    }

    pub fn fetch_policy(mut self, fetch_policy: FetchPolicy) -> Self {
        self.fetch_policy = fetch_policy;
        self
    }

    pub fn context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }
}

#[derive(Clone)]
pub struct QueryOptions {
    pub document: Document,
    pub variables: Value,
    pub fetch_policy: FetchPolicy,
    pub context: OperationContext,
}

impl QueryOptions {
    pub fn new(document: Document) -> Self {
        Self { document, variables: Value::Object(Default::default()), fetch_policy: FetchPolicy::default(), context: OperationContext::default() }
    }

    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    pub fn fetch_policy(mut self, fetch_policy: FetchPolicy) -> Self {
        self.fetch_policy = fetch_policy;
        self
    }

    pub fn context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }
}

/// A GraphQL client that keeps working without a network.
///
/// Mutations issued through it are queued, applied optimistically and replayed in order once the
/// network is back. The queue, the identifier map and the cache survive restarts through the
/// configured [`Storage`].
pub struct OfflineClient {
    store: OfflineStore,
    chain: LinkChain,
    driver: Option<OutboxDriver>,
    cache_updates: CacheUpdates,
    offline_enabled: bool,
}

impl OfflineClient {
    /// Build the client and start restoring persisted state in the background. Must be called
    /// from within a tokio runtime.
    pub async fn new(options: OfflineClientOptions) -> Result<Self, ConfigError> {
        let OfflineClientOptions { disable_offline, offline_links, online_link, link, cache, mutation_cache_updates, offline, network } = options;
        let offline_enabled = !disable_offline;

        let store = OfflineStore::new(
            StoreConfig {
                data_id_from_object: cache.data_id_from_object.clone(),
                is_client_id: offline.is_client_id.clone(),
                cache_updates: mutation_cache_updates.clone(),
                callback: offline.callback.clone(),
            },
            Arc::new(InMemoryCache::new(cache)),
            network,
            offline_enabled.then(|| Persistor::new(offline.storage.clone(), offline.key_prefix.clone())),
        );

        let chain = match link {
            Some(chain) => chain,
            None => {
                let online_link = online_link.ok_or(ConfigError::MissingOnlineLink)?;
                let offline_link = offline_enabled.then(|| Arc::new(OfflineLink::new(store.clone())) as Arc<dyn Link>);
                create_network_link(offline_links, offline_link, online_link)
            }
        };
        let chain = chain.prepend(Arc::new(HydrationGate::new(store.hydrated_flag())));

        let driver = if offline_enabled {
            tokio::spawn({
                let store = store.clone();
                async move { store.rehydrate().await }
            });
            Some(OutboxDriver::start(store.clone(), chain.clone(), offline.discard_condition, offline.retry))
        } else {
            store.mark_hydrated();
            None
        };

        info!("Offline client created (offline {})", if offline_enabled { "enabled" } else { "disabled" });
        Ok(Self { store, chain, driver, cache_updates: mutation_cache_updates, offline_enabled })
    }

    /// Resolves once persisted state has been restored.
    pub async fn hydrated(&self) { self.store.hydrated().await }

    pub fn is_hydrated(&self) -> bool { self.store.is_hydrated() }

    pub fn is_offline_enabled(&self) -> bool { self.offline_enabled }

    pub fn network_connected(&self) -> bool { self.store.network().is_online() }

    pub fn set_online(&self, online: bool) { self.store.network().set_online(online) }

    pub fn network(&self) -> &NetworkStatus { self.store.network() }

    pub fn cache(&self) -> &Arc<dyn NormalizedCache> { self.store.cache() }

    pub fn link(&self) -> &LinkChain { &self.chain }

    pub fn outbox(&self) -> Vec<EnqueuedEffect> { self.store.outbox() }

    pub fn outbox_len(&self) -> usize { self.store.outbox_len() }

    pub fn ids_map(&self) -> IdsMap { self.store.ids_map() }

    /// Resolves once the outbox is empty.
    pub async fn drained(&self) {
        let mut len = self.store.watch_outbox_len();
        // the store owns the sender, so the channel outlives this borrow
        let _ = len.wait_for(|len| *len == 0).await;
    }

    /// Run a mutation. While offline this resolves with the optimistic data as soon as the mutation
    /// is queued; while online it resolves with the server's answer once the outbox has replayed it.
    pub async fn mutate(&self, options: MutationOptions) -> Result<Response, MutationError> {
        let MutationOptions { document, variables, optimistic_response, update, fetch_policy, mut context } = options;
        let attempt_id = AttemptId::new();
        context.attempt_id = Some(attempt_id);
        let optimistic = optimistic_response.map(|o| o.evaluate(&variables));
        let operation = Operation { document, variables, context };
        let update = update.or_else(|| self.cache_updates.resolve(operation.name(), &operation.context));

        let (observer, settled) = oneshot::channel();
        if self.offline_enabled {
            self.store.register(
                attempt_id,
                PendingMutation { optimistic_response: optimistic, fetch_policy },
                EffectHandles { observer: Some(observer), update: update.clone() },
            );
        }

        let document = operation.document.clone();
        let variables = operation.variables.clone();
        let response = match self.chain.execute(operation).await {
            Ok(response) => response,
            Err(err) => {
                self.store.forget(&attempt_id);
                return Err(err.into());
            }
        };

        match response.origin {
            ResultOrigin::Queued => match settled.await {
                Ok(outcome) => outcome,
                Err(_) => Err(MutationError::Dropped),
            },
            ResultOrigin::Network => {
                // went around the outbox: bypass, replay-free chain or offline disabled
                self.store.forget(&attempt_id);
                if response.result.has_errors() {
                    return Err(LinkError::GraphQL(response.result.errors).into());
                }
                if fetch_policy.writes_cache() {
                    self.fold(&document, &variables, &response.result, update.as_ref());
                }
                Ok(response)
            }
            ResultOrigin::Optimistic | ResultOrigin::Cache => Ok(response),
        }
    }

    fn fold(&self, document: &Document, variables: &Value, result: &FetchResult, update: Option<&MutationUpdater>) {
        if let Err(err) = fold_result(self.cache().as_ref(), document, variables, result, update) {
            debug!("Writing the result of {} to the cache failed: {}", document.kind, err);
        }
        self.cache().broadcast();
    }

    pub async fn query(&self, options: QueryOptions) -> Result<Response, QueryError> {
        let QueryOptions { document, variables, fetch_policy, context } = options;
        // cache reads must not see a partially restored cache
        self.store.hydrated().await;

        if matches!(fetch_policy, FetchPolicy::CacheFirst | FetchPolicy::CacheOnly) {
            match self.cache().read(&document, &variables) {
                Ok(data) => return Ok(Response::cache(data)),
                Err(err) if fetch_policy == FetchPolicy::CacheOnly => return Err(err.into()),
                Err(err) => debug!("Cache miss for {}: {}", document.kind, err),
            }
        }

        let operation = Operation { document: document.clone(), variables: variables.clone(), context };
        let response = self.chain.execute(operation).await?;
        if response.origin == ResultOrigin::Network {
            if response.result.has_errors() {
                return Err(LinkError::GraphQL(response.result.errors).into());
            }
            if fetch_policy.writes_cache() && response.result.data.is_some() {
                self.fold(&document, &variables, &response.result, None);
            }
        }
        Ok(response)
    }

    /// Wipe queued mutations, metadata and cache, then tell watchers.
    pub async fn reset_store(&self) -> Result<(), StorageError> {
        self.store.clear().await?;
        self.cache().broadcast();
        Ok(())
    }

    /// Wipe queued mutations, metadata and cache without telling watchers.
    pub async fn clear_store(&self) -> Result<(), StorageError> { self.store.clear().await }

    /// Stop replaying. Queued mutations stay persisted for the next start.
    pub async fn shutdown(&self) {
        if let Some(driver) = &self.driver {
            driver.shutdown().await;
        }
    }
}
