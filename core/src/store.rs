//! The offline state shared by the offline link, the effect executor and the outbox driver.
//!
//! Outbox and metadata live behind one mutex together, and every sequence that rewrites the cache
//! on their behalf (optimistic write, snapshot restore, fold, cascade) runs to completion while it
//! is held. Nothing awaits under that lock; persistence takes a copy and writes it afterwards.

use offgrid_proto::{AttemptId, EnqueuedEffect, FetchPolicy, FetchResult, IdsMap, MetadataState, Operation, PersistedState};
use serde_json::Value;
use std::{
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard},
};
use tokio::sync::{oneshot, watch, Notify};
use tracing::{error, info, warn};

use crate::{
    action_info, action_warn,
    cache::NormalizedCache,
    callback::{self, ErrorRecord, OfflineCallback, SuccessRecord},
    error::{LinkError, MutationError, StorageError},
    ids::{self, default_client_id_predicate, default_id_getter, ClientIdPredicate, IdGetter},
    link::Response,
    network::NetworkStatus,
    outbox::Outbox,
    snapshot,
    storage::Persistor,
    update::{fold_result, CacheUpdates, MutationUpdater},
    util::{OneTimeFlag, SafeMap},
};

pub type Observer = oneshot::Sender<Result<Response, MutationError>>;

#[derive(Clone)]
pub struct StoreConfig {
    pub data_id_from_object: IdGetter,
    pub is_client_id: ClientIdPredicate,
    pub cache_updates: CacheUpdates,
    pub callback: Option<OfflineCallback>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_id_from_object: default_id_getter(),
            is_client_id: default_client_id_predicate(),
            cache_updates: CacheUpdates::default(),
            callback: None,
        }
    }
}

/// What the caller hands over with a mutation that can't be persisted.
#[derive(Default)]
pub struct PendingMutation {
    pub optimistic_response: Option<Value>,
    pub fetch_policy: FetchPolicy,
}

/// Lives as long as the effect is queued.
#[derive(Default)]
pub struct EffectHandles {
    pub observer: Option<Observer>,
    pub update: Option<MutationUpdater>,
}

#[derive(Default)]
struct OfflineState {
    outbox: Outbox,
    metadata: MetadataState,
}

pub struct StoreInner {
    state: Mutex<OfflineState>,
    cache: Arc<dyn NormalizedCache>,
    network: NetworkStatus,
    hydrated: OneTimeFlag,
    pending: SafeMap<AttemptId, PendingMutation>,
    handles: SafeMap<AttemptId, EffectHandles>,
    persistor: Option<Persistor>,
    persist_lock: tokio::sync::Mutex<()>,
    pub(crate) wake: Notify,
    outbox_len: watch::Sender<usize>,
    config: StoreConfig,
}

#[derive(Clone)]
pub struct OfflineStore(Arc<StoreInner>);

impl Deref for OfflineStore {
    type Target = Arc<StoreInner>;
    fn deref(&self) -> &Self::Target { &self.0 }
}

impl OfflineStore {
    pub fn new(config: StoreConfig, cache: Arc<dyn NormalizedCache>, network: NetworkStatus, persistor: Option<Persistor>) -> Self {
        let (outbox_len, _) = watch::channel(0);
        Self(Arc::new(StoreInner {
            state: Mutex::new(OfflineState::default()),
            cache,
            network,
            hydrated: OneTimeFlag::new(),
            pending: SafeMap::new(),
            handles: SafeMap::new(),
            persistor,
            persist_lock: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            outbox_len,
            config,
        }))
    }

    fn state(&self) -> MutexGuard<'_, OfflineState> { self.state.lock().expect("Failed to lock the offline state") }

    pub fn cache(&self) -> &Arc<dyn NormalizedCache> { &self.cache }

    pub fn network(&self) -> &NetworkStatus { &self.network }

    pub fn hydrated_flag(&self) -> OneTimeFlag { self.hydrated.clone() }

    pub async fn hydrated(&self) { self.hydrated.wait().await }

    pub fn is_hydrated(&self) -> bool { self.hydrated.is_set() }

    pub fn mark_hydrated(&self) { self.hydrated.set() }

    pub fn head(&self) -> Option<EnqueuedEffect> { self.state().outbox.head().cloned() }

    pub fn outbox(&self) -> Vec<EnqueuedEffect> { self.state().outbox.to_vec() }

    pub fn outbox_len(&self) -> usize { self.state().outbox.len() }

    pub fn watch_outbox_len(&self) -> watch::Receiver<usize> { self.outbox_len.subscribe() }

    pub fn ids_map(&self) -> IdsMap { self.state().metadata.ids_map.clone() }

    pub fn metadata(&self) -> MetadataState { self.state().metadata.clone() }

    /// Stash the transient parts of a mutation before it enters the link chain.
    pub fn register(&self, attempt_id: AttemptId, pending: PendingMutation, handles: EffectHandles) {
        self.pending.insert(attempt_id, pending);
        self.handles.insert(attempt_id, handles);
    }

    /// Drop the transient parts of a mutation that never made it into the outbox.
    pub fn forget(&self, attempt_id: &AttemptId) {
        self.pending.remove(attempt_id);
        self.handles.remove(attempt_id);
    }

    /// The explicitly attached updater, else the one registered under the operation name.
    pub fn updater_for(&self, effect: &EnqueuedEffect) -> Option<MutationUpdater> {
        self.handles
            .with(&effect.attempt_id, |handles| handles.and_then(|h| h.update.clone()))
            .or_else(|| self.config.cache_updates.resolve(effect.operation_name(), &effect.operation.context))
    }

    /// Queue a mutation and apply its optimistic response. Returns the optimistic data, or an
    /// object of nulls when there is none.
    pub async fn enqueue(&self, mut operation: Operation) -> Value {
        let attempt_id = operation.context.attempt_id.unwrap_or_default();
        operation.context.attempt_id = Some(attempt_id);
        let PendingMutation { optimistic_response, fetch_policy } = self.pending.remove(&attempt_id).unwrap_or_default();
        let null_response = operation.document.null_response();

        let optimistic = {
            let mut state = self.state();
            // the batch may already have resolved ids this mutation refers to
            operation.variables = ids::substitute(&operation.variables, &state.metadata.ids_map);
            let optimistic = optimistic_response.map(|data| ids::substitute(&data, &state.metadata.ids_map));

            let effect = EnqueuedEffect::new(operation, optimistic.clone(), fetch_policy);
            snapshot::open_mutation(&mut state.metadata.snapshot, self.cache.as_ref());
            if let Some(data) = &optimistic {
                let client_ids = ids::record_client_ids(&self.config.data_id_from_object, &self.config.is_client_id, data);
                ids::register_client_ids(&mut state.metadata.ids_map, &client_ids);
                if fetch_policy.writes_cache() {
                    self.apply_optimistic(&effect, data);
                }
            }

            action_info!(effect, "enqueued", "{} outstanding", state.metadata.snapshot.enqueued_mutations);
            state.outbox.enqueue(effect);
            self.outbox_len.send_replace(state.outbox.len());
            optimistic
        };

        self.cache.broadcast();
        self.persist_logged().await;
        self.wake.notify_one();
        optimistic.unwrap_or(null_response)
    }

    fn apply_optimistic(&self, effect: &EnqueuedEffect, data: &Value) {
        let updater = self.updater_for(effect);
        let result = FetchResult::data(data.clone());
        if let Err(err) = fold_result(self.cache.as_ref(), &effect.operation.document, &effect.operation.variables, &result, updater.as_ref()) {
            warn!("Optimistic write of {} failed: {}", effect, err);
        }
    }

    /// Re-apply the optimistic data of `effects` on top of the current cache.
    fn cascade<'a>(&self, effects: impl Iterator<Item = &'a EnqueuedEffect>) {
        let mut count = 0;
        for effect in effects {
            if let (true, Some(data)) = (effect.fetch_policy.writes_cache(), &effect.optimistic_response) {
                self.apply_optimistic(effect, data);
                count += 1;
            }
        }
        if count > 0 {
            crate::action_debug!("Outbox", "cascade", "{} optimistic write(s)", count);
        }
    }

    /// Fold a confirmed result in: resolve ids, restore the snapshot, write the result, re-checkpoint,
    /// re-apply the rest of the queue, broadcast. Then tell the caller and the host callback.
    pub fn apply_confirmed(
        &self,
        effect: &EnqueuedEffect,
        variables: &Value,
        optimistic: Option<&Value>,
        result: &FetchResult,
        updater: Option<&MutationUpdater>,
    ) {
        {
            let mut state = self.state();
            if state.outbox.head().map(|head| head.attempt_id) != Some(effect.attempt_id) {
                action_warn!(effect, "confirmed but no longer queued");
                return;
            }

            if let (Some(optimistic), Some(data)) = (optimistic, &result.data) {
                let OfflineState { outbox, metadata } = &mut *state;
                let resolved = ids::resolve_server_ids(
                    &mut metadata.ids_map,
                    &self.config.data_id_from_object,
                    &self.config.is_client_id,
                    optimistic,
                    data,
                );
                if !resolved.is_empty() {
                    action_info!(effect, "resolved ids", "{:?}", resolved);
                    outbox.substitute_ids(&metadata.ids_map);
                }
            }

            snapshot::restore(&state.metadata.snapshot, self.cache.as_ref());
            if effect.fetch_policy.writes_cache() {
                if let Err(err) = fold_result(self.cache.as_ref(), &effect.operation.document, variables, result, updater) {
                    warn!("Writing the result of {} failed: {}", effect, err);
                }
            }
            snapshot::checkpoint(&mut state.metadata.snapshot, self.cache.as_ref());
            self.cascade(state.outbox.remaining());
        }
        self.cache.broadcast();

        let observer = self.handles.remove(&effect.attempt_id).and_then(|handles| handles.observer);
        let notified = match observer {
            Some(observer) => observer.send(Ok(Response::network(result.clone()))).is_ok(),
            None => false,
        };
        let record = SuccessRecord { mutation: effect.mutation_field().map(str::to_owned), variables: variables.clone(), data: result.clone(), notified };
        callback::invoke(self.config.callback.as_ref(), None, Some(&record));
    }

    /// Retire the head after a confirmed replay.
    pub async fn commit(&self, attempt_id: &AttemptId) {
        {
            let mut state = self.state();
            if state.outbox.commit(attempt_id).is_none() {
                return;
            }
            self.settle(&mut state);
        }
        self.handles.remove(attempt_id);
        self.publish_len();
        self.persist_logged().await;
    }

    /// Drop the head after a permanent failure: take its optimistic data back out of the cache and
    /// report the failure to the caller and the host callback.
    pub async fn discard(&self, effect: &EnqueuedEffect, error: LinkError) {
        {
            let mut state = self.state();
            if state.outbox.rollback(&effect.attempt_id).is_none() {
                return;
            }
            action_warn!(effect, "discarded", "{}", error);
            snapshot::restore(&state.metadata.snapshot, self.cache.as_ref());
            self.cascade(state.outbox.iter());
            self.settle(&mut state);
        }
        self.cache.broadcast();

        let observer = self.handles.remove(&effect.attempt_id).and_then(|handles| handles.observer);
        let notified = match observer {
            Some(observer) => observer.send(Err(MutationError::Discarded(error.clone()))).is_ok(),
            None => false,
        };
        let variables = ids::substitute(&effect.operation.variables, &self.ids_map());
        let record = ErrorRecord { mutation: effect.mutation_field().map(str::to_owned), variables, error, notified };
        callback::invoke(self.config.callback.as_ref(), Some(&record), None);

        self.publish_len();
        self.persist_logged().await;
    }

    fn settle(&self, state: &mut OfflineState) {
        if snapshot::settle_mutation(&mut state.metadata.snapshot) == 0 {
            state.metadata.ids_map.clear();
        }
    }

    /// Wake `drained()` waiters. Called only once everything about the retired effect is reported.
    fn publish_len(&self) { self.outbox_len.send_replace(self.outbox_len()); }

    /// Load durable state and re-apply every still-queued mutation's optimistic data, then open the
    /// hydration gate. A state that can't be read is logged and replaced by an empty one.
    #[cfg_attr(feature = "instrument", tracing::instrument(level = "debug", skip_all))]
    pub async fn rehydrate(&self) {
        let loaded = match &self.persistor {
            Some(persistor) => match persistor.load().await {
                Ok(loaded) => loaded,
                Err(err) => {
                    error!("Failed to load offline state, starting empty: {}", err);
                    PersistedState::default()
                }
            },
            None => PersistedState::default(),
        };

        {
            let mut state = self.state();
            let PersistedState { outbox, mut metadata, cache } = loaded;

            // the persisted cache already holds the optimistic writes, start from the restore point
            let base = if metadata.snapshot.enqueued_mutations > 0 && !outbox.is_empty() { metadata.snapshot.cache.clone() } else { cache };
            if metadata.snapshot.enqueued_mutations != outbox.len() {
                warn!("Outstanding count {} does not match {} queued effects", metadata.snapshot.enqueued_mutations, outbox.len());
                metadata.snapshot.enqueued_mutations = outbox.len();
            }
            if outbox.is_empty() {
                metadata.ids_map.clear();
            }

            self.cache.restore(base);
            let mut outbox = Outbox::from_effects(outbox);
            outbox.substitute_ids(&metadata.ids_map);
            self.cascade(outbox.iter());

            action_info!("OfflineStore", "rehydrated", "{} queued, {} known ids", outbox.len(), metadata.ids_map.len());
            self.outbox_len.send_replace(outbox.len());
            *state = OfflineState { outbox, metadata };
        }

        self.cache.broadcast();
        self.hydrated.set();
        self.wake.notify_one();
    }

    /// Empty the outbox, metadata and cache. Callers still waiting on a queued mutation get
    /// [`MutationError::Dropped`].
    pub async fn clear(&self) -> Result<(), StorageError> {
        {
            let mut state = self.state();
            *state = OfflineState::default();
            self.cache.reset();
            self.pending.clear();
            self.handles.clear();
            self.outbox_len.send_replace(0);
        }
        info!("Offline store cleared");
        self.persist().await
    }

    fn persisted_state(&self) -> PersistedState {
        let state = self.state();
        PersistedState { outbox: state.outbox.to_vec(), metadata: state.metadata.clone(), cache: self.cache.extract() }
    }

    /// Write the current state. Concurrent calls are serialized and each writes what is current
    /// when its turn comes, so the last write always wins with the latest state.
    pub async fn persist(&self) -> Result<(), StorageError> {
        let Some(persistor) = &self.persistor else { return Ok(()) };
        let _guard = self.persist_lock.lock().await;
        let state = self.persisted_state();
        persistor.save(&state).await
    }

    async fn persist_logged(&self) {
        if let Err(err) = self.persist().await {
            error!("Failed to persist offline state: {}", err);
        }
    }
}
