use offgrid_proto::EnqueuedEffect;

use crate::{
    action_info, action_warn,
    error::LinkError,
    ids,
    link::{LinkChain, Response},
    store::OfflineStore,
};

/// Send one queued mutation for real and fold the confirmed result into the cache.
///
/// This does not retire the effect. The driver commits or discards it depending on the outcome,
/// and a failure is only broadcast here, never retried.
#[cfg_attr(feature = "instrument", tracing::instrument(level = "debug", skip_all, fields(effect = %effect)))]
pub async fn execute_effect(store: &OfflineStore, chain: &LinkChain, effect: &EnqueuedEffect) -> Result<Response, LinkError> {
    store.hydrated().await;

    let ids_map = store.ids_map();
    let variables = ids::substitute(&effect.operation.variables, &ids_map);
    let optimistic = effect.optimistic_response.as_ref().map(|data| ids::substitute(data, &ids_map));
    let updater = store.updater_for(effect);

    let mut operation = effect.operation.clone();
    operation.variables = variables.clone();
    operation.context.execute = true;
    operation.context.attempt_id = Some(effect.attempt_id);

    action_info!(effect, "execute");
    let outcome = match chain.execute(operation).await {
        Ok(response) if response.result.has_errors() => Err(LinkError::GraphQL(response.result.errors)),
        other => other,
    };

    match outcome {
        Ok(response) => {
            store.apply_confirmed(effect, &variables, optimistic.as_ref(), &response.result, updater.as_ref());
            action_info!(effect, "confirmed");
            Ok(Response::network(response.result))
        }
        Err(err) => {
            action_warn!(effect, "failed", "{}", err);
            store.cache().broadcast();
            Err(err)
        }
    }
}
