use futures::future::BoxFuture;
use offgrid_proto::EnqueuedEffect;
use std::{future::Future, sync::Arc};

use crate::error::{LinkError, ERROR_STATUS_CODE};

type ConditionFn = dyn Fn(&LinkError, &EnqueuedEffect, u32) -> BoxFuture<'static, bool> + Send + Sync;

/// Host policy for failures that are not permanent by themselves.
#[derive(Clone)]
pub struct DiscardCondition(Arc<ConditionFn>);

impl DiscardCondition {
    /// Keep retrying transient failures forever.
    pub fn never() -> Self { Self::from_fn(|_, _, _| false) }

    /// Give up once an effect has been retried `max_retries` times.
    pub fn max_retries(max_retries: u32) -> Self { Self::from_fn(move |_, _, retries| retries >= max_retries) }

    pub fn from_fn<F>(condition: F) -> Self
    where F: Fn(&LinkError, &EnqueuedEffect, u32) -> bool + Send + Sync + 'static {
        Self(Arc::new(move |error: &LinkError, effect: &EnqueuedEffect, retries: u32| -> BoxFuture<'static, bool> {
            let discard = condition(error, effect, retries);
            Box::pin(async move { discard })
        }))
    }

    pub fn from_async<F, Fut>(condition: F) -> Self
    where
        F: Fn(LinkError, EnqueuedEffect, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self(Arc::new(move |error: &LinkError, effect: &EnqueuedEffect, retries: u32| -> BoxFuture<'static, bool> {
            Box::pin(condition(error.clone(), effect.clone(), retries))
        }))
    }

    pub async fn evaluate(&self, error: &LinkError, effect: &EnqueuedEffect, retries: u32) -> bool { (self.0)(error, effect, retries).await }
}

impl Default for DiscardCondition {
    fn default() -> Self { Self::never() }
}

impl std::fmt::Debug for DiscardCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("DiscardCondition") }
}

/// Failures that are never worth retrying, whatever the host policy says.
pub fn is_permanent(error: &LinkError) -> bool {
    !error.graphql_errors().is_empty() || error.status_code().is_some_and(|status| status >= ERROR_STATUS_CODE) || error.is_permanent()
}

/// Decide whether a failed replay is dropped for good or retried later.
pub async fn should_discard(error: &LinkError, effect: &EnqueuedEffect, retries: u32, condition: &DiscardCondition) -> bool {
    if is_permanent(error) {
        return true;
    }
    condition.evaluate(error, effect, retries).await
}
