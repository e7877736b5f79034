use async_trait::async_trait;
use offgrid_proto::{Operation, OperationKind};
use tracing::debug;

use crate::{
    error::LinkError,
    link::{Link, NextLink, Response},
    store::OfflineStore,
};

/// Routes operations between the local cache, the outbox and the rest of the chain.
///
/// * operations flagged `require_online` and mutations replayed by the outbox go on unchanged
/// * queries while offline are answered from the cache, a miss answers with no data
/// * every other mutation is queued and answered with its optimistic data
pub struct OfflineLink {
    store: OfflineStore,
}

impl OfflineLink {
    pub fn new(store: OfflineStore) -> Self { Self { store } }
}

#[async_trait]
impl Link for OfflineLink {
    async fn request(&self, operation: Operation, forward: NextLink) -> Result<Response, LinkError> {
        if operation.context.require_online {
            return forward.run(operation).await;
        }

        match operation.kind() {
            OperationKind::Query if !self.store.network().is_online() => {
                match self.store.cache().read(&operation.document, &operation.variables) {
                    Ok(data) => Ok(Response::cache(data)),
                    Err(err) => {
                        debug!("Offline read of {} missed: {}", operation, err);
                        Ok(Response::cache_miss())
                    }
                }
            }
            OperationKind::Mutation if !operation.context.execute => {
                let online = self.store.network().is_online();
                let optimistic = self.store.enqueue(operation).await;
                Ok(if online { Response::queued(optimistic) } else { Response::optimistic(optimistic) })
            }
            _ => forward.run(operation).await,
        }
    }
}
