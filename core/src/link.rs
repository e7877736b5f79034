use async_trait::async_trait;
use offgrid_proto::{FetchResult, Operation};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::{error::LinkError, util::OneTimeFlag};

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOrigin {
    /// Confirmed by the transport.
    Network,
    /// Optimistic payload of a mutation queued while offline. This is the caller's final answer.
    Optimistic,
    /// Optimistic payload of a mutation queued while online. The confirmed result follows through
    /// the caller's observer once the outbox replays it.
    Queued,
    /// Read from the local cache.
    Cache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub result: FetchResult,
    pub origin: ResultOrigin,
}

impl Response {
    pub fn network(result: FetchResult) -> Self { Self { result, origin: ResultOrigin::Network } }

    pub fn optimistic(data: Value) -> Self { Self { result: FetchResult::data(data), origin: ResultOrigin::Optimistic } }

    pub fn queued(data: Value) -> Self { Self { result: FetchResult::data(data), origin: ResultOrigin::Queued } }

    pub fn cache(data: Value) -> Self { Self { result: FetchResult::data(data), origin: ResultOrigin::Cache } }

    /// A cache read that found nothing.
    pub fn cache_miss() -> Self { Self { result: FetchResult::empty(), origin: ResultOrigin::Cache } }

    pub fn is_optimistic(&self) -> bool { matches!(self.origin, ResultOrigin::Optimistic | ResultOrigin::Queued) }

    pub fn data(&self) -> Option<&Value> { self.result.data.as_ref() }
}

impl From<FetchResult> for Response {
    fn from(result: FetchResult) -> Self { Self::network(result) }
}

/// One request handler in the chain. A link either answers the operation itself or hands it on
/// through `forward`.
#[async_trait]
pub trait Link: Send + Sync {
    async fn request(&self, operation: Operation, forward: NextLink) -> Result<Response, LinkError>;
}

/// The rest of the chain after the current link.
#[derive(Clone)]
pub struct NextLink {
    links: Arc<[Arc<dyn Link>]>,
    index: usize,
}

impl NextLink {
    pub async fn run(self, operation: Operation) -> Result<Response, LinkError> {
        match self.links.get(self.index).cloned() {
            Some(link) => link.request(operation, NextLink { links: self.links, index: self.index + 1 }).await,
            None => {
                debug!("{} ran off the end of the link chain", operation);
                Ok(Response::network(FetchResult::empty()))
            }
        }
    }
}

#[derive(Clone)]
pub struct LinkChain {
    links: Arc<[Arc<dyn Link>]>,
}

impl LinkChain {
    pub fn new(links: Vec<Arc<dyn Link>>) -> Self { Self { links: links.into() } }

    pub fn len(&self) -> usize { self.links.len() }

    pub fn is_empty(&self) -> bool { self.links.is_empty() }

    pub fn prepend(&self, link: Arc<dyn Link>) -> Self {
        let mut links = Vec::with_capacity(self.links.len() + 1);
        links.push(link);
        links.extend(self.links.iter().cloned());
        Self::new(links)
    }

    pub async fn execute(&self, operation: Operation) -> Result<Response, LinkError> {
        NextLink { links: self.links.clone(), index: 0 }.run(operation).await
    }
}

/// Hands every operation straight on.
pub struct Passthrough;

#[async_trait]
impl Link for Passthrough {
    async fn request(&self, operation: Operation, forward: NextLink) -> Result<Response, LinkError> { forward.run(operation).await }
}

/// Holds every operation until the offline state has been restored from storage.
pub struct HydrationGate {
    hydrated: OneTimeFlag,
}

impl HydrationGate {
    pub fn new(hydrated: OneTimeFlag) -> Self { Self { hydrated } }
}

#[async_trait]
impl Link for HydrationGate {
    async fn request(&self, operation: Operation, forward: NextLink) -> Result<Response, LinkError> {
        if !self.hydrated.is_set() {
            debug!("{} waiting for rehydration", operation);
            self.hydrated.wait().await;
        }
        forward.run(operation).await
    }
}

/// `[offline_links.., offline_link, online_link]`, skipping the offline link when there is none.
pub fn create_network_link(offline_links: Vec<Arc<dyn Link>>, offline_link: Option<Arc<dyn Link>>, online_link: Arc<dyn Link>) -> LinkChain {
    let mut links = offline_links;
    links.extend(offline_link);
    links.push(online_link);
    LinkChain::new(links)
}
