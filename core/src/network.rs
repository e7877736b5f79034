use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Whether the transport is believed to be reachable.
///
/// Nothing here probes the network. The host reports connectivity through [`NetworkStatus::set_online`]
/// and the offline link and the outbox driver follow it.
#[derive(Clone)]
pub struct NetworkStatus {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool { *self.tx.borrow() }

    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            info!("Network is now {}", if online { "online" } else { "offline" });
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> { self.tx.subscribe() }

    /// Resolves once the status is online.
    pub async fn wait_online(&self) {
        let mut rx = self.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|online| *online).await;
    }
}

impl Default for NetworkStatus {
    fn default() -> Self { Self::new(true) }
}

impl std::fmt::Debug for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_tuple("NetworkStatus").field(&self.is_online()).finish() }
}
