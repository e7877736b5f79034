use std::{sync::Arc, time::Duration};
use tokio::{select, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    discard::{should_discard, DiscardCondition},
    effect::execute_effect,
    link::LinkChain,
    store::OfflineStore,
    util::OneTimeFlag,
};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self { initial_backoff: INITIAL_BACKOFF, max_backoff: MAX_BACKOFF } }
}

impl RetryPolicy {
    pub fn next_backoff(&self, current: Duration) -> Duration { (current * 2).min(self.max_backoff) }
}

struct Inner {
    store: OfflineStore,
    chain: LinkChain,
    discard_condition: DiscardCondition,
    retry: RetryPolicy,
    shutdown: OneTimeFlag,
}

/// Drains the outbox in order while the network is up: one effect in flight at a time, committed on
/// success, discarded on permanent failure, retried with exponential backoff otherwise.
pub struct OutboxDriver {
    inner: Arc<Inner>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl OutboxDriver {
    pub fn start(store: OfflineStore, chain: LinkChain, discard_condition: DiscardCondition, retry: RetryPolicy) -> Self {
        let inner = Arc::new(Inner { store, chain, discard_condition, retry, shutdown: OneTimeFlag::new() });
        let task = tokio::spawn(Self::run(inner.clone()));
        Self { inner, task: std::sync::Mutex::new(Some(task)) }
    }

    pub async fn shutdown(&self) {
        let task = self.task.lock().expect("Failed to lock the task").take();
        match task {
            Some(task) => {
                self.inner.shutdown.set();
                if let Err(e) = task.await {
                    warn!("Outbox driver join error during shutdown: {}", e);
                }
                info!("Outbox driver stopped");
            }
            None => debug!("Outbox driver already stopped"),
        }
    }

    async fn run(inner: Arc<Inner>) {
        select! {
            _ = inner.shutdown.wait() => return,
            _ = inner.store.hydrated() => {}
        }
        info!("Outbox driver started with {} queued", inner.store.outbox_len());

        let mut network = inner.store.network().subscribe();
        let mut backoff = inner.retry.initial_backoff;
        let mut retries: u32 = 0;

        loop {
            let online = *network.borrow_and_update();
            let head = if online { inner.store.head() } else { None };

            let Some(effect) = head else {
                select! {
                    _ = inner.shutdown.wait() => break,
                    _ = inner.store.wake.notified() => {}
                    _ = network.changed() => {}
                }
                continue;
            };

            let outcome = select! {
                _ = inner.shutdown.wait() => break,
                outcome = execute_effect(&inner.store, &inner.chain, &effect) => outcome,
            };

            match outcome {
                Ok(_) => {
                    inner.store.commit(&effect.attempt_id).await;
                    backoff = inner.retry.initial_backoff;
                    retries = 0;
                }
                Err(err) => {
                    if should_discard(&err, &effect, retries, &inner.discard_condition).await {
                        inner.store.discard(&effect, err).await;
                        backoff = inner.retry.initial_backoff;
                        retries = 0;
                        continue;
                    }

                    retries += 1;
                    info!("Retrying {} in {:?} (attempt {})", effect, backoff, retries + 1);
                    let reconnected = select! {
                        _ = inner.shutdown.wait() => break,
                        _ = sleep(backoff) => false,
                        changed = network.changed() => changed.is_ok() && *network.borrow(),
                    };
                    backoff = if reconnected { inner.retry.initial_backoff } else { inner.retry.next_backoff(backoff) };
                }
            }
        }
    }
}
