pub mod cache;
pub mod callback;
pub mod client;
pub mod discard;
pub mod driver;
pub mod effect;
pub mod error;
pub mod ids;
pub mod link;
pub mod network;
pub mod offline_link;
pub mod outbox;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod update;
pub mod util;

pub use cache::{CacheOptions, InMemoryCache, NormalizedCache};
pub use callback::{ErrorRecord, OfflineCallback, SuccessRecord};
pub use client::{MutationOptions, OfflineClient, OfflineClientOptions, OfflineConfig, OptimisticResponse, QueryOptions};
pub use discard::DiscardCondition;
pub use driver::RetryPolicy;
pub use error::{CacheError, ConfigError, LinkError, MutationError, QueryError, StorageError};
pub use link::{Link, LinkChain, NextLink, Response, ResultOrigin};
pub use network::NetworkStatus;
pub use offline_link::OfflineLink;
pub use storage::{MemoryStorage, Storage};
pub use update::{CacheUpdates, MutationUpdater, UpdaterFactory};

pub use offgrid_proto as proto;
