use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::effect::EnqueuedEffect;

// Persisted schema keys. Changing these orphans state written by earlier versions.
pub const OUTBOX_KEY: &str = "outbox";
pub const NORMALIZED_CACHE_KEY: &str = "normalized-cache";
pub const METADATA_KEY: &str = "metadata";

/// The whitelist of top-level keys that are written to durable storage. Transient state such as
/// the hydration flag never is.
pub const PERSISTED_KEYS: [&str; 3] = [OUTBOX_KEY, NORMALIZED_CACHE_KEY, METADATA_KEY];

/// Client-generated id -> server-assigned id, `None` until the server answers.
pub type IdsMap = BTreeMap<String, Option<String>>;

/// Serialized contents of the normalized cache, keyed by data id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheSnapshot(pub BTreeMap<String, Value>);

impl CacheSnapshot {
    pub fn new() -> Self { Self(BTreeMap::new()) }

    pub fn get(&self, data_id: &str) -> Option<&Value> { self.0.get(data_id) }

    pub fn contains(&self, data_id: &str) -> bool { self.0.contains_key(data_id) }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }
}

impl From<BTreeMap<String, Value>> for CacheSnapshot {
    fn from(records: BTreeMap<String, Value>) -> Self { Self(records) }
}

/// Last known-good cache contents plus the number of mutations enqueued since it was taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    #[serde(default)]
    pub cache: CacheSnapshot,
    #[serde(default)]
    pub enqueued_mutations: usize,
}

/// Identifier map and snapshot, persisted and rehydrated together with the outbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataState {
    #[serde(default)]
    pub ids_map: IdsMap,
    #[serde(default)]
    pub snapshot: SnapshotState,
}

/// Everything that is written to durable storage as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub outbox: Vec<EnqueuedEffect>,
    pub metadata: MetadataState,
    pub cache: CacheSnapshot,
}
