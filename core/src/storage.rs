use async_trait::async_trait;
use offgrid_proto::{CacheSnapshot, EnqueuedEffect, MetadataState, PersistedState, METADATA_KEY, NORMALIZED_CACHE_KEY, OUTBOX_KEY};
use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StorageError;

/// Durable key-value store for the offline state.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError>;
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError>;

    /// Write several keys. Backends that can should apply them atomically.
    async fn multi_set(&self, items: Vec<(String, String)>) -> Result<(), StorageError> {
        for (key, value) in items {
            self.set_item(&key, value).await?;
        }
        Ok(())
    }
}

/// Non-durable storage. Shared between client instances it stands in for a disk across restarts.
#[derive(Default)]
pub struct MemoryStorage {
    items: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> { Ok(self.items.read().await.get(key).cloned()) }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.items.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.write().await.remove(key);
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> { Ok(self.items.read().await.keys().cloned().collect()) }

    async fn multi_set(&self, items: Vec<(String, String)>) -> Result<(), StorageError> {
        let mut map = self.items.write().await;
        map.extend(items);
        Ok(())
    }
}

/// Reads and writes the persisted unit (outbox, metadata, normalized cache) under a key prefix.
/// Only these keys are ever written; everything else about the client is transient.
#[derive(Clone)]
pub struct Persistor {
    storage: Arc<dyn Storage>,
    prefix: String,
}

impl Persistor {
    pub fn new(storage: Arc<dyn Storage>, prefix: impl Into<String>) -> Self { Self { storage, prefix: prefix.into() } }

    fn key(&self, key: &str) -> String { format!("{}:{}", self.prefix, key) }

    pub async fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        let items = vec![
            (self.key(OUTBOX_KEY), serde_json::to_string(&state.outbox)?),
            (self.key(METADATA_KEY), serde_json::to_string(&state.metadata)?),
            (self.key(NORMALIZED_CACHE_KEY), serde_json::to_string(&state.cache)?),
        ];
        self.storage.multi_set(items).await?;
        debug!("Persisted {} outbox entries, {} cache records", state.outbox.len(), state.cache.len());
        Ok(())
    }

    pub async fn load(&self) -> Result<PersistedState, StorageError> {
        let outbox: Vec<EnqueuedEffect> = self.load_key(OUTBOX_KEY).await?.unwrap_or_default();
        let metadata: MetadataState = self.load_key(METADATA_KEY).await?.unwrap_or_default();
        let cache: CacheSnapshot = self.load_key(NORMALIZED_CACHE_KEY).await?.unwrap_or_default();
        Ok(PersistedState { outbox, metadata, cache })
    }

    async fn load_key<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.storage.get_item(&self.key(key)).await? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub async fn purge(&self) -> Result<(), StorageError> {
        for key in [OUTBOX_KEY, METADATA_KEY, NORMALIZED_CACHE_KEY] {
            self.storage.remove_item(&self.key(key)).await?;
        }
        Ok(())
    }
}
