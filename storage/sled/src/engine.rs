use std::path::PathBuf;

use async_trait::async_trait;
use offgrid_core::{Storage, StorageError};
use sled::Config;
use tokio::task;
use tracing::debug;

use crate::error::{sled_error, SledStorageError};

const TREE_NAME: &str = "offline_state";

/// [`Storage`] on a sled tree. Every key of the persisted unit is one entry, and `multi_set` goes
/// through a single batch so the outbox, metadata and cache land on disk together.
#[derive(Clone)]
pub struct SledStorage {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStorage {
    pub fn with_homedir_folder(folder_name: &str) -> anyhow::Result<Self> {
        let dir = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to get home directory"))?.join(folder_name);

        Self::with_path(dir)
    }

    pub fn with_path(path: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&path)?;
        let db = sled::open(path.join("sled"))?;
        Self::open(db)
    }

    pub fn new() -> anyhow::Result<Self> { Self::with_homedir_folder(".offgrid") }

    pub fn new_test() -> anyhow::Result<Self> {
        let db = Config::new().temporary(true).flush_every_ms(None).open()?;
        Self::open(db)
    }

    fn open(db: sled::Db) -> anyhow::Result<Self> {
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { db, tree })
    }

    /// Flush pending writes to disk.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let db = self.db.clone();
        task::spawn_blocking(move || db.flush()).await.map_err(SledStorageError::from)?.map_err(sled_error)?;
        Ok(())
    }

    fn get_item_blocking(&self, key: String) -> Result<Option<String>, StorageError> {
        match self.tree.get(key.as_bytes()).map_err(sled_error)? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes.to_vec()).map_err(|_| SledStorageError::InvalidUtf8(key))?)),
            None => Ok(None),
        }
    }

    fn multi_set_blocking(&self, items: Vec<(String, String)>) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        for (key, value) in &items {
            batch.insert(key.as_bytes(), value.as_bytes());
        }
        self.tree.apply_batch(batch).map_err(sled_error)?;
        debug!("SledStorage wrote {} key(s) in one batch", items.len());
        Ok(())
    }

    fn get_all_keys_blocking(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for key in self.tree.iter().keys() {
            let key = key.map_err(sled_error)?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }
}

#[async_trait]
impl Storage for SledStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let me = self.clone();
        let key = key.to_owned();
        task::spawn_blocking(move || me.get_item_blocking(key)).await.map_err(SledStorageError::from)?
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> { self.multi_set(vec![(key.to_owned(), value)]).await }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let me = self.clone();
        let key = key.to_owned();
        task::spawn_blocking(move || me.tree.remove(key.as_bytes()).map(|_| ()).map_err(sled_error)).await.map_err(SledStorageError::from)?
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
        let me = self.clone();
        task::spawn_blocking(move || me.get_all_keys_blocking()).await.map_err(SledStorageError::from)?
    }

    async fn multi_set(&self, items: Vec<(String, String)>) -> Result<(), StorageError> {
        let me = self.clone();
        task::spawn_blocking(move || me.multi_set_blocking(items)).await.map_err(SledStorageError::from)?
    }
}
