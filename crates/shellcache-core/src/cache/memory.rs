use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use super::{CacheStorage, CachedEntry};
use crate::error::StorageError;
use crate::http::CacheKey;

type Store = BTreeMap<CacheKey, CachedEntry>;

/// In-process store backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stores: RwLock<HashMap<String, Store>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a store, `None` if the store is absent.
    pub async fn len(&self, name: &str) -> Option<usize> {
        self.stores.read().await.get(name).map(|s| s.len())
    }
}

impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<(), StorageError> {
        self.stores
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.stores.read().await.contains_key(name))
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.stores.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.stores.write().await.remove(name).is_some())
    }

    async fn lookup(
        &self,
        name: &str,
        key: &CacheKey,
    ) -> Result<Option<CachedEntry>, StorageError> {
        Ok(self
            .stores
            .read()
            .await
            .get(name)
            .and_then(|store| store.get(key))
            .cloned())
    }

    async fn put(&self, name: &str, key: CacheKey, entry: CachedEntry) -> Result<(), StorageError> {
        self.stores
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(key, entry);
        Ok(())
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(CacheKey, CachedEntry)>,
    ) -> Result<(), StorageError> {
        // One write guard for the whole batch
        let mut stores = self.stores.write().await;
        stores.entry(name.to_string()).or_default().extend(entries);
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<(CacheKey, CachedEntry)>, StorageError> {
        Ok(self
            .stores
            .read()
            .await
            .get(name)
            .map(|store| store.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
