//! Test doubles for the storage and network seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cache::{CacheStorage, CachedEntry, MemoryStorage};
use crate::error::{FetchError, StorageError};
use crate::http::{CacheKey, Request, Response};
use crate::network::Fetcher;

/// Fetcher answering from a fixed URL table. Unknown URLs get a 404.
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetches attempted, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable(request.url.to_string()));
        }
        let response = self
            .responses
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found"));
        Ok(response)
    }
}

/// Memory storage whose writes can be switched to fail.
#[derive(Default)]
pub struct FailingWrites {
    inner: MemoryStorage,
    fail: AtomicBool,
    fail_batch: AtomicBool,
}

impl FailingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Fail only `put_all`, leaving single writes working.
    pub fn fail_batch_writes(&self, fail: bool) {
        self.fail_batch.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryStorage {
        &self.inner
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl CacheStorage for FailingWrites {
    async fn open(&self, name: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.delete(name).await
    }

    async fn lookup(
        &self,
        name: &str,
        key: &CacheKey,
    ) -> Result<Option<CachedEntry>, StorageError> {
        self.inner.lookup(name, key).await
    }

    async fn put(&self, name: &str, key: CacheKey, entry: CachedEntry) -> Result<(), StorageError> {
        self.check()?;
        self.inner.put(name, key, entry).await
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(CacheKey, CachedEntry)>,
    ) -> Result<(), StorageError> {
        self.check()?;
        if self.fail_batch.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("batch writes disabled".to_string()));
        }
        self.inner.put_all(name, entries).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<(CacheKey, CachedEntry)>, StorageError> {
        self.inner.entries(name).await
    }
}
