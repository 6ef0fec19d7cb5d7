//! Versioned cache stores.
//!
//! A store is a named container mapping a [`CacheKey`] to a stored response.
//! The proxy keeps exactly one store current, named after its version id.
//!
//! Two backends are provided:
//! - `MemoryStorage`: process-local, used by tests and embedders
//! - `DiskStorage`: one JSON document per store, used by the CLI

pub mod disk;
pub mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::http::{CacheKey, Response};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// One stored response. Replaced in place, never expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub response: Response,
    pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Backend holding the named stores.
///
/// Every write is atomic per key, and `put_all` is atomic for the whole
/// batch. Writing to a store that does not exist creates it.
pub trait CacheStorage: Send + Sync + 'static {
    /// Create the store if absent.
    fn open(&self, name: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn has(&self, name: &str) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Names of all existing stores, sorted.
    fn keys(&self) -> impl Future<Output = Result<Vec<String>, StorageError>> + Send;

    /// Delete a store and its entries. Returns whether it existed.
    fn delete(&self, name: &str) -> impl Future<Output = Result<bool, StorageError>> + Send;

    fn lookup(
        &self,
        name: &str,
        key: &CacheKey,
    ) -> impl Future<Output = Result<Option<CachedEntry>, StorageError>> + Send;

    fn put(
        &self,
        name: &str,
        key: CacheKey,
        entry: CachedEntry,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn put_all(
        &self,
        name: &str,
        entries: Vec<(CacheKey, CachedEntry)>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// All entries of a store, sorted by key. Empty if the store is absent.
    fn entries(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Vec<(CacheKey, CachedEntry)>, StorageError>> + Send;
}
