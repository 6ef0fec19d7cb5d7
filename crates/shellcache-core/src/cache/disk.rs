use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CacheStorage, CachedEntry};
use crate::error::StorageError;
use crate::http::CacheKey;

/// Extension of a committed store document
const STORE_EXTENSION: &str = "json";

/// Extension of a store document being written
const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    name: String,
    entries: BTreeMap<CacheKey, CachedEntry>,
}

/// Store backend keeping one JSON document per store under a root directory.
///
/// The file name is the hex-encoded store name, so any store name maps to a
/// valid, collision-free path. Every write replaces the whole document via
/// a temporary file and a rename.
pub struct DiskStorage {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl DiskStorage {
    pub fn new(root: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", encode_name(name), STORE_EXTENSION))
    }

    async fn load(&self, name: &str) -> Result<Option<StoreFile>, StorageError> {
        let path = self.store_path(name);
        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: StoreFile =
            serde_json::from_slice(&contents).map_err(|source| StorageError::Corrupt {
                name: name.to_string(),
                source,
            })?;
        Ok(Some(file))
    }

    async fn save(&self, file: &StoreFile) -> Result<(), StorageError> {
        let path = self.store_path(&file.name);
        let temp = path.with_extension(TEMP_EXTENSION);
        let contents = serde_json::to_vec(file)?;
        fs::write(&temp, contents).await?;
        fs::rename(&temp, &path).await?;
        debug!(store = %file.name, entries = file.entries.len(), "Store written");
        Ok(())
    }

    async fn load_or_new(&self, name: &str) -> Result<StoreFile, StorageError> {
        Ok(self.load(name).await?.unwrap_or_else(|| StoreFile {
            name: name.to_string(),
            entries: BTreeMap::new(),
        }))
    }
}

impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        if self.load(name).await?.is_none() {
            self.save(&StoreFile {
                name: name.to_string(),
                entries: BTreeMap::new(),
            })
            .await?;
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.store_path(name)).await?)
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STORE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match decode_name(stem) {
                Some(name) => names.push(name),
                None => warn!(path = %path.display(), "Ignoring unrecognized file in cache directory"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.store_path(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn lookup(
        &self,
        name: &str,
        key: &CacheKey,
    ) -> Result<Option<CachedEntry>, StorageError> {
        Ok(self
            .load(name)
            .await?
            .and_then(|mut file| file.entries.remove(key)))
    }

    async fn put(&self, name: &str, key: CacheKey, entry: CachedEntry) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load_or_new(name).await?;
        file.entries.insert(key, entry);
        self.save(&file).await
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(CacheKey, CachedEntry)>,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load_or_new(name).await?;
        file.entries.extend(entries);
        self.save(&file).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<(CacheKey, CachedEntry)>, StorageError> {
        Ok(self
            .load(name)
            .await?
            .map(|file| file.entries.into_iter().collect())
            .unwrap_or_default())
    }
}

fn encode_name(name: &str) -> String {
    hex::encode(name)
}

fn decode_name(encoded: &str) -> Option<String> {
    let bytes = hex::decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}
