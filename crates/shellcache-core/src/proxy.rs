//! The offline cache proxy and its lifecycle.
//!
//! A proxy instance belongs to one deployed version. It is installed, then
//! activated, then intercepts requests until a newer version supersedes it.
//! Cloning a proxy is cheap and clones share state, so one instance can
//! serve concurrent intercepts from many tasks.

use std::fmt;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStorage, CachedEntry};
use crate::config::{CachePolicy, ProxyConfig};
use crate::error::ProxyError;
use crate::http::{CacheKey, Request, Response, Url};
use crate::network::Fetcher;

/// Lifecycle phase of a proxy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Parsed => "parsed",
            Phase::Installing => "installing",
            Phase::Installed => "installed",
            Phase::Activating => "activating",
            Phase::Activated => "activated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub version_id: String,
    /// Number of manifest entries written to the store.
    pub cached: usize,
    /// Tell the host not to wait for older instances to finish.
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    pub version_id: String,
    /// Stores removed because they belonged to other versions.
    pub deleted: Vec<String>,
    /// Tell the host to take control of already-open pages.
    pub claim_clients: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Cache,
    Network,
}

/// Result of a successful intercept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: Response,
    pub source: ServedFrom,
}

struct Inner<S, N> {
    config: ProxyConfig,
    manifest: Vec<Url>,
    storage: Arc<S>,
    fetcher: Arc<N>,
    phase: Mutex<Phase>,
    refreshes: Mutex<JoinSet<()>>,
}

pub struct OfflineCacheProxy<S, N> {
    inner: Arc<Inner<S, N>>,
}

impl<S, N> Clone for OfflineCacheProxy<S, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: CacheStorage, N: Fetcher> OfflineCacheProxy<S, N> {
    /// Create a proxy for the configured version. The config is validated and
    /// the manifest resolved up front.
    pub fn new(config: ProxyConfig, storage: Arc<S>, fetcher: Arc<N>) -> Result<Self, ProxyError> {
        config.validate()?;
        let manifest = config.manifest_urls()?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                manifest,
                storage,
                fetcher,
                phase: Mutex::new(Phase::Parsed),
                refreshes: Mutex::new(JoinSet::new()),
            }),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.inner.config
    }

    pub fn version_id(&self) -> &str {
        &self.inner.config.version_id
    }

    pub async fn phase(&self) -> Phase {
        *self.inner.phase.lock().await
    }

    /// Move straight to `Activated` if this version's store already exists.
    ///
    /// A store is only created by a successful install, so its presence
    /// means this version was installed by an earlier instance. Returns
    /// whether the proxy is now active.
    pub async fn resume(&self) -> Result<bool, ProxyError> {
        let mut phase = self.inner.phase.lock().await;
        if *phase == Phase::Activated {
            return Ok(true);
        }
        if *phase != Phase::Parsed {
            return Ok(false);
        }
        if self.inner.storage.has(self.version_id()).await? {
            *phase = Phase::Activated;
            info!(version = %self.version_id(), "Resumed active proxy from existing store");
            return Ok(true);
        }
        Ok(false)
    }

    /// Cache every manifest URL as one batch.
    ///
    /// Fails without touching the store if any fetch fails or returns a
    /// non-ok status. A failed install may be retried.
    pub async fn install(&self) -> Result<InstallOutcome, ProxyError> {
        self.transition("install", Phase::Parsed, Phase::Installing)
            .await?;
        info!(
            version = %self.version_id(),
            assets = self.inner.manifest.len(),
            "Installing offline cache"
        );

        match self.populate_manifest().await {
            Ok(cached) => {
                self.set_phase(Phase::Installed).await;
                info!(version = %self.version_id(), cached = cached, "App shell cached");
                Ok(InstallOutcome {
                    version_id: self.version_id().to_string(),
                    cached,
                    skip_waiting: true,
                })
            }
            Err(e) => {
                self.set_phase(Phase::Parsed).await;
                error!(version = %self.version_id(), error = %e, "Install failed");
                Err(e)
            }
        }
    }

    async fn populate_manifest(&self) -> Result<usize, ProxyError> {
        let fetcher = &self.inner.fetcher;
        let fetches = self.inner.manifest.iter().map(|url| async move {
            let request = Request::get(url.clone());
            let response = fetcher
                .fetch(&request)
                .await
                .map_err(|e| ProxyError::install(url.as_str(), e.to_string()))?;
            if !response.is_ok() {
                return Err(ProxyError::install(
                    url.as_str(),
                    format!("status {}", response.status),
                ));
            }
            Ok((request.key(), CachedEntry::new(response)))
        });
        let batch = try_join_all(fetches).await?;
        let cached = batch.len();

        // put_all creates the store, so a failed write leaves none behind
        self.inner
            .storage
            .put_all(self.version_id(), batch)
            .await?;
        Ok(cached)
    }

    /// Delete every store except this version's.
    pub async fn activate(&self) -> Result<ActivateOutcome, ProxyError> {
        self.transition("activate", Phase::Installed, Phase::Activating)
            .await?;
        info!(version = %self.version_id(), "Activating offline cache");

        match self.delete_stale_stores().await {
            Ok(deleted) => {
                self.set_phase(Phase::Activated).await;
                Ok(ActivateOutcome {
                    version_id: self.version_id().to_string(),
                    deleted,
                    claim_clients: true,
                })
            }
            Err(e) => {
                self.set_phase(Phase::Installed).await;
                error!(version = %self.version_id(), error = %e, "Activate failed");
                Err(e)
            }
        }
    }

    async fn delete_stale_stores(&self) -> Result<Vec<String>, ProxyError> {
        let storage = &self.inner.storage;
        let mut deleted = Vec::new();
        for name in storage.keys().await? {
            if name == self.version_id() {
                continue;
            }
            info!(store = %name, "Removing old cache");
            if storage.delete(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Answer one request from the store, or from the network on a miss.
    ///
    /// A miss whose network fetch fails is an error; no fallback content is
    /// served. Failing to write a fetched response to the store never fails
    /// the intercept.
    ///
    /// Writes always target this instance's own store. An instance that keeps
    /// intercepting after a newer version activated recreates its old store,
    /// which the next activation removes again.
    pub async fn intercept(&self, request: Request) -> Result<Served, ProxyError> {
        let phase = self.phase().await;
        if phase != Phase::Activated {
            return Err(ProxyError::NotActive(phase));
        }

        let key = request.key();
        if let Some(entry) = self.lookup(&key).await {
            debug!(key = %key, "Cache hit");
            if self.inner.config.policy == CachePolicy::StaleWhileRevalidate && request.is_get() {
                self.spawn_refresh(request).await;
            }
            return Ok(Served {
                response: entry.response,
                source: ServedFrom::Cache,
            });
        }

        debug!(key = %key, "Cache miss");
        let response = match self.inner.fetcher.fetch(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(key = %key, error = %e, "Fetch failed with no cached response");
                return Err(e.into());
            }
        };

        self.inner.store_if_cacheable(&request, key, &response).await;

        Ok(Served {
            response,
            source: ServedFrom::Network,
        })
    }

    /// Wait for background refreshes started by stale-while-revalidate.
    pub async fn settle(&self) {
        let mut pending = std::mem::take(&mut *self.inner.refreshes.lock().await);
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Background refresh task failed");
            }
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<CachedEntry> {
        match self.inner.storage.lookup(self.version_id(), key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn spawn_refresh(&self, request: Request) {
        let inner = Arc::clone(&self.inner);
        let mut refreshes = self.inner.refreshes.lock().await;
        // Reap finished refreshes so the set does not grow without bound
        while refreshes.try_join_next().is_some() {}
        refreshes.spawn(async move {
            let key = request.key();
            match inner.fetcher.fetch(&request).await {
                Ok(response) => inner.store_if_cacheable(&request, key, &response).await,
                Err(e) => debug!(key = %key, error = %e, "Background refresh failed"),
            }
        });
    }

    async fn transition(
        &self,
        operation: &'static str,
        from: Phase,
        to: Phase,
    ) -> Result<(), ProxyError> {
        let mut phase = self.inner.phase.lock().await;
        if *phase != from {
            return Err(ProxyError::InvalidPhase {
                operation,
                phase: *phase,
            });
        }
        *phase = to;
        Ok(())
    }

    async fn set_phase(&self, to: Phase) {
        *self.inner.phase.lock().await = to;
    }
}

impl<S: CacheStorage, N: Fetcher> Inner<S, N> {
    /// GET, status exactly 200, and a response type the config allows.
    fn is_cacheable(&self, request: &Request, response: &Response) -> bool {
        request.is_get()
            && response.status == 200
            && self.config.cacheable.allows(response.response_type)
    }

    async fn store_if_cacheable(&self, request: &Request, key: CacheKey, response: &Response) {
        if !self.is_cacheable(request, response) {
            debug!(
                key = %key,
                status = response.status,
                response_type = %response.response_type,
                "Response not cacheable"
            );
            return;
        }
        let entry = CachedEntry::new(response.clone());
        if let Err(e) = self.storage.put(&self.config.version_id, key.clone(), entry).await {
            warn!(key = %key, error = %e, "Failed to cache response");
        }
    }
}
