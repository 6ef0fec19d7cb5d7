//! Core library for shellcache.
//!
//! shellcache is an offline cache proxy for a single hosted web application.
//! It sits between the application and the network, answering requests from
//! a versioned local store when it can and populating that store from the
//! network when it cannot.
//!
//! The proxy walks through three lifecycle phases, once per deployed version:
//! - **Install**: eagerly cache the asset manifest as one atomic batch
//! - **Activate**: delete every store that does not belong to this version
//! - **Intercept**: answer each request, cache-first
//!
//! Storage and network access sit behind the [`CacheStorage`] and [`Fetcher`]
//! traits so the same proxy runs against disk and reqwest in the CLI, and
//! against in-memory doubles in tests.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod network;
pub mod proxy;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheStorage, CachedEntry, DiskStorage, MemoryStorage};
pub use config::{CachePolicy, CacheableResponses, ProxyConfig};
pub use error::{FetchError, ProxyError, StorageError};
pub use http::{CacheKey, Request, Response, ResponseType, Url};
pub use network::{Fetcher, HttpFetcher};
pub use proxy::{ActivateOutcome, InstallOutcome, OfflineCacheProxy, Phase, Served, ServedFrom};
