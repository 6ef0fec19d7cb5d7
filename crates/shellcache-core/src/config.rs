//! Proxy configuration.
//!
//! Everything that used to be a module-level constant of the offline script
//! (store name, asset list, which responses may be cached) lives here and is
//! handed to the proxy at construction.
//!
//! Configuration is stored at `~/.config/shellcache/config.json` unless a
//! path is given explicitly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::http::{ResponseType, Url};
use crate::network::http::DEFAULT_TIMEOUT_SECS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_VERSION_ID: &str = "meditrack-v1-offline";

pub const DEFAULT_SCOPE: &str = "http://localhost:8080/";

/// Local app shell assets, cached at install time
pub const APP_SHELL_ASSETS: &[&str] = &[
    "./",
    "./index.html",
    "./manifest.json",
    "./icon-192.png",
    "./icon-512.png",
];

/// How a hit is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Serve hits from the store, never touching the network.
    #[default]
    CacheFirst,
    /// Serve hits from the store and refresh them in the background.
    StaleWhileRevalidate,
}

/// Which response types may be written to the store.
///
/// Opaque responses are never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheableResponses {
    /// Only responses from the application's own origin.
    #[default]
    SameOrigin,
    /// Same-origin responses and readable cross-origin (CORS) responses.
    SameOriginAndCors,
}

impl CacheableResponses {
    pub fn allows(self, response_type: ResponseType) -> bool {
        match (self, response_type) {
            (_, ResponseType::Basic) => true,
            (CacheableResponses::SameOriginAndCors, ResponseType::Cors) => true,
            _ => false,
        }
    }
}

/// Configuration of one deployed proxy version.
///
/// The default pairs the local app shell manifest with same-origin-only
/// caching. It matches neither preset: `app_shell()` keeps the same manifest
/// but also caches CORS responses, and `with_libraries()` adds cross-origin
/// library URLs to the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Name of the current store. Changing it invalidates every older store.
    pub version_id: String,
    /// Base URL of the application; relative manifest entries resolve here.
    pub scope: String,
    pub manifest: Vec<String>,
    pub policy: CachePolicy,
    pub cacheable: CacheableResponses,
    pub request_timeout_secs: u64,
    /// Overrides the platform cache directory.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            version_id: DEFAULT_VERSION_ID.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            manifest: APP_SHELL_ASSETS.iter().map(|s| s.to_string()).collect(),
            policy: CachePolicy::default(),
            cacheable: CacheableResponses::default(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            cache_dir: None,
        }
    }
}

impl ProxyConfig {
    /// Local app shell only; cross-origin responses with CORS are cached
    /// on demand at intercept time.
    pub fn app_shell() -> Self {
        Self {
            cacheable: CacheableResponses::SameOriginAndCors,
            ..Self::default()
        }
    }

    /// App shell plus third-party libraries fetched cross-origin at install.
    /// Only same-origin responses are cached at intercept time.
    pub fn with_libraries<I, S>(libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self {
            cacheable: CacheableResponses::SameOrigin,
            ..Self::default()
        };
        config.manifest.extend(libraries.into_iter().map(Into::into));
        config
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the on-disk stores.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn scope_url(&self) -> Result<Url, ProxyError> {
        let url = Url::parse(&self.scope).map_err(|e| ProxyError::InvalidUrl {
            url: self.scope.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidConfig(format!(
                "scope must be an http(s) URL, got {}",
                self.scope
            )));
        }
        Ok(url)
    }

    /// Manifest entries resolved against the scope, in manifest order.
    pub fn manifest_urls(&self) -> Result<Vec<Url>, ProxyError> {
        let scope = self.scope_url()?;
        self.manifest
            .iter()
            .map(|entry| {
                scope.join(entry).map_err(|e| ProxyError::InvalidUrl {
                    url: entry.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.version_id.trim().is_empty() {
            return Err(ProxyError::InvalidConfig(
                "version_id must not be empty".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ProxyError::InvalidConfig(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        self.manifest_urls()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProxyConfig::default();
        config.validate().unwrap();
        assert_eq!(config.version_id, "meditrack-v1-offline");
        assert_eq!(config.policy, CachePolicy::CacheFirst);
        assert_eq!(config.cacheable, CacheableResponses::SameOrigin);
    }

    #[test]
    fn test_manifest_resolves_against_scope() {
        let config = ProxyConfig {
            scope: "https://app.example.com/meditrack/".to_string(),
            manifest: vec!["./".into(), "./index.html".into(), "/favicon.ico".into()],
            ..ProxyConfig::default()
        };
        let urls: Vec<String> = config
            .manifest_urls()
            .unwrap()
            .into_iter()
            .map(|u| u.to_string())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://app.example.com/meditrack/",
                "https://app.example.com/meditrack/index.html",
                "https://app.example.com/favicon.ico",
            ]
        );
    }

    #[test]
    fn test_with_libraries_appends_absolute_urls() {
        let config = ProxyConfig::with_libraries(["https://cdn.jsdelivr.net/npm/chart.js"]);
        assert_eq!(config.manifest.len(), APP_SHELL_ASSETS.len() + 1);
        assert_eq!(config.cacheable, CacheableResponses::SameOrigin);
        let last = config.manifest_urls().unwrap().pop().unwrap();
        assert_eq!(last.as_str(), "https://cdn.jsdelivr.net/npm/chart.js");
    }

    #[test]
    fn test_default_differs_from_both_presets() {
        let default = ProxyConfig::default();
        let shell = ProxyConfig::app_shell();
        let libraries = ProxyConfig::with_libraries(["https://cdn.jsdelivr.net/npm/chart.js"]);

        assert_eq!(default.manifest, shell.manifest);
        assert_ne!(default.cacheable, shell.cacheable);
        assert_eq!(default.cacheable, libraries.cacheable);
        assert_ne!(default.manifest, libraries.manifest);
    }

    #[test]
    fn test_app_shell_caches_cors() {
        assert_eq!(
            ProxyConfig::app_shell().cacheable,
            CacheableResponses::SameOriginAndCors
        );
    }

    #[test]
    fn test_cacheable_never_allows_opaque() {
        for setting in [
            CacheableResponses::SameOrigin,
            CacheableResponses::SameOriginAndCors,
        ] {
            assert!(setting.allows(ResponseType::Basic));
            assert!(!setting.allows(ResponseType::Opaque));
        }
        assert!(!CacheableResponses::SameOrigin.allows(ResponseType::Cors));
        assert!(CacheableResponses::SameOriginAndCors.allows(ResponseType::Cors));
    }

    #[test]
    fn test_validate_rejects_empty_version() {
        let config = ProxyConfig {
            version_id: "  ".to_string(),
            ..ProxyConfig::default()
        };
        assert!(matches!(config.validate(), Err(ProxyError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_relative_scope() {
        let config = ProxyConfig {
            scope: "/app/".to_string(),
            ..ProxyConfig::default()
        };
        assert!(matches!(config.validate(), Err(ProxyError::InvalidUrl { .. })));
    }

    #[test]
    fn test_validate_rejects_non_http_scope() {
        let config = ProxyConfig {
            scope: "file:///srv/app/".to_string(),
            ..ProxyConfig::default()
        };
        assert!(matches!(config.validate(), Err(ProxyError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProxyConfig::load_from(&dir.path().join("missing.json")).unwrap();
        assert_eq!(config, ProxyConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = ProxyConfig {
            version_id: "meditrack-v2-offline".to_string(),
            policy: CachePolicy::StaleWhileRevalidate,
            ..ProxyConfig::app_shell()
        };
        config.save_to(&path).unwrap();
        assert_eq!(ProxyConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"version_id": "v9", "policy": "stale_while_revalidate"}"#)
            .unwrap();
        let config = ProxyConfig::load_from(&path).unwrap();
        assert_eq!(config.version_id, "v9");
        assert_eq!(config.policy, CachePolicy::StaleWhileRevalidate);
        assert_eq!(config.scope, DEFAULT_SCOPE);
    }
}
