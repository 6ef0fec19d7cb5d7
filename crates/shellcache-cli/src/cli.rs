//! CLI definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use shellcache_core::ProxyConfig;

/// shellcache - offline cache proxy for a hosted web app.
#[derive(Parser, Debug)]
#[command(name = "shellcache", version)]
pub struct Cli {
    /// Config file path (defaults to the platform config directory).
    #[arg(long, global = true, env = "SHELLCACHE_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the cache version id from the config file.
    #[arg(long = "version-id", global = true, env = "SHELLCACHE_VERSION", value_name = "NAME")]
    pub version_id: Option<String>,

    /// Override the application scope URL from the config file.
    #[arg(long, global = true, env = "SHELLCACHE_SCOPE", value_name = "URL")]
    pub scope: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Cache the asset manifest and activate this version.
    Install,

    /// Answer a request through the proxy; the body goes to stdout.
    Fetch {
        /// Absolute URL to request.
        url: String,

        /// HTTP method.
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
    },

    /// List stores and their entries.
    Status,

    /// Delete every store.
    Clear,
}

impl Cli {
    /// Apply command-line and environment overrides on top of a loaded config.
    pub fn apply_overrides(&self, config: &mut ProxyConfig) {
        if let Some(ref version) = self.version_id {
            config.version_id = version.clone();
        }
        if let Some(ref scope) = self.scope {
            config.scope = scope.clone();
        }
    }
}
