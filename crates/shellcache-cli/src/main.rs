//! shellcache - drive the offline cache proxy from the command line.
//!
//! Stores live on disk, so a version installed by one invocation is picked
//! up as already active by the next.

mod cli;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shellcache_core::{
    CacheStorage, DiskStorage, HttpFetcher, OfflineCacheProxy, ProxyConfig, Request, ServedFrom,
};

use cli::{Cli, Commands};

type Proxy = OfflineCacheProxy<DiskStorage, HttpFetcher>;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let storage = Arc::new(
        DiskStorage::new(config.cache_dir()?).context("Failed to open cache directory")?,
    );

    match cli.command {
        Commands::Install => install(config, storage).await,
        Commands::Fetch { url, method } => fetch(config, storage, &method, &url).await,
        Commands::Status => status(&config, &storage).await,
        Commands::Clear => clear(&storage).await,
    }
}

fn load_config(cli: &Cli) -> Result<ProxyConfig> {
    let path = match cli.config.clone() {
        Some(path) => path,
        None => ProxyConfig::config_path()?,
    };
    let mut config = ProxyConfig::load_from(&path)?;
    cli.apply_overrides(&mut config);

    config.validate().context("Invalid configuration")?;
    info!(path = %path.display(), version = %config.version_id, "Configuration loaded");
    Ok(config)
}

fn build_proxy(config: ProxyConfig, storage: Arc<DiskStorage>) -> Result<Proxy> {
    let scope = config.scope_url()?;
    let fetcher = HttpFetcher::new(scope, config.request_timeout())
        .context("Failed to create HTTP client")?;
    Ok(OfflineCacheProxy::new(config, storage, Arc::new(fetcher))?)
}

async fn install(config: ProxyConfig, storage: Arc<DiskStorage>) -> Result<()> {
    let proxy = build_proxy(config, storage)?;

    let installed = proxy.install().await?;
    eprintln!(
        "Installed {} ({} assets cached)",
        installed.version_id, installed.cached
    );

    // Installation asks not to wait for older versions
    if installed.skip_waiting {
        let activated = proxy.activate().await?;
        for name in &activated.deleted {
            eprintln!("Removed old cache {}", name);
        }
        eprintln!("Activated {}", activated.version_id);
    }
    Ok(())
}

async fn fetch(
    config: ProxyConfig,
    storage: Arc<DiskStorage>,
    method: &str,
    url: &str,
) -> Result<()> {
    let proxy = build_proxy(config, storage)?;
    if !proxy.resume().await? {
        anyhow::bail!(
            "Version {} is not installed; run `shellcache install` first",
            proxy.version_id()
        );
    }

    let request = Request::parse(method, url)?;
    let served = proxy
        .intercept(request)
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    let source = match served.source {
        ServedFrom::Cache => "cache",
        ServedFrom::Network => "network",
    };
    eprintln!(
        "{} {} ({}, {})",
        served.response.status, url, source, served.response.response_type
    );

    let mut stdout = io::stdout().lock();
    stdout.write_all(&served.response.body)?;
    stdout.flush()?;

    proxy.settle().await;
    Ok(())
}

async fn status(config: &ProxyConfig, storage: &DiskStorage) -> Result<()> {
    let names = storage.keys().await?;
    println!("Cache directory: {}", storage.root().display());
    if names.is_empty() {
        println!("No stores");
        return Ok(());
    }

    for name in names {
        let entries = storage.entries(&name).await?;
        let marker = if name == config.version_id { " (current)" } else { "" };
        println!("{}{}: {} entries", name, marker, entries.len());
        for (key, entry) in entries {
            println!(
                "  {:>3} {:<7} {}  [{}]",
                entry.response.status,
                entry.response.response_type.to_string(),
                key,
                entry.age_display()
            );
        }
    }
    Ok(())
}

async fn clear(storage: &DiskStorage) -> Result<()> {
    let mut removed = 0;
    for name in storage.keys().await? {
        if storage.delete(&name).await? {
            removed += 1;
        }
    }
    println!("Removed {} store(s)", removed);
    Ok(())
}
