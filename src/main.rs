mod cache;
mod config;
mod errors;
mod events;
mod identity;
mod lookup;
mod notify;
mod scheduler;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cache::{FileAssetCache, HttpAssetFetcher};
use events::NetworkMonitor;
use lookup::{HttpLookupClient, LookupClient};
use notify::{ConsoleDisplay, LogNotifier};
use scheduler::{Collaborators, RefreshScheduler};

#[derive(Parser)]
#[command(name = "extip-watch")]
#[command(about = "Keeps the host's external IP identity fresh without hammering the lookup service")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Force debug logging
    #[arg(long)]
    debug: bool,

    /// Look up the external identity once, print it and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = config::Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from {:?}: {}", cli.config, e);
        eprintln!("Using default configuration");
        config::Config::default()
    });
    if cli.debug {
        config.logging.debug = true;
    }

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .init();

    config.validate().context("invalid configuration")?;

    let lookup = Arc::new(HttpLookupClient::new(config.lookup.clone())?);

    if cli.once {
        return run_once(lookup.as_ref()).await;
    }

    info!("extip-watch v{}", env!("CARGO_PKG_VERSION"));

    let fetcher = Arc::new(HttpAssetFetcher::new(
        &config.cache,
        &config.lookup.user_agent,
    )?);
    let cache = Arc::new(FileAssetCache::new(config.cache.resolved_dir(), fetcher));

    let scheduler = RefreshScheduler::new(
        config.schedule.clone(),
        Collaborators {
            lookup,
            cache: Some(cache),
            notifier: Arc::new(LogNotifier),
            display: Arc::new(ConsoleDisplay),
        },
    )?
    .with_map_prewarm(config.cache.maps)
    .with_event_source(NetworkMonitor::new(&config.network)?);

    #[cfg(unix)]
    let scheduler = scheduler.with_event_source(events::SignalSource);

    let handle = scheduler.handle();
    let engine = tokio::spawn(scheduler.run());
    handle.enable();

    info!("Watching external IP. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    handle.shutdown();
    if let Err(e) = engine.await {
        error!("Scheduler task failed: {}", e);
    }

    Ok(())
}

/// One identity + ASN lookup, printed to stdout
async fn run_once(client: &dyn LookupClient) -> anyhow::Result<()> {
    let identity = client
        .fetch_identity()
        .await
        .context("external IP lookup failed")?;

    println!("IP:       {}", identity.ip_address);
    if !identity.country_code.is_empty() {
        println!(
            "Country:  {} ({})",
            identity.country_name, identity.country_code
        );
    }
    if !identity.city_name.is_empty() {
        println!("City:     {}", identity.city_name);
    }
    if let Some((lat, lon)) = identity.coordinates() {
        println!("Location: {:.4}, {:.4}", lat, lon);
    }

    match client.fetch_asn_info().await {
        Ok(asn) => {
            if let Some(hostname) = asn.hostname {
                println!("Hostname: {}", hostname);
            }
            if let Some(org) = asn.org {
                println!("Org:      {}", org);
            }
            if let Some(timezone) = asn.timezone {
                println!("Timezone: {}", timezone);
            }
        }
        Err(e) => warn!("ASN lookup failed: {}", e),
    }

    Ok(())
}
