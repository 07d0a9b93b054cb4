use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

mod cache;
mod config;
mod error;
mod observability;
mod proxy;

use cache::build_cache_store;
use config::{Config, EnvArgs};
use observability::{init_tracing, MetricsCollector};
use proxy::{ForwardProxy, ProxyExecutor};

#[derive(Parser, Debug)]
#[command(name = "cache-forward-proxy")]
#[command(about = "A caching HTTP forward proxy addressed by URL path")]
struct Args {
    /// YAML configuration file; replaces the flag and environment settings
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<String>,

    #[arg(short, long)]
    validate_config: bool,

    #[command(flatten)]
    env: EnvArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.env.logging());

    info!("Starting cache forward proxy");

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::load(path).await?,
        None => Config::from_env(&args.env)?,
    };

    if args.validate_config {
        info!("Configuration is valid");
        return Ok(());
    }

    // Initialize components
    let metrics_collector = MetricsCollector::new(&config.metrics)?;

    let cache = build_cache_store(&config.cache).await;
    match cache.entry_count().await {
        Ok(count) => info!("Cache contains {} entries", count),
        Err(e) => error!("Failed to count cache entries: {}", e),
    }

    let executor = ProxyExecutor::new(&config.upstream, metrics_collector.clone())?;
    let forward_proxy = Arc::new(ForwardProxy::new(cache, executor, metrics_collector.clone()));

    // Start metrics server if enabled
    let metrics_task = if config.metrics.enabled {
        let metrics_collector = metrics_collector.clone();
        let metrics_config = config.metrics.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = metrics_collector.start_server(&metrics_config).await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start the main server
    let server_config = config.server.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = forward_proxy.start(&server_config).await {
            error!("Server error: {}", e);
        }
    });

    info!("Cache forward proxy started successfully");

    // In-flight requests are dropped with the runtime
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = server_task => {
            error!("Main server task exited unexpectedly");
        }
    }

    if let Some(metrics_task) = metrics_task {
        metrics_task.abort();
    }

    info!("Cache forward proxy shutdown complete");
    Ok(())
}
