use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

use polyroute_core::forwarder::{GrpcForwarder, HttpForwarder};
use polyroute_core::resolver::RegionResolver;
use polyroute_core::ServiceConfig;

#[derive(Parser, Debug)]
#[command(
    name = "polyroute",
    about = "Region-aware reverse proxy for HTTP and gRPC"
)]
struct Cli {
    /// Path to the service configuration file
    #[arg(
        short,
        long,
        env = "CONFIG_FILE_PATH",
        default_value = "config.yaml"
    )]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = ServiceConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let resolver = Arc::new(RegionResolver::from_config(&cfg.region_retriever)?);

    let mut servers = JoinSet::new();

    if let Some(http_cfg) = &cfg.http {
        let addr = http_cfg.listen_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding HTTP listener on {addr}"))?;
        info!(addr = %listener.local_addr()?, "HTTP proxy listening");

        let router = HttpForwarder::new(http_cfg.destinations.clone(), resolver.clone()).router();
        servers.spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await
        });
    }

    if let Some(grpc_cfg) = &cfg.grpc {
        let addr = grpc_cfg.listen_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding gRPC listener on {addr}"))?;
        info!(addr = %listener.local_addr()?, "gRPC proxy listening");

        let router = GrpcForwarder::new(grpc_cfg.destinations.clone(), resolver.clone()).router();
        servers.spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await
        });
    }

    while let Some(result) = servers.join_next().await {
        result.context("proxy listener task failed")??;
    }

    Ok(())
}

/// Resolves when the process receives an interrupt, letting in-flight
/// requests drain before the listeners stop.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
