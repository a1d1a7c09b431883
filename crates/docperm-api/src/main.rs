//! docperm server binary
//!
//! Hands out short-lived, per-user resource tokens over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! docperm --config config.yaml
//!
//! # With environment variables only
//! DOCPERM_BROKER__MAX_DURATION_SECS=3600 docperm
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use docperm_api::http::{create_router, create_router_with_observability, AppState};
use docperm_api::observability::{init_logging, init_metrics, LoggingConfig};
use docperm_api::warm::WarmTimer;
use docperm_server::ServerConfig;
use docperm_storage::{MemoryResourceStore, MemorySecretCache};

/// docperm - per-user resource token broker
#[derive(Parser, Debug)]
#[command(name = "docperm")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if let Some(config_path) = args.config {
        ServerConfig::load(&config_path)?
    } else {
        ServerConfig::from_env()?
    };

    init_logging(LoggingConfig::from_settings(&config.logging));

    info!(version = env!("CARGO_PKG_VERSION"), "Starting docperm server");

    let store = Arc::new(MemoryResourceStore::new());
    let secrets = Arc::new(MemorySecretCache::with_capacity(
        config.secrets.max_capacity,
    ));
    info!(
        max_secrets = config.secrets.max_capacity,
        "Using in-memory resource store and secret cache"
    );
    let state = AppState::from_config(store, secrets, &config);

    let router = if config.metrics.enabled {
        let metrics_state = init_metrics()?;
        info!(path = %config.metrics.path, "Metrics enabled");
        create_router_with_observability(state, metrics_state, &config.metrics.path)
    } else {
        create_router(state)
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let warm = WarmTimer::from_settings(&config.warm_timer)
        .map(|timer| timer.spawn(shutdown_tx.subscribe()));

    let http_shutdown_rx = shutdown_tx.subscribe();
    let result = tokio::select! {
        result = run_http_server(router, addr, http_shutdown_rx) => {
            if let Err(ref e) = result {
                error!("HTTP server error: {}", e);
            }
            result
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server");
            Ok(())
        }
    };

    let _ = shutdown_tx.send(());
    if let Some(handle) = warm {
        if let Ok(ticks) = handle.await {
            info!(ticks, "Warm timer stopped");
        }
    }

    info!("Shutdown complete");
    result
}

/// Run the HTTP server with graceful shutdown.
async fn run_http_server(
    router: axum::Router,
    addr: SocketAddr,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    info!(%addr, "HTTP server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("HTTP server received shutdown signal");
        })
        .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
