//! Channel Transfer Node - hosts channels with replay protection and
//! cross-channel transfers
//!
//! The node exposes each configured channel over HTTP; an external Relay
//! drives transfers by observing one channel and invoking another.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use channel_transfer::api;
use channel_transfer::chain::ChannelManager;
use channel_transfer::config::{LoggingConfig, Settings};
use channel_transfer::metrics::MetricsServer;

const DEFAULT_LOG_FILTER: &str = "info,channel_transfer=debug,hyper=warn";

/// Interval between channel health checks
const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    init_logging(&settings.logging);

    info!(
        "Starting Channel Transfer Node v{} ({})",
        env!("CARGO_PKG_VERSION"),
        settings.node.instance_id
    );
    info!(
        "Loaded configuration for {} channels",
        settings.enabled_channels().len()
    );

    // Initialize channels
    let channels = Arc::new(ChannelManager::new(&settings).context("Failed to set up channels")?);
    info!("Channels initialized: {}", channels.names().join(", "));

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let channels = channels.clone();
        async move {
            if let Err(e) = api::run_server(config, channels).await {
                error!("API server error: {:#}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {:#}", e);
            }
        }))
    } else {
        None
    };

    // Health check loop
    let health_handle = tokio::spawn({
        let channels = channels.clone();
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS)).await;

                for (name, healthy) in channels.health_check().await {
                    if !healthy {
                        warn!("Channel {} health check failed", name);
                    }
                }
            }
        }
    });

    info!("Channel Transfer Node is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Abort background tasks
    api_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Channel Transfer Node stopped");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
