//! Klusterlet Addon Controller
//!
//! Keeps one `KlusterletAddonConfig` per registered `ManagedCluster` and the
//! cluster's `ManagedClusterAddOn` installations equal to the addon set of
//! its provisioning class, recreating either when they are deleted.

mod addons;
mod backoff;
mod classifier;
mod config;
mod controller;
mod error;
mod http;
mod metrics;
mod reconciler;
mod retry;
mod synthesizer;
#[cfg(test)]
mod test_utils;
mod watcher;


use crate::config::Config;
use crate::controller::Controller;
use crate::error::ControllerError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube uses rustls; pick the ring provider explicitly
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Klusterlet Addon Controller");

    let config = Config::from_env()?;
    info!("Configuration:");
    info!("  Workers: {}", config.worker_count);
    info!("  Resync interval: {:?}", config.resync_interval);
    info!(
        "  Retries: {} attempts, {:?}..{:?}",
        config.max_retries, config.retry_initial, config.retry_max
    );
    info!("  Stall threshold: {} failed passes", config.stall_threshold);
    info!(
        "  Standard addons: {}",
        config
            .standard_addons
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );
    info!("  Addon install namespace: {}", config.addon_install_namespace);
    info!("  Metrics address: {}", config.metrics_addr);

    let client = kube::Client::try_default().await?;
    let controller = Controller::new(client, config.clone());

    let http_server = tokio::spawn(http::serve(config.metrics_addr, controller.ready_flag()));

    let result = controller.run(shutdown_signal()).await;
    http_server.abort();
    result
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
