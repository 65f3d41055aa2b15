//! Deferred authorization maintenance daemon
//!
//! Initializes the receipt system and confirm code manager from the
//! environment, verifies the store, and purges expired entries on a schedule
//! until shut down.

use std::sync::Arc;
use std::time::Duration;

use deferred_authz::jobs::{PurgeScheduler, PurgeSchedulerConfig};
use deferred_authz::{
    initialize_confirm_code_manager, initialize_receipt_system, CommandRegistry, Config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "deferred_authz=info".into());

    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting deferred authorization maintenance daemon");

    // Command handlers live in the host application; the daemon only purges
    let receipts = Arc::new(
        initialize_receipt_system(&config.receipt_store, CommandRegistry::new()).await?,
    );
    let codes = Arc::new(initialize_confirm_code_manager(&config.confirm_code)?);

    let scheduler = PurgeScheduler::new(receipts.clone())
        .with_codes(codes)
        .with_config(PurgeSchedulerConfig {
            receipt_purge_interval: Duration::from_secs(config.purge_interval_secs),
            ..Default::default()
        });
    let handle = scheduler.start();

    shutdown_signal().await;

    // Cleanup
    tracing::info!("Shutting down...");
    handle.abort();
    if let Err(e) = receipts.dispose().await {
        tracing::error!(error = %e, "Failed to dispose receipt system");
    }
    tracing::info!("Receipt store closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
