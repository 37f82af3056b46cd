//! # gmx-api: Binary Entry Point
//!
//! Starts the marketplace order service and its auto-completion worker.
//! Configuration comes from the environment; see [`gmx_api::config`].

use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;

use gmx_api::config::LogFormat;
use gmx_api::notify::{Dispatcher, HttpNotifier, LogNotifier, Notifier};
use gmx_api::store::{MarketStore, MemoryStore, PgStore};
use gmx_api::worker::AutoCompleteWorker;
use gmx_api::{AppConfig, AppState};
use gmx_core::SystemClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    // Initialize structured tracing.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(?config, "configuration loaded");

    let metrics_handle = if config.metrics_enabled {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("failed to install Prometheus recorder")?,
        )
    } else {
        None
    };

    // Database is optional; absent means in-memory only.
    let store: Arc<dyn MarketStore> = match &config.database_url {
        Some(url) => Arc::new(PgStore::connect(url).await.map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?),
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            tracing::info!("Notification webhook configured");
            Arc::new(HttpNotifier::new(url.clone(), config.notify_timeout)?)
        }
        None => Arc::new(LogNotifier),
    };
    let dispatcher = Dispatcher::new(notifier, config.notify_timeout);

    let port = config.port;
    let interval = config.auto_complete_interval;
    let bootstrap_admin = config.bootstrap_admin;

    let mut state = AppState::with_parts(store, dispatcher, Arc::new(SystemClock), config);
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }

    if let Some(admin) = bootstrap_admin {
        state
            .engine
            .ensure_admin(admin)
            .await
            .context("failed to bootstrap admin profile")?;
        tracing::info!(profile_id = %admin, "bootstrap admin ensured");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine = state.engine.clone();
    let worker = AutoCompleteWorker::new(engine.clone(), interval).spawn(shutdown_rx);

    let app = gmx_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("GMX API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped; waiting for auto-completion worker");
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker.await {
        tracing::error!("auto-completion worker panicked: {e}");
    }
    engine.flush_notifications().await;
    tracing::info!("pending notifications delivered");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
