//! # Application State
//!
//! Shared state handed to every handler. The engine owns the store, the
//! notification dispatcher and the clock; handlers only ever reach the
//! store through it.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use gmx_core::{Clock, SystemClock};

use crate::config::AppConfig;
use crate::engine::OrderEngine;
use crate::notify::Dispatcher;
use crate::store::{MarketStore, MemoryStore};

#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<OrderEngine>,
    pub config: Arc<AppConfig>,
    /// Renders `/metrics`. `None` when metrics are disabled.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(engine: Arc<OrderEngine>, config: AppConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
            metrics: None,
        }
    }

    /// Attach the Prometheus handle that renders `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// State over `store` with the given config, a log-only notifier and
    /// the system clock.
    pub fn with_store(store: Arc<dyn MarketStore>, config: AppConfig) -> Self {
        Self::with_parts(store, Dispatcher::log_only(), Arc::new(SystemClock), config)
    }

    /// State from explicit parts.
    pub fn with_parts(
        store: Arc<dyn MarketStore>,
        notifier: Dispatcher,
        clock: Arc<dyn Clock>,
        config: AppConfig,
    ) -> Self {
        let engine = OrderEngine::new(store, notifier, config.protection_window, clock);
        Self::new(Arc::new(engine), config)
    }

    /// Default config over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), AppConfig::default())
    }
}
