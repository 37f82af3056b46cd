//! # Auto-Completion Worker
//!
//! Background task that completes delivered orders once their buyer
//! protection window has elapsed. Each tick runs one bounded sweep through
//! [`OrderEngine::auto_complete_due`]; a failed sweep is logged and retried
//! on the next tick. The worker stops when the shutdown channel flips to
//! `true` or its sender is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::{OrderEngine, SweepReport, SWEEP_BATCH_LIMIT};

/// Periodic auto-completion sweeper.
#[derive(Debug, Clone)]
pub struct AutoCompleteWorker {
    engine: Arc<OrderEngine>,
    interval: Duration,
    batch_limit: usize,
}

impl AutoCompleteWorker {
    pub fn new(engine: Arc<OrderEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            batch_limit: SWEEP_BATCH_LIMIT,
        }
    }

    /// Cap the number of orders one sweep examines.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Run one sweep and log its outcome.
    pub async fn sweep(&self) -> Option<SweepReport> {
        match self.engine.auto_complete_due(self.batch_limit).await {
            Ok(report) => {
                if report.examined > 0 {
                    tracing::info!(
                        examined = report.examined,
                        completed = report.completed,
                        skipped = report.skipped,
                        failed = report.failed,
                        "auto-completion sweep finished"
                    );
                }
                if report.examined == self.batch_limit {
                    tracing::warn!(
                        limit = self.batch_limit,
                        "auto-completion sweep hit its batch limit; backlog remains"
                    );
                }
                Some(report)
            }
            Err(err) => {
                tracing::error!(error = %err, "auto-completion sweep failed");
                metrics::counter!("gmx_auto_complete_sweep_failures_total").increment(1);
                None
            }
        }
    }

    /// Sweep on every tick until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "auto-completion worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("auto-completion worker stopped");
    }

    /// Spawn [`run`](Self::run) onto the runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Dispatcher;
    use crate::store::{MarketStore, MemoryStore};
    use gmx_core::{Amount, ListingId, ManualClock, Profile, ProfileId, Timestamp};
    use gmx_state::{DeliveryType, ListingSnapshot, OrderStatus, ProtectionWindow};

    use crate::engine::OrderRequest;

    fn t0() -> Timestamp {
        Timestamp::parse("2026-05-04T08:00:00Z").unwrap()
    }

    async fn setup() -> (Arc<OrderEngine>, Arc<ManualClock>, MemoryStore, gmx_core::OrderId) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = Arc::new(OrderEngine::new(
            Arc::new(store.clone()),
            Dispatcher::log_only(),
            ProtectionWindow::default(),
            clock.clone(),
        ));
        let buyer = engine
            .register_profile(Profile::new(ProfileId::new(), "buyer", t0()))
            .await
            .unwrap()
            .actor();
        let seller = engine
            .register_profile(Profile::new(ProfileId::new(), "seller", t0()))
            .await
            .unwrap();
        let order = engine
            .create_order(
                &buyer,
                OrderRequest {
                    seller_id: seller.id,
                    amount: Amount::from_cents(2_500),
                    quantity: 1,
                    listing: ListingSnapshot {
                        listing_id: ListingId::new(),
                        title: "Gold bundle".to_string(),
                        game: "Example Realms".to_string(),
                        category: "currency".to_string(),
                        image_url: None,
                        delivery_type: DeliveryType::Instant,
                    },
                },
            )
            .await
            .unwrap();
        engine.capture_payment(&buyer, order.id).await.unwrap();
        (engine, clock, store, order.id)
    }

    #[tokio::test]
    async fn test_sweep_completes_only_after_window() {
        let (engine, clock, store, id) = setup().await;
        let worker = AutoCompleteWorker::new(engine, Duration::from_secs(60));

        clock.advance_hours(47);
        let report = worker.sweep().await.unwrap();
        assert_eq!(report.completed, 0);

        clock.advance_hours(2);
        let report = worker.sweep().await.unwrap();
        assert_eq!(report.completed, 1);
        let order = store.order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_sweep_failure_is_logged_not_fatal() {
        let (engine, _clock, store, _) = setup().await;
        store.set_offline(true);
        let worker = AutoCompleteWorker::new(engine, Duration::from_secs(60));
        assert!(worker.sweep().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (engine, _clock, _store, _) = setup().await;
        let (tx, rx) = watch::channel(false);
        let handle = AutoCompleteWorker::new(engine, Duration::from_secs(60)).spawn(rx);
        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
