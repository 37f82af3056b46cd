//! # Notification Dispatch
//!
//! Order events are announced to the parties after the write that caused
//! them has committed. Delivery runs in the background and is best effort:
//! a failed or slow notifier is logged at `warn`, counted in
//! `gmx_notification_failures_total`, and otherwise ignored. It never rolls
//! back, fails or delays the operation.
//!
//! Two notifiers ship with the service:
//!
//! - [`LogNotifier`] writes each notice to the tracing log. Used when no
//!   webhook is configured.
//! - [`HttpNotifier`] POSTs each notice as JSON to a webhook, where a mail
//!   relay turns it into the transactional email.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;

use gmx_arbitration::{DisputeReason, Verdict};
use gmx_core::{fee_breakdown, OrderId, ProfileId};
use gmx_state::Order;

/// An event worth telling a party about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notice {
    /// Payment captured.
    OrderPaid {
        order_id: OrderId,
        title: String,
        total_buyer_charge_cents: u64,
        net_seller_earnings_cents: u64,
    },
    /// The order was delivered and the protection window started.
    OrderDelivered {
        order_id: OrderId,
        title: String,
        window_hours: u32,
    },
    /// The buyer opened a dispute.
    DisputeOpened {
        order_id: OrderId,
        title: String,
        reason: DisputeReason,
    },
    /// An admin decided the dispute.
    DisputeResolved {
        order_id: OrderId,
        title: String,
        verdict: Verdict,
    },
}

impl Notice {
    /// Short event name used in logs and metrics.
    pub fn event(&self) -> &'static str {
        match self {
            Self::OrderPaid { .. } => "order_paid",
            Self::OrderDelivered { .. } => "order_delivered",
            Self::DisputeOpened { .. } => "dispute_opened",
            Self::DisputeResolved { .. } => "dispute_resolved",
        }
    }
}

/// Why a notice could not be delivered.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The notifier could not be reached.
    #[error("notifier transport failed: {0}")]
    Transport(String),

    /// The notifier answered with a non-success status.
    #[error("notifier rejected notice with HTTP {status}")]
    Rejected {
        /// HTTP status code returned.
        status: u16,
    },

    /// Delivery did not finish within the configured timeout.
    #[error("notifier timed out after {0:?}")]
    Timeout(Duration),
}

/// A channel that delivers notices to a profile.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `notice` to `recipient`.
    async fn deliver(&self, recipient: ProfileId, notice: &Notice) -> Result<(), NotifyError>;
}

// ─── Notifiers ───────────────────────────────────────────────────────

/// Writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, recipient: ProfileId, notice: &Notice) -> Result<(), NotifyError> {
        tracing::info!(%recipient, event = notice.event(), ?notice, "notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    recipient: ProfileId,
    #[serde(flatten)]
    notice: &'a Notice,
}

/// POSTs notices to a webhook.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    /// Build a notifier posting to `url`, with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn deliver(&self, recipient: ProfileId, notice: &Notice) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { recipient, notice })
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(NotifyError::Rejected {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}

// ─── Dispatcher ──────────────────────────────────────────────────────

/// Fans notices out to the parties of an order and swallows failures.
///
/// Each `send_*` call spawns one background task and returns at once, so a
/// slow notifier never holds up the request that triggered it. Tasks are
/// tracked so [`Dispatcher::flush`] can wait for them at shutdown.
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("timeout", &self.timeout)
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

/// Deliver one notice, bounded by `timeout`. Failures are logged and counted.
async fn deliver_logged(
    notifier: &dyn Notifier,
    timeout: Duration,
    recipient: ProfileId,
    notice: &Notice,
) {
    let outcome = tokio::time::timeout(timeout, notifier.deliver(recipient, notice))
        .await
        .unwrap_or(Err(NotifyError::Timeout(timeout)));
    if let Err(err) = outcome {
        tracing::warn!(
            %recipient,
            event = notice.event(),
            error = %err,
            "notification delivery failed"
        );
        metrics::counter!("gmx_notification_failures_total", "event" => notice.event())
            .increment(1);
    }
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self {
            notifier,
            timeout,
            in_flight: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// A dispatcher that only logs.
    pub fn log_only() -> Self {
        Self::new(Arc::new(LogNotifier), Duration::from_secs(5))
    }

    /// Queue `notice` for each recipient in turn. Must be called from
    /// within a Tokio runtime.
    fn dispatch(&self, recipients: Vec<ProfileId>, notice: Notice) {
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.timeout;
        let mut tasks = self.in_flight.lock();
        // Reap finished tasks so the set only holds live ones.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            for recipient in recipients {
                deliver_logged(notifier.as_ref(), timeout, recipient, &notice).await;
            }
        });
    }

    /// Wait until every queued notice has been delivered or has failed.
    pub async fn flush(&self) {
        let mut tasks = std::mem::take(&mut *self.in_flight.lock());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("notification task panicked: {e}");
            }
        }
    }

    /// Payment captured: tell buyer and seller.
    pub fn send_order_emails(&self, order: &Order) {
        let pricing = fee_breakdown(order.amount);
        let notice = Notice::OrderPaid {
            order_id: order.id,
            title: order.listing.title.clone(),
            total_buyer_charge_cents: pricing.total_buyer_charge.cents(),
            net_seller_earnings_cents: pricing.net_seller_earnings.cents(),
        };
        self.dispatch(vec![order.buyer_id, order.seller_id], notice);
    }

    /// Delivered: tell the buyer their protection window has started.
    pub fn send_delivered_email(&self, order: &Order, window_hours: u32) {
        let notice = Notice::OrderDelivered {
            order_id: order.id,
            title: order.listing.title.clone(),
            window_hours,
        };
        self.dispatch(vec![order.buyer_id], notice);
    }

    /// Dispute opened: tell both parties.
    pub fn send_dispute_emails(&self, order: &Order, reason: DisputeReason) {
        let notice = Notice::DisputeOpened {
            order_id: order.id,
            title: order.listing.title.clone(),
            reason,
        };
        self.dispatch(vec![order.buyer_id, order.seller_id], notice);
    }

    /// Dispute decided: tell both parties.
    pub fn send_resolution_emails(&self, order: &Order, verdict: Verdict) {
        let notice = Notice::DisputeResolved {
            order_id: order.id,
            title: order.listing.title.clone(),
            verdict,
        };
        self.dispatch(vec![order.buyer_id, order.seller_id], notice);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every delivery; optionally fails them all.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) sent: Mutex<Vec<(ProfileId, Notice)>>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, recipient: ProfileId, notice: &Notice) -> Result<(), NotifyError> {
            self.sent.lock().push((recipient, notice.clone()));
            if self.fail {
                return Err(NotifyError::Rejected { status: 502 });
            }
            Ok(())
        }
    }

    struct StalledNotifier;

    #[async_trait]
    impl Notifier for StalledNotifier {
        async fn deliver(&self, _: ProfileId, _: &Notice) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn notice() -> Notice {
        Notice::OrderDelivered {
            order_id: OrderId::new(),
            title: "Starter account".to_string(),
            window_hours: 48,
        }
    }

    #[tokio::test]
    async fn test_failed_delivery_is_swallowed() {
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        deliver_logged(&notifier, Duration::from_secs(1), ProfileId::new(), &notice()).await;
        assert_eq!(notifier.sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_notifier_times_out() {
        // Returns once the timeout fires rather than after the hour-long stall.
        deliver_logged(
            &StalledNotifier,
            Duration::from_millis(50),
            ProfileId::new(),
            &notice(),
        )
        .await;
    }

    #[tokio::test]
    async fn test_dispatch_returns_before_delivery() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Dispatcher::new(notifier.clone(), Duration::from_secs(1));
        dispatcher.dispatch(vec![ProfileId::new(), ProfileId::new()], notice());
        dispatcher.flush().await;
        assert_eq!(notifier.sent.lock().len(), 2);
        assert_eq!(dispatcher.in_flight.lock().len(), 0);
    }

    #[test]
    fn test_notice_serialises_with_event_tag() {
        let json = serde_json::to_value(notice()).unwrap();
        assert_eq!(json["event"], "order_delivered");
        assert_eq!(json["window_hours"], 48);
    }
}
