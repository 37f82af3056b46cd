//! # Order Lifecycle Engine
//!
//! Every actor-facing operation runs the same way:
//!
//! 1. Validate input that needs no reads.
//! 2. Load the order (and dispute/review) from the store.
//! 3. Apply the change in memory through the state machine or the
//!    arbitration rules, which decide authorization and state.
//! 4. Commit one [`WriteBatch`] whose order/dispute writes are conditioned
//!    on the status read in step 2.
//! 5. Record metrics and hand notifications to the dispatcher.
//!
//! A lost race in step 4 surfaces as a conflict and leaves the store
//! untouched. Notifications are queued only after the commit and delivered
//! in the background; they can neither fail nor delay the operation.
//!
//! Orders are invisible to actors who are neither a party nor an admin:
//! such callers get `NotFound`, the same answer as for a missing order.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use gmx_arbitration::review::{check_comment, check_rating};
use gmx_arbitration::{
    adjudicate, require_admin, verify_chain, AdminAction, AdminActionDraft, AdminActionType,
    ArbitrationError, ChainVerification, Dispute, DisputeFiling, Review, ReviewDraft, ReviewEdit,
    TargetType, Verdict,
};
use gmx_core::{Actor, Amount, Clock, OrderId, Profile, ProfileId, ReviewId, ValidationError};
use gmx_state::{
    DeliveryType, ListingSnapshot, NewOrder, Order, OrderAction, OrderError, OrderRole,
    OrderStatus, OrderTransition, ProtectionWindow,
};

use crate::notify::Dispatcher;
use crate::store::{MarketStore, ReviewWrite, StoreError, WriteBatch};

/// Maximum orders one auto-completion sweep examines.
pub const SWEEP_BATCH_LIMIT: usize = 500;

/// Maximum length of a ban reason.
pub const MAX_BAN_REASON_CHARS: usize = 500;

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors returned by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The order state machine rejected the action.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Dispute, review or admin rules rejected the action.
    #[error(transparent)]
    Arbitration(ArbitrationError),

    /// The store failed or a conditional write lost a race.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The target does not exist or is not visible to the caller.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// The caller may not perform the operation.
    #[error("{0}")]
    Forbidden(String),

    /// The operation conflicts with the current state.
    #[error("{0}")]
    Conflict(String),
}

impl From<ArbitrationError> for EngineError {
    fn from(err: ArbitrationError) -> Self {
        match err {
            ArbitrationError::Validation(v) => Self::Validation(v),
            ArbitrationError::Order(o) => Self::Order(o),
            other => Self::Arbitration(other),
        }
    }
}

fn not_found(what: impl std::fmt::Display) -> EngineError {
    EngineError::NotFound {
        what: what.to_string(),
    }
}

// ─── Inputs and Outputs ──────────────────────────────────────────────

/// A buyer's checkout of a listing.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// The listing's seller.
    pub seller_id: ProfileId,
    /// Price paid, excluding the service fee.
    pub amount: Amount,
    pub quantity: u32,
    /// Listing data as shown at checkout.
    pub listing: ListingSnapshot,
}

/// Outcome of an admin verdict.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The order after the verdict.
    pub order: Order,
    /// The settled dispute, when one was on file.
    pub dispute: Option<Dispute>,
    /// The sealed audit entry.
    pub admin_action: AdminAction,
}

/// Tally of one auto-completion sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Due orders read from the store.
    pub examined: usize,
    /// Orders moved to `completed`.
    pub completed: usize,
    /// Orders that changed under the sweep (confirmed or disputed meanwhile).
    pub skipped: usize,
    /// Orders whose commit failed for another reason.
    pub failed: usize,
}

// ─── Engine ──────────────────────────────────────────────────────────

/// Orchestrates the order lifecycle over a [`MarketStore`].
pub struct OrderEngine {
    store: Arc<dyn MarketStore>,
    notifier: Dispatcher,
    window: ProtectionWindow,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for OrderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderEngine")
            .field("window", &self.window)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl OrderEngine {
    pub fn new(
        store: Arc<dyn MarketStore>,
        notifier: Dispatcher,
        window: ProtectionWindow,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            window,
            clock,
        }
    }

    /// The buyer protection window in force.
    pub fn window(&self) -> &ProtectionWindow {
        &self.window
    }

    /// The engine's clock.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Whether the store answers.
    pub async fn ping(&self) -> Result<(), EngineError> {
        Ok(self.store.ping().await?)
    }

    // -- Profiles --

    /// The actor for an authenticated profile id.
    ///
    /// Profiles are provisioned on first sight, as the auth provider's
    /// sign-up hook would; the new profile is a regular user. Provisioning
    /// never overwrites a row written concurrently, so the actor is always
    /// read back from the store.
    pub async fn resolve_actor(&self, id: ProfileId) -> Result<Actor, EngineError> {
        if let Some(profile) = self.store.profile(id).await? {
            return Ok(profile.actor());
        }
        let now = self.clock.now();
        let simple = id.as_uuid().simple().to_string();
        let profile = Profile::new(id, format!("user_{}", &simple[..8]), now);
        self.store
            .commit(WriteBatch::new(now).provision_profile(profile))
            .await?;
        tracing::info!(profile_id = %id, "profile provisioned");
        Ok(self.profile(id).await?.actor())
    }

    /// Insert or replace a profile.
    pub async fn register_profile(&self, profile: Profile) -> Result<Profile, EngineError> {
        self.store
            .commit(WriteBatch::new(self.clock.now()).upsert_profile(profile.clone()))
            .await?;
        Ok(profile)
    }

    /// Make `id` an admin, creating the profile if needed. Other fields of
    /// an existing profile are left alone.
    pub async fn ensure_admin(&self, id: ProfileId) -> Result<Profile, EngineError> {
        let now = self.clock.now();
        self.store
            .commit(
                WriteBatch::new(now)
                    .provision_profile(Profile::new(id, "admin", now))
                    .grant_admin(id),
            )
            .await?;
        self.profile(id).await
    }

    pub async fn profile(&self, id: ProfileId) -> Result<Profile, EngineError> {
        self.store.profile(id).await?.ok_or_else(|| not_found(id))
    }

    // -- Orders --

    /// Create a `pending` order with the caller as buyer.
    pub async fn create_order(
        &self,
        actor: &Actor,
        request: OrderRequest,
    ) -> Result<Order, EngineError> {
        if actor.is_banned() {
            return Err(OrderError::ActorBanned {
                actor: actor.to_string(),
            }
            .into());
        }
        let buyer_id = actor
            .profile_id()
            .ok_or_else(|| EngineError::Forbidden(format!("{actor} cannot place orders")))?;

        let now = self.clock.now();
        let order = Order::new(
            NewOrder {
                buyer_id,
                seller_id: request.seller_id,
                amount: request.amount,
                quantity: request.quantity,
                listing: request.listing,
            },
            now,
        )?;

        let seller = self
            .store
            .profile(order.seller_id)
            .await?
            .ok_or_else(|| not_found(order.seller_id))?;
        if seller.is_banned {
            return Err(EngineError::Conflict(format!(
                "seller {} is banned and cannot sell",
                seller.id
            )));
        }

        self.store
            .commit(WriteBatch::new(now).insert_order(order.clone()))
            .await?;
        tracing::info!(
            order_id = %order.id,
            buyer_id = %order.buyer_id,
            seller_id = %order.seller_id,
            amount_cents = order.amount.cents(),
            "order created"
        );
        Ok(order)
    }

    async fn load_order(&self, id: OrderId) -> Result<Order, EngineError> {
        self.store.order(id).await?.ok_or_else(|| not_found(id))
    }

    async fn visible_order(&self, actor: &Actor, id: OrderId) -> Result<Order, EngineError> {
        let order = self.load_order(id).await?;
        if !order.is_visible_to(actor) {
            return Err(not_found(id));
        }
        Ok(order)
    }

    /// Fetch an order the caller may see.
    pub async fn order(&self, actor: &Actor, id: OrderId) -> Result<Order, EngineError> {
        self.visible_order(actor, id).await
    }

    /// Orders where the caller is buyer or seller, newest first.
    pub async fn orders_for(&self, actor: &Actor) -> Result<Vec<Order>, EngineError> {
        match actor.profile_id() {
            Some(id) => Ok(self.store.orders_for_party(id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Apply one transition and commit it conditionally.
    async fn transition(
        &self,
        actor: &Actor,
        id: OrderId,
        action: OrderAction,
    ) -> Result<(Order, OrderTransition), EngineError> {
        let mut order = self.visible_order(actor, id).await?;
        let transition = self.apply_and_commit(&mut order, actor, action).await?;
        Ok((order, transition))
    }

    async fn apply_and_commit(
        &self,
        order: &mut Order,
        actor: &Actor,
        action: OrderAction,
    ) -> Result<OrderTransition, EngineError> {
        let now = self.clock.now();
        let expected = order.status;
        let mut next = order.clone();
        let transition = next.apply(actor, action, now, &self.window)?;
        self.store
            .commit(WriteBatch::new(now).update_order(next.clone(), expected))
            .await?;
        *order = next;
        record_transition(&transition);
        Ok(transition)
    }

    /// `pending → paid`. Instant-delivery orders then move straight on to
    /// `delivered` as the platform.
    pub async fn capture_payment(&self, actor: &Actor, id: OrderId) -> Result<Order, EngineError> {
        let (mut order, _) = self.transition(actor, id, OrderAction::CapturePayment).await?;
        self.notifier.send_order_emails(&order);

        if order.listing.delivery_type == DeliveryType::Instant {
            match self
                .apply_and_commit(&mut order, &Actor::System, OrderAction::AutoDeliver)
                .await
            {
                Ok(_) => self.notifier.send_delivered_email(&order, self.window.hours()),
                Err(err) => {
                    tracing::error!(order_id = %order.id, error = %err, "instant delivery failed");
                }
            }
        }
        Ok(order)
    }

    /// `paid → delivered` by the seller of a manual-delivery order.
    pub async fn mark_delivered(&self, actor: &Actor, id: OrderId) -> Result<Order, EngineError> {
        let (order, _) = self.transition(actor, id, OrderAction::MarkDelivered).await?;
        self.notifier.send_delivered_email(&order, self.window.hours());
        Ok(order)
    }

    /// `delivered → completed` by the buyer.
    pub async fn confirm_receipt(&self, actor: &Actor, id: OrderId) -> Result<Order, EngineError> {
        let (order, _) = self.transition(actor, id, OrderAction::ConfirmReceipt).await?;
        Ok(order)
    }

    /// Cancel a pending order (buyer or admin) or a paid order (admin).
    /// Cancellation by an admin acting as such is audited.
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        id: OrderId,
        reason: Option<String>,
    ) -> Result<Order, EngineError> {
        let mut order = self.visible_order(actor, id).await?;
        let now = self.clock.now();
        let expected = order.status;
        let transition = order.apply(actor, OrderAction::Cancel, now, &self.window)?;

        let mut batch = WriteBatch::new(now).update_order(order.clone(), expected);
        if transition.role == OrderRole::Admin {
            let admin_id = require_admin(actor, "cancel orders")?;
            let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
            batch = batch.audit(
                AdminActionDraft::new(
                    admin_id,
                    AdminActionType::OrderCancelled,
                    TargetType::Order,
                    *order.id.as_uuid(),
                    format!("{} cancelled by admin", order.id),
                )
                .with_metadata(serde_json::json!({
                    "previous_status": transition.from.as_str(),
                    "new_status": transition.to.as_str(),
                    "payment_status": order.payment_status.as_str(),
                    "reason": reason,
                })),
            );
        }
        self.store.commit(batch).await?;
        record_transition(&transition);
        Ok(order)
    }

    // -- Disputes --

    /// The buyer disputes a paid or delivered order.
    ///
    /// The filing is validated before anything is read. The dispute row and
    /// the order's move to `dispute_raised` commit together.
    pub async fn open_dispute(
        &self,
        actor: &Actor,
        id: OrderId,
        filing: DisputeFiling,
    ) -> Result<Dispute, EngineError> {
        let filing = filing.validate()?;

        let mut order = self.visible_order(actor, id).await?;
        let now = self.clock.now();
        let expected = order.status;
        let transition = order.apply(
            actor,
            OrderAction::RaiseDispute {
                reason: filing.reason.label().to_string(),
            },
            now,
            &self.window,
        )?;

        if let Some(open) = self.store.latest_dispute(id).await? {
            if open.status.is_active() {
                return Err(EngineError::Conflict(format!(
                    "{id} already has an open dispute ({})",
                    open.id
                )));
            }
        }

        let dispute = Dispute::open(order.id, order.buyer_id, filing, transition.at);
        self.store
            .commit(
                WriteBatch::new(now)
                    .insert_dispute(dispute.clone())
                    .update_order(order.clone(), expected),
            )
            .await?;
        record_transition(&transition);
        tracing::info!(
            order_id = %order.id,
            dispute_id = %dispute.id,
            reason = dispute.reason.label(),
            "dispute opened"
        );
        self.notifier.send_dispute_emails(&order, dispute.reason);
        Ok(dispute)
    }

    /// The dispute currently open on an order, if the order is disputed.
    pub async fn active_dispute(
        &self,
        actor: &Actor,
        id: OrderId,
    ) -> Result<Option<Dispute>, EngineError> {
        let order = self.visible_order(actor, id).await?;
        if order.status != OrderStatus::DisputeRaised {
            return Ok(None);
        }
        Ok(self.store.latest_dispute(id).await?)
    }

    /// An admin takes the open dispute on an order under review.
    pub async fn begin_review(&self, actor: &Actor, id: OrderId) -> Result<Dispute, EngineError> {
        require_admin(actor, "review disputes")?;
        let order = self.load_order(id).await?;
        let mut dispute = self
            .store
            .latest_dispute(order.id)
            .await?
            .filter(|d| d.status.is_active())
            .ok_or_else(|| not_found(format!("open dispute on {id}")))?;

        let now = self.clock.now();
        let expected = dispute.status;
        let draft = dispute.begin_review(actor, now)?;
        self.store
            .commit(
                WriteBatch::new(now)
                    .update_dispute(dispute.clone(), expected)
                    .audit(draft),
            )
            .await?;
        tracing::info!(order_id = %id, dispute_id = %dispute.id, "dispute under review");
        Ok(dispute)
    }

    /// An admin decides a disputed order.
    ///
    /// The order write is conditioned on `dispute_raised` and the dispute
    /// write on its current status, so of two racing verdicts exactly one
    /// lands and the other gets a conflict.
    pub async fn resolve_dispute(
        &self,
        actor: &Actor,
        id: OrderId,
        verdict: Verdict,
        notes: Option<String>,
    ) -> Result<Resolved, EngineError> {
        require_admin(actor, "resolve disputes")?;
        let mut order = self.load_order(id).await?;
        let mut dispute = self
            .store
            .latest_dispute(id)
            .await?
            .filter(|d| d.status.is_active());

        let now = self.clock.now();
        let expected_order = order.status;
        let expected_dispute = dispute.as_ref().map(|d| d.status);
        let resolution = adjudicate(
            &mut order,
            dispute.as_mut(),
            actor,
            verdict,
            notes,
            now,
            &self.window,
        )?;

        let mut batch = WriteBatch::new(now)
            .update_order(order.clone(), expected_order)
            .audit(resolution.audit);
        if let (Some(d), Some(expected)) = (dispute.as_ref(), expected_dispute) {
            batch = batch.update_dispute(d.clone(), expected);
        }
        let admin_action = self
            .store
            .commit(batch)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Corrupt("verdict committed without audit entry".into()))?;

        record_transition(&resolution.transition);
        tracing::info!(
            order_id = %id,
            verdict = %verdict,
            admin_action = admin_action.sequence,
            "dispute resolved"
        );
        self.notifier.send_resolution_emails(&order, verdict);
        Ok(Resolved {
            order,
            dispute,
            admin_action,
        })
    }

    // -- Reviews --

    /// The buyer reviews a completed order. An order whose review an admin
    /// deleted stays reviewed.
    pub async fn submit_review(
        &self,
        actor: &Actor,
        id: OrderId,
        draft: ReviewDraft,
    ) -> Result<Review, EngineError> {
        check_rating(draft.rating)?;
        check_comment(draft.comment.as_deref())?;

        let order = self.visible_order(actor, id).await?;
        let now = self.clock.now();
        let review = Review::submit(&order, actor, &draft, now)?;
        if self.store.review_for_order(id).await?.is_some() {
            return Err(EngineError::Conflict(format!("{id} has already been reviewed")));
        }
        self.store
            .commit(WriteBatch::new(now).review(ReviewWrite::Insert(review.clone())))
            .await?;
        tracing::info!(order_id = %id, review_id = %review.id, rating = review.rating, "review submitted");
        Ok(review)
    }

    /// The review on an order. Reviews are public to signed-in users;
    /// deleted ones are hidden.
    pub async fn review_for_order(&self, id: OrderId) -> Result<Option<Review>, EngineError> {
        self.load_order(id).await?;
        Ok(self
            .store
            .review_for_order(id)
            .await?
            .filter(|r| !r.is_deleted()))
    }

    async fn live_review(&self, id: ReviewId) -> Result<Review, EngineError> {
        self.store
            .review(id)
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| not_found(id))
    }

    /// An admin edits a review.
    pub async fn admin_edit_review(
        &self,
        actor: &Actor,
        id: ReviewId,
        edit: ReviewEdit,
    ) -> Result<Review, EngineError> {
        require_admin(actor, "edit reviews")?;
        let mut review = self.live_review(id).await?;
        let now = self.clock.now();
        let draft = review.admin_edit(actor, &edit, now)?;
        self.store
            .commit(
                WriteBatch::new(now)
                    .review(ReviewWrite::Update(review.clone()))
                    .audit(draft),
            )
            .await?;
        tracing::info!(review_id = %id, "review edited by admin");
        Ok(review)
    }

    /// An admin deletes a review. The row becomes a tombstone and the audit
    /// entry keeps its content.
    pub async fn admin_delete_review(
        &self,
        actor: &Actor,
        id: ReviewId,
        reason: Option<String>,
    ) -> Result<AdminAction, EngineError> {
        require_admin(actor, "delete reviews")?;
        let mut review = self.live_review(id).await?;
        let now = self.clock.now();
        let draft = review.mark_deleted(actor, reason.as_deref(), now)?;
        let sealed = self
            .store
            .commit(
                WriteBatch::new(now)
                    .review(ReviewWrite::Update(review))
                    .audit(draft),
            )
            .await?;
        tracing::info!(review_id = %id, "review deleted by admin");
        sealed
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Corrupt("deletion committed without audit entry".into()).into())
    }

    // -- Moderation --

    /// Ban or unban a profile.
    pub async fn set_banned(
        &self,
        actor: &Actor,
        target: ProfileId,
        banned: bool,
        reason: Option<String>,
    ) -> Result<Profile, EngineError> {
        let admin_id = require_admin(actor, "ban users")?;
        if admin_id == target {
            return Err(ValidationError::Invalid {
                field: "profile_id",
                reason: "admins cannot change their own ban status".to_string(),
            }
            .into());
        }
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        if let Some(r) = &reason {
            gmx_core::error::check_length("reason", r, 1, MAX_BAN_REASON_CHARS)?;
        }

        let mut profile = self.profile(target).await?;
        if profile.is_banned == banned {
            return Err(EngineError::Conflict(format!(
                "{target} is already {}",
                if banned { "banned" } else { "not banned" }
            )));
        }
        profile.is_banned = banned;

        let (action_type, verb) = if banned {
            (AdminActionType::UserBanned, "banned")
        } else {
            (AdminActionType::UserUnbanned, "unbanned")
        };
        let draft = AdminActionDraft::new(
            admin_id,
            action_type,
            TargetType::Profile,
            *target.as_uuid(),
            format!("{} {verb}", profile.username),
        )
        .with_metadata(serde_json::json!({
            "username": profile.username,
            "reason": reason,
        }));

        self.store
            .commit(
                WriteBatch::new(self.clock.now())
                    .set_banned(target, banned)
                    .audit(draft),
            )
            .await?;
        tracing::warn!(profile_id = %target, admin_id = %admin_id, banned, "ban status changed");
        Ok(profile)
    }

    /// The audit trail, optionally narrowed to one target.
    pub async fn admin_actions(
        &self,
        actor: &Actor,
        target: Option<Uuid>,
    ) -> Result<Vec<AdminAction>, EngineError> {
        require_admin(actor, "read the audit log")?;
        Ok(match target {
            Some(id) => self.store.admin_actions_for(id).await?,
            None => self.store.admin_actions().await?,
        })
    }

    /// Re-hash the whole audit chain.
    pub async fn verify_audit_chain(&self, actor: &Actor) -> Result<ChainVerification, EngineError> {
        require_admin(actor, "verify the audit log")?;
        let actions = self.store.admin_actions().await?;
        let verification = verify_chain(&actions);
        if !verification.chain_valid {
            tracing::error!(
                broken_links = verification.broken_links,
                first_broken_sequence = ?verification.first_broken_sequence,
                "audit chain verification failed"
            );
        }
        Ok(verification)
    }

    /// Wait for notifications already handed to the dispatcher.
    pub async fn flush_notifications(&self) {
        self.notifier.flush().await;
    }

    // -- Auto-completion --

    /// Complete every delivered order whose protection window has elapsed.
    ///
    /// Orders that changed since the read (confirmed, disputed) are skipped.
    pub async fn auto_complete_due(&self, limit: usize) -> Result<SweepReport, EngineError> {
        let now = self.clock.now();
        let due = self
            .store
            .orders_delivered_before(self.window.elapsed_cutoff(now), limit)
            .await?;

        let mut report = SweepReport {
            examined: due.len(),
            ..SweepReport::default()
        };
        for mut order in due {
            let id = order.id;
            match self
                .apply_and_commit(&mut order, &Actor::System, OrderAction::AutoComplete)
                .await
            {
                Ok(_) => {
                    report.completed += 1;
                    metrics::counter!("gmx_auto_completed_total").increment(1);
                }
                Err(EngineError::Store(StoreError::Conflict(detail))) => {
                    report.skipped += 1;
                    tracing::debug!(order_id = %id, %detail, "order changed before auto-completion");
                }
                Err(EngineError::Order(err)) => {
                    report.skipped += 1;
                    tracing::debug!(order_id = %id, error = %err, "order not eligible for auto-completion");
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(order_id = %id, error = %err, "auto-completion failed");
                }
            }
        }
        Ok(report)
    }
}

fn record_transition(t: &OrderTransition) {
    metrics::counter!(
        "gmx_order_transitions_total",
        "from" => t.from.as_str(),
        "to" => t.to.as_str()
    )
    .increment(1);
    tracing::info!(
        order_id = %t.order_id,
        from = %t.from,
        to = %t.to,
        action = %t.action,
        role = t.role.as_str(),
        "order transitioned"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::tests::RecordingNotifier;
    use crate::notify::{Notice, Notifier, NotifyError};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use gmx_arbitration::DisputeStatus;
    use gmx_core::{ListingId, ManualClock, Timestamp};
    use gmx_state::{PaymentStatus, ResolutionType};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Yields to the scheduler before every call, so operations joined on
    /// one task interleave their reads and writes.
    struct YieldingStore(MemoryStore);

    #[async_trait]
    impl MarketStore for YieldingStore {
        async fn commit(&self, batch: WriteBatch) -> Result<Vec<AdminAction>, StoreError> {
            tokio::task::yield_now().await;
            self.0.commit(batch).await
        }
        async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
            tokio::task::yield_now().await;
            self.0.order(id).await
        }
        async fn orders_for_party(&self, p: ProfileId) -> Result<Vec<Order>, StoreError> {
            tokio::task::yield_now().await;
            self.0.orders_for_party(p).await
        }
        async fn orders_delivered_before(
            &self,
            cutoff: Timestamp,
            limit: usize,
        ) -> Result<Vec<Order>, StoreError> {
            tokio::task::yield_now().await;
            self.0.orders_delivered_before(cutoff, limit).await
        }
        async fn latest_dispute(&self, order: OrderId) -> Result<Option<Dispute>, StoreError> {
            tokio::task::yield_now().await;
            self.0.latest_dispute(order).await
        }
        async fn review(&self, id: ReviewId) -> Result<Option<Review>, StoreError> {
            tokio::task::yield_now().await;
            self.0.review(id).await
        }
        async fn review_for_order(&self, order: OrderId) -> Result<Option<Review>, StoreError> {
            tokio::task::yield_now().await;
            self.0.review_for_order(order).await
        }
        async fn profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
            tokio::task::yield_now().await;
            self.0.profile(id).await
        }
        async fn admin_actions_for(&self, target: Uuid) -> Result<Vec<AdminAction>, StoreError> {
            tokio::task::yield_now().await;
            self.0.admin_actions_for(target).await
        }
        async fn admin_actions(&self) -> Result<Vec<AdminAction>, StoreError> {
            tokio::task::yield_now().await;
            self.0.admin_actions().await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            self.0.ping().await
        }
    }

    /// Records deliveries, but only once the test opens the gate.
    struct GatedNotifier {
        gate: Semaphore,
        inner: RecordingNotifier,
    }

    #[async_trait]
    impl Notifier for GatedNotifier {
        async fn deliver(&self, recipient: ProfileId, notice: &Notice) -> Result<(), NotifyError> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| NotifyError::Transport(e.to_string()))?;
            permit.forget();
            self.inner.deliver(recipient, notice).await
        }
    }

    struct Harness {
        engine: OrderEngine,
        store: MemoryStore,
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
        buyer: Actor,
        seller: Actor,
        admin: Actor,
    }

    fn t0() -> Timestamp {
        Timestamp::parse("2026-03-01T10:00:00Z").unwrap()
    }

    async fn harness() -> Harness {
        build_harness(false).await
    }

    /// A harness whose store yields on every call.
    async fn racing_harness() -> Harness {
        build_harness(true).await
    }

    async fn build_harness(yielding: bool) -> Harness {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let notifier = Arc::new(RecordingNotifier::default());
        let backing: Arc<dyn MarketStore> = if yielding {
            Arc::new(YieldingStore(store.clone()))
        } else {
            Arc::new(store.clone())
        };
        let engine = OrderEngine::new(
            backing,
            Dispatcher::new(notifier.clone(), Duration::from_secs(1)),
            ProtectionWindow::default(),
            clock.clone(),
        );
        let buyer = engine
            .register_profile(Profile::new(ProfileId::new(), "buyer", t0()))
            .await
            .unwrap()
            .actor();
        let seller = engine
            .register_profile(Profile::new(ProfileId::new(), "seller", t0()))
            .await
            .unwrap()
            .actor();
        let admin = engine.ensure_admin(ProfileId::new()).await.unwrap().actor();
        Harness {
            engine,
            store,
            clock,
            notifier,
            buyer,
            seller,
            admin,
        }
    }

    fn request(h: &Harness, delivery_type: DeliveryType) -> OrderRequest {
        OrderRequest {
            seller_id: h.seller.profile_id().unwrap(),
            amount: Amount::from_cents(10_000),
            quantity: 1,
            listing: ListingSnapshot {
                listing_id: ListingId::new(),
                title: "Level 80 account".to_string(),
                game: "Example Quest".to_string(),
                category: "accounts".to_string(),
                image_url: None,
                delivery_type,
            },
        }
    }

    async fn delivered_order(h: &Harness) -> Order {
        let o = h.engine.create_order(&h.buyer, request(h, DeliveryType::Manual)).await.unwrap();
        h.engine.capture_payment(&h.buyer, o.id).await.unwrap();
        h.engine.mark_delivered(&h.seller, o.id).await.unwrap()
    }

    fn filing() -> DisputeFiling {
        DisputeFiling {
            reason: "Account credentials invalid".to_string(),
            description: "The password was changed before I could log in".to_string(),
            evidence_urls: vec!["https://img.example.com/screenshot.png".to_string()],
        }
    }

    #[tokio::test]
    async fn test_happy_path_manual_delivery() {
        let h = harness().await;
        let o = delivered_order(&h).await;
        assert_eq!(o.status, OrderStatus::Delivered);
        assert_eq!(o.payment_status, PaymentStatus::Paid);
        assert_eq!(o.delivered_at, Some(t0()));

        h.clock.advance_hours(3);
        let done = h.engine.confirm_receipt(&h.buyer, o.id).await.unwrap();
        assert_eq!(done.status, OrderStatus::Completed);
        assert_eq!(done.completed_at, Some(t0().plus_hours(3)));
        done.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_instant_order_is_delivered_on_payment() {
        let h = harness().await;
        let o = h.engine.create_order(&h.buyer, request(&h, DeliveryType::Instant)).await.unwrap();
        let paid = h.engine.capture_payment(&h.buyer, o.id).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Delivered);
        assert_eq!(h.store.order(o.id).await.unwrap().unwrap().status, OrderStatus::Delivered);

        h.engine.flush_notifications().await;
        let sent = h.notifier.sent.lock();
        assert!(sent.iter().any(|(_, n)| matches!(n, Notice::OrderPaid { .. })));
        assert!(sent.iter().any(|(_, n)| matches!(n, Notice::OrderDelivered { .. })));
    }

    #[tokio::test]
    async fn test_seller_cannot_deliver_unpaid_order() {
        let h = harness().await;
        let o = h.engine.create_order(&h.buyer, request(&h, DeliveryType::Manual)).await.unwrap();
        let err = h.engine.mark_delivered(&h.seller, o.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Order(OrderError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_unknown_seller_rejected() {
        let h = harness().await;
        let mut req = request(&h, DeliveryType::Manual);
        req.seller_id = ProfileId::new();
        assert!(matches!(
            h.engine.create_order(&h.buyer, req).await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_strangers_cannot_see_orders() {
        let h = harness().await;
        let o = delivered_order(&h).await;
        let stranger = h.engine.resolve_actor(ProfileId::new()).await.unwrap();
        assert!(matches!(
            h.engine.order(&stranger, o.id).await,
            Err(EngineError::NotFound { .. })
        ));
        assert!(h.engine.order(&h.admin, o.id).await.is_ok());
        assert_eq!(h.engine.orders_for(&h.seller).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispute_then_buyer_verdict() {
        let h = harness().await;
        let o = delivered_order(&h).await;
        h.clock.advance_hours(2);
        let d = h.engine.open_dispute(&h.buyer, o.id, filing()).await.unwrap();
        assert_eq!(d.status, DisputeStatus::Open);

        let active = h.engine.active_dispute(&h.seller, o.id).await.unwrap().unwrap();
        assert_eq!(active.id, d.id);

        h.clock.advance_hours(1);
        let r = h
            .engine
            .resolve_dispute(&h.admin, o.id, Verdict::Buyer, Some("Refunding".into()))
            .await
            .unwrap();
        assert_eq!(r.order.status, OrderStatus::Refunded);
        assert_eq!(r.order.resolution_type, Some(ResolutionType::Refunded));
        assert_eq!(r.dispute.unwrap().status, DisputeStatus::Resolved);
        assert_eq!(r.admin_action.action_type, AdminActionType::DisputeResolvedBuyer);
        assert_eq!(r.admin_action.metadata["dispute_id"], d.id.as_uuid().to_string());

        // Order no longer disputed, so there is no active dispute.
        assert!(h.engine.active_dispute(&h.buyer, o.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_resolution_conflicts() {
        let h = harness().await;
        let o = delivered_order(&h).await;
        h.engine.open_dispute(&h.buyer, o.id, filing()).await.unwrap();
        h.engine
            .resolve_dispute(&h.admin, o.id, Verdict::Seller, None)
            .await
            .unwrap();
        let err = h
            .engine
            .resolve_dispute(&h.admin, o.id, Verdict::Buyer, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Order(OrderError::AlreadyTerminal { .. })));
        assert_eq!(h.engine.admin_actions(&h.admin, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_resolution_loses_race() {
        let h = harness().await;
        let o = delivered_order(&h).await;
        h.engine.open_dispute(&h.buyer, o.id, filing()).await.unwrap();

        // Another admin resolved between our read and our write.
        let mut stored = h.store.order(o.id).await.unwrap().unwrap();
        let snapshot = stored.clone();
        stored.status = OrderStatus::Completed;
        stored.completed_at = Some(t0());
        h.store.force_order(stored);
        let mut stale = snapshot;
        let transition = stale
            .apply(
                &h.admin,
                OrderAction::ResolveForBuyer { notes: None },
                t0(),
                &ProtectionWindow::default(),
            )
            .unwrap();
        let err = h
            .store
            .commit(WriteBatch::new(t0()).update_order(stale, transition.from))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_non_admin_resolution_forbidden() {
        let h = harness().await;
        let o = delivered_order(&h).await;
        h.engine.open_dispute(&h.buyer, o.id, filing()).await.unwrap();
        let err = h
            .engine
            .resolve_dispute(&h.buyer, o.id, Verdict::Buyer, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Arbitration(ArbitrationError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_filing_rejected_before_read() {
        let h = harness().await;
        let mut bad = filing();
        bad.description = "too short".to_string();
        // The order does not exist, yet validation answers first.
        assert!(matches!(
            h.engine.open_dispute(&h.buyer, OrderId::new(), bad).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_dispute_after_window_rejected() {
        let h = harness().await;
        let o = delivered_order(&h).await;
        h.clock.advance_hours(48);
        assert!(matches!(
            h.engine.open_dispute(&h.buyer, o.id, filing()).await,
            Err(EngineError::Order(OrderError::ProtectionWindowElapsed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_begin_review_is_audited() {
        let h = harness().await;
        let o = delivered_order(&h).await;
        h.engine.open_dispute(&h.buyer, o.id, filing()).await.unwrap();
        let d = h.engine.begin_review(&h.admin, o.id).await.unwrap();
        assert_eq!(d.status, DisputeStatus::UnderReview);
        let trail = h.engine.admin_actions(&h.admin, Some(*d.id.as_uuid())).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action_type, AdminActionType::DisputeUnderReview);

        let r = h
            .engine
            .resolve_dispute(&h.admin, o.id, Verdict::Seller, None)
            .await
            .unwrap();
        assert_eq!(r.dispute.unwrap().status, DisputeStatus::Closed);
        assert!(h.engine.verify_audit_chain(&h.admin).await.unwrap().chain_valid);
    }

    #[tokio::test]
    async fn test_auto_complete_sweep() {
        let h = harness().await;
        let due = delivered_order(&h).await;
        h.clock.advance_hours(24);
        let fresh = delivered_order(&h).await;
        let disputed = delivered_order(&h).await;
        h.engine.open_dispute(&h.buyer, disputed.id, filing()).await.unwrap();

        h.clock.advance_hours(24);
        let report = h.engine.auto_complete_due(SWEEP_BATCH_LIMIT).await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 0);

        let due = h.store.order(due.id).await.unwrap().unwrap();
        assert_eq!(due.status, OrderStatus::Completed);
        assert_eq!(due.completed_at, Some(t0().plus_hours(48)));
        assert_eq!(
            h.store.order(fresh.id).await.unwrap().unwrap().status,
            OrderStatus::Delivered
        );
        assert_eq!(
            h.store.order(disputed.id).await.unwrap().unwrap().status,
            OrderStatus::DisputeRaised
        );

        // A second sweep finds nothing new.
        let again = h.engine.auto_complete_due(SWEEP_BATCH_LIMIT).await.unwrap();
        assert_eq!(again.completed, 0);
    }

    #[tokio::test]
    async fn test_review_lifecycle() {
        let h = harness().await;
        let o = delivered_order(&h).await;
        let draft = ReviewDraft {
            rating: 2,
            comment: Some("Slow".to_string()),
        };
        assert!(matches!(
            h.engine.submit_review(&h.buyer, o.id, draft.clone()).await,
            Err(EngineError::Arbitration(ArbitrationError::ReviewNotAllowed { .. }))
        ));

        h.engine.confirm_receipt(&h.buyer, o.id).await.unwrap();
        let review = h.engine.submit_review(&h.buyer, o.id, draft.clone()).await.unwrap();
        assert!(matches!(
            h.engine.submit_review(&h.buyer, o.id, draft).await,
            Err(EngineError::Conflict(_))
        ));

        let edited = h
            .engine
            .admin_edit_review(
                &h.admin,
                review.id,
                ReviewEdit {
                    rating: Some(4),
                    comment: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.rating, 4);
        assert_eq!(edited.original_rating, 2);

        let deletion = h
            .engine
            .admin_delete_review(&h.admin, review.id, Some("spam".into()))
            .await
            .unwrap();
        assert_eq!(deletion.metadata["rating"], 4);
        assert!(h.engine.review_for_order(o.id).await.unwrap().is_none());
        assert!(h.engine.verify_audit_chain(&h.admin).await.unwrap().chain_valid);

        // The order stays reviewed after the deletion.
        let again = ReviewDraft {
            rating: 5,
            comment: None,
        };
        assert!(matches!(
            h.engine.submit_review(&h.buyer, o.id, again).await,
            Err(EngineError::Conflict(_))
        ));
        let tombstone = h.store.review(review.id).await.unwrap().unwrap();
        assert!(tombstone.is_deleted());
        assert_eq!(tombstone.deleted_by, h.admin.profile_id());

        // A deleted review is gone for moderation too.
        assert!(matches!(
            h.engine.admin_delete_review(&h.admin, review.id, None).await,
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            h.engine
                .admin_edit_review(
                    &h.admin,
                    review.id,
                    ReviewEdit {
                        rating: Some(1),
                        comment: None,
                    },
                )
                .await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_review_rating_validated_first() {
        let h = harness().await;
        let err = h
            .engine
            .submit_review(
                &h.buyer,
                OrderId::new(),
                ReviewDraft {
                    rating: 9,
                    comment: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_banned_buyer_cannot_act() {
        let h = harness().await;
        let o = h.engine.create_order(&h.buyer, request(&h, DeliveryType::Manual)).await.unwrap();
        let buyer_id = h.buyer.profile_id().unwrap();
        h.engine
            .set_banned(&h.admin, buyer_id, true, Some("chargeback fraud".into()))
            .await
            .unwrap();
        let banned = h.engine.resolve_actor(buyer_id).await.unwrap();
        assert!(matches!(
            h.engine.capture_payment(&banned, o.id).await,
            Err(EngineError::Order(OrderError::ActorBanned { .. }))
        ));
        assert!(matches!(
            h.engine.set_banned(&h.admin, buyer_id, true, None).await,
            Err(EngineError::Conflict(_))
        ));
        let admin_id = h.admin.profile_id().unwrap();
        assert!(matches!(
            h.engine.set_banned(&h.admin, admin_id, true, None).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_cancel_of_paid_order_is_audited() {
        let h = harness().await;
        let o = h.engine.create_order(&h.buyer, request(&h, DeliveryType::Manual)).await.unwrap();
        h.engine.capture_payment(&h.buyer, o.id).await.unwrap();
        assert!(matches!(
            h.engine.cancel_order(&h.buyer, o.id, None).await,
            Err(EngineError::Order(OrderError::InvalidTransition { .. }))
        ));
        let cancelled = h
            .engine
            .cancel_order(&h.admin, o.id, Some("seller unreachable".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Paid);
        let trail = h.engine.admin_actions(&h.admin, Some(*o.id.as_uuid())).await.unwrap();
        assert_eq!(trail[0].action_type, AdminActionType::OrderCancelled);
    }

    #[tokio::test]
    async fn test_failed_notification_does_not_fail_operation() {
        let store = MemoryStore::new();
        let failing = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let engine = OrderEngine::new(
            Arc::new(store),
            Dispatcher::new(failing.clone(), Duration::from_secs(1)),
            ProtectionWindow::default(),
            Arc::new(ManualClock::new(t0())),
        );
        let buyer = engine.resolve_actor(ProfileId::new()).await.unwrap();
        let seller = engine.resolve_actor(ProfileId::new()).await.unwrap();
        let o = engine
            .create_order(
                &buyer,
                OrderRequest {
                    seller_id: seller.profile_id().unwrap(),
                    amount: Amount::from_cents(500),
                    quantity: 1,
                    listing: ListingSnapshot {
                        listing_id: ListingId::new(),
                        title: "Gift card".to_string(),
                        game: "Example Store".to_string(),
                        category: "gift_cards".to_string(),
                        image_url: None,
                        delivery_type: DeliveryType::Manual,
                    },
                },
            )
            .await
            .unwrap();
        let paid = engine.capture_payment(&buyer, o.id).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        engine.flush_notifications().await;
        assert_eq!(failing.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_slow_notifier_does_not_delay_operations() {
        let gated = Arc::new(GatedNotifier {
            gate: Semaphore::new(0),
            inner: RecordingNotifier::default(),
        });
        let engine = OrderEngine::new(
            Arc::new(MemoryStore::new()),
            Dispatcher::new(gated.clone(), Duration::from_secs(3600)),
            ProtectionWindow::default(),
            Arc::new(ManualClock::new(t0())),
        );
        let buyer = engine.resolve_actor(ProfileId::new()).await.unwrap();
        let seller = engine.resolve_actor(ProfileId::new()).await.unwrap();
        let o = engine
            .create_order(
                &buyer,
                OrderRequest {
                    seller_id: seller.profile_id().unwrap(),
                    amount: Amount::from_cents(2_500),
                    quantity: 1,
                    listing: ListingSnapshot {
                        listing_id: ListingId::new(),
                        title: "Currency pack".to_string(),
                        game: "Example Online".to_string(),
                        category: "currency".to_string(),
                        image_url: None,
                        delivery_type: DeliveryType::Manual,
                    },
                },
            )
            .await
            .unwrap();

        // The notifier is blocked; the operation must still return promptly.
        let paid = tokio::time::timeout(
            Duration::from_secs(5),
            engine.capture_payment(&buyer, o.id),
        )
        .await
        .expect("capture_payment waited on the notifier")
        .unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        let delivered = tokio::time::timeout(
            Duration::from_secs(5),
            engine.mark_delivered(&seller, o.id),
        )
        .await
        .expect("mark_delivered waited on the notifier")
        .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert!(gated.inner.sent.lock().is_empty());

        gated.gate.add_permits(16);
        engine.flush_notifications().await;
        assert_eq!(gated.inner.sent.lock().len(), 3);
    }

    // -- Concurrent operations --

    #[tokio::test]
    async fn test_concurrent_resolutions_one_wins() {
        let h = racing_harness().await;
        let o = delivered_order(&h).await;
        h.engine.open_dispute(&h.buyer, o.id, filing()).await.unwrap();

        let (for_buyer, for_seller) = tokio::join!(
            h.engine.resolve_dispute(&h.admin, o.id, Verdict::Buyer, None),
            h.engine.resolve_dispute(&h.admin, o.id, Verdict::Seller, None),
        );

        let (winner, loser) = match (for_buyer, for_seller) {
            (Ok(r), Err(e)) => ((Verdict::Buyer, r), e),
            (Err(e), Ok(r)) => ((Verdict::Seller, r), e),
            (a, b) => panic!("expected exactly one verdict to land, got {a:?} and {b:?}"),
        };
        assert!(
            matches!(
                loser,
                EngineError::Store(StoreError::Conflict(_))
                    | EngineError::Order(OrderError::AlreadyTerminal { .. })
            ),
            "unexpected loser error: {loser:?}"
        );

        let (verdict, resolved) = winner;
        let stored = h.store.order(o.id).await.unwrap().unwrap();
        let expected_status = match verdict {
            Verdict::Buyer => OrderStatus::Refunded,
            Verdict::Seller => OrderStatus::Completed,
        };
        assert_eq!(stored.status, expected_status);
        assert_eq!(stored.status, resolved.order.status);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        stored.check_invariants().unwrap();

        let trail = h.engine.admin_actions(&h.admin, Some(*o.id.as_uuid())).await.unwrap();
        let verdicts: Vec<_> = trail
            .iter()
            .filter(|a| {
                matches!(
                    a.action_type,
                    AdminActionType::DisputeResolvedBuyer | AdminActionType::DisputeResolvedSeller
                )
            })
            .collect();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].id, resolved.admin_action.id);
        assert!(h.engine.verify_audit_chain(&h.admin).await.unwrap().chain_valid);
    }

    #[tokio::test]
    async fn test_confirm_racing_dispute_one_wins() {
        let h = racing_harness().await;
        let o = delivered_order(&h).await;

        let (confirmed, disputed) = tokio::join!(
            h.engine.confirm_receipt(&h.buyer, o.id),
            h.engine.open_dispute(&h.buyer, o.id, filing()),
        );
        assert!(
            confirmed.is_ok() != disputed.is_ok(),
            "expected exactly one winner: {confirmed:?} / {disputed:?}"
        );

        let stored = h.store.order(o.id).await.unwrap().unwrap();
        let dispute = h.store.latest_dispute(o.id).await.unwrap();
        if confirmed.is_ok() {
            assert_eq!(stored.status, OrderStatus::Completed);
            assert!(dispute.is_none());
        } else {
            assert_eq!(stored.status, OrderStatus::DisputeRaised);
            assert!(dispute.is_some());
            // The dispute that won can still be decided exactly once.
            h.engine
                .resolve_dispute(&h.admin, o.id, Verdict::Seller, None)
                .await
                .unwrap();
        }
        stored.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_confirm_racing_sweep_completes_once() {
        let h = racing_harness().await;
        let o = delivered_order(&h).await;
        h.clock.advance_hours(49);

        let (confirmed, report) = tokio::join!(
            h.engine.confirm_receipt(&h.buyer, o.id),
            h.engine.auto_complete_due(SWEEP_BATCH_LIMIT),
        );
        let report = report.unwrap();
        assert_eq!(report.failed, 0);
        assert!(confirmed.is_ok() != (report.completed == 1));

        let stored = h.store.order(o.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert_eq!(stored.completed_at, Some(t0().plus_hours(49)));
    }

    #[tokio::test]
    async fn test_provisioning_keeps_concurrent_admin_grant() {
        let h = racing_harness().await;
        let id = ProfileId::new();
        let (actor, admin) = tokio::join!(h.engine.resolve_actor(id), h.engine.ensure_admin(id));
        actor.unwrap();
        assert!(admin.unwrap().is_admin);
        assert!(h.engine.profile(id).await.unwrap().is_admin);
    }

    #[tokio::test]
    async fn test_store_outage_surfaces() {
        let h = harness().await;
        h.store.set_offline(true);
        assert!(matches!(
            h.engine.orders_for(&h.buyer).await,
            Err(EngineError::Store(StoreError::Unavailable(_)))
        ));
    }
}
