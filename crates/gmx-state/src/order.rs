//! # Order Lifecycle State Machine
//!
//! Models a marketplace order from checkout to a terminal outcome.
//!
//! ## States
//!
//! ```text
//! Pending ──capture_payment──▶ Paid ──mark_delivered / auto_deliver──▶ Delivered
//!    │                          │  │                                     │  │  │
//!  cancel                  cancel  raise_dispute              confirm_receipt │ auto_complete
//!    │                    (admin)  │                                     │  │  │
//!    ▼                          ▼  ▼                                     ▼  │  ▼
//! Cancelled ◀───────────────────┘  DisputeRaised ◀────raise_dispute──────┼──┘ Completed
//!                                     │       │                          │
//!                      resolve_for_buyer     resolve_for_seller ─────────┴──▶ Completed
//!                                     │
//!                                     ▼
//!                                 Refunded
//! ```
//!
//! Terminal states: `Completed`, `Refunded`, `Cancelled`.
//!
//! ## Design Decision
//!
//! Orders are read back from the store with a status known only at
//! runtime, so the lifecycle is a validated enum driven by a single
//! [`TRANSITION_TABLE`] rather than typestate. Every rule (who may do
//! what from which status) lives in that one table; [`Order::apply`] is
//! the only function that changes an order's status.
//!
//! ## Guard Order
//!
//! 1. Banned actors are rejected outright.
//! 2. Authorization: an actor with no role permitted to perform the action
//!    from *any* status gets [`OrderError::Unauthorized`]. A buyer trying to
//!    resolve their own dispute is an authorization failure, not a state
//!    failure.
//! 3. State: no rule for `(status, action, role)` gives
//!    [`OrderError::AlreadyTerminal`] or [`OrderError::InvalidTransition`].
//! 4. Delivery type and protection-window guards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gmx_core::error::check_length;
use gmx_core::{
    fee_breakdown, Actor, Amount, FeeBreakdown, ListingId, OrderId, ProfileId, Timestamp,
    ValidationError,
};

use crate::protection::ProtectionWindow;

/// Maximum length of a listing title snapshot.
pub const MAX_TITLE_CHARS: usize = 200;

// ─── Status Enums ────────────────────────────────────────────────────

/// The lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order placed, payment not yet captured.
    Pending,
    /// Payment captured; awaiting delivery.
    Paid,
    /// Seller (or the platform) delivered; protection window running.
    Delivered,
    /// Funds released to the seller (terminal).
    Completed,
    /// Buyer contested the order; awaiting admin adjudication.
    DisputeRaised,
    /// Dispute decided in the buyer's favor (terminal).
    Refunded,
    /// Order abandoned before delivery (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 7] = [
        Self::Pending,
        Self::Paid,
        Self::Delivered,
        Self::Completed,
        Self::DisputeRaised,
        Self::Refunded,
        Self::Cancelled,
    ];

    /// The canonical string name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::DisputeRaised => "dispute_raised",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the canonical string name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Refunded | Self::Cancelled)
    }

    /// Whether funds are still conceptually held (escrow) in this status.
    pub fn holds_funds(&self) -> bool {
        matches!(self, Self::Paid | Self::Delivered | Self::DisputeRaised)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment capture status, independent of the order status.
///
/// Moves `Pending → Paid` once and is never reversed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No payment captured.
    Pending,
    /// Payment captured.
    Paid,
}

impl PaymentStatus {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }

    /// Parse the canonical string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }
}

/// How a listing is fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    /// The seller hands over the item and marks the order delivered.
    Manual,
    /// The platform delivers automatically on payment (codes, keys).
    Instant,
}

impl DeliveryType {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Instant => "instant",
        }
    }

    /// Parse the canonical string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "instant" => Some(Self::Instant),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeliveryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded on an adjudicated order; mirrors the terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    /// Dispute upheld; buyer refunded.
    Refunded,
    /// Dispute rejected; funds released to the seller.
    Completed,
}

impl ResolutionType {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refunded => "refunded",
            Self::Completed => "completed",
        }
    }

    /// Parse the canonical string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "refunded" => Some(Self::Refunded),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

// ─── Roles, Actions, Transition Table ────────────────────────────────

/// The capacity in which an actor touches an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderRole {
    /// The order's buyer.
    Buyer,
    /// The order's seller.
    Seller,
    /// A profile flagged `is_admin`.
    Admin,
    /// The platform (background jobs, instant delivery).
    System,
}

impl OrderRole {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

/// The kind of an order action, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderActionKind {
    /// Simulated payment capture.
    CapturePayment,
    /// Seller marks a manual-delivery order delivered.
    MarkDelivered,
    /// Platform delivers an instant-delivery order.
    AutoDeliver,
    /// Buyer confirms receipt, releasing funds.
    ConfirmReceipt,
    /// Buyer contests the order.
    RaiseDispute,
    /// Platform completes an order whose protection window elapsed.
    AutoComplete,
    /// Admin upholds a dispute.
    ResolveForBuyer,
    /// Admin rejects a dispute.
    ResolveForSeller,
    /// Order abandoned before delivery.
    Cancel,
}

impl OrderActionKind {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapturePayment => "capture_payment",
            Self::MarkDelivered => "mark_delivered",
            Self::AutoDeliver => "auto_deliver",
            Self::ConfirmReceipt => "confirm_receipt",
            Self::RaiseDispute => "raise_dispute",
            Self::AutoComplete => "auto_complete",
            Self::ResolveForBuyer => "resolve_for_buyer",
            Self::ResolveForSeller => "resolve_for_seller",
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for OrderActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action on an order, carrying the data its side effects need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderAction {
    /// See [`OrderActionKind::CapturePayment`].
    CapturePayment,
    /// See [`OrderActionKind::MarkDelivered`].
    MarkDelivered,
    /// See [`OrderActionKind::AutoDeliver`].
    AutoDeliver,
    /// See [`OrderActionKind::ConfirmReceipt`].
    ConfirmReceipt,
    /// See [`OrderActionKind::RaiseDispute`].
    RaiseDispute {
        /// Short dispute reason copied onto the order.
        reason: String,
    },
    /// See [`OrderActionKind::AutoComplete`].
    AutoComplete,
    /// See [`OrderActionKind::ResolveForBuyer`].
    ResolveForBuyer {
        /// Admin's resolution notes.
        notes: Option<String>,
    },
    /// See [`OrderActionKind::ResolveForSeller`].
    ResolveForSeller {
        /// Admin's resolution notes.
        notes: Option<String>,
    },
    /// See [`OrderActionKind::Cancel`].
    Cancel,
}

impl OrderAction {
    /// The payload-free kind of this action.
    pub fn kind(&self) -> OrderActionKind {
        match self {
            Self::CapturePayment => OrderActionKind::CapturePayment,
            Self::MarkDelivered => OrderActionKind::MarkDelivered,
            Self::AutoDeliver => OrderActionKind::AutoDeliver,
            Self::ConfirmReceipt => OrderActionKind::ConfirmReceipt,
            Self::RaiseDispute { .. } => OrderActionKind::RaiseDispute,
            Self::AutoComplete => OrderActionKind::AutoComplete,
            Self::ResolveForBuyer { .. } => OrderActionKind::ResolveForBuyer,
            Self::ResolveForSeller { .. } => OrderActionKind::ResolveForSeller,
            Self::Cancel => OrderActionKind::Cancel,
        }
    }
}

/// One permitted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    /// Required current status.
    pub from: OrderStatus,
    /// The action performed.
    pub action: OrderActionKind,
    /// The role that may perform it.
    pub role: OrderRole,
    /// Resulting status.
    pub to: OrderStatus,
}

const fn rule(
    from: OrderStatus,
    action: OrderActionKind,
    role: OrderRole,
    to: OrderStatus,
) -> TransitionRule {
    TransitionRule {
        from,
        action,
        role,
        to,
    }
}

/// Every permitted order transition. Anything not listed is rejected.
pub const TRANSITION_TABLE: &[TransitionRule] = {
    use OrderActionKind as A;
    use OrderRole as R;
    use OrderStatus as S;
    &[
        rule(S::Pending, A::CapturePayment, R::Buyer, S::Paid),
        rule(S::Pending, A::Cancel, R::Buyer, S::Cancelled),
        rule(S::Pending, A::Cancel, R::Admin, S::Cancelled),
        rule(S::Paid, A::Cancel, R::Admin, S::Cancelled),
        rule(S::Paid, A::MarkDelivered, R::Seller, S::Delivered),
        rule(S::Paid, A::AutoDeliver, R::System, S::Delivered),
        rule(S::Paid, A::RaiseDispute, R::Buyer, S::DisputeRaised),
        rule(S::Delivered, A::ConfirmReceipt, R::Buyer, S::Completed),
        rule(S::Delivered, A::RaiseDispute, R::Buyer, S::DisputeRaised),
        rule(S::Delivered, A::AutoComplete, R::System, S::Completed),
        rule(S::DisputeRaised, A::ResolveForBuyer, R::Admin, S::Refunded),
        rule(S::DisputeRaised, A::ResolveForSeller, R::Admin, S::Completed),
    ]
};

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors that can occur creating or transitioning an order.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    /// The actor's profile is banned.
    #[error("{actor} is banned and cannot act on orders")]
    ActorBanned {
        /// The banned actor.
        actor: String,
    },

    /// The actor holds no role permitted to perform the action.
    #[error("{actor} is not authorized to {action} on {order_id}")]
    Unauthorized {
        /// The rejected actor.
        actor: String,
        /// The attempted action.
        action: OrderActionKind,
        /// Target order.
        order_id: OrderId,
    },

    /// The action is not permitted from the current status.
    #[error("cannot {action} an order in status {from}")]
    InvalidTransition {
        /// Current status.
        from: OrderStatus,
        /// Attempted action.
        action: OrderActionKind,
    },

    /// The order is in a terminal status.
    #[error("{order_id} is already {status} and cannot transition")]
    AlreadyTerminal {
        /// Target order.
        order_id: OrderId,
        /// Its terminal status.
        status: OrderStatus,
    },

    /// The action does not match the listing's delivery type.
    #[error("{action} is not available for {delivery_type} delivery orders")]
    DeliveryTypeMismatch {
        /// Attempted action.
        action: OrderActionKind,
        /// The order's delivery type.
        delivery_type: DeliveryType,
    },

    /// The buyer protection window has closed.
    #[error("buyer protection window for {order_id} closed at {closed_at}")]
    ProtectionWindowElapsed {
        /// Target order.
        order_id: OrderId,
        /// When the window closed.
        closed_at: Timestamp,
    },

    /// The buyer protection window is still open.
    #[error("buyer protection window for {order_id} is open until {closes_at}")]
    ProtectionWindowOpen {
        /// Target order.
        order_id: OrderId,
        /// When the window closes.
        closes_at: Timestamp,
    },

    /// Order input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A status/timestamp invariant does not hold.
    #[error("{order_id} violates lifecycle invariant: {detail}")]
    InvariantViolation {
        /// Target order.
        order_id: OrderId,
        /// Which invariant failed.
        detail: String,
    },
}

// ─── Order ───────────────────────────────────────────────────────────

/// Listing data copied onto the order at creation.
///
/// Immutable once the order exists; later edits or deletion of the listing
/// never change what the order displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    /// The listing the order was placed against.
    pub listing_id: ListingId,
    /// Listing title.
    pub title: String,
    /// Game the listing belongs to.
    pub game: String,
    /// Listing category (account, currency, items, boosting, …).
    pub category: String,
    /// Cover image URL, if any.
    pub image_url: Option<String>,
    /// Fulfilment mode.
    pub delivery_type: DeliveryType,
}

/// Input for placing a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Purchasing profile.
    pub buyer_id: ProfileId,
    /// Selling profile.
    pub seller_id: ProfileId,
    /// Price paid, excluding the service fee.
    pub amount: Amount,
    /// Units purchased.
    pub quantity: u32,
    /// Listing snapshot.
    pub listing: ListingSnapshot,
}

/// A marketplace order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub id: OrderId,
    /// Purchasing profile.
    pub buyer_id: ProfileId,
    /// Selling profile.
    pub seller_id: ProfileId,
    /// Price paid, excluding the service fee.
    pub amount: Amount,
    /// Units purchased.
    pub quantity: u32,
    /// Listing snapshot taken at creation.
    pub listing: ListingSnapshot,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Payment capture status.
    pub payment_status: PaymentStatus,
    /// When the order was placed.
    pub created_at: Timestamp,
    /// When the order was delivered.
    pub delivered_at: Option<Timestamp>,
    /// When the order reached completed or refunded.
    pub completed_at: Option<Timestamp>,
    /// When a dispute was raised.
    pub dispute_opened_at: Option<Timestamp>,
    /// Short reason from the buyer's dispute.
    pub dispute_reason: Option<String>,
    /// Admin who adjudicated the dispute.
    pub resolved_by: Option<ProfileId>,
    /// Admin's resolution notes.
    pub resolution_notes: Option<String>,
    /// Adjudicated outcome.
    pub resolution_type: Option<ResolutionType>,
}

/// Record of an applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTransition {
    /// Target order.
    pub order_id: OrderId,
    /// Status before.
    pub from: OrderStatus,
    /// Status after.
    pub to: OrderStatus,
    /// The action applied.
    pub action: OrderActionKind,
    /// The role the actor acted in.
    pub role: OrderRole,
    /// When it took effect.
    pub at: Timestamp,
}

impl Order {
    /// Place a new order in `Pending` status.
    pub fn new(input: NewOrder, created_at: Timestamp) -> Result<Self, OrderError> {
        if input.amount.is_zero() {
            return Err(ValidationError::OutOfRange {
                field: "amount",
                min: 1,
                max: i64::MAX,
                actual: 0,
            }
            .into());
        }
        if input.quantity == 0 {
            return Err(ValidationError::OutOfRange {
                field: "quantity",
                min: 1,
                max: i64::from(u32::MAX),
                actual: 0,
            }
            .into());
        }
        if input.buyer_id == input.seller_id {
            return Err(ValidationError::Invalid {
                field: "seller_id",
                reason: "buyers cannot purchase their own listing".to_string(),
            }
            .into());
        }
        let title = input.listing.title.trim();
        if title.is_empty() {
            return Err(ValidationError::Missing { field: "title" }.into());
        }
        check_length("title", title, 1, MAX_TITLE_CHARS)?;

        Ok(Self {
            id: OrderId::new(),
            buyer_id: input.buyer_id,
            seller_id: input.seller_id,
            amount: input.amount,
            quantity: input.quantity,
            listing: input.listing,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            created_at,
            delivered_at: None,
            completed_at: None,
            dispute_opened_at: None,
            dispute_reason: None,
            resolved_by: None,
            resolution_notes: None,
            resolution_type: None,
        })
    }

    /// The derived fee split for this order.
    pub fn pricing(&self) -> FeeBreakdown {
        fee_breakdown(self.amount)
    }

    /// Whether `actor` is the buyer or seller.
    pub fn is_party(&self, actor: &Actor) -> bool {
        actor.is(&self.buyer_id) || actor.is(&self.seller_id)
    }

    /// Whether `actor` may read this order (a party or an admin).
    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        self.is_party(actor) || actor.is_admin() || actor.is_system()
    }

    /// Every role `actor` holds with respect to this order.
    pub fn roles_of(&self, actor: &Actor) -> Vec<OrderRole> {
        let mut roles = Vec::with_capacity(2);
        if actor.is_system() {
            roles.push(OrderRole::System);
        }
        if actor.is(&self.buyer_id) {
            roles.push(OrderRole::Buyer);
        }
        if actor.is(&self.seller_id) {
            roles.push(OrderRole::Seller);
        }
        if actor.is_admin() {
            roles.push(OrderRole::Admin);
        }
        roles
    }

    /// Actions `actor` could attempt from the current status, per the
    /// transition table and delivery type (window guards not applied).
    pub fn permitted_actions(&self, actor: &Actor) -> Vec<OrderActionKind> {
        if actor.is_banned() {
            return Vec::new();
        }
        let roles = self.roles_of(actor);
        let mut actions: Vec<OrderActionKind> = TRANSITION_TABLE
            .iter()
            .filter(|r| r.from == self.status && roles.contains(&r.role))
            .filter(|r| self.delivery_guard(r.action).is_ok())
            .map(|r| r.action)
            .collect();
        actions.dedup();
        actions
    }

    /// The latest lifecycle timestamp set on this order.
    pub fn latest_timestamp(&self) -> Timestamp {
        [self.delivered_at, self.completed_at, self.dispute_opened_at]
            .into_iter()
            .flatten()
            .fold(self.created_at, Timestamp::max)
    }

    /// Apply `action` on behalf of `actor` at `now`.
    ///
    /// On success the order is mutated and the applied transition returned.
    /// On failure the order is left untouched.
    pub fn apply(
        &mut self,
        actor: &Actor,
        action: OrderAction,
        now: Timestamp,
        window: &ProtectionWindow,
    ) -> Result<OrderTransition, OrderError> {
        if actor.is_banned() {
            return Err(OrderError::ActorBanned {
                actor: actor.to_string(),
            });
        }

        let kind = action.kind();
        let roles = self.roles_of(actor);

        let authorized = TRANSITION_TABLE
            .iter()
            .any(|r| r.action == kind && roles.contains(&r.role));
        if !authorized {
            return Err(OrderError::Unauthorized {
                actor: actor.to_string(),
                action: kind,
                order_id: self.id,
            });
        }

        let rule = TRANSITION_TABLE
            .iter()
            .find(|r| r.from == self.status && r.action == kind && roles.contains(&r.role))
            .copied()
            .ok_or_else(|| self.state_error(kind))?;

        self.delivery_guard(kind)?;
        self.window_guard(kind, now, window)?;

        // Lifecycle timestamps never run backwards, even under clock skew.
        let at = now.max(self.latest_timestamp());

        let mut next = self.clone();
        match action {
            OrderAction::CapturePayment => {
                next.payment_status = PaymentStatus::Paid;
            }
            OrderAction::MarkDelivered | OrderAction::AutoDeliver => {
                next.delivered_at = Some(at);
            }
            OrderAction::ConfirmReceipt | OrderAction::AutoComplete => {
                next.completed_at = Some(at);
            }
            OrderAction::RaiseDispute { reason } => {
                next.dispute_opened_at = Some(at);
                next.dispute_reason = Some(reason);
            }
            OrderAction::ResolveForBuyer { notes } => {
                next.completed_at = Some(at);
                next.resolved_by = actor.profile_id();
                next.resolution_notes = notes;
                next.resolution_type = Some(ResolutionType::Refunded);
            }
            OrderAction::ResolveForSeller { notes } => {
                next.completed_at = Some(at);
                next.resolved_by = actor.profile_id();
                next.resolution_notes = notes;
                next.resolution_type = Some(ResolutionType::Completed);
            }
            OrderAction::Cancel => {}
        }
        next.status = rule.to;
        next.check_invariants()?;

        *self = next;
        Ok(OrderTransition {
            order_id: self.id,
            from: rule.from,
            to: rule.to,
            action: kind,
            role: rule.role,
            at,
        })
    }

    fn state_error(&self, action: OrderActionKind) -> OrderError {
        if self.status.is_terminal() {
            OrderError::AlreadyTerminal {
                order_id: self.id,
                status: self.status,
            }
        } else {
            OrderError::InvalidTransition {
                from: self.status,
                action,
            }
        }
    }

    fn delivery_guard(&self, action: OrderActionKind) -> Result<(), OrderError> {
        let required = match action {
            OrderActionKind::MarkDelivered => DeliveryType::Manual,
            OrderActionKind::AutoDeliver => DeliveryType::Instant,
            _ => return Ok(()),
        };
        if self.listing.delivery_type == required {
            Ok(())
        } else {
            Err(OrderError::DeliveryTypeMismatch {
                action,
                delivery_type: self.listing.delivery_type,
            })
        }
    }

    fn window_guard(
        &self,
        action: OrderActionKind,
        now: Timestamp,
        window: &ProtectionWindow,
    ) -> Result<(), OrderError> {
        let delivered_at = match (self.status, self.delivered_at) {
            (OrderStatus::Delivered, Some(at)) => at,
            _ => return Ok(()),
        };
        match action {
            OrderActionKind::RaiseDispute if window.has_elapsed(delivered_at, now) => {
                Err(OrderError::ProtectionWindowElapsed {
                    order_id: self.id,
                    closed_at: window.closes_at(delivered_at),
                })
            }
            OrderActionKind::AutoComplete if window.is_open(delivered_at, now) => {
                Err(OrderError::ProtectionWindowOpen {
                    order_id: self.id,
                    closes_at: window.closes_at(delivered_at),
                })
            }
            _ => Ok(()),
        }
    }

    /// Verify that status, payment status, timestamps and resolution
    /// fields are mutually consistent.
    pub fn check_invariants(&self) -> Result<(), OrderError> {
        let violation = |detail: &str| OrderError::InvariantViolation {
            order_id: self.id,
            detail: detail.to_string(),
        };

        let (needs_delivered, needs_completed, needs_dispute) = match self.status {
            OrderStatus::Delivered => (Some(true), Some(false), Some(false)),
            OrderStatus::DisputeRaised => (None, Some(false), Some(true)),
            OrderStatus::Completed => (None, Some(true), None),
            OrderStatus::Refunded => (None, Some(true), Some(true)),
            OrderStatus::Pending | OrderStatus::Paid | OrderStatus::Cancelled => {
                (Some(false), Some(false), Some(false))
            }
        };
        let checks = [
            (needs_delivered, self.delivered_at.is_some(), "delivered_at"),
            (needs_completed, self.completed_at.is_some(), "completed_at"),
            (needs_dispute, self.dispute_opened_at.is_some(), "dispute_opened_at"),
        ];
        for (required, present, field) in checks {
            match required {
                Some(true) if !present => {
                    return Err(violation(&format!("{} requires {field}", self.status)))
                }
                Some(false) if present => {
                    return Err(violation(&format!("{} forbids {field}", self.status)))
                }
                _ => {}
            }
        }

        let must_be_paid = matches!(
            self.status,
            OrderStatus::Paid
                | OrderStatus::Delivered
                | OrderStatus::Completed
                | OrderStatus::DisputeRaised
                | OrderStatus::Refunded
        );
        if must_be_paid && self.payment_status != PaymentStatus::Paid {
            return Err(violation(&format!("{} requires payment_status paid", self.status)));
        }
        if self.status == OrderStatus::Pending && self.payment_status != PaymentStatus::Pending {
            return Err(violation("pending requires payment_status pending"));
        }

        for (later, earlier, label) in [
            (self.delivered_at, Some(self.created_at), "delivered_at before created_at"),
            (self.dispute_opened_at, Some(self.created_at), "dispute_opened_at before created_at"),
            (self.dispute_opened_at, self.delivered_at, "dispute_opened_at before delivered_at"),
            (self.completed_at, self.delivered_at, "completed_at before delivered_at"),
            (self.completed_at, self.dispute_opened_at, "completed_at before dispute_opened_at"),
        ] {
            if let (Some(later), Some(earlier)) = (later, earlier) {
                if later < earlier {
                    return Err(violation(label));
                }
            }
        }

        if self.resolution_type.is_some() != self.resolved_by.is_some() {
            return Err(violation("resolution_type and resolved_by must be set together"));
        }
        match (self.status, self.resolution_type) {
            (OrderStatus::Refunded, Some(ResolutionType::Refunded)) => {}
            (OrderStatus::Refunded, _) => {
                return Err(violation("refunded requires resolution_type refunded"))
            }
            (OrderStatus::Completed, Some(ResolutionType::Completed)) | (_, None) => {}
            _ => return Err(violation("resolution_type does not match status")),
        }

        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
