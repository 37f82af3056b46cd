//! # Order Store
//!
//! The persistence seam for orders, disputes, reviews, profiles and the
//! admin audit log.
//!
//! ## Write Model
//!
//! Every mutation the engine performs is one [`WriteBatch`], committed
//! atomically: either every write in the batch lands or none does. Order
//! and dispute updates carry the status they expect to replace, so a
//! transition computed from a stale read is rejected with
//! [`StoreError::Conflict`] instead of silently overwriting a concurrent
//! change.
//!
//! Admin actions are handed over as drafts; the store seals them onto the
//! hash chain while holding the chain head, so concurrent commits can never
//! fork the chain.
//!
//! ## Implementations
//!
//! - [`memory::MemoryStore`]: one write lock over all tables. Used in
//!   development and tests.
//! - [`postgres::PgStore`]: one transaction per batch, conditional
//!   `UPDATE … WHERE status = $expected`, unique indexes for the
//!   one-open-dispute and one-review-per-order rules, and an advisory lock
//!   around the audit chain head.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use gmx_arbitration::{AdminAction, AdminActionDraft, Dispute, DisputeStatus, Review};
use gmx_core::{OrderId, Profile, ProfileId, ReviewId, Timestamp};
use gmx_state::{Order, OrderStatus};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors surfaced by a store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A conditional write found the record in an unexpected state, or a
    /// uniqueness rule was violated. Nothing in the batch was applied.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded into a domain value.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

// ─── Write Batch ─────────────────────────────────────────────────────

/// A write to the orders table.
#[derive(Debug, Clone)]
pub enum OrderWrite {
    /// Insert a new order.
    Insert(Order),
    /// Replace an order, provided its stored status is still `expected`.
    Update {
        /// New contents.
        order: Order,
        /// The status the write was computed against.
        expected: OrderStatus,
    },
}

/// A write to the disputes table.
#[derive(Debug, Clone)]
pub enum DisputeWrite {
    /// Insert a new dispute. Rejected if the order already has an active one.
    Insert(Dispute),
    /// Replace a dispute, provided its stored status is still `expected`.
    Update {
        /// New contents.
        dispute: Dispute,
        /// The status the write was computed against.
        expected: DisputeStatus,
    },
}

/// A write to the reviews table. Reviews are never removed; an admin
/// deletion is an `Update` carrying the tombstone.
#[derive(Debug, Clone)]
pub enum ReviewWrite {
    /// Insert a new review. Rejected if the order already has one, deleted
    /// or not.
    Insert(Review),
    /// Replace an existing review, provided it has not been deleted.
    Update(Review),
}

/// A write to the profiles table.
#[derive(Debug, Clone)]
pub enum ProfileWrite {
    /// Create the profile unless it already exists; an existing row is
    /// left untouched.
    Provision(Profile),
    /// Insert or replace the whole profile.
    Upsert(Profile),
    /// Set the admin flag on an existing profile.
    GrantAdmin(ProfileId),
    /// Flip the ban flag, provided it is not already `banned`.
    SetBanned {
        /// Target profile.
        id: ProfileId,
        /// New ban status.
        banned: bool,
    },
}

/// An atomic unit of writes.
#[derive(Debug, Clone)]
pub struct WriteBatch {
    /// Timestamp stamped on sealed admin actions.
    pub at: Timestamp,
    pub orders: Vec<OrderWrite>,
    pub disputes: Vec<DisputeWrite>,
    pub reviews: Vec<ReviewWrite>,
    pub profiles: Vec<ProfileWrite>,
    /// Audit entries to seal onto the chain.
    pub admin_actions: Vec<AdminActionDraft>,
}

impl WriteBatch {
    /// An empty batch recorded at `at`.
    pub fn new(at: Timestamp) -> Self {
        Self {
            at,
            orders: Vec::new(),
            disputes: Vec::new(),
            reviews: Vec::new(),
            profiles: Vec::new(),
            admin_actions: Vec::new(),
        }
    }

    pub fn insert_order(mut self, order: Order) -> Self {
        self.orders.push(OrderWrite::Insert(order));
        self
    }

    pub fn update_order(mut self, order: Order, expected: OrderStatus) -> Self {
        self.orders.push(OrderWrite::Update { order, expected });
        self
    }

    pub fn insert_dispute(mut self, dispute: Dispute) -> Self {
        self.disputes.push(DisputeWrite::Insert(dispute));
        self
    }

    pub fn update_dispute(mut self, dispute: Dispute, expected: DisputeStatus) -> Self {
        self.disputes.push(DisputeWrite::Update { dispute, expected });
        self
    }

    pub fn review(mut self, write: ReviewWrite) -> Self {
        self.reviews.push(write);
        self
    }

    pub fn provision_profile(mut self, profile: Profile) -> Self {
        self.profiles.push(ProfileWrite::Provision(profile));
        self
    }

    pub fn upsert_profile(mut self, profile: Profile) -> Self {
        self.profiles.push(ProfileWrite::Upsert(profile));
        self
    }

    pub fn grant_admin(mut self, id: ProfileId) -> Self {
        self.profiles.push(ProfileWrite::GrantAdmin(id));
        self
    }

    pub fn set_banned(mut self, id: ProfileId, banned: bool) -> Self {
        self.profiles.push(ProfileWrite::SetBanned { id, banned });
        self
    }

    pub fn audit(mut self, draft: AdminActionDraft) -> Self {
        self.admin_actions.push(draft);
        self
    }

    /// Whether the batch writes nothing. Stores commit an empty batch
    /// without touching storage.
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
            && self.disputes.is_empty()
            && self.reviews.is_empty()
            && self.profiles.is_empty()
            && self.admin_actions.is_empty()
    }
}

// ─── Store Trait ─────────────────────────────────────────────────────

/// Persistent storage for the order lifecycle.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Apply `batch` atomically. Returns the sealed admin actions.
    async fn commit(&self, batch: WriteBatch) -> Result<Vec<AdminAction>, StoreError>;

    /// Fetch an order.
    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Orders where `profile` is buyer or seller, newest first.
    async fn orders_for_party(&self, profile: ProfileId) -> Result<Vec<Order>, StoreError>;

    /// `delivered` orders with `delivered_at <= cutoff`, oldest first.
    async fn orders_delivered_before(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError>;

    /// The most recently filed dispute on an order.
    async fn latest_dispute(&self, order: OrderId) -> Result<Option<Dispute>, StoreError>;

    /// Fetch a review, including a deleted one.
    async fn review(&self, id: ReviewId) -> Result<Option<Review>, StoreError>;

    /// The review left on an order, if any, including a deleted one.
    async fn review_for_order(&self, order: OrderId) -> Result<Option<Review>, StoreError>;

    /// Fetch a profile.
    async fn profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError>;

    /// Audit entries targeting `target_id`, in chain order.
    async fn admin_actions_for(&self, target_id: Uuid) -> Result<Vec<AdminAction>, StoreError>;

    /// The full audit chain, in chain order.
    async fn admin_actions(&self) -> Result<Vec<AdminAction>, StoreError>;

    /// Check connectivity.
    async fn ping(&self) -> Result<(), StoreError>;
}
