//! # In-Memory Store
//!
//! All tables live behind a single `parking_lot::RwLock`. A commit takes the
//! write lock, checks every precondition in the batch, and only then applies
//! the writes, so a failed batch leaves nothing behind. The lock is never
//! held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use gmx_arbitration::{seal_all, AdminAction, ChainHead, Dispute, Review};
use gmx_core::{DisputeId, OrderId, Profile, ProfileId, ReviewId, Timestamp};
use gmx_state::{Order, OrderStatus};

use super::{
    DisputeWrite, MarketStore, OrderWrite, ProfileWrite, ReviewWrite, StoreError, WriteBatch,
};

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    disputes: HashMap<DisputeId, Dispute>,
    reviews: HashMap<ReviewId, Review>,
    profiles: HashMap<ProfileId, Profile>,
    admin_actions: Vec<AdminAction>,
}

impl Tables {
    fn active_dispute(&self, order: OrderId) -> Option<&Dispute> {
        self.disputes
            .values()
            .find(|d| d.order_id == order && d.status.is_active())
    }

    fn review_for_order(&self, order: OrderId) -> Option<&Review> {
        self.reviews.values().find(|r| r.order_id == order)
    }

    fn chain_head(&self) -> ChainHead {
        self.admin_actions
            .last()
            .map(AdminAction::head)
            .unwrap_or_default()
    }

    fn check(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        for write in &batch.profiles {
            match write {
                ProfileWrite::Provision(_) | ProfileWrite::Upsert(_) => {}
                ProfileWrite::GrantAdmin(id) => {
                    if !self.profiles.contains_key(id) {
                        return Err(StoreError::Conflict(format!("{id} does not exist")));
                    }
                }
                ProfileWrite::SetBanned { id, banned } => match self.profiles.get(id) {
                    Some(current) if current.is_banned != *banned => {}
                    Some(_) => {
                        return Err(StoreError::Conflict(format!(
                            "{id} ban status changed concurrently"
                        )))
                    }
                    None => return Err(StoreError::Conflict(format!("{id} does not exist"))),
                },
            }
        }

        for write in &batch.orders {
            match write {
                OrderWrite::Insert(order) => {
                    if self.orders.contains_key(&order.id) {
                        return Err(StoreError::Conflict(format!("{} already exists", order.id)));
                    }
                }
                OrderWrite::Update { order, expected } => match self.orders.get(&order.id) {
                    Some(current) if current.status == *expected => {}
                    Some(current) => {
                        return Err(StoreError::Conflict(format!(
                            "{} is {}, expected {}",
                            order.id, current.status, expected
                        )))
                    }
                    None => return Err(StoreError::Conflict(format!("{} does not exist", order.id))),
                },
            }
        }

        for write in &batch.disputes {
            match write {
                DisputeWrite::Insert(dispute) => {
                    if let Some(open) = self.active_dispute(dispute.order_id) {
                        return Err(StoreError::Conflict(format!(
                            "{} already has active {}",
                            dispute.order_id, open.id
                        )));
                    }
                }
                DisputeWrite::Update { dispute, expected } => {
                    match self.disputes.get(&dispute.id) {
                        Some(current) if current.status == *expected => {}
                        Some(current) => {
                            return Err(StoreError::Conflict(format!(
                                "{} is {}, expected {}",
                                dispute.id, current.status, expected
                            )))
                        }
                        None => {
                            return Err(StoreError::Conflict(format!(
                                "{} does not exist",
                                dispute.id
                            )))
                        }
                    }
                }
            }
        }

        for write in &batch.reviews {
            match write {
                ReviewWrite::Insert(review) => {
                    if self.review_for_order(review.order_id).is_some() {
                        return Err(StoreError::Conflict(format!(
                            "{} has already been reviewed",
                            review.order_id
                        )));
                    }
                }
                ReviewWrite::Update(review) => match self.reviews.get(&review.id) {
                    Some(current) if current.is_deleted() => {
                        return Err(StoreError::Conflict(format!("{} has been deleted", review.id)))
                    }
                    Some(_) => {}
                    None => {
                        return Err(StoreError::Conflict(format!("{} does not exist", review.id)))
                    }
                },
            }
        }
        Ok(())
    }
}

/// Thread-safe, cloneable in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while offline every call fails with
    /// [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store is offline".into()))
        } else {
            Ok(())
        }
    }

    /// Overwrite a stored order without any checks. Test-only escape hatch
    /// for staging races.
    #[doc(hidden)]
    pub fn force_order(&self, order: Order) {
        self.tables.write().orders.insert(order.id, order);
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn commit(&self, batch: WriteBatch) -> Result<Vec<AdminAction>, StoreError> {
        self.online()?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut tables = self.tables.write();
        tables.check(&batch)?;

        let WriteBatch {
            at,
            orders,
            disputes,
            reviews,
            profiles,
            admin_actions,
        } = batch;

        for write in orders {
            let order = match write {
                OrderWrite::Insert(order) | OrderWrite::Update { order, .. } => order,
            };
            tables.orders.insert(order.id, order);
        }
        for write in disputes {
            let dispute = match write {
                DisputeWrite::Insert(dispute) | DisputeWrite::Update { dispute, .. } => dispute,
            };
            tables.disputes.insert(dispute.id, dispute);
        }
        for write in reviews {
            let review = match write {
                ReviewWrite::Insert(review) | ReviewWrite::Update(review) => review,
            };
            tables.reviews.insert(review.id, review);
        }
        for write in profiles {
            match write {
                ProfileWrite::Provision(profile) => {
                    tables.profiles.entry(profile.id).or_insert(profile);
                }
                ProfileWrite::Upsert(profile) => {
                    tables.profiles.insert(profile.id, profile);
                }
                ProfileWrite::GrantAdmin(id) => {
                    if let Some(p) = tables.profiles.get_mut(&id) {
                        p.is_admin = true;
                    }
                }
                ProfileWrite::SetBanned { id, banned } => {
                    if let Some(p) = tables.profiles.get_mut(&id) {
                        p.is_banned = banned;
                    }
                }
            }
        }

        let (sealed, _) = seal_all(admin_actions, tables.chain_head(), at);
        tables.admin_actions.extend(sealed.iter().cloned());
        Ok(sealed)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.online()?;
        Ok(self.tables.read().orders.get(&id).cloned())
    }

    async fn orders_for_party(&self, profile: ProfileId) -> Result<Vec<Order>, StoreError> {
        self.online()?;
        let mut orders: Vec<Order> = self
            .tables
            .read()
            .orders
            .values()
            .filter(|o| o.buyer_id == profile || o.seller_id == profile)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn orders_delivered_before(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError> {
        self.online()?;
        let mut due: Vec<Order> = self
            .tables
            .read()
            .orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::Delivered
                    && o.delivered_at.is_some_and(|at| at <= cutoff)
            })
            .cloned()
            .collect();
        due.sort_by_key(|o| o.delivered_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn latest_dispute(&self, order: OrderId) -> Result<Option<Dispute>, StoreError> {
        self.online()?;
        Ok(self
            .tables
            .read()
            .disputes
            .values()
            .filter(|d| d.order_id == order)
            .max_by_key(|d| d.created_at)
            .cloned())
    }

    async fn review(&self, id: ReviewId) -> Result<Option<Review>, StoreError> {
        self.online()?;
        Ok(self.tables.read().reviews.get(&id).cloned())
    }

    async fn review_for_order(&self, order: OrderId) -> Result<Option<Review>, StoreError> {
        self.online()?;
        Ok(self.tables.read().review_for_order(order).cloned())
    }

    async fn profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
        self.online()?;
        Ok(self.tables.read().profiles.get(&id).cloned())
    }

    async fn admin_actions_for(&self, target_id: Uuid) -> Result<Vec<AdminAction>, StoreError> {
        self.online()?;
        Ok(self
            .tables
            .read()
            .admin_actions
            .iter()
            .filter(|a| a.target_id == target_id)
            .cloned()
            .collect())
    }

    async fn admin_actions(&self) -> Result<Vec<AdminAction>, StoreError> {
        self.online()?;
        Ok(self.tables.read().admin_actions.clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmx_arbitration::{
        verify_chain, AdminActionDraft, AdminActionType, DisputeFiling, TargetType,
    };
    use gmx_core::{Amount, ListingId};
    use gmx_state::{DeliveryType, ListingSnapshot, NewOrder};

    fn t0() -> Timestamp {
        Timestamp::parse("2026-03-01T10:00:00Z").unwrap()
    }

    fn order() -> Order {
        Order::new(
            NewOrder {
                buyer_id: ProfileId::new(),
                seller_id: ProfileId::new(),
                amount: Amount::from_cents(4_000),
                quantity: 1,
                listing: ListingSnapshot {
                    listing_id: ListingId::new(),
                    title: "Skin bundle".to_string(),
                    game: "Example Shooter".to_string(),
                    category: "items".to_string(),
                    image_url: None,
                    delivery_type: DeliveryType::Instant,
                },
            },
            t0(),
        )
        .unwrap()
    }

    fn dispute_for(order: &Order) -> Dispute {
        let filing = DisputeFiling {
            reason: "Code already used".to_string(),
            description: "The code was redeemed before I got it".to_string(),
            evidence_urls: vec![],
        }
        .validate()
        .unwrap();
        Dispute::open(order.id, order.buyer_id, filing, t0())
    }

    fn audit_draft() -> AdminActionDraft {
        AdminActionDraft::new(
            ProfileId::new(),
            AdminActionType::UserBanned,
            TargetType::Profile,
            Uuid::new_v4(),
            "ban",
        )
    }

    #[tokio::test]
    async fn test_conditional_update_rejects_stale_status() {
        let store = MemoryStore::new();
        let o = order();
        store.commit(WriteBatch::new(t0()).insert_order(o.clone())).await.unwrap();

        let mut paid = o.clone();
        paid.status = OrderStatus::Paid;
        let err = store
            .commit(WriteBatch::new(t0()).update_order(paid.clone(), OrderStatus::Paid))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store
            .commit(WriteBatch::new(t0()).update_order(paid, OrderStatus::Pending))
            .await
            .unwrap();
        assert_eq!(store.order(o.id).await.unwrap().unwrap().status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let store = MemoryStore::new();
        let o = order();
        store.commit(WriteBatch::new(t0()).insert_order(o.clone())).await.unwrap();

        // Valid dispute insert paired with a stale order update.
        let batch = WriteBatch::new(t0())
            .insert_dispute(dispute_for(&o))
            .update_order(o.clone(), OrderStatus::Delivered)
            .audit(audit_draft());
        assert!(store.commit(batch).await.is_err());
        assert!(store.latest_dispute(o.id).await.unwrap().is_none());
        assert!(store.admin_actions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_active_dispute_per_order() {
        let store = MemoryStore::new();
        let o = order();
        store
            .commit(WriteBatch::new(t0()).insert_dispute(dispute_for(&o)))
            .await
            .unwrap();
        assert!(matches!(
            store
                .commit(WriteBatch::new(t0()).insert_dispute(dispute_for(&o)))
                .await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_chain_is_sealed_in_order() {
        let store = MemoryStore::new();
        store
            .commit(WriteBatch::new(t0()).audit(audit_draft()).audit(audit_draft()))
            .await
            .unwrap();
        let sealed = store
            .commit(WriteBatch::new(t0()).audit(audit_draft()))
            .await
            .unwrap();
        assert_eq!(sealed[0].sequence, 3);
        let chain = store.admin_actions().await.unwrap();
        assert!(verify_chain(&chain).chain_valid);
    }

    #[tokio::test]
    async fn test_delivered_before_cutoff() {
        let store = MemoryStore::new();
        let mut early = order();
        early.status = OrderStatus::Delivered;
        early.delivered_at = Some(t0());
        let mut late = order();
        late.status = OrderStatus::Delivered;
        late.delivered_at = Some(t0().plus_hours(10));
        store
            .commit(WriteBatch::new(t0()).insert_order(early.clone()).insert_order(late))
            .await
            .unwrap();
        let due = store
            .orders_delivered_before(t0().plus_hours(1), 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, early.id);
    }

    fn review_for(order: &Order) -> Review {
        Review {
            id: ReviewId::new(),
            order_id: order.id,
            reviewer_id: order.buyer_id,
            seller_id: order.seller_id,
            rating: 2,
            comment: None,
            original_rating: 2,
            edited_by_admin: false,
            edited_at: None,
            created_at: t0(),
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[tokio::test]
    async fn test_deleted_review_keeps_its_order_slot() {
        let store = MemoryStore::new();
        let o = order();
        let review = review_for(&o);
        store
            .commit(WriteBatch::new(t0()).review(ReviewWrite::Insert(review.clone())))
            .await
            .unwrap();

        let mut tombstone = review.clone();
        tombstone.deleted_at = Some(t0());
        tombstone.deleted_by = Some(ProfileId::new());
        store
            .commit(WriteBatch::new(t0()).review(ReviewWrite::Update(tombstone.clone())))
            .await
            .unwrap();
        assert!(store.review_for_order(o.id).await.unwrap().unwrap().is_deleted());

        assert!(matches!(
            store
                .commit(WriteBatch::new(t0()).review(ReviewWrite::Insert(review_for(&o))))
                .await,
            Err(StoreError::Conflict(_))
        ));
        // A stale edit cannot resurrect the tombstone.
        assert!(matches!(
            store
                .commit(WriteBatch::new(t0()).review(ReviewWrite::Update(review)))
                .await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_provisioning_never_overwrites_flags() {
        let store = MemoryStore::new();
        let id = ProfileId::new();
        let mut admin = Profile::new(id, "moderator", t0());
        admin.is_admin = true;
        admin.is_banned = true;
        store.commit(WriteBatch::new(t0()).upsert_profile(admin)).await.unwrap();

        store
            .commit(WriteBatch::new(t0()).provision_profile(Profile::new(id, "user_x", t0())))
            .await
            .unwrap();
        let stored = store.profile(id).await.unwrap().unwrap();
        assert!(stored.is_admin);
        assert!(stored.is_banned);
        assert_eq!(stored.username, "moderator");
    }

    #[tokio::test]
    async fn test_ban_write_conditioned_on_current_flag() {
        let store = MemoryStore::new();
        let id = ProfileId::new();
        store
            .commit(WriteBatch::new(t0()).provision_profile(Profile::new(id, "player", t0())))
            .await
            .unwrap();
        store.commit(WriteBatch::new(t0()).set_banned(id, true)).await.unwrap();
        assert!(matches!(
            store.commit(WriteBatch::new(t0()).set_banned(id, true)).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(store.profile(id).await.unwrap().unwrap().is_banned);
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let store = MemoryStore::new();
        assert!(store.commit(WriteBatch::new(t0())).await.unwrap().is_empty());
        assert!(store.admin_actions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_store_is_unavailable() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        store.set_offline(false);
        assert!(store.ping().await.is_ok());
    }
}
