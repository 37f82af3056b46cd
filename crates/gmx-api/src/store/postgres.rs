//! # Postgres Store
//!
//! Persists the marketplace through SQLx. Each [`WriteBatch`] runs in one
//! transaction. Lifecycle rules are enforced by the state machine in the
//! application layer; the database only guards races:
//!
//! - Order and dispute updates are `UPDATE … WHERE id = $1 AND status = $2`;
//!   zero affected rows aborts the transaction with a conflict.
//! - A partial unique index admits one active dispute per order, and a
//!   unique index one review per order. Deleted reviews are tombstones and
//!   keep their slot.
//! - Profile provisioning inserts with `ON CONFLICT DO NOTHING`; ban and
//!   admin changes touch only their own column, the ban conditioned on the
//!   status it read.
//! - Audit entries are sealed under a transaction-scoped advisory lock, so
//!   two commits never read the same chain head.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use uuid::Uuid;

use gmx_arbitration::{
    seal_all, AdminAction, AdminActionType, ChainHead, Dispute, DisputeReason, DisputeStatus,
    Review, TargetType,
};
use gmx_core::{
    AdminActionId, Amount, DisputeId, ListingId, OrderId, Profile, ProfileId, ReviewId, Timestamp,
};
use gmx_state::{
    DeliveryType, ListingSnapshot, Order, OrderStatus, PaymentStatus, ResolutionType,
};

use super::{
    DisputeWrite, MarketStore, OrderWrite, ProfileWrite, ReviewWrite, StoreError, WriteBatch,
};

/// Advisory lock key serialising appends to the audit chain.
const AUDIT_CHAIN_LOCK: i64 = 0x676d_785f_6175_6474;

/// Postgres-backed [`MarketStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to `url` and apply embedded migrations.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await?;
        tracing::info!("Connected to PostgreSQL");

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");

        Ok(Self { pool })
    }

    /// Wrap an existing pool. Migrations are the caller's concern.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::TypeNotFound { .. } => {
            StoreError::Corrupt(err.to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn ts(t: Timestamp) -> DateTime<Utc> {
    *t.as_datetime()
}

fn corrupt(table: &str, column: &str, value: impl std::fmt::Display) -> StoreError {
    tracing::warn!(table, column, value = %value, "unrecognised value in stored row");
    StoreError::Corrupt(format!("{table}.{column} holds unrecognised value '{value}'"))
}

fn cents(amount: Amount) -> Result<i64, StoreError> {
    i64::try_from(amount.cents())
        .map_err(|_| StoreError::Corrupt(format!("amount {} exceeds column range", amount.cents())))
}

// ─── Rows ────────────────────────────────────────────────────────────

const ORDER_COLUMNS: &str = "id, buyer_id, seller_id, amount_cents, quantity, listing_id, \
     listing_title, listing_game, listing_category, listing_image_url, delivery_type, status, \
     payment_status, created_at, delivered_at, completed_at, dispute_opened_at, dispute_reason, \
     resolved_by, resolution_notes, resolution_type";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    buyer_id: Uuid,
    seller_id: Uuid,
    amount_cents: i64,
    quantity: i32,
    listing_id: Uuid,
    listing_title: String,
    listing_game: String,
    listing_category: String,
    listing_image_url: Option<String>,
    delivery_type: String,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    dispute_opened_at: Option<DateTime<Utc>>,
    dispute_reason: Option<String>,
    resolved_by: Option<Uuid>,
    resolution_notes: Option<String>,
    resolution_type: Option<String>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order, StoreError> {
        let status = OrderStatus::parse(&self.status)
            .ok_or_else(|| corrupt("orders", "status", &self.status))?;
        let payment_status = PaymentStatus::parse(&self.payment_status)
            .ok_or_else(|| corrupt("orders", "payment_status", &self.payment_status))?;
        let delivery_type = DeliveryType::parse(&self.delivery_type)
            .ok_or_else(|| corrupt("orders", "delivery_type", &self.delivery_type))?;
        let resolution_type = self
            .resolution_type
            .as_deref()
            .map(|r| ResolutionType::parse(r).ok_or_else(|| corrupt("orders", "resolution_type", r)))
            .transpose()?;
        let amount = u64::try_from(self.amount_cents)
            .map_err(|_| corrupt("orders", "amount_cents", self.amount_cents))?;
        let quantity = u32::try_from(self.quantity)
            .map_err(|_| corrupt("orders", "quantity", self.quantity))?;

        Ok(Order {
            id: OrderId::from_uuid(self.id),
            buyer_id: ProfileId::from_uuid(self.buyer_id),
            seller_id: ProfileId::from_uuid(self.seller_id),
            amount: Amount::from_cents(amount),
            quantity,
            listing: ListingSnapshot {
                listing_id: ListingId::from_uuid(self.listing_id),
                title: self.listing_title,
                game: self.listing_game,
                category: self.listing_category,
                image_url: self.listing_image_url,
                delivery_type,
            },
            status,
            payment_status,
            created_at: Timestamp::from_utc(self.created_at),
            delivered_at: self.delivered_at.map(Timestamp::from_utc),
            completed_at: self.completed_at.map(Timestamp::from_utc),
            dispute_opened_at: self.dispute_opened_at.map(Timestamp::from_utc),
            dispute_reason: self.dispute_reason,
            resolved_by: self.resolved_by.map(ProfileId::from_uuid),
            resolution_notes: self.resolution_notes,
            resolution_type,
        })
    }
}

const DISPUTE_COLUMNS: &str =
    "id, order_id, raised_by, reason, description, evidence_urls, status, created_at, resolved_at";

#[derive(sqlx::FromRow)]
struct DisputeRow {
    id: Uuid,
    order_id: Uuid,
    raised_by: Uuid,
    reason: String,
    description: String,
    evidence_urls: Vec<String>,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl DisputeRow {
    fn into_dispute(self) -> Result<Dispute, StoreError> {
        let reason =
            DisputeReason::parse(&self.reason).map_err(|_| corrupt("disputes", "reason", &self.reason))?;
        let status = DisputeStatus::parse(&self.status)
            .ok_or_else(|| corrupt("disputes", "status", &self.status))?;
        Ok(Dispute {
            id: DisputeId::from_uuid(self.id),
            order_id: OrderId::from_uuid(self.order_id),
            raised_by: ProfileId::from_uuid(self.raised_by),
            reason,
            description: self.description,
            evidence_urls: self.evidence_urls,
            status,
            created_at: Timestamp::from_utc(self.created_at),
            resolved_at: self.resolved_at.map(Timestamp::from_utc),
        })
    }
}

const REVIEW_COLUMNS: &str = "id, order_id, reviewer_id, seller_id, rating, comment, \
     original_rating, edited_by_admin, edited_at, created_at, deleted_at, deleted_by";

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    order_id: Uuid,
    reviewer_id: Uuid,
    seller_id: Uuid,
    rating: i16,
    comment: Option<String>,
    original_rating: i16,
    edited_by_admin: bool,
    edited_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
}

impl ReviewRow {
    fn into_review(self) -> Result<Review, StoreError> {
        let rating = u8::try_from(self.rating).map_err(|_| corrupt("reviews", "rating", self.rating))?;
        let original_rating = u8::try_from(self.original_rating)
            .map_err(|_| corrupt("reviews", "original_rating", self.original_rating))?;
        Ok(Review {
            id: ReviewId::from_uuid(self.id),
            order_id: OrderId::from_uuid(self.order_id),
            reviewer_id: ProfileId::from_uuid(self.reviewer_id),
            seller_id: ProfileId::from_uuid(self.seller_id),
            rating,
            comment: self.comment,
            original_rating,
            edited_by_admin: self.edited_by_admin,
            edited_at: self.edited_at.map(Timestamp::from_utc),
            created_at: Timestamp::from_utc(self.created_at),
            deleted_at: self.deleted_at.map(Timestamp::from_utc),
            deleted_by: self.deleted_by.map(ProfileId::from_uuid),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    username: String,
    is_admin: bool,
    is_banned: bool,
    created_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: ProfileId::from_uuid(row.id),
            username: row.username,
            is_admin: row.is_admin,
            is_banned: row.is_banned,
            created_at: Timestamp::from_utc(row.created_at),
        }
    }
}

const ADMIN_ACTION_COLUMNS: &str = "id, admin_id, action_type, target_type, target_id, \
     description, metadata, created_at, sequence, previous_hash, entry_hash";

#[derive(sqlx::FromRow)]
struct AdminActionRow {
    id: Uuid,
    admin_id: Uuid,
    action_type: String,
    target_type: String,
    target_id: Uuid,
    description: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    sequence: i64,
    previous_hash: String,
    entry_hash: String,
}

impl AdminActionRow {
    fn into_action(self) -> Result<AdminAction, StoreError> {
        let action_type = AdminActionType::parse(&self.action_type)
            .ok_or_else(|| corrupt("admin_actions", "action_type", &self.action_type))?;
        let target_type = TargetType::parse(&self.target_type)
            .ok_or_else(|| corrupt("admin_actions", "target_type", &self.target_type))?;
        let sequence = u64::try_from(self.sequence)
            .map_err(|_| corrupt("admin_actions", "sequence", self.sequence))?;
        Ok(AdminAction {
            id: AdminActionId::from_uuid(self.id),
            admin_id: ProfileId::from_uuid(self.admin_id),
            action_type,
            target_type,
            target_id: self.target_id,
            description: self.description,
            metadata: self.metadata,
            created_at: Timestamp::from_utc(self.created_at),
            sequence,
            previous_hash: self.previous_hash,
            entry_hash: self.entry_hash,
        })
    }
}

// ─── Writes ──────────────────────────────────────────────────────────

async fn insert_order(conn: &mut PgConnection, o: &Order) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO orders ({ORDER_COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"
    ))
    .bind(o.id.as_uuid())
    .bind(o.buyer_id.as_uuid())
    .bind(o.seller_id.as_uuid())
    .bind(cents(o.amount)?)
    .bind(i32::try_from(o.quantity).unwrap_or(i32::MAX))
    .bind(o.listing.listing_id.as_uuid())
    .bind(&o.listing.title)
    .bind(&o.listing.game)
    .bind(&o.listing.category)
    .bind(&o.listing.image_url)
    .bind(o.listing.delivery_type.as_str())
    .bind(o.status.as_str())
    .bind(o.payment_status.as_str())
    .bind(ts(o.created_at))
    .bind(o.delivered_at.map(ts))
    .bind(o.completed_at.map(ts))
    .bind(o.dispute_opened_at.map(ts))
    .bind(&o.dispute_reason)
    .bind(o.resolved_by.as_ref().map(ProfileId::as_uuid))
    .bind(&o.resolution_notes)
    .bind(o.resolution_type.map(|r| r.as_str()))
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx)?;
    Ok(())
}

async fn update_order(
    conn: &mut PgConnection,
    o: &Order,
    expected: OrderStatus,
) -> Result<(), StoreError> {
    // Listing snapshot, parties and amount are immutable after insert.
    let result = sqlx::query(
        "UPDATE orders SET status = $3, payment_status = $4, delivered_at = $5,
         completed_at = $6, dispute_opened_at = $7, dispute_reason = $8, resolved_by = $9,
         resolution_notes = $10, resolution_type = $11
         WHERE id = $1 AND status = $2",
    )
    .bind(o.id.as_uuid())
    .bind(expected.as_str())
    .bind(o.status.as_str())
    .bind(o.payment_status.as_str())
    .bind(o.delivered_at.map(ts))
    .bind(o.completed_at.map(ts))
    .bind(o.dispute_opened_at.map(ts))
    .bind(&o.dispute_reason)
    .bind(o.resolved_by.as_ref().map(ProfileId::as_uuid))
    .bind(&o.resolution_notes)
    .bind(o.resolution_type.map(|r| r.as_str()))
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "{} is no longer {}",
            o.id, expected
        )));
    }
    Ok(())
}

async fn insert_dispute(conn: &mut PgConnection, d: &Dispute) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO disputes ({DISPUTE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    ))
    .bind(d.id.as_uuid())
    .bind(d.order_id.as_uuid())
    .bind(d.raised_by.as_uuid())
    .bind(d.reason.label())
    .bind(&d.description)
    .bind(&d.evidence_urls)
    .bind(d.status.as_str())
    .bind(ts(d.created_at))
    .bind(d.resolved_at.map(ts))
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx)?;
    Ok(())
}

async fn update_dispute(
    conn: &mut PgConnection,
    d: &Dispute,
    expected: DisputeStatus,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE disputes SET status = $3, resolved_at = $4 WHERE id = $1 AND status = $2",
    )
    .bind(d.id.as_uuid())
    .bind(expected.as_str())
    .bind(d.status.as_str())
    .bind(d.resolved_at.map(ts))
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "{} is no longer {}",
            d.id, expected
        )));
    }
    Ok(())
}

async fn write_review(conn: &mut PgConnection, write: &ReviewWrite) -> Result<(), StoreError> {
    let result = match write {
        ReviewWrite::Insert(r) => sqlx::query(&format!(
            "INSERT INTO reviews ({REVIEW_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(r.id.as_uuid())
        .bind(r.order_id.as_uuid())
        .bind(r.reviewer_id.as_uuid())
        .bind(r.seller_id.as_uuid())
        .bind(i16::from(r.rating))
        .bind(&r.comment)
        .bind(i16::from(r.original_rating))
        .bind(r.edited_by_admin)
        .bind(r.edited_at.map(ts))
        .bind(ts(r.created_at))
        .bind(r.deleted_at.map(ts))
        .bind(r.deleted_by.as_ref().map(ProfileId::as_uuid))
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx)?,
        ReviewWrite::Update(r) => sqlx::query(
            "UPDATE reviews SET rating = $2, comment = $3, edited_by_admin = $4, edited_at = $5,
                 deleted_at = $6, deleted_by = $7
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(r.id.as_uuid())
        .bind(i16::from(r.rating))
        .bind(&r.comment)
        .bind(r.edited_by_admin)
        .bind(r.edited_at.map(ts))
        .bind(r.deleted_at.map(ts))
        .bind(r.deleted_by.as_ref().map(ProfileId::as_uuid))
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx)?,
    };

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(
            "review no longer exists or has been deleted".to_string(),
        ));
    }
    Ok(())
}

async fn write_profile(conn: &mut PgConnection, write: &ProfileWrite) -> Result<(), StoreError> {
    match write {
        ProfileWrite::Provision(p) => {
            sqlx::query(
                "INSERT INTO profiles (id, username, is_admin, is_banned, created_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(p.id.as_uuid())
            .bind(&p.username)
            .bind(p.is_admin)
            .bind(p.is_banned)
            .bind(ts(p.created_at))
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx)?;
        }
        ProfileWrite::Upsert(p) => {
            sqlx::query(
                "INSERT INTO profiles (id, username, is_admin, is_banned, created_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (id) DO UPDATE
                 SET username = EXCLUDED.username, is_admin = EXCLUDED.is_admin,
                     is_banned = EXCLUDED.is_banned",
            )
            .bind(p.id.as_uuid())
            .bind(&p.username)
            .bind(p.is_admin)
            .bind(p.is_banned)
            .bind(ts(p.created_at))
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx)?;
        }
        ProfileWrite::GrantAdmin(id) => {
            let result = sqlx::query("UPDATE profiles SET is_admin = TRUE WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!("{id} does not exist")));
            }
        }
        ProfileWrite::SetBanned { id, banned } => {
            let result = sqlx::query(
                "UPDATE profiles SET is_banned = $2 WHERE id = $1 AND is_banned = NOT $2",
            )
            .bind(id.as_uuid())
            .bind(*banned)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!(
                    "{id} ban status changed concurrently"
                )));
            }
        }
    }
    Ok(())
}

async fn insert_admin_action(conn: &mut PgConnection, a: &AdminAction) -> Result<(), StoreError> {
    let sequence = i64::try_from(a.sequence)
        .map_err(|_| StoreError::Corrupt(format!("sequence {} exceeds column range", a.sequence)))?;
    sqlx::query(&format!(
        "INSERT INTO admin_actions ({ADMIN_ACTION_COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    ))
    .bind(a.id.as_uuid())
    .bind(a.admin_id.as_uuid())
    .bind(a.action_type.as_str())
    .bind(a.target_type.as_str())
    .bind(a.target_id)
    .bind(&a.description)
    .bind(&a.metadata)
    .bind(ts(a.created_at))
    .bind(sequence)
    .bind(&a.previous_hash)
    .bind(&a.entry_hash)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx)?;
    Ok(())
}

async fn chain_head(conn: &mut PgConnection) -> Result<ChainHead, StoreError> {
    let head: Option<(i64, String)> = sqlx::query_as(
        "SELECT sequence, entry_hash FROM admin_actions ORDER BY sequence DESC LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    match head {
        None => Ok(ChainHead::genesis()),
        Some((sequence, hash)) => Ok(ChainHead {
            sequence: u64::try_from(sequence)
                .map_err(|_| corrupt("admin_actions", "sequence", sequence))?,
            hash,
        }),
    }
}

// ─── Store ───────────────────────────────────────────────────────────

#[async_trait]
impl MarketStore for PgStore {
    async fn commit(&self, batch: WriteBatch) -> Result<Vec<AdminAction>, StoreError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        for write in &batch.profiles {
            write_profile(&mut tx, write).await?;
        }
        for write in &batch.orders {
            match write {
                OrderWrite::Insert(order) => insert_order(&mut tx, order).await?,
                OrderWrite::Update { order, expected } => {
                    update_order(&mut tx, order, *expected).await?
                }
            }
        }
        for write in &batch.disputes {
            match write {
                DisputeWrite::Insert(dispute) => insert_dispute(&mut tx, dispute).await?,
                DisputeWrite::Update { dispute, expected } => {
                    update_dispute(&mut tx, dispute, *expected).await?
                }
            }
        }
        for write in &batch.reviews {
            write_review(&mut tx, write).await?;
        }

        let mut sealed = Vec::new();
        if !batch.admin_actions.is_empty() {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(AUDIT_CHAIN_LOCK)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            let head = chain_head(&mut tx).await?;
            let (actions, _) = seal_all(batch.admin_actions, head, batch.at);
            for action in &actions {
                insert_admin_action(&mut tx, action).await?;
            }
            sealed = actions;
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(sealed)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn orders_for_party(&self, profile: ProfileId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE buyer_id = $1 OR seller_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(profile.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn orders_delivered_before(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE status = 'delivered' AND delivered_at <= $1
             ORDER BY delivered_at ASC
             LIMIT $2"
        ))
        .bind(ts(cutoff))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn latest_dispute(&self, order: OrderId) -> Result<Option<Dispute>, StoreError> {
        let row = sqlx::query_as::<_, DisputeRow>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes
             WHERE order_id = $1
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(order.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(DisputeRow::into_dispute).transpose()
    }

    async fn review(&self, id: ReviewId) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(ReviewRow::into_review).transpose()
    }

    async fn review_for_order(&self, order: OrderId) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE order_id = $1"
        ))
        .bind(order.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(ReviewRow::into_review).transpose()
    }

    async fn profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, username, is_admin, is_banned, created_at FROM profiles WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(Profile::from))
    }

    async fn admin_actions_for(&self, target_id: Uuid) -> Result<Vec<AdminAction>, StoreError> {
        let rows = sqlx::query_as::<_, AdminActionRow>(&format!(
            "SELECT {ADMIN_ACTION_COLUMNS} FROM admin_actions
             WHERE target_id = $1
             ORDER BY sequence ASC"
        ))
        .bind(target_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(AdminActionRow::into_action).collect()
    }

    async fn admin_actions(&self) -> Result<Vec<AdminAction>, StoreError> {
        let rows = sqlx::query_as::<_, AdminActionRow>(&format!(
            "SELECT {ADMIN_ACTION_COLUMNS} FROM admin_actions ORDER BY sequence ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(AdminActionRow::into_action).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}
