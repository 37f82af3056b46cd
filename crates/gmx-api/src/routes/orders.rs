//! # Order API
//!
//! Checkout and the buyer/seller steps of the order lifecycle. Every
//! response is an [`OrderView`]: the stored order plus its derived fee
//! split, the protection countdown while delivered, and the actions the
//! caller may take next.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use gmx_core::{Actor, Amount, ListingId, OrderId, ProfileId, Timestamp, ValidationError};
use gmx_state::{DeliveryType, ListingSnapshot, Order, OrderStatus, ProtectionWindow};

use crate::auth::CurrentActor;
use crate::engine::OrderRequest;
use crate::error::AppError;
use crate::extractors::{extract_optional_json, extract_validated_json, Validate};
use crate::routes::utc;
use crate::state::AppState;

// ─── Requests ────────────────────────────────────────────────────────

/// Listing data captured at checkout.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListingInput {
    pub listing_id: Uuid,
    pub title: String,
    pub game: String,
    pub category: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// `manual` or `instant`.
    pub delivery_type: String,
}

/// Request to place an order. The caller becomes the buyer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub seller_id: Uuid,
    /// Listing price in minor units, excluding the service fee.
    pub amount_cents: u64,
    #[serde(default = "one")]
    pub quantity: u32,
    pub listing: ListingInput,
}

fn one() -> u32 {
    1
}

fn parse_delivery_type(s: &str) -> Result<DeliveryType, ValidationError> {
    DeliveryType::parse(s).ok_or_else(|| ValidationError::Invalid {
        field: "delivery_type",
        reason: format!("expected 'manual' or 'instant', got '{s}'"),
    })
}

impl Validate for CreateOrderRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.amount_cents == 0 || self.amount_cents > i64::MAX as u64 {
            return Err(ValidationError::OutOfRange {
                field: "amount_cents",
                min: 1,
                max: i64::MAX,
                actual: i64::try_from(self.amount_cents).unwrap_or(i64::MAX),
            });
        }
        if self.listing.game.trim().is_empty() {
            return Err(ValidationError::Missing { field: "game" });
        }
        if self.listing.category.trim().is_empty() {
            return Err(ValidationError::Missing { field: "category" });
        }
        if let Some(url) = &self.listing.image_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ValidationError::Invalid {
                    field: "image_url",
                    reason: "must be an http(s) URL".to_string(),
                });
            }
        }
        parse_delivery_type(&self.listing.delivery_type)?;
        Ok(())
    }
}

impl CreateOrderRequest {
    fn into_order_request(self) -> Result<OrderRequest, ValidationError> {
        let delivery_type = parse_delivery_type(&self.listing.delivery_type)?;
        Ok(OrderRequest {
            seller_id: ProfileId::from_uuid(self.seller_id),
            amount: Amount::from_cents(self.amount_cents),
            quantity: self.quantity,
            listing: ListingSnapshot {
                listing_id: ListingId::from_uuid(self.listing.listing_id),
                title: self.listing.title.trim().to_string(),
                game: self.listing.game.trim().to_string(),
                category: self.listing.category.trim().to_string(),
                image_url: self.listing.image_url,
                delivery_type,
            },
        })
    }
}

/// Optional cancellation note. Recorded in the audit log when an admin
/// cancels.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// ─── Views ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListingView {
    pub listing_id: Uuid,
    pub title: String,
    pub game: String,
    pub category: String,
    pub image_url: Option<String>,
    pub delivery_type: String,
}

/// Fee split derived from the order amount.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PricingView {
    pub amount_cents: u64,
    pub service_fee_cents: u64,
    pub total_buyer_charge_cents: u64,
    pub net_seller_earnings_cents: u64,
}

/// Buyer protection countdown, present while the order is delivered.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProtectionView {
    pub window_hours: u32,
    pub closes_at: DateTime<Utc>,
    /// Fractional hours left; zero or negative once elapsed.
    pub hours_remaining: f64,
    /// `"{h}h {m}m {s}s"`.
    pub countdown: String,
    pub expired: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub quantity: u32,
    pub listing: ListingView,
    pub pricing: PricingView,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub dispute_opened_at: Option<DateTime<Utc>>,
    pub dispute_reason: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub resolution_notes: Option<String>,
    pub resolution_type: Option<String>,
    pub protection: Option<ProtectionView>,
    /// Actions the caller may attempt from the current status.
    pub permitted_actions: Vec<String>,
}

impl OrderView {
    pub fn build(order: &Order, viewer: &Actor, window: &ProtectionWindow, now: Timestamp) -> Self {
        let pricing = order.pricing();
        let protection = match (order.status, order.delivered_at) {
            (OrderStatus::Delivered, Some(delivered_at)) => {
                let countdown = window.countdown(delivered_at, now);
                Some(ProtectionView {
                    window_hours: window.hours(),
                    closes_at: utc(window.closes_at(delivered_at)),
                    hours_remaining: window.hours_remaining(delivered_at, now),
                    countdown: countdown.to_string(),
                    expired: countdown.is_expired(),
                })
            }
            _ => None,
        };
        Self {
            id: *order.id.as_uuid(),
            buyer_id: *order.buyer_id.as_uuid(),
            seller_id: *order.seller_id.as_uuid(),
            status: order.status.as_str().to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            quantity: order.quantity,
            listing: ListingView {
                listing_id: *order.listing.listing_id.as_uuid(),
                title: order.listing.title.clone(),
                game: order.listing.game.clone(),
                category: order.listing.category.clone(),
                image_url: order.listing.image_url.clone(),
                delivery_type: order.listing.delivery_type.as_str().to_string(),
            },
            pricing: PricingView {
                amount_cents: pricing.amount.cents(),
                service_fee_cents: pricing.service_fee.cents(),
                total_buyer_charge_cents: pricing.total_buyer_charge.cents(),
                net_seller_earnings_cents: pricing.net_seller_earnings.cents(),
            },
            created_at: utc(order.created_at),
            delivered_at: order.delivered_at.map(utc),
            completed_at: order.completed_at.map(utc),
            dispute_opened_at: order.dispute_opened_at.map(utc),
            dispute_reason: order.dispute_reason.clone(),
            resolved_by: order.resolved_by.map(|p| *p.as_uuid()),
            resolution_notes: order.resolution_notes.clone(),
            resolution_type: order.resolution_type.map(|r| r.as_str().to_string()),
            protection,
            permitted_actions: order
                .permitted_actions(viewer)
                .into_iter()
                .map(|a| a.as_str().to_string())
                .collect(),
        }
    }
}

fn view(state: &AppState, order: &Order, viewer: &Actor) -> OrderView {
    let engine = &state.engine;
    OrderView::build(order, viewer, engine.window(), engine.clock().now())
}

// ─── Router ──────────────────────────────────────────────────────────

/// Build the orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order).get(list_orders))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/pay", post(capture_payment))
        .route("/v1/orders/{id}/deliver", post(mark_delivered))
        .route("/v1/orders/{id}/confirm", post(confirm_receipt))
        .route("/v1/orders/{id}/cancel", post(cancel_order))
}

/// POST /v1/orders: Place an order as buyer.
#[utoipa::path(
    post,
    path = "/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created in pending status", body = OrderView),
        (status = 403, description = "Caller is banned", body = crate::error::ErrorBody),
        (status = 404, description = "Seller not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid order", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn create_order(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderView>), AppError> {
    let req = extract_validated_json(body)?;
    let order = state
        .engine
        .create_order(&actor, req.into_order_request()?)
        .await?;
    Ok((StatusCode::CREATED, Json(view(&state, &order, &actor))))
}

/// GET /v1/orders: Orders where the caller is buyer or seller.
#[utoipa::path(
    get,
    path = "/v1/orders",
    responses(
        (status = 200, description = "Caller's orders, newest first", body = Vec<OrderView>),
    ),
    tag = "orders"
)]
async fn list_orders(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<OrderView>>, AppError> {
    let orders = state.engine.orders_for(&actor).await?;
    Ok(Json(
        orders.iter().map(|o| view(&state, o, &actor)).collect(),
    ))
}

/// GET /v1/orders/{id}: Order with pricing and countdown.
#[utoipa::path(
    get,
    path = "/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order found", body = OrderView),
        (status = 404, description = "Not found or not visible", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn get_order(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    let order = state.engine.order(&actor, OrderId::from_uuid(id)).await?;
    Ok(Json(view(&state, &order, &actor)))
}

/// POST /v1/orders/{id}/pay: Capture payment.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/pay",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Paid (instant orders are also delivered)", body = OrderView),
        (status = 403, description = "Caller is not the buyer", body = crate::error::ErrorBody),
        (status = 409, description = "Order is not pending", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn capture_payment(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    let order = state
        .engine
        .capture_payment(&actor, OrderId::from_uuid(id))
        .await?;
    Ok(Json(view(&state, &order, &actor)))
}

/// POST /v1/orders/{id}/deliver: Seller marks a manual order delivered.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/deliver",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Delivered; protection window started", body = OrderView),
        (status = 403, description = "Caller is not the seller", body = crate::error::ErrorBody),
        (status = 409, description = "Order is not paid, or is an instant order", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn mark_delivered(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    let order = state
        .engine
        .mark_delivered(&actor, OrderId::from_uuid(id))
        .await?;
    Ok(Json(view(&state, &order, &actor)))
}

/// POST /v1/orders/{id}/confirm: Buyer confirms receipt.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/confirm",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Completed", body = OrderView),
        (status = 403, description = "Caller is not the buyer", body = crate::error::ErrorBody),
        (status = 409, description = "Order is not delivered", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn confirm_receipt(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    let order = state
        .engine
        .confirm_receipt(&actor, OrderId::from_uuid(id))
        .await?;
    Ok(Json(view(&state, &order, &actor)))
}

/// POST /v1/orders/{id}/cancel: Cancel a pending (buyer, admin) or paid
/// (admin) order.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body(content = CancelRequest, description = "Optional reason"),
    responses(
        (status = 200, description = "Cancelled", body = OrderView),
        (status = 403, description = "Caller may not cancel", body = crate::error::ErrorBody),
        (status = 409, description = "Order can no longer be cancelled", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn cancel_order(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<OrderView>, AppError> {
    let req: CancelRequest = extract_optional_json(body)?;
    let order = state
        .engine
        .cancel_order(&actor, OrderId::from_uuid(id), req.reason)
        .await?;
    Ok(Json(view(&state, &order, &actor)))
}
