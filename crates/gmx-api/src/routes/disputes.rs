//! # Dispute API
//!
//! Buyers file disputes on paid or delivered orders; admins take them under
//! review and decide them. A verdict for the buyer refunds the order, a
//! verdict for the seller completes it. Either way exactly one audit entry
//! is written.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use gmx_arbitration::{Dispute, DisputeFiling, Verdict};
use gmx_core::{OrderId, ValidationError};

use crate::auth::CurrentActor;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::routes::admin::AdminActionView;
use crate::routes::orders::OrderView;
use crate::routes::utc;
use crate::state::AppState;

/// A buyer's dispute filing.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DisputeRequest {
    /// One of: "Item not received", "Wrong item received", "Code already
    /// used", "Account credentials invalid", "Item not as described",
    /// "Seller unresponsive", "Other".
    pub reason: String,
    /// 20 to 1000 characters.
    pub description: String,
    /// Up to three http(s) links.
    #[serde(default)]
    pub evidence_urls: Vec<String>,
}

impl DisputeRequest {
    fn filing(&self) -> DisputeFiling {
        DisputeFiling {
            reason: self.reason.clone(),
            description: self.description.clone(),
            evidence_urls: self.evidence_urls.clone(),
        }
    }
}

impl Validate for DisputeRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        self.filing().validate().map(|_| ())
    }
}

/// An admin's verdict on a disputed order.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRequest {
    /// `buyer` (refund) or `seller` (release funds).
    pub verdict: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ResolveRequest {
    fn verdict(&self) -> Result<Verdict, ValidationError> {
        match self.verdict.trim() {
            "buyer" => Ok(Verdict::Buyer),
            "seller" => Ok(Verdict::Seller),
            other => Err(ValidationError::Invalid {
                field: "verdict",
                reason: format!("expected 'buyer' or 'seller', got '{other}'"),
            }),
        }
    }
}

impl Validate for ResolveRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        self.verdict().map(|_| ())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DisputeView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub raised_by: Uuid,
    pub reason: String,
    pub description: String,
    pub evidence_urls: Vec<String>,
    /// `open`, `under_review`, `resolved` or `closed`.
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<&Dispute> for DisputeView {
    fn from(d: &Dispute) -> Self {
        Self {
            id: *d.id.as_uuid(),
            order_id: *d.order_id.as_uuid(),
            raised_by: *d.raised_by.as_uuid(),
            reason: d.reason.label().to_string(),
            description: d.description.clone(),
            evidence_urls: d.evidence_urls.clone(),
            status: d.status.as_str().to_string(),
            created_at: utc(d.created_at),
            resolved_at: d.resolved_at.map(utc),
        }
    }
}

/// The dispute open on an order, if any.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActiveDisputeResponse {
    pub order_id: Uuid,
    pub dispute: Option<DisputeView>,
}

/// Outcome of a verdict.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolutionResponse {
    pub order: OrderView,
    pub dispute: Option<DisputeView>,
    pub admin_action: AdminActionView,
}

/// Build the disputes router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/orders/{id}/dispute",
            post(open_dispute).get(get_active_dispute),
        )
        .route("/v1/admin/orders/{id}/dispute/review", post(begin_review))
        .route("/v1/admin/orders/{id}/dispute/resolve", post(resolve_dispute))
}

/// POST /v1/orders/{id}/dispute: Buyer opens a dispute.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/dispute",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = DisputeRequest,
    responses(
        (status = 201, description = "Dispute opened; order moved to dispute_raised", body = DisputeView),
        (status = 403, description = "Caller is not the buyer", body = crate::error::ErrorBody),
        (status = 409, description = "Order not disputable or already disputed", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid filing", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
async fn open_dispute(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Result<Json<DisputeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DisputeView>), AppError> {
    let req = extract_validated_json(body)?;
    let dispute = state
        .engine
        .open_dispute(&actor, OrderId::from_uuid(id), req.filing())
        .await?;
    Ok((StatusCode::CREATED, Json(DisputeView::from(&dispute))))
}

/// GET /v1/orders/{id}/dispute: The active dispute on an order.
#[utoipa::path(
    get,
    path = "/v1/orders/{id}/dispute",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Active dispute, or null when the order is not disputed", body = ActiveDisputeResponse),
        (status = 404, description = "Order not found or not visible", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
async fn get_active_dispute(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<ActiveDisputeResponse>, AppError> {
    let dispute = state
        .engine
        .active_dispute(&actor, OrderId::from_uuid(id))
        .await?;
    Ok(Json(ActiveDisputeResponse {
        order_id: id,
        dispute: dispute.as_ref().map(DisputeView::from),
    }))
}

/// POST /v1/admin/orders/{id}/dispute/review: Admin takes the dispute.
#[utoipa::path(
    post,
    path = "/v1/admin/orders/{id}/dispute/review",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Dispute under review", body = DisputeView),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "No open dispute", body = crate::error::ErrorBody),
        (status = 409, description = "Dispute already under review", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn begin_review(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<DisputeView>, AppError> {
    let dispute = state
        .engine
        .begin_review(&actor, OrderId::from_uuid(id))
        .await?;
    Ok(Json(DisputeView::from(&dispute)))
}

/// POST /v1/admin/orders/{id}/dispute/resolve: Admin decides the dispute.
#[utoipa::path(
    post,
    path = "/v1/admin/orders/{id}/dispute/resolve",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Order refunded or completed", body = ResolutionResponse),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 409, description = "Order is not in dispute_raised", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid verdict or notes", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn resolve_dispute(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<ResolutionResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let verdict = req.verdict()?;
    let resolved = state
        .engine
        .resolve_dispute(&actor, OrderId::from_uuid(id), verdict, req.notes)
        .await?;
    let engine = &state.engine;
    Ok(Json(ResolutionResponse {
        order: OrderView::build(&resolved.order, &actor, engine.window(), engine.clock().now()),
        dispute: resolved.dispute.as_ref().map(DisputeView::from),
        admin_action: AdminActionView::from(&resolved.admin_action),
    }))
}
