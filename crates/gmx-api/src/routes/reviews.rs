//! # Review API
//!
//! One review per completed order, written by its buyer. Admins may edit a
//! review (the buyer's original rating is kept) or delete it; both are
//! audited.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use gmx_arbitration::review::{check_comment, check_rating};
use gmx_arbitration::{Review, ReviewDraft, ReviewEdit};
use gmx_core::{OrderId, ReviewId, ValidationError};

use crate::auth::CurrentActor;
use crate::error::AppError;
use crate::extractors::{extract_optional_json, extract_validated_json, Validate};
use crate::routes::admin::AdminActionView;
use crate::routes::utc;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    /// 1 to 5.
    pub rating: i64,
    /// Up to 500 characters.
    #[serde(default)]
    pub comment: Option<String>,
}

impl Validate for ReviewRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        check_rating(self.rating)?;
        check_comment(self.comment.as_deref())?;
        Ok(())
    }
}

/// Fields an admin replaces. Omitted fields are kept; an empty comment
/// clears it.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EditReviewRequest {
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Validate for EditReviewRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(rating) = self.rating {
            check_rating(rating)?;
        }
        check_comment(self.comment.as_deref())?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DeleteReviewRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub reviewer_id: Uuid,
    pub seller_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
    /// The buyer's rating before any admin edit.
    pub original_rating: u8,
    pub edited_by_admin: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Review> for ReviewView {
    fn from(r: &Review) -> Self {
        Self {
            id: *r.id.as_uuid(),
            order_id: *r.order_id.as_uuid(),
            reviewer_id: *r.reviewer_id.as_uuid(),
            seller_id: *r.seller_id.as_uuid(),
            rating: r.rating,
            comment: r.comment.clone(),
            original_rating: r.original_rating,
            edited_by_admin: r.edited_by_admin,
            edited_at: r.edited_at.map(utc),
            created_at: utc(r.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderReviewResponse {
    pub order_id: Uuid,
    pub review: Option<ReviewView>,
}

/// Build the reviews router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/orders/{id}/review",
            post(submit_review).get(get_order_review),
        )
        .route(
            "/v1/admin/reviews/{id}",
            put(edit_review).delete(delete_review),
        )
}

/// POST /v1/orders/{id}/review: Buyer reviews a completed order.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/review",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ReviewRequest,
    responses(
        (status = 201, description = "Review recorded", body = ReviewView),
        (status = 403, description = "Caller is not the buyer", body = crate::error::ErrorBody),
        (status = 409, description = "Order not completed or already reviewed", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid rating or comment", body = crate::error::ErrorBody),
    ),
    tag = "reviews"
)]
async fn submit_review(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReviewView>), AppError> {
    let req = extract_validated_json(body)?;
    let draft = ReviewDraft {
        rating: req.rating,
        comment: req.comment,
    };
    let review = state
        .engine
        .submit_review(&actor, OrderId::from_uuid(id), draft)
        .await?;
    Ok((StatusCode::CREATED, Json(ReviewView::from(&review))))
}

/// GET /v1/orders/{id}/review: The review on an order.
#[utoipa::path(
    get,
    path = "/v1/orders/{id}/review",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Review, or null when none was written", body = OrderReviewResponse),
        (status = 404, description = "Order not found", body = crate::error::ErrorBody),
    ),
    tag = "reviews"
)]
async fn get_order_review(
    State(state): State<AppState>,
    CurrentActor(_actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderReviewResponse>, AppError> {
    let review = state
        .engine
        .review_for_order(OrderId::from_uuid(id))
        .await?;
    Ok(Json(OrderReviewResponse {
        order_id: id,
        review: review.as_ref().map(ReviewView::from),
    }))
}

/// PUT /v1/admin/reviews/{id}: Admin edits a review.
#[utoipa::path(
    put,
    path = "/v1/admin/reviews/{id}",
    params(("id" = Uuid, Path, description = "Review ID")),
    request_body = EditReviewRequest,
    responses(
        (status = 200, description = "Review edited", body = ReviewView),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Review not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid or empty edit", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn edit_review(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Result<Json<EditReviewRequest>, JsonRejection>,
) -> Result<Json<ReviewView>, AppError> {
    let req = extract_validated_json(body)?;
    let edit = ReviewEdit {
        rating: req.rating,
        comment: req.comment,
    };
    let review = state
        .engine
        .admin_edit_review(&actor, ReviewId::from_uuid(id), edit)
        .await?;
    Ok(Json(ReviewView::from(&review)))
}

/// DELETE /v1/admin/reviews/{id}: Admin deletes a review.
#[utoipa::path(
    delete,
    path = "/v1/admin/reviews/{id}",
    params(("id" = Uuid, Path, description = "Review ID")),
    request_body(content = DeleteReviewRequest, description = "Optional reason"),
    responses(
        (status = 200, description = "Review deleted; audit entry returned", body = AdminActionView),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Review not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn delete_review(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Result<Json<DeleteReviewRequest>, JsonRejection>,
) -> Result<Json<AdminActionView>, AppError> {
    let req: DeleteReviewRequest = extract_optional_json(body)?;
    let action = state
        .engine
        .admin_delete_review(&actor, ReviewId::from_uuid(id), req.reason)
        .await?;
    Ok(Json(AdminActionView::from(&action)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_request_bounds() {
        let ok = ReviewRequest {
            rating: 5,
            comment: Some("Fast delivery".into()),
        };
        assert!(ok.validate().is_ok());

        let low = ReviewRequest {
            rating: 0,
            comment: None,
        };
        assert!(matches!(
            low.validate(),
            Err(ValidationError::OutOfRange { field: "rating", .. })
        ));

        let long = ReviewRequest {
            rating: 4,
            comment: Some("x".repeat(501)),
        };
        assert!(matches!(
            long.validate(),
            Err(ValidationError::TooLong { field: "comment", .. })
        ));
    }

    #[test]
    fn edit_request_allows_partial_changes() {
        let req = EditReviewRequest {
            rating: None,
            comment: Some(String::new()),
        };
        assert!(req.validate().is_ok());

        let bad = EditReviewRequest {
            rating: Some(9),
            comment: None,
        };
        assert!(bad.validate().is_err());
    }
}
