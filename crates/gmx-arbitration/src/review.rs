//! # Review Lifecycle
//!
//! A buyer may leave exactly one review per order, and only once the order
//! is `completed`. Admins may edit or delete any review; both produce an
//! audit entry, and an edit never loses the buyer's original rating.
//!
//! Deletion is a tombstone: the row stays, hidden from readers, so the
//! one-review-per-order rule still holds after an admin removes a review.

use serde::{Deserialize, Serialize};

use gmx_core::error::check_length;
use gmx_core::{Actor, OrderId, ProfileId, ReviewId, Timestamp, ValidationError};
use gmx_state::{Order, OrderStatus};

use crate::audit::{require_admin, AdminActionDraft, AdminActionType, TargetType};
use crate::error::ArbitrationError;

/// Lowest permitted rating.
pub const MIN_RATING: i64 = 1;
/// Highest permitted rating.
pub const MAX_RATING: i64 = 5;
/// Maximum comment length in characters.
pub const MAX_COMMENT_CHARS: usize = 500;

/// Validate a star rating.
pub fn check_rating(rating: i64) -> Result<u8, ValidationError> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(ValidationError::OutOfRange {
            field: "rating",
            min: MIN_RATING,
            max: MAX_RATING,
            actual: rating,
        });
    }
    // In range 1..=5.
    Ok(rating as u8)
}

/// Trim a comment; blank becomes `None`.
pub fn check_comment(comment: Option<&str>) -> Result<Option<String>, ValidationError> {
    match comment.map(str::trim) {
        None | Some("") => Ok(None),
        Some(c) => {
            check_length("comment", c, 1, MAX_COMMENT_CHARS)?;
            Ok(Some(c.to_string()))
        }
    }
}

/// A buyer's review submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewDraft {
    /// Star rating, 1–5.
    pub rating: i64,
    /// Optional comment.
    #[serde(default)]
    pub comment: Option<String>,
}

/// Changes an admin applies to a review. Absent fields are left alone; an
/// empty comment clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewEdit {
    /// Replacement rating.
    #[serde(default)]
    pub rating: Option<i64>,
    /// Replacement comment.
    #[serde(default)]
    pub comment: Option<String>,
}

/// A buyer's review of a completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub order_id: OrderId,
    /// The buyer.
    pub reviewer_id: ProfileId,
    /// The seller being reviewed.
    pub seller_id: ProfileId,
    /// Current rating.
    pub rating: u8,
    pub comment: Option<String>,
    /// The buyer's rating as submitted, kept across admin edits.
    pub original_rating: u8,
    pub edited_by_admin: bool,
    pub edited_at: Option<Timestamp>,
    pub created_at: Timestamp,
    /// Set when an admin deleted the review.
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
    /// The admin who deleted it.
    #[serde(default)]
    pub deleted_by: Option<ProfileId>,
}

impl Review {
    /// Create the buyer's review of `order`.
    ///
    /// Validation runs first; the order must be completed and `actor` must
    /// be its buyer. Uniqueness per order is enforced by the store.
    pub fn submit(
        order: &Order,
        actor: &Actor,
        draft: &ReviewDraft,
        now: Timestamp,
    ) -> Result<Self, ArbitrationError> {
        let rating = check_rating(draft.rating)?;
        let comment = check_comment(draft.comment.as_deref())?;

        if actor.is_banned() {
            return Err(ArbitrationError::ActorBanned {
                actor: actor.to_string(),
                operation: "review orders",
            });
        }
        if !actor.is(&order.buyer_id) {
            return Err(ArbitrationError::Unauthorized {
                actor: actor.to_string(),
                operation: "review this order",
            });
        }
        if order.status != OrderStatus::Completed {
            return Err(ArbitrationError::ReviewNotAllowed {
                order_id: order.id,
                status: order.status,
            });
        }

        Ok(Self {
            id: ReviewId::new(),
            order_id: order.id,
            reviewer_id: order.buyer_id,
            seller_id: order.seller_id,
            rating,
            comment,
            original_rating: rating,
            edited_by_admin: false,
            edited_at: None,
            created_at: now,
            deleted_at: None,
            deleted_by: None,
        })
    }

    /// Whether an admin has deleted this review.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn ensure_live(&self) -> Result<(), ArbitrationError> {
        if self.is_deleted() {
            return Err(ArbitrationError::ReviewDeleted { review_id: self.id });
        }
        Ok(())
    }

    /// Apply an admin edit. Returns the audit entry to commit with it.
    pub fn admin_edit(
        &mut self,
        admin: &Actor,
        edit: &ReviewEdit,
        now: Timestamp,
    ) -> Result<AdminActionDraft, ArbitrationError> {
        let admin_id = require_admin(admin, "edit reviews")?;
        self.ensure_live()?;
        let rating = edit.rating.map(check_rating).transpose()?;
        let comment = edit
            .comment
            .as_deref()
            .map(|c| check_comment(Some(c)))
            .transpose()?;
        if rating.is_none() && comment.is_none() {
            return Err(ArbitrationError::EmptyEdit { review_id: self.id });
        }

        let previous_rating = self.rating;
        let previous_comment = self.comment.clone();
        if let Some(r) = rating {
            self.rating = r;
        }
        if let Some(c) = comment {
            self.comment = c;
        }
        self.edited_by_admin = true;
        self.edited_at = Some(now.max(self.created_at));

        Ok(AdminActionDraft::new(
            admin_id,
            AdminActionType::ReviewEdited,
            TargetType::Review,
            *self.id.as_uuid(),
            format!("Review on {} edited", self.order_id),
        )
        .with_metadata(serde_json::json!({
            "order_id": self.order_id.as_uuid().to_string(),
            "original_rating": self.original_rating,
            "previous_rating": previous_rating,
            "new_rating": self.rating,
            "previous_comment": previous_comment,
            "new_comment": self.comment,
        })))
    }

    /// Tombstone the review on an admin's behalf. Returns the audit entry,
    /// which keeps the rating and comment so the deletion loses nothing.
    pub fn mark_deleted(
        &mut self,
        admin: &Actor,
        reason: Option<&str>,
        now: Timestamp,
    ) -> Result<AdminActionDraft, ArbitrationError> {
        let admin_id = require_admin(admin, "delete reviews")?;
        self.ensure_live()?;
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        self.deleted_at = Some(now.max(self.created_at));
        self.deleted_by = Some(admin_id);
        Ok(AdminActionDraft::new(
            admin_id,
            AdminActionType::ReviewDeleted,
            TargetType::Review,
            *self.id.as_uuid(),
            format!("Review on {} deleted", self.order_id),
        )
        .with_metadata(serde_json::json!({
            "order_id": self.order_id.as_uuid().to_string(),
            "reviewer_id": self.reviewer_id.as_uuid().to_string(),
            "rating": self.rating,
            "original_rating": self.original_rating,
            "comment": self.comment,
            "reason": reason,
        })))
    }
}
