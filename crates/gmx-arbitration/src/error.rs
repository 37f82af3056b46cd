//! # Arbitration Errors
//!
//! Failures raised while filing, adjudicating or moderating. Order-level
//! guard failures pass through unchanged as [`ArbitrationError::Order`] so
//! callers can distinguish an authorization failure from a state failure
//! regardless of which crate detected it.

use gmx_core::{DisputeId, OrderId, ReviewId, ValidationError};
use gmx_state::{OrderError, OrderStatus};
use thiserror::Error;

use crate::dispute::DisputeStatus;

/// Errors from dispute, resolution, review and audit operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArbitrationError {
    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The order state machine rejected the transition.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// The actor's profile is banned.
    #[error("{actor} is banned and cannot {operation}")]
    ActorBanned {
        /// The banned actor.
        actor: String,
        /// What they attempted.
        operation: &'static str,
    },

    /// The actor lacks the privilege the operation requires.
    #[error("{actor} is not authorized to {operation}")]
    Unauthorized {
        /// The rejected actor.
        actor: String,
        /// What they attempted.
        operation: &'static str,
    },

    /// The dispute cannot move to the requested status.
    #[error("{dispute_id} cannot move from {from} to {to}")]
    InvalidDisputeTransition {
        /// Target dispute.
        dispute_id: DisputeId,
        /// Current status.
        from: DisputeStatus,
        /// Requested status.
        to: DisputeStatus,
    },

    /// The dispute does not belong to the order being adjudicated.
    #[error("{dispute_id} does not belong to {order_id}")]
    DisputeMismatch {
        /// The dispute supplied.
        dispute_id: DisputeId,
        /// The order being adjudicated.
        order_id: OrderId,
    },

    /// Reviews require a completed order.
    #[error("{order_id} is {status}; only completed orders can be reviewed")]
    ReviewNotAllowed {
        /// Target order.
        order_id: OrderId,
        /// Its current status.
        status: OrderStatus,
    },

    /// The review was deleted by an admin.
    #[error("{review_id} has been deleted")]
    ReviewDeleted {
        /// Target review.
        review_id: ReviewId,
    },

    /// An admin edit must change at least one field.
    #[error("edit of {review_id} changes nothing")]
    EmptyEdit {
        /// Target review.
        review_id: ReviewId,
    },
}
