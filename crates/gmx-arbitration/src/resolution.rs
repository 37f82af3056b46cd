//! # Resolution: Admin Adjudication of Disputes
//!
//! An admin decides a disputed order for the buyer or the seller. One
//! verdict produces three coordinated changes that the engine commits as a
//! single batch:
//!
//! | Verdict | Order | Dispute | Audit entry |
//! |---------|-------|---------|-------------|
//! | buyer   | `dispute_raised → refunded`  | `resolved` | `dispute_resolved_buyer`  |
//! | seller  | `dispute_raised → completed` | `closed`   | `dispute_resolved_seller` |
//!
//! The order transition runs through the state machine, so a non-admin
//! gets an authorization failure and a second verdict on the same order
//! gets a state failure. The engine additionally conditions the write on
//! the order still being `dispute_raised`, so two admins racing on the
//! same dispute cannot both succeed.

use serde::{Deserialize, Serialize};

use gmx_core::{Actor, Timestamp, ValidationError};
use gmx_state::{Order, OrderAction, OrderTransition, ProtectionWindow, ResolutionType};

use crate::audit::{AdminActionDraft, AdminActionType, TargetType};
use crate::dispute::{Dispute, DisputeStatus};
use crate::error::ArbitrationError;

/// Maximum length of resolution notes.
pub const MAX_NOTES_CHARS: usize = 2000;

/// Which party the admin sided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Uphold the dispute and refund the buyer.
    Buyer,
    /// Reject the dispute and release funds to the seller.
    Seller,
}

impl Verdict {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
        }
    }

    /// The order action this verdict drives.
    pub fn order_action(&self, notes: Option<String>) -> OrderAction {
        match self {
            Self::Buyer => OrderAction::ResolveForBuyer { notes },
            Self::Seller => OrderAction::ResolveForSeller { notes },
        }
    }

    /// The dispute's final status.
    pub fn dispute_status(&self) -> DisputeStatus {
        match self {
            Self::Buyer => DisputeStatus::Resolved,
            Self::Seller => DisputeStatus::Closed,
        }
    }

    /// The audit entry type.
    pub fn action_type(&self) -> AdminActionType {
        match self {
            Self::Buyer => AdminActionType::DisputeResolvedBuyer,
            Self::Seller => AdminActionType::DisputeResolvedSeller,
        }
    }

    /// The outcome recorded on the order.
    pub fn resolution_type(&self) -> ResolutionType {
        match self {
            Self::Buyer => ResolutionType::Refunded,
            Self::Seller => ResolutionType::Completed,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a verdict changed, ready to commit.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The order transition applied.
    pub transition: OrderTransition,
    /// The audit entry to append.
    pub audit: AdminActionDraft,
}

/// Normalise admin notes: trimmed, blank becomes `None`, bounded length.
pub fn normalize_notes(notes: Option<String>) -> Result<Option<String>, ValidationError> {
    let Some(notes) = notes else {
        return Ok(None);
    };
    let notes = notes.trim();
    if notes.is_empty() {
        return Ok(None);
    }
    gmx_core::error::check_length("notes", notes, 1, MAX_NOTES_CHARS)?;
    Ok(Some(notes.to_string()))
}

/// Apply `verdict` to `order` and its active `dispute`.
///
/// Both are mutated in place only on success. The dispute is settled
/// after the order transition succeeds, so an unauthorized or stale
/// verdict leaves both untouched.
pub fn adjudicate(
    order: &mut Order,
    dispute: Option<&mut Dispute>,
    admin: &Actor,
    verdict: Verdict,
    notes: Option<String>,
    now: Timestamp,
    window: &ProtectionWindow,
) -> Result<Resolution, ArbitrationError> {
    let notes = normalize_notes(notes)?;

    if let Some(d) = dispute.as_deref() {
        if d.order_id != order.id {
            return Err(ArbitrationError::DisputeMismatch {
                dispute_id: d.id,
                order_id: order.id,
            });
        }
    }

    let mut next = order.clone();
    let transition = next.apply(admin, verdict.order_action(notes.clone()), now, window)?;

    let mut dispute_id = None;
    if let Some(d) = dispute {
        let mut settled = d.clone();
        settled.settle(verdict.dispute_status(), transition.at)?;
        dispute_id = Some(settled.id.as_uuid().to_string());
        *d = settled;
    }
    *order = next;

    // The state machine only admits admins here, so resolved_by is set.
    let admin_id = order.resolved_by.ok_or_else(|| ArbitrationError::Unauthorized {
        actor: admin.to_string(),
        operation: "resolve disputes",
    })?;

    let audit = AdminActionDraft::new(
        admin_id,
        verdict.action_type(),
        TargetType::Order,
        *order.id.as_uuid(),
        format!(
            "Dispute on {} resolved in favor of the {}",
            order.id, verdict
        ),
    )
    .with_metadata(serde_json::json!({
        "previous_status": transition.from.as_str(),
        "new_status": transition.to.as_str(),
        "verdict": verdict.as_str(),
        "notes": notes,
        "dispute_id": dispute_id,
        "resolution_type": verdict.resolution_type().as_str(),
    }));

    Ok(Resolution { transition, audit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispute::DisputeFiling;
    use gmx_core::{Amount, ListingId, ProfileId};
    use gmx_state::{DeliveryType, ListingSnapshot, NewOrder, OrderError, OrderStatus};

    fn t0() -> Timestamp {
        Timestamp::parse("2026-03-01T10:00:00Z").unwrap()
    }

    fn admin() -> Actor {
        Actor::User {
            id: ProfileId::new(),
            is_admin: true,
            is_banned: false,
        }
    }

    fn disputed() -> (Order, Dispute) {
        let window = ProtectionWindow::default();
        let mut order = Order::new(
            NewOrder {
                buyer_id: ProfileId::new(),
                seller_id: ProfileId::new(),
                amount: Amount::from_cents(2_500),
                quantity: 1,
                listing: ListingSnapshot {
                    listing_id: ListingId::new(),
                    title: "5000 gold".to_string(),
                    game: "Example Online".to_string(),
                    category: "currency".to_string(),
                    image_url: None,
                    delivery_type: DeliveryType::Manual,
                },
            },
            t0(),
        )
        .unwrap();
        let buyer = Actor::User {
            id: order.buyer_id,
            is_admin: false,
            is_banned: false,
        };
        let seller = Actor::User {
            id: order.seller_id,
            is_admin: false,
            is_banned: false,
        };
        order
            .apply(&buyer, OrderAction::CapturePayment, t0(), &window)
            .unwrap();
        order
            .apply(&seller, OrderAction::MarkDelivered, t0().plus_hours(1), &window)
            .unwrap();
        let filing = DisputeFiling {
            reason: "Item not received".to_string(),
            description: "Gold never arrived in my account".to_string(),
            evidence_urls: vec![],
        }
        .validate()
        .unwrap();
        order
            .apply(
                &buyer,
                OrderAction::RaiseDispute {
                    reason: filing.reason.label().to_string(),
                },
                t0().plus_hours(2),
                &window,
            )
            .unwrap();
        let dispute = Dispute::open(order.id, order.buyer_id, filing, t0().plus_hours(2));
        (order, dispute)
    }

    #[test]
    fn test_buyer_verdict_refunds_and_resolves() {
        let (mut order, mut dispute) = disputed();
        let a = admin();
        let r = adjudicate(
            &mut order,
            Some(&mut dispute),
            &a,
            Verdict::Buyer,
            Some("  Refund issued ".to_string()),
            t0().plus_hours(5),
            &ProtectionWindow::default(),
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::Refunded);
        assert_eq!(order.resolution_notes.as_deref(), Some("Refund issued"));
        assert_eq!(dispute.status, DisputeStatus::Resolved);
        assert_eq!(dispute.resolved_at, Some(t0().plus_hours(5)));
        assert_eq!(r.audit.action_type, AdminActionType::DisputeResolvedBuyer);
        assert_eq!(r.audit.admin_id, a.profile_id().unwrap());
        assert_eq!(r.audit.metadata["previous_status"], "dispute_raised");
        assert_eq!(r.audit.metadata["new_status"], "refunded");
        assert_eq!(r.audit.metadata["notes"], "Refund issued");
    }

    #[test]
    fn test_seller_verdict_completes_and_closes() {
        let (mut order, mut dispute) = disputed();
        let r = adjudicate(
            &mut order,
            Some(&mut dispute),
            &admin(),
            Verdict::Seller,
            None,
            t0().plus_hours(5),
            &ProtectionWindow::default(),
        )
        .unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(dispute.status, DisputeStatus::Closed);
        assert_eq!(r.audit.action_type, AdminActionType::DisputeResolvedSeller);
        assert!(r.audit.metadata["notes"].is_null());
    }

    #[test]
    fn test_non_admin_cannot_adjudicate() {
        let (mut order, mut dispute) = disputed();
        let buyer = Actor::User {
            id: order.buyer_id,
            is_admin: false,
            is_banned: false,
        };
        let err = adjudicate(
            &mut order,
            Some(&mut dispute),
            &buyer,
            Verdict::Buyer,
            None,
            t0().plus_hours(5),
            &ProtectionWindow::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ArbitrationError::Order(OrderError::Unauthorized { .. })
        ));
        assert_eq!(order.status, OrderStatus::DisputeRaised);
        assert_eq!(dispute.status, DisputeStatus::Open);
    }

    #[test]
    fn test_second_verdict_fails_loudly() {
        let (mut order, mut dispute) = disputed();
        let a = admin();
        let w = ProtectionWindow::default();
        adjudicate(&mut order, Some(&mut dispute), &a, Verdict::Buyer, None, t0().plus_hours(5), &w)
            .unwrap();
        let err = adjudicate(
            &mut order,
            Some(&mut dispute),
            &a,
            Verdict::Seller,
            None,
            t0().plus_hours(6),
            &w,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ArbitrationError::Order(OrderError::AlreadyTerminal { .. })
        ));
        assert_eq!(order.status, OrderStatus::Refunded);
        assert_eq!(dispute.status, DisputeStatus::Resolved);
    }

    #[test]
    fn test_mismatched_dispute_rejected() {
        let (mut order, _) = disputed();
        let (_, mut other) = disputed();
        assert!(matches!(
            adjudicate(
                &mut order,
                Some(&mut other),
                &admin(),
                Verdict::Buyer,
                None,
                t0().plus_hours(5),
                &ProtectionWindow::default()
            ),
            Err(ArbitrationError::DisputeMismatch { .. })
        ));
    }

    #[test]
    fn test_notes_normalisation() {
        assert_eq!(normalize_notes(None).unwrap(), None);
        assert_eq!(normalize_notes(Some("   ".into())).unwrap(), None);
        assert!(normalize_notes(Some("x".repeat(MAX_NOTES_CHARS + 1))).is_err());
    }
}
