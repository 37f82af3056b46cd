//! # Dispute Records
//!
//! A buyer contests a paid or delivered order by filing a dispute. The
//! dispute row and the order's move to `dispute_raised` are committed as
//! one batch by the engine; this module owns the dispute's own lifecycle
//! and input validation.
//!
//! ## States
//!
//! ```text
//! Open ──begin_review──▶ UnderReview
//!   │                        │
//!   └────────┬───────────────┘
//!            ▼
//!   Resolved (buyer verdict) | Closed (seller verdict)
//! ```
//!
//! At most one dispute per order may be `Open` or `UnderReview` at a time.
//! Disputes are never deleted.

use serde::{Deserialize, Serialize};

use gmx_core::error::check_length;
use gmx_core::{Actor, DisputeId, OrderId, ProfileId, Timestamp, ValidationError};

use crate::audit::{require_admin, AdminActionDraft, AdminActionType, TargetType};
use crate::error::ArbitrationError;

/// Minimum description length in characters.
pub const MIN_DESCRIPTION_CHARS: usize = 20;
/// Maximum description length in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 1000;
/// Maximum number of evidence URLs per dispute.
pub const MAX_EVIDENCE_URLS: usize = 3;

// ─── Status ──────────────────────────────────────────────────────────

/// The lifecycle status of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    /// Filed; awaiting admin attention.
    Open,
    /// An admin has picked the dispute up.
    UnderReview,
    /// Decided in the buyer's favor (terminal).
    Resolved,
    /// Decided in the seller's favor (terminal).
    Closed,
}

impl DisputeStatus {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::UnderReview => "under_review",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Parse the canonical string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "under_review" => Some(Self::UnderReview),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Whether the dispute still awaits a verdict.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::UnderReview)
    }

    /// Whether `self → to` is a permitted move.
    pub fn can_transition_to(&self, to: DisputeStatus) -> bool {
        matches!(
            (self, to),
            (Self::Open, Self::UnderReview)
                | (Self::Open | Self::UnderReview, Self::Resolved | Self::Closed)
        )
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Reasons ─────────────────────────────────────────────────────────

/// The fixed set of dispute reasons offered to buyers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeReason {
    #[serde(rename = "Item not received")]
    ItemNotReceived,
    #[serde(rename = "Wrong item received")]
    WrongItemReceived,
    #[serde(rename = "Code already used")]
    CodeAlreadyUsed,
    #[serde(rename = "Account credentials invalid")]
    AccountCredentialsInvalid,
    #[serde(rename = "Item not as described")]
    ItemNotAsDescribed,
    #[serde(rename = "Seller unresponsive")]
    SellerUnresponsive,
    #[serde(rename = "Other")]
    Other,
}

impl DisputeReason {
    /// Every reason, in the order buyers see them.
    pub const ALL: [DisputeReason; 7] = [
        Self::ItemNotReceived,
        Self::WrongItemReceived,
        Self::CodeAlreadyUsed,
        Self::AccountCredentialsInvalid,
        Self::ItemNotAsDescribed,
        Self::SellerUnresponsive,
        Self::Other,
    ];

    /// The human-readable label stored with the dispute.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ItemNotReceived => "Item not received",
            Self::WrongItemReceived => "Wrong item received",
            Self::CodeAlreadyUsed => "Code already used",
            Self::AccountCredentialsInvalid => "Account credentials invalid",
            Self::ItemNotAsDescribed => "Item not as described",
            Self::SellerUnresponsive => "Seller unresponsive",
            Self::Other => "Other",
        }
    }

    /// Parse a label. Blank input is a missing reason.
    pub fn parse(label: &str) -> Result<Self, ValidationError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ValidationError::Missing { field: "reason" });
        }
        Self::ALL
            .into_iter()
            .find(|r| r.label() == label)
            .ok_or_else(|| ValidationError::Invalid {
                field: "reason",
                reason: format!("unknown dispute reason {label:?}"),
            })
    }
}

impl std::fmt::Display for DisputeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ─── Filing ──────────────────────────────────────────────────────────

/// Raw dispute input as submitted by the buyer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisputeFiling {
    /// One of the [`DisputeReason`] labels.
    #[serde(default)]
    pub reason: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Links to uploaded evidence.
    #[serde(default)]
    pub evidence_urls: Vec<String>,
}

/// A filing that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidFiling {
    /// Parsed reason.
    pub reason: DisputeReason,
    /// Trimmed description.
    pub description: String,
    /// Checked evidence links.
    pub evidence_urls: Vec<String>,
}

impl DisputeFiling {
    /// Validate every field. Runs before the store is touched.
    pub fn validate(&self) -> Result<ValidFiling, ValidationError> {
        let reason = DisputeReason::parse(&self.reason)?;

        let description = self.description.trim();
        check_length(
            "description",
            description,
            MIN_DESCRIPTION_CHARS,
            MAX_DESCRIPTION_CHARS,
        )?;

        if self.evidence_urls.len() > MAX_EVIDENCE_URLS {
            return Err(ValidationError::TooMany {
                field: "evidence_urls",
                max: MAX_EVIDENCE_URLS,
                actual: self.evidence_urls.len(),
            });
        }
        let evidence_urls = self
            .evidence_urls
            .iter()
            .map(|u| check_evidence_url(u.trim()).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ValidFiling {
            reason,
            description: description.to_string(),
            evidence_urls,
        })
    }
}

fn check_evidence_url(url: &str) -> Result<&str, ValidationError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') && !url.contains(char::is_whitespace) => {
            Ok(url)
        }
        _ => Err(ValidationError::Invalid {
            field: "evidence_urls",
            reason: format!("{url:?} is not an http(s) URL"),
        }),
    }
}

// ─── Dispute ─────────────────────────────────────────────────────────

/// A dispute raised by a buyer against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    /// Dispute identifier.
    pub id: DisputeId,
    /// The contested order.
    pub order_id: OrderId,
    /// The buyer who filed it.
    pub raised_by: ProfileId,
    /// Reason from the fixed set.
    pub reason: DisputeReason,
    /// Buyer's description.
    pub description: String,
    /// Evidence links (at most three).
    pub evidence_urls: Vec<String>,
    /// Current status.
    pub status: DisputeStatus,
    /// When it was filed.
    pub created_at: Timestamp,
    /// When a verdict was reached.
    pub resolved_at: Option<Timestamp>,
}

impl Dispute {
    /// A new `Open` dispute from a validated filing.
    pub fn open(
        order_id: OrderId,
        raised_by: ProfileId,
        filing: ValidFiling,
        now: Timestamp,
    ) -> Self {
        Self {
            id: DisputeId::new(),
            order_id,
            raised_by,
            reason: filing.reason,
            description: filing.description,
            evidence_urls: filing.evidence_urls,
            status: DisputeStatus::Open,
            created_at: now,
            resolved_at: None,
        }
    }

    fn transition(&mut self, to: DisputeStatus) -> Result<(), ArbitrationError> {
        if !self.status.can_transition_to(to) {
            return Err(ArbitrationError::InvalidDisputeTransition {
                dispute_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// An admin picks the dispute up: `Open → UnderReview`.
    ///
    /// Returns the audit record to commit alongside the status change.
    pub fn begin_review(
        &mut self,
        admin: &Actor,
        now: Timestamp,
    ) -> Result<AdminActionDraft, ArbitrationError> {
        let admin_id = require_admin(admin, "review disputes")?;
        let previous = self.status;
        self.transition(DisputeStatus::UnderReview)?;
        Ok(AdminActionDraft::new(
            admin_id,
            AdminActionType::DisputeUnderReview,
            TargetType::Dispute,
            *self.id.as_uuid(),
            format!("Dispute on {} taken under review", self.order_id),
        )
        .with_metadata(serde_json::json!({
            "order_id": self.order_id.as_uuid().to_string(),
            "previous_status": previous.as_str(),
            "new_status": self.status.as_str(),
            "reviewed_at": now.to_iso8601(),
        })))
    }

    /// Record a verdict: the dispute moves to `status` and `resolved_at` is
    /// stamped.
    pub fn settle(&mut self, status: DisputeStatus, now: Timestamp) -> Result<(), ArbitrationError> {
        self.transition(status)?;
        self.resolved_at = Some(now.max(self.created_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filing(description: &str, urls: &[&str]) -> DisputeFiling {
        DisputeFiling {
            reason: "Item not received".to_string(),
            description: description.to_string(),
            evidence_urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    fn now() -> Timestamp {
        Timestamp::parse("2026-03-02T09:00:00Z").unwrap()
    }

    fn admin() -> Actor {
        Actor::User {
            id: ProfileId::new(),
            is_admin: true,
            is_banned: false,
        }
    }

    #[test]
    fn test_valid_filing() {
        let f = filing("  Seller never sent the code.  ", &["https://cdn.example.com/a.png"])
            .validate()
            .unwrap();
        assert_eq!(f.reason, DisputeReason::ItemNotReceived);
        assert_eq!(f.description, "Seller never sent the code.");
        assert_eq!(f.evidence_urls.len(), 1);
    }

    #[test]
    fn test_description_too_short() {
        let err = filing("too short", &[]).validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooShort {
                field: "description",
                min: 20,
                actual: 9
            }
        );
    }

    #[test]
    fn test_description_too_long() {
        let long = "x".repeat(1001);
        assert!(matches!(
            filing(&long, &[]).validate(),
            Err(ValidationError::TooLong { field: "description", .. })
        ));
        assert!(filing(&"x".repeat(1000), &[]).validate().is_ok());
    }

    #[test]
    fn test_too_many_evidence_urls() {
        let urls = [
            "https://e.com/1",
            "https://e.com/2",
            "https://e.com/3",
            "https://e.com/4",
        ];
        assert!(matches!(
            filing("a description long enough", &urls).validate(),
            Err(ValidationError::TooMany { field: "evidence_urls", max: 3, actual: 4 })
        ));
    }

    #[test]
    fn test_non_http_evidence_rejected() {
        for bad in ["ftp://e.com/x", "javascript:alert(1)", "https://", "https:///path", "https://a b"] {
            assert!(
                filing("a description long enough", &[bad]).validate().is_err(),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn test_reason_missing_or_unknown() {
        let mut f = filing("a description long enough", &[]);
        f.reason = "  ".to_string();
        assert_eq!(
            f.validate().unwrap_err(),
            ValidationError::Missing { field: "reason" }
        );
        f.reason = "I changed my mind".to_string();
        assert!(matches!(
            f.validate(),
            Err(ValidationError::Invalid { field: "reason", .. })
        ));
    }

    #[test]
    fn test_reason_labels_roundtrip() {
        for r in DisputeReason::ALL {
            assert_eq!(DisputeReason::parse(r.label()).unwrap(), r);
            let json = serde_json::to_string(&r).unwrap();
            assert_eq!(json, format!("\"{}\"", r.label()));
        }
    }

    #[test]
    fn test_begin_review_then_settle() {
        let f = filing("a description long enough", &[]).validate().unwrap();
        let mut d = Dispute::open(OrderId::new(), ProfileId::new(), f, now());
        assert_eq!(d.status, DisputeStatus::Open);

        let draft = d.begin_review(&admin(), now()).unwrap();
        assert_eq!(d.status, DisputeStatus::UnderReview);
        assert_eq!(draft.action_type, AdminActionType::DisputeUnderReview);
        assert_eq!(draft.metadata["previous_status"], "open");

        d.settle(DisputeStatus::Closed, now().plus_hours(1)).unwrap();
        assert_eq!(d.status, DisputeStatus::Closed);
        assert_eq!(d.resolved_at, Some(now().plus_hours(1)));
    }

    #[test]
    fn test_begin_review_requires_admin() {
        let f = filing("a description long enough", &[]).validate().unwrap();
        let buyer = ProfileId::new();
        let mut d = Dispute::open(OrderId::new(), buyer, f, now());
        let actor = Actor::User {
            id: buyer,
            is_admin: false,
            is_banned: false,
        };
        assert!(matches!(
            d.begin_review(&actor, now()),
            Err(ArbitrationError::Unauthorized { .. })
        ));
        assert_eq!(d.status, DisputeStatus::Open);
    }

    #[test]
    fn test_settled_dispute_is_final() {
        let f = filing("a description long enough", &[]).validate().unwrap();
        let mut d = Dispute::open(OrderId::new(), ProfileId::new(), f, now());
        d.settle(DisputeStatus::Resolved, now()).unwrap();
        assert!(!d.status.is_active());
        assert!(matches!(
            d.settle(DisputeStatus::Closed, now()),
            Err(ArbitrationError::InvalidDisputeTransition { .. })
        ));
        assert!(d.begin_review(&admin(), now()).is_err());
    }
}
