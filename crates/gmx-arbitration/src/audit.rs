//! # Admin Action Audit Log: Immutable Hash Chain
//!
//! Every privileged operation (dispute verdicts, review moderation, bans,
//! admin cancellations) appends one [`AdminAction`]. Rows are append-only
//! and each carries a SHA-256 hash chaining it to its predecessor, so a row
//! edited or deleted after the fact breaks [`verify_chain`].
//!
//! ## Chain Construction
//!
//! ```text
//! entry_hash = SHA-256(previous_hash | sequence | id | admin_id | action_type
//!                      | target_type | target_id | description | metadata
//!                      | created_at)
//! ```
//!
//! The first row chains from [`GENESIS_HASH`]. Sequences start at 1 and are
//! contiguous. `metadata` is hashed in its compact JSON form with object
//! keys sorted, which survives a round trip through a JSONB column.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use gmx_core::{Actor, AdminActionId, ProfileId, Timestamp};

use crate::error::ArbitrationError;

/// Hash the first entry chains from.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// What a privileged action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminActionType {
    /// Dispute decided for the buyer; order refunded.
    DisputeResolvedBuyer,
    /// Dispute decided for the seller; order completed.
    DisputeResolvedSeller,
    /// Dispute taken under review.
    DisputeUnderReview,
    /// Review rating or comment changed by an admin.
    ReviewEdited,
    /// Review removed by an admin.
    ReviewDeleted,
    /// Order cancelled by an admin.
    OrderCancelled,
    /// Profile banned.
    UserBanned,
    /// Profile ban lifted.
    UserUnbanned,
}

impl AdminActionType {
    /// Every action type.
    pub const ALL: [AdminActionType; 8] = [
        Self::DisputeResolvedBuyer,
        Self::DisputeResolvedSeller,
        Self::DisputeUnderReview,
        Self::ReviewEdited,
        Self::ReviewDeleted,
        Self::OrderCancelled,
        Self::UserBanned,
        Self::UserUnbanned,
    ];

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DisputeResolvedBuyer => "dispute_resolved_buyer",
            Self::DisputeResolvedSeller => "dispute_resolved_seller",
            Self::DisputeUnderReview => "dispute_under_review",
            Self::ReviewEdited => "review_edited",
            Self::ReviewDeleted => "review_deleted",
            Self::OrderCancelled => "order_cancelled",
            Self::UserBanned => "user_banned",
            Self::UserUnbanned => "user_unbanned",
        }
    }

    /// Parse the canonical string name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for AdminActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of record an admin action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Order,
    Dispute,
    Review,
    Profile,
}

impl TargetType {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Dispute => "dispute",
            Self::Review => "review",
            Self::Profile => "profile",
        }
    }

    /// Parse the canonical string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "order" => Some(Self::Order),
            "dispute" => Some(Self::Dispute),
            "review" => Some(Self::Review),
            "profile" => Some(Self::Profile),
            _ => None,
        }
    }
}

/// Require `actor` to be a non-banned admin; returns the admin's profile id.
pub fn require_admin(actor: &Actor, operation: &'static str) -> Result<ProfileId, ArbitrationError> {
    if actor.is_banned() {
        return Err(ArbitrationError::ActorBanned {
            actor: actor.to_string(),
            operation,
        });
    }
    match actor.profile_id() {
        Some(id) if actor.is_admin() => Ok(id),
        _ => Err(ArbitrationError::Unauthorized {
            actor: actor.to_string(),
            operation,
        }),
    }
}

// ─── Records ─────────────────────────────────────────────────────────

/// An admin action not yet placed in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminActionDraft {
    /// The acting admin.
    pub admin_id: ProfileId,
    /// What was done.
    pub action_type: AdminActionType,
    /// Kind of record affected.
    pub target_type: TargetType,
    /// Id of the record affected.
    pub target_id: Uuid,
    /// Human-readable summary.
    pub description: String,
    /// Structured details (previous_status, new_status, notes, …).
    pub metadata: serde_json::Value,
}

impl AdminActionDraft {
    /// A draft with empty metadata.
    pub fn new(
        admin_id: ProfileId,
        action_type: AdminActionType,
        target_type: TargetType,
        target_id: Uuid,
        description: impl Into<String>,
    ) -> Self {
        Self {
            admin_id,
            action_type,
            target_type,
            target_id,
            description: description.into(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Place the draft after `head`, stamping it and computing its hash.
    pub fn seal(self, head: &ChainHead, created_at: Timestamp) -> AdminAction {
        let mut action = AdminAction {
            id: AdminActionId::new(),
            admin_id: self.admin_id,
            action_type: self.action_type,
            target_type: self.target_type,
            target_id: self.target_id,
            description: self.description,
            metadata: self.metadata,
            created_at,
            sequence: head.sequence + 1,
            previous_hash: head.hash.clone(),
            entry_hash: String::new(),
        };
        action.entry_hash = action.compute_hash();
        action
    }
}

/// A sealed, append-only admin action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAction {
    /// Record identifier.
    pub id: AdminActionId,
    /// The acting admin.
    pub admin_id: ProfileId,
    /// What was done.
    pub action_type: AdminActionType,
    /// Kind of record affected.
    pub target_type: TargetType,
    /// Id of the record affected.
    pub target_id: Uuid,
    /// Human-readable summary.
    pub description: String,
    /// Structured details.
    pub metadata: serde_json::Value,
    /// When the action was recorded.
    pub created_at: Timestamp,
    /// Position in the chain, starting at 1.
    pub sequence: u64,
    /// Hash of the preceding entry, or [`GENESIS_HASH`].
    pub previous_hash: String,
    /// Hash of this entry.
    pub entry_hash: String,
}

impl AdminAction {
    /// Recompute this entry's hash from its contents.
    pub fn compute_hash(&self) -> String {
        let input = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.previous_hash,
            self.sequence,
            self.id.as_uuid(),
            self.admin_id.as_uuid(),
            self.action_type.as_str(),
            self.target_type.as_str(),
            self.target_id,
            self.description,
            self.metadata,
            self.created_at.to_iso8601(),
        );
        sha256_hex(&input)
    }

    /// The chain head after this entry.
    pub fn head(&self) -> ChainHead {
        ChainHead {
            sequence: self.sequence,
            hash: self.entry_hash.clone(),
        }
    }
}

/// The tail of the chain new entries attach to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHead {
    /// Sequence of the last entry (0 when empty).
    pub sequence: u64,
    /// Hash of the last entry.
    pub hash: String,
}

impl ChainHead {
    /// The head of an empty chain.
    pub fn genesis() -> Self {
        Self {
            sequence: 0,
            hash: GENESIS_HASH.to_string(),
        }
    }
}

impl Default for ChainHead {
    fn default() -> Self {
        Self::genesis()
    }
}

/// Seal a batch of drafts one after another starting at `head`.
///
/// Returns the sealed actions and the new head.
pub fn seal_all(
    drafts: Vec<AdminActionDraft>,
    head: ChainHead,
    created_at: Timestamp,
) -> (Vec<AdminAction>, ChainHead) {
    let mut head = head;
    let mut sealed = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let action = draft.seal(&head, created_at);
        head = action.head();
        sealed.push(action);
    }
    (sealed, head)
}

// ─── Verification ────────────────────────────────────────────────────

/// Result of chain integrity verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// Entries examined.
    pub total_entries: usize,
    /// Entries whose link, sequence or hash is wrong.
    pub broken_links: usize,
    /// Sequence of the first bad entry.
    pub first_broken_sequence: Option<u64>,
    /// Whether the whole chain checks out.
    pub chain_valid: bool,
}

/// Verify a full chain, ordered by sequence ascending.
pub fn verify_chain(actions: &[AdminAction]) -> ChainVerification {
    let mut expected = ChainHead::genesis();
    let mut broken_links = 0;
    let mut first_broken_sequence = None;

    for action in actions {
        let ok = action.sequence == expected.sequence + 1
            && action.previous_hash == expected.hash
            && action.entry_hash == action.compute_hash();
        if !ok {
            broken_links += 1;
            first_broken_sequence.get_or_insert(action.sequence);
        }
        expected = action.head();
    }

    ChainVerification {
        total_entries: actions.len(),
        broken_links,
        first_broken_sequence,
        chain_valid: broken_links == 0,
    }
}

/// Compute SHA-256 hex digest of input string.
fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    result.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t() -> Timestamp {
        Timestamp::parse("2026-03-05T12:00:00Z").unwrap()
    }

    fn draft(kind: AdminActionType) -> AdminActionDraft {
        AdminActionDraft::new(
            ProfileId::new(),
            kind,
            TargetType::Order,
            Uuid::new_v4(),
            "test action",
        )
        .with_metadata(serde_json::json!({"notes": "n", "previous_status": "dispute_raised"}))
    }

    fn chain(n: usize) -> Vec<AdminAction> {
        let drafts = (0..n)
            .map(|i| draft(AdminActionType::ALL[i % AdminActionType::ALL.len()]))
            .collect();
        seal_all(drafts, ChainHead::genesis(), t()).0
    }

    #[test]
    fn test_first_entry_chains_from_genesis() {
        let a = draft(AdminActionType::UserBanned).seal(&ChainHead::genesis(), t());
        assert_eq!(a.sequence, 1);
        assert_eq!(a.previous_hash, GENESIS_HASH);
        assert_eq!(a.entry_hash.len(), 64);
        assert_eq!(a.entry_hash, a.compute_hash());
    }

    #[test]
    fn test_valid_chain_verifies() {
        let actions = chain(5);
        let v = verify_chain(&actions);
        assert!(v.chain_valid);
        assert_eq!(v.total_entries, 5);
        assert_eq!(v.first_broken_sequence, None);
    }

    #[test]
    fn test_tampered_metadata_detected() {
        let mut actions = chain(4);
        actions[2].metadata = serde_json::json!({"notes": "rewritten"});
        let v = verify_chain(&actions);
        assert!(!v.chain_valid);
        assert_eq!(v.first_broken_sequence, Some(3));
    }

    #[test]
    fn test_deleted_entry_detected() {
        let mut actions = chain(4);
        actions.remove(1);
        let v = verify_chain(&actions);
        assert!(!v.chain_valid);
        assert_eq!(v.first_broken_sequence, Some(3));
    }

    #[test]
    fn test_metadata_key_order_does_not_matter() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":"x"}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":"x","b":1}"#).unwrap();
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_require_admin() {
        let id = ProfileId::new();
        let admin = Actor::User { id, is_admin: true, is_banned: false };
        assert_eq!(require_admin(&admin, "ban users").unwrap(), id);

        let user = Actor::User { id, is_admin: false, is_banned: false };
        assert!(matches!(
            require_admin(&user, "ban users"),
            Err(ArbitrationError::Unauthorized { .. })
        ));
        let banned_admin = Actor::User { id, is_admin: true, is_banned: true };
        assert!(matches!(
            require_admin(&banned_admin, "ban users"),
            Err(ArbitrationError::ActorBanned { .. })
        ));
        assert!(require_admin(&Actor::System, "ban users").is_err());
    }

    #[test]
    fn test_action_type_names() {
        for t in AdminActionType::ALL {
            assert_eq!(AdminActionType::parse(t.as_str()), Some(t));
        }
        assert_eq!(
            serde_json::to_string(&AdminActionType::DisputeResolvedBuyer).unwrap(),
            "\"dispute_resolved_buyer\""
        );
    }

    proptest! {
        #[test]
        fn prop_any_single_edit_breaks_chain(n in 1usize..12, idx in 0usize..12) {
            let mut actions = chain(n);
            let idx = idx % n;
            actions[idx].description.push('!');
            let v = verify_chain(&actions);
            prop_assert!(!v.chain_valid);
            prop_assert_eq!(v.first_broken_sequence, Some(idx as u64 + 1));
        }
    }
}
