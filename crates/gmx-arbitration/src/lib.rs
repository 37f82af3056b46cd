//! # gmx-arbitration: Disputes, Verdicts, Reviews and the Audit Log
//!
//! Everything that happens around an order once buyer and seller disagree,
//! or once an admin steps in:
//!
//! - **Dispute** (`dispute.rs`): dispute filing validation and the
//!   `open → under_review → resolved | closed` lifecycle.
//!
//! - **Resolution** (`resolution.rs`): an admin verdict, mapped onto the
//!   order transition, the dispute's final status and one audit entry.
//!
//! - **Review** (`review.rs`): one buyer review per completed order, with
//!   audited admin edits and deletions.
//!
//! - **Audit** (`audit.rs`): the append-only, SHA-256 hash-chained admin
//!   action log and its verifier.
//!
//! ## Crate Policy
//!
//! - Depends on `gmx-core` and `gmx-state` internally.
//! - Never touches storage. Operations mutate values in memory and return
//!   the audit drafts the caller must commit in the same batch.

pub mod audit;
pub mod dispute;
pub mod error;
pub mod resolution;
pub mod review;

pub use audit::{
    require_admin, seal_all, verify_chain, AdminAction, AdminActionDraft, AdminActionType,
    ChainHead, ChainVerification, TargetType, GENESIS_HASH,
};
pub use dispute::{Dispute, DisputeFiling, DisputeReason, DisputeStatus, ValidFiling};
pub use error::ArbitrationError;
pub use resolution::{adjudicate, Resolution, Verdict};
pub use review::{Review, ReviewDraft, ReviewEdit};
