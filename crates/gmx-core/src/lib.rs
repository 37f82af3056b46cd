//! # gmx-core: Foundational Types for the GMX Marketplace
//!
//! This crate is the leaf of the workspace dependency graph. It defines the
//! primitives every other crate builds on, so that the order lifecycle rules
//! are expressed over typed values rather than bare strings and floats.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `OrderId`, `DisputeId`,
//!    `ReviewId`, `ProfileId`, `ListingId`, `AdminActionId`: you cannot pass
//!    a buyer's profile id where an order id is expected.
//!
//! 2. **One pricing function.** The 5% service fee is computed only by
//!    [`fee_breakdown`]. Amounts are integer minor units; floats never enter
//!    a money path.
//!
//! 3. **UTC-only timestamps.** [`Timestamp`] is UTC with seconds precision,
//!    and all "now" readings flow through a [`Clock`] so time-windowed rules
//!    are testable.
//!
//! 4. **Explicit actors.** Every state-changing operation takes an [`Actor`];
//!    there is no ambient "current user".
//!
//! ## Crate Policy
//!
//! - No dependencies on other `gmx-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod actor;
pub mod error;
pub mod identity;
pub mod pricing;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use actor::{Actor, Profile};
pub use error::ValidationError;
pub use identity::{AdminActionId, DisputeId, ListingId, OrderId, ProfileId, ReviewId};
pub use pricing::{fee_breakdown, Amount, FeeBreakdown, SERVICE_FEE_BPS};
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
