//! # API Route Modules
//!
//! - `orders`: checkout, payment, delivery, confirmation and cancellation,
//!   plus the order view with pricing and the protection countdown.
//! - `disputes`: buyer dispute filing, the active-dispute lookup, and the
//!   admin review and resolution endpoints.
//! - `reviews`: buyer reviews and admin moderation of them.
//! - `admin`: bans and the admin audit log.

pub mod admin;
pub mod disputes;
pub mod orders;
pub mod reviews;

use chrono::{DateTime, Utc};

use gmx_core::Timestamp;

/// Wire form of a domain timestamp.
pub(crate) fn utc(ts: Timestamp) -> DateTime<Utc> {
    *ts.as_datetime()
}
