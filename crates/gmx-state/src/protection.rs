//! # Buyer Protection Window
//!
//! After an order is delivered the buyer has a fixed window (48 hours by
//! default) to confirm receipt or raise a dispute. Once the window elapses
//! uncontested, the order is due for automatic completion.
//!
//! ```text
//! delivered_at                         delivered_at + 48h
//!      │◀──────── window open ─────────▶│
//!      │  confirm / dispute permitted    │  auto-complete due
//! ─────┴─────────────────────────────────┴──────────────────▶ time
//! ```
//!
//! The same arithmetic drives the countdown shown to the buyer and the
//! server-side auto-completion worker, so the two can never disagree about
//! when the window closes.

use serde::{Deserialize, Serialize};

use gmx_core::{Timestamp, ValidationError};

/// Default buyer protection window length.
pub const PROTECTION_WINDOW_HOURS: u32 = 48;

/// Longest configurable window: one year.
pub const MAX_PROTECTION_WINDOW_HOURS: u32 = 8760;

const SECS_PER_HOUR: i64 = 3600;

/// A buyer protection window of a fixed number of hours, between one hour
/// and [`MAX_PROTECTION_WINDOW_HOURS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ProtectionWindow {
    hours: u32,
}

impl ProtectionWindow {
    /// A window of `hours` hours, clamped to the permitted range.
    pub fn new(hours: u32) -> Self {
        Self {
            hours: hours.clamp(1, MAX_PROTECTION_WINDOW_HOURS),
        }
    }

    /// A window of exactly `hours` hours, rejecting out-of-range lengths.
    pub fn try_new(hours: u32) -> Result<Self, ValidationError> {
        if !(1..=MAX_PROTECTION_WINDOW_HOURS).contains(&hours) {
            return Err(ValidationError::OutOfRange {
                field: "protection_window_hours",
                min: 1,
                max: i64::from(MAX_PROTECTION_WINDOW_HOURS),
                actual: i64::from(hours),
            });
        }
        Ok(Self { hours })
    }

    /// Window length in hours.
    pub fn hours(&self) -> u32 {
        self.hours
    }

    /// Window length in seconds.
    pub fn length_secs(&self) -> i64 {
        i64::from(self.hours) * SECS_PER_HOUR
    }

    /// The instant the window closes for an order delivered at `delivered_at`.
    pub fn closes_at(&self, delivered_at: Timestamp) -> Timestamp {
        delivered_at.plus_seconds(self.length_secs())
    }

    /// Whether the buyer may still confirm or dispute at `now`.
    pub fn is_open(&self, delivered_at: Timestamp, now: Timestamp) -> bool {
        now < self.closes_at(delivered_at)
    }

    /// Whether the window has elapsed and the order is due for auto-completion.
    pub fn has_elapsed(&self, delivered_at: Timestamp, now: Timestamp) -> bool {
        !self.is_open(delivered_at, now)
    }

    /// Seconds left in the window (negative once elapsed).
    pub fn seconds_remaining(&self, delivered_at: Timestamp, now: Timestamp) -> i64 {
        self.length_secs() - now.seconds_since(delivered_at)
    }

    /// Hours left in the window, fractional; `<= 0` once elapsed.
    pub fn hours_remaining(&self, delivered_at: Timestamp, now: Timestamp) -> f64 {
        self.seconds_remaining(delivered_at, now) as f64 / SECS_PER_HOUR as f64
    }

    /// The countdown shown to the buyer.
    pub fn countdown(&self, delivered_at: Timestamp, now: Timestamp) -> Countdown {
        Countdown::from_seconds(self.seconds_remaining(delivered_at, now))
    }

    /// The latest `delivered_at` for which the window has elapsed at `now`.
    ///
    /// Orders delivered at or before this instant are due for
    /// auto-completion.
    pub fn elapsed_cutoff(&self, now: Timestamp) -> Timestamp {
        now.plus_seconds(-self.length_secs())
    }
}

impl TryFrom<u32> for ProtectionWindow {
    type Error = ValidationError;

    fn try_from(hours: u32) -> Result<Self, Self::Error> {
        Self::try_new(hours)
    }
}

impl From<ProtectionWindow> for u32 {
    fn from(window: ProtectionWindow) -> Self {
        window.hours
    }
}

impl Default for ProtectionWindow {
    fn default() -> Self {
        Self::new(PROTECTION_WINDOW_HOURS)
    }
}

/// Hours remaining in the default 48-hour window.
///
/// Strictly decreasing in `now`; reaches zero exactly 48 hours after
/// `delivered_at` and is negative afterwards.
pub fn hours_remaining(delivered_at: Timestamp, now: Timestamp) -> f64 {
    ProtectionWindow::default().hours_remaining(delivered_at, now)
}

/// Remaining protection time, split for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    remaining_secs: i64,
}

impl Countdown {
    /// A countdown with `secs` seconds left (may be negative).
    pub fn from_seconds(secs: i64) -> Self {
        Self {
            remaining_secs: secs,
        }
    }

    /// Raw seconds remaining, negative once elapsed.
    pub fn remaining_secs(&self) -> i64 {
        self.remaining_secs
    }

    /// Whether the countdown has run out.
    pub fn is_expired(&self) -> bool {
        self.remaining_secs <= 0
    }

    fn clamped(&self) -> i64 {
        self.remaining_secs.max(0)
    }

    /// Whole hours left.
    pub fn hours(&self) -> i64 {
        self.clamped() / SECS_PER_HOUR
    }

    /// Minutes left past the whole hours.
    pub fn minutes(&self) -> i64 {
        (self.clamped() % SECS_PER_HOUR) / 60
    }

    /// Seconds left past the whole minutes.
    pub fn seconds(&self) -> i64 {
        self.clamped() % 60
    }
}

impl std::fmt::Display for Countdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}h {}m {}s", self.hours(), self.minutes(), self.seconds())
    }
}
