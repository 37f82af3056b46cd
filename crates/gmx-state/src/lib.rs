//! # gmx-state: Order Lifecycle State Machine
//!
//! Implements the lifecycle of a marketplace order and the buyer protection
//! window that bounds it.
//!
//! ## Modules
//!
//! - **Order** (`order.rs`): `Pending → Paid → Delivered → Completed`, with
//!   `Cancelled`, `DisputeRaised` and `Refunded` branches. Every permitted
//!   transition is one row of [`TRANSITION_TABLE`]; [`Order::apply`] is the
//!   only way an order's status changes.
//!
//! - **Protection** (`protection.rs`): the 48-hour buyer protection window
//!   that follows delivery, the countdown shown to buyers, and the cutoff the
//!   auto-completion worker sweeps against.
//!
//! ## Design
//!
//! Status is a validated enum rather than a type parameter because orders
//! are loaded from storage with a status only known at runtime. No
//! string-typed states cross the crate boundary: the store and the HTTP
//! layer parse into [`OrderStatus`] and reject unknown values.

pub mod order;
pub mod protection;

// ─── Order re-exports ───────────────────────────────────────────────

pub use order::{
    DeliveryType, ListingSnapshot, NewOrder, Order, OrderAction, OrderActionKind, OrderError,
    OrderRole, OrderStatus, OrderTransition, PaymentStatus, ResolutionType, TransitionRule,
    TRANSITION_TABLE,
};

// ─── Protection re-exports ──────────────────────────────────────────

pub use protection::{
    hours_remaining, Countdown, ProtectionWindow, MAX_PROTECTION_WINDOW_HOURS, PROTECTION_WINDOW_HOURS,
};
