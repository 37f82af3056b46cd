//! # Pricing: The Service Fee Split
//!
//! The marketplace charges a fixed 5% service fee on top of the listing
//! amount. The buyer pays `amount × 1.05`; the seller nets `amount × 0.95`.
//!
//! [`fee_breakdown`] is the only place that arithmetic happens. Order views,
//! notifications and the store all call it, so the split cannot drift
//! between call sites. The fee is derived at read time and never stored.
//!
//! ## Money Representation
//!
//! Amounts are integer minor units (cents). The fee is rounded half-up to
//! the nearest cent, so `total = amount + fee` and `net = amount − fee`
//! hold exactly, and `total = amount × 1.05` holds exactly whenever that
//! product is a whole number of cents.

use serde::{Deserialize, Serialize};

/// Service fee in basis points (500 bps = 5%).
pub const SERVICE_FEE_BPS: u64 = 500;

const BPS_DENOMINATOR: u128 = 10_000;

/// A non-negative monetary amount in minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// An amount expressed in cents.
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// The amount in cents.
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Whether the amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Apply a basis-point rate, rounding half-up to the nearest cent.
    pub fn apply_bps(&self, bps: u64) -> Amount {
        let scaled = self.0 as u128 * bps as u128;
        let rounded = (scaled + BPS_DENOMINATOR / 2) / BPS_DENOMINATOR;
        // bps <= 10_000 keeps the result within u64.
        Amount(rounded.min(u64::MAX as u128) as u64)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// The fee split for one order amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// Listing amount paid, excluding fee.
    pub amount: Amount,
    /// The 5% service fee.
    pub service_fee: Amount,
    /// What the buyer is charged: `amount + service_fee`.
    pub total_buyer_charge: Amount,
    /// What the seller nets: `amount − service_fee`.
    pub net_seller_earnings: Amount,
}

/// Compute the fee split for `amount`.
pub fn fee_breakdown(amount: Amount) -> FeeBreakdown {
    let service_fee = amount.apply_bps(SERVICE_FEE_BPS);
    FeeBreakdown {
        amount,
        service_fee,
        total_buyer_charge: Amount(amount.0.saturating_add(service_fee.0)),
        net_seller_earnings: Amount(amount.0 - service_fee.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hundred_dollar_order() {
        let b = fee_breakdown(Amount::from_cents(10_000));
        assert_eq!(b.service_fee, Amount::from_cents(500));
        assert_eq!(b.total_buyer_charge, Amount::from_cents(10_500));
        assert_eq!(b.net_seller_earnings, Amount::from_cents(9_500));
    }

    #[test]
    fn test_fee_rounds_half_up() {
        // 5% of 10 cents is 0.5 cents, rounds to 1.
        assert_eq!(fee_breakdown(Amount::from_cents(10)).service_fee.cents(), 1);
        // 5% of 9 cents is 0.45 cents, rounds to 0.
        assert_eq!(fee_breakdown(Amount::from_cents(9)).service_fee.cents(), 0);
    }

    #[test]
    fn test_zero_amount() {
        let b = fee_breakdown(Amount::ZERO);
        assert!(b.service_fee.is_zero());
        assert!(b.total_buyer_charge.is_zero());
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from_cents(10_500).to_string(), "105.00");
        assert_eq!(Amount::from_cents(7).to_string(), "0.07");
    }

    proptest! {
        #[test]
        fn prop_split_is_consistent(cents in 0u64..=1_000_000_000_000) {
            let b = fee_breakdown(Amount::from_cents(cents));
            prop_assert_eq!(b.total_buyer_charge.cents(), cents + b.service_fee.cents());
            prop_assert_eq!(b.net_seller_earnings.cents(), cents - b.service_fee.cents());
            prop_assert_eq!(
                b.total_buyer_charge.cents() - b.net_seller_earnings.cents(),
                2 * b.service_fee.cents()
            );
        }

        #[test]
        fn prop_exact_when_divisible(twenties in 0u64..=50_000_000_000) {
            // Multiples of 20 cents have an exact 5% fee.
            let cents = twenties * 20;
            let b = fee_breakdown(Amount::from_cents(cents));
            prop_assert_eq!(b.total_buyer_charge.cents() * 100, cents * 105);
            prop_assert_eq!(b.net_seller_earnings.cents() * 100, cents * 95);
        }
    }
}
