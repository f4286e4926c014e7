//! Fee calculation utilities
//!
//! All fee rates use 10^6 precision: 25_000 = 2.50%

use crate::core_types::Cents;
use serde::{Deserialize, Serialize};

/// Fee rate precision (10^6 = 1,000,000)
pub const FEE_PRECISION: u64 = 1_000_000;

/// Default platform fee on secondary-market trades (25_000 = 2.50%)
pub const DEFAULT_PLATFORM_FEE: u64 = 25_000;

/// Default withdrawal fee (15_000 = 1.50%)
pub const DEFAULT_WITHDRAWAL_FEE: u64 = 15_000;

/// Default minimum withdrawal amount (cents)
pub const DEFAULT_MIN_WITHDRAWAL: Cents = 10_00;

/// Calculate fee from amount and rate.
///
/// Uses u128 intermediate to prevent overflow.
///
/// # Arguments
/// * `amount` - Amount in cents
/// * `rate` - Fee rate in 10^6 precision (25_000 = 2.50%)
///
/// # Example
/// ```
/// use crowdstake::fee::calculate_fee;
/// // $240.00 * 2.50% = $6.00
/// let fee = calculate_fee(240_00, 25_000);
/// assert_eq!(fee, 6_00);
/// ```
#[inline]
pub fn calculate_fee(amount: Cents, rate: u64) -> Cents {
    let fee = (amount as u128 * rate as u128) / FEE_PRECISION as u128;
    // Minimum fee is 1 cent if amount > 0 and rate > 0
    if fee == 0 && amount > 0 && rate > 0 {
        1
    } else {
        fee as u64
    }
}

/// Fee configuration passed into the trade engine and withdrawal desk
/// at construction.
///
/// Rates are explicit configuration, not module-level constants, so
/// they can be versioned per era without breaking historical
/// reconciliation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeSchedule {
    /// Platform cut on secondary-market trades (10^6 precision)
    pub platform_fee_rate: u64,
    /// Fee charged on completed withdrawals (10^6 precision)
    pub withdrawal_fee_rate: u64,
    /// Minimum withdrawal request amount (cents)
    pub min_withdrawal: Cents,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            platform_fee_rate: DEFAULT_PLATFORM_FEE,
            withdrawal_fee_rate: DEFAULT_WITHDRAWAL_FEE,
            min_withdrawal: DEFAULT_MIN_WITHDRAWAL,
        }
    }
}

impl FeeSchedule {
    /// Platform fee for a trade of the given gross amount
    #[inline]
    pub fn platform_fee(&self, amount: Cents) -> Cents {
        calculate_fee(amount, self.platform_fee_rate)
    }

    /// Fee for a withdrawal of the given gross amount
    #[inline]
    pub fn withdrawal_fee(&self, amount: Cents) -> Cents {
        calculate_fee(amount, self.withdrawal_fee_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_fee_basic() {
        // $240.00 * 2.50% = $6.00
        assert_eq!(calculate_fee(240_00, 25_000), 6_00);

        // $500.00 * 1.50% = $7.50
        assert_eq!(calculate_fee(500_00, 15_000), 7_50);
    }

    #[test]
    fn test_calculate_fee_small_amount() {
        // Amount that would round to 0 -> minimum fee is 1 cent
        assert_eq!(calculate_fee(10, 25_000), 1); // 10 * 2.5% = 0.25 -> 1
        assert_eq!(calculate_fee(1, 25_000), 1);
    }

    #[test]
    fn test_calculate_fee_zero() {
        assert_eq!(calculate_fee(0, 25_000), 0);
        assert_eq!(calculate_fee(100_00, 0), 0);
    }

    #[test]
    fn test_no_overflow() {
        // Large amount close to u64::MAX should not overflow
        let large_amount: u64 = 10_000_000_000_000_000_000; // 10^19
        let fee = calculate_fee(large_amount, 25_000);
        assert_eq!(fee, 250_000_000_000_000_000); // 2.5% of 10^19
    }

    #[test]
    fn test_schedule_defaults() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.platform_fee(240_00), 6_00);
        assert_eq!(fees.withdrawal_fee(500_00), 7_50);
        assert_eq!(fees.min_withdrawal, 10_00);
    }
}
