//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// User ID - globally unique, immutable after assignment.
///
/// One wallet exists per user, so `UserId` also identifies a wallet.
pub type UserId = u64;

/// Offering ID - a channel's tradable issuance
pub type OfferingId = u64;

/// Investment ID - a holding (investor, offering) record
pub type InvestmentId = u64;

/// Sell order ID - unique within the system
pub type OrderId = u64;

/// Trade ID - unique within the system
pub type TradeId = u64;

/// Withdrawal request ID
pub type WithdrawalId = u64;

/// Payout ID
pub type PayoutId = u64;

/// Transaction ID - user-facing money movement record
pub type TxId = u64;

/// Bank account ID
pub type BankAccountId = u64;

/// Ledger sequence number for ordering entries
pub type LedgerSeq = u64;

/// Share count - whole shares, no fractional units
pub type ShareCount = u64;

/// Money amount in scaled integer cents.
///
/// All money math uses u128 intermediates where multiplication could
/// overflow (see [`crate::fee`]).
pub type Cents = u64;

/// Reserved user id for the platform's fee-revenue wallet.
///
/// Platform fees collected on secondary-market trades are credited here
/// so money conservation holds across every settlement.
pub const PLATFORM_USER_ID: UserId = 0;
