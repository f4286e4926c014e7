// models.rs - Core entity and status types

use crate::core_types::{
    BankAccountId, Cents, InvestmentId, OfferingId, OrderId, PayoutId, ShareCount, TradeId, TxId,
    UserId, WithdrawalId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================
// LEDGER REFERENCE (tagged union, not a loose string pair)
// ============================================================

/// Polymorphic reference from a ledger entry or transaction to the
/// entity that caused it. A tagged union so entries can never point at
/// the wrong entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerRef {
    Investment(InvestmentId),
    Trade(TradeId),
    Withdrawal(WithdrawalId),
    Payout(PayoutId),
}

/// Ledger entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Deposit,
    Investment,
    TradeBuy,
    TradeSell,
    FeeCharged,
    Withdrawal,
    Unlock,
    PayoutReceived,
}

// ============================================================
// TRANSACTION (user-facing money movement record)
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    Deposit,
    Withdrawal,
    Investment,
    Earning,
    Refund,
}

/// Transaction status - created PENDING, transitions to a terminal
/// state exactly once, never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: TxId,
    pub user_id: UserId,
    pub tx_type: TxType,
    pub amount: Cents,
    pub fee: Cents,
    pub net_amount: Cents,
    pub status: TxStatus,
    /// External payment-processor id (deposits only)
    pub external_payment_id: Option<Uuid>,
    pub reference: Option<LedgerRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================
// OFFERING & INVESTMENT
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferingStatus {
    Active,
    Paused,
    Closed,
}

impl OfferingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferingStatus::Active => "ACTIVE",
            OfferingStatus::Paused => "PAUSED",
            OfferingStatus::Closed => "CLOSED",
        }
    }
}

/// A channel's tradable issuance.
///
/// Invariant: `0 <= available_shares <= total_shares`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offering {
    pub offering_id: OfferingId,
    pub channel_name: String,
    pub total_shares: ShareCount,
    pub available_shares: ShareCount,
    pub price_per_share: Cents,
    pub min_investment: Cents,
    pub max_investment: Cents,
    /// Revenue share sold to investors, in basis points (e.g. 1500 = 15%)
    pub share_percentage_bps: u32,
    pub status: OfferingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentStatus {
    Confirmed,
    Cancelled,
}

/// A holding. Exactly one CONFIRMED row exists per (investor, offering)
/// pair; trades mutate it in place rather than creating duplicates.
///
/// Invariant: `shares >= 0` (a fully divested holding stays at 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub investment_id: InvestmentId,
    pub investor_id: UserId,
    pub offering_id: OfferingId,
    pub shares: ShareCount,
    /// Cumulative cost basis of the holding
    pub total_amount: Cents,
    pub status: InvestmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================
// SELL ORDER
// ============================================================

/// Sell order lifecycle.
///
/// `Active -> PartiallyFilled -> Filled` (terminal), or
/// `Active/PartiallyFilled -> Cancelled` (terminal, seller-initiated), or
/// `Active/PartiallyFilled -> Expired` (terminal, time-triggered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SellOrderStatus {
    Active,
    PartiallyFilled,
    Filled,
    Expired,
    Cancelled,
}

impl SellOrderStatus {
    /// Open orders can still be matched or cancelled
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, SellOrderStatus::Active | SellOrderStatus::PartiallyFilled)
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SellOrderStatus::Active => "ACTIVE",
            SellOrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            SellOrderStatus::Filled => "FILLED",
            SellOrderStatus::Expired => "EXPIRED",
            SellOrderStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Secondary-market listing.
///
/// Invariant: `0 <= shares_remaining <= shares_listed`. Shares stay in
/// the seller's holding while listed ("owned but encumbered"); they
/// leave the holding only when a trade executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellOrder {
    pub order_id: OrderId,
    pub seller_id: UserId,
    pub investment_id: InvestmentId,
    pub offering_id: OfferingId,
    pub shares_listed: ShareCount,
    pub shares_remaining: ShareCount,
    pub price_per_share: Cents,
    pub min_shares: ShareCount,
    pub status: SellOrderStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SellOrder {
    /// Gross cost of filling `shares` at this order's price
    #[inline]
    pub fn cost_of(&self, shares: ShareCount) -> Cents {
        // u128 intermediate: price * shares can exceed u64::MAX
        let cost = self.price_per_share as u128 * shares as u128;
        debug_assert!(cost <= u64::MAX as u128);
        cost as u64
    }

    /// True if `expires_at` is set and in the past
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }
}

// ============================================================
// TRADE (immutable settlement record)
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Completed,
}

/// Created once per settlement, never mutated except to attach
/// `buyer_investment_id` within the same settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub sell_order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub offering_id: OfferingId,
    pub shares: ShareCount,
    pub price_per_share: Cents,
    pub total_amount: Cents,
    pub platform_fee: Cents,
    pub net_amount: Cents,
    pub status: TradeStatus,
    pub buyer_investment_id: Option<InvestmentId>,
    pub executed_at: DateTime<Utc>,
}

// ============================================================
// WITHDRAWAL
// ============================================================

/// Withdrawal request lifecycle.
///
/// `Pending -> Processing -> Completed` (happy path),
/// `Pending/Processing -> Failed` (bank rejects),
/// `Pending -> Cancelled` (user-initiated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl WithdrawalStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Completed | WithdrawalStatus::Failed | WithdrawalStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "PENDING",
            WithdrawalStatus::Processing => "PROCESSING",
            WithdrawalStatus::Completed => "COMPLETED",
            WithdrawalStatus::Failed => "FAILED",
            WithdrawalStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub withdrawal_id: WithdrawalId,
    pub user_id: UserId,
    pub bank_account_id: BankAccountId,
    /// Gross amount locked in the wallet
    pub amount: Cents,
    pub fee: Cents,
    /// Amount the bank transfer pays out (`amount - fee`)
    pub net_amount: Cents,
    pub status: WithdrawalStatus,
    pub failure_reason: Option<String>,
    pub tx_id: TxId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Bank account on file. Verification is computed by an external KYC
/// collaborator; the core only reads the flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub bank_account_id: BankAccountId,
    pub user_id: UserId,
    pub verified: bool,
}

// ============================================================
// PAYOUT
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Completed,
}

/// Revenue-share payout, immutable after creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub payout_id: PayoutId,
    pub investment_id: InvestmentId,
    pub amount: Cents,
    /// Revenue month in `YYYY-MM` form
    pub revenue_month: String,
    pub status: PayoutStatus,
    pub paid_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sell_order_status_lifecycle() {
        assert!(SellOrderStatus::Active.is_open());
        assert!(SellOrderStatus::PartiallyFilled.is_open());
        assert!(SellOrderStatus::Filled.is_terminal());
        assert!(SellOrderStatus::Expired.is_terminal());
        assert!(SellOrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_withdrawal_terminal_states() {
        assert!(WithdrawalStatus::Completed.is_terminal());
        assert!(WithdrawalStatus::Failed.is_terminal());
        assert!(WithdrawalStatus::Cancelled.is_terminal());

        assert!(!WithdrawalStatus::Pending.is_terminal());
        assert!(!WithdrawalStatus::Processing.is_terminal());
    }

    #[test]
    fn test_ledger_ref_discriminates_entity_kind() {
        let a = LedgerRef::Trade(7);
        let b = LedgerRef::Withdrawal(7);
        assert_ne!(a, b);

        let json = serde_json::to_string(&a).unwrap();
        assert!(json.contains("TRADE"));
    }

    #[test]
    fn test_sell_order_cost_of() {
        let order = SellOrder {
            order_id: 1,
            seller_id: 1,
            investment_id: 1,
            offering_id: 1,
            shares_listed: 50,
            shares_remaining: 50,
            price_per_share: 12_00,
            min_shares: 5,
            status: SellOrderStatus::Active,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(order.cost_of(20), 240_00);
    }
}
