//! Wallet - enforced balance type and the wallet service
//!
//! [`Wallet`] is the single source of truth for one user's money.
//! Fields are PRIVATE; all mutations go through validated methods with
//! checked arithmetic and explicit Results.
//!
//! [`WalletService`] owns every wallet, the append-only ledger, and the
//! user-facing transaction records. It is designed for single-writer
//! execution: `&mut self` serializes all mutations, which gives natural
//! atomicity with no double-spend risk. Every operation validates its
//! preconditions before touching any state.

use crate::core_types::{Cents, TxId, UserId};
use crate::error::{MarketError, MarketResult};
use crate::ledger::LedgerStore;
use crate::models::{EntryType, LedgerRef, Transaction, TxStatus, TxType};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================
// WALLET (enforced balance type)
// ============================================================

/// Balance state for one user.
///
/// # Invariants (ENFORCED by private fields):
/// - `locked <= balance` (locked funds are carved out of balance at
///   lock time, never double-counted)
/// - no overflow/underflow (checked arithmetic)
/// - all state changes return Result
///
/// `available = balance - locked` is the only spendable amount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    balance: Cents,          // PRIVATE - includes locked funds
    locked: Cents,           // PRIVATE - reserved for in-flight withdrawals
    total_deposited: Cents,  // lifetime counters
    total_invested: Cents,
    total_withdrawn: Cents,
    total_earnings: Cents,
    last_activity_at: DateTime<Utc>,
}

impl Wallet {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            balance: 0,
            locked: 0,
            total_deposited: 0,
            total_invested: 0,
            total_withdrawn: 0,
            total_earnings: 0,
            last_activity_at: now,
        }
    }

    // ============================================================
    // READ-ONLY GETTERS (safe to expose)
    // ============================================================

    #[inline(always)]
    pub const fn balance(&self) -> Cents {
        self.balance
    }

    #[inline(always)]
    pub const fn locked(&self) -> Cents {
        self.locked
    }

    /// Spendable balance (balance minus locked)
    #[inline(always)]
    pub const fn available(&self) -> Cents {
        self.balance - self.locked
    }

    #[inline(always)]
    pub const fn total_deposited(&self) -> Cents {
        self.total_deposited
    }

    #[inline(always)]
    pub const fn total_invested(&self) -> Cents {
        self.total_invested
    }

    #[inline(always)]
    pub const fn total_withdrawn(&self) -> Cents {
        self.total_withdrawn
    }

    #[inline(always)]
    pub const fn total_earnings(&self) -> Cents {
        self.total_earnings
    }

    #[inline(always)]
    pub const fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    // ============================================================
    // VALIDATED MUTATIONS
    // ============================================================

    /// Credit a confirmed deposit
    fn deposit(&mut self, amount: Cents) -> Result<(), &'static str> {
        self.balance = self.balance.checked_add(amount).ok_or("Deposit overflow")?;
        self.total_deposited = self
            .total_deposited
            .checked_add(amount)
            .ok_or("Deposit total overflow")?;
        Ok(())
    }

    /// Reserve funds for an in-flight withdrawal. Balance unchanged;
    /// the amount becomes unavailable until unlocked or withdrawn.
    fn lock(&mut self, amount: Cents) -> Result<(), &'static str> {
        if self.available() < amount {
            return Err("Insufficient funds to lock");
        }
        self.locked = self.locked.checked_add(amount).ok_or("Lock overflow")?;
        Ok(())
    }

    /// Return locked funds to available. Balance unchanged.
    fn unlock(&mut self, amount: Cents) -> Result<(), &'static str> {
        if self.locked < amount {
            return Err("Insufficient locked funds");
        }
        self.locked = self.locked.checked_sub(amount).ok_or("Unlock underflow")?;
        Ok(())
    }

    /// Finalize a withdrawal: remove the gross amount from both
    /// balance and locked, count the net amount as withdrawn.
    fn withdraw_locked(&mut self, gross: Cents, net: Cents) -> Result<(), &'static str> {
        if self.locked < gross || self.balance < gross {
            return Err("Insufficient locked funds");
        }
        self.locked = self.locked.checked_sub(gross).ok_or("Withdraw underflow")?;
        self.balance = self.balance.checked_sub(gross).ok_or("Withdraw underflow")?;
        self.total_withdrawn = self
            .total_withdrawn
            .checked_add(net)
            .ok_or("Withdrawn total overflow")?;
        Ok(())
    }

    /// Spend available funds on an investment or trade buy
    fn debit(&mut self, amount: Cents) -> Result<(), &'static str> {
        if self.available() < amount {
            return Err("Insufficient funds");
        }
        self.balance = self.balance.checked_sub(amount).ok_or("Debit underflow")?;
        self.total_invested = self
            .total_invested
            .checked_add(amount)
            .ok_or("Invested total overflow")?;
        Ok(())
    }

    /// Credit sale proceeds net of the platform fee.
    /// Gross arrives, the fee leaves; both legs are atomic here.
    fn credit_sale(&mut self, gross: Cents, fee: Cents) -> Result<(), &'static str> {
        let net = gross.checked_sub(fee).ok_or("Fee exceeds gross")?;
        self.balance = self.balance.checked_add(net).ok_or("Credit overflow")?;
        self.total_earnings = self
            .total_earnings
            .checked_add(net)
            .ok_or("Earnings total overflow")?;
        Ok(())
    }

    /// Credit a revenue payout
    fn credit_earning(&mut self, amount: Cents) -> Result<(), &'static str> {
        self.balance = self.balance.checked_add(amount).ok_or("Credit overflow")?;
        self.total_earnings = self
            .total_earnings
            .checked_add(amount)
            .ok_or("Earnings total overflow")?;
        Ok(())
    }

    #[inline]
    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }
}

// ============================================================
// WALLET SERVICE
// ============================================================

/// Owns Wallet and ledger mutation exclusively. Other components move
/// money only through these operations, keeping the invariants in one
/// place.
pub struct WalletService {
    wallets: FxHashMap<UserId, Wallet>,
    ledger: LedgerStore,
    transactions: Vec<Transaction>,
    tx_index: FxHashMap<TxId, usize>,
    /// Duplicate-delivery guard for payment-processor callbacks
    seen_payments: FxHashMap<Uuid, TxId>,
    next_tx_id: TxId,
}

impl Default for WalletService {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletService {
    pub fn new() -> Self {
        Self {
            wallets: FxHashMap::default(),
            ledger: LedgerStore::new(),
            transactions: Vec::new(),
            tx_index: FxHashMap::default(),
            seen_payments: FxHashMap::default(),
            next_tx_id: 1,
        }
    }

    // ============================================================
    // QUERY OPERATIONS (Read-Only)
    // ============================================================

    pub fn wallet(&self, user_id: UserId) -> Option<&Wallet> {
        self.wallets.get(&user_id)
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn transaction(&self, tx_id: TxId) -> Option<&Transaction> {
        self.tx_index.get(&tx_id).map(|&i| &self.transactions[i])
    }

    /// A user's transactions, newest first
    pub fn transaction_history(
        &self,
        user_id: UserId,
        offset: usize,
        limit: usize,
    ) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .skip(offset)
            .take(limit)
            .collect()
    }

    /// Replay the user's ledger and compare against the live balance
    pub fn reconcile(&self, user_id: UserId) -> bool {
        let live = self.wallets.get(&user_id).map(|w| w.balance()).unwrap_or(0);
        self.ledger.reconcile(user_id, live)
    }

    // ============================================================
    // WALLET LIFECYCLE
    // ============================================================

    /// Returns the existing wallet or creates a zeroed one. Idempotent,
    /// no error conditions.
    pub fn get_or_create_wallet(&mut self, user_id: UserId, now: DateTime<Utc>) -> &Wallet {
        self.wallets.entry(user_id).or_insert_with(|| {
            tracing::debug!(user_id, "wallet created");
            Wallet::new(now)
        })
    }

    fn wallet_mut(&mut self, user_id: UserId) -> MarketResult<&mut Wallet> {
        self.wallets.get_mut(&user_id).ok_or(MarketError::NotFound {
            entity: "wallet",
            id: user_id,
        })
    }

    // ============================================================
    // TRANSACTIONS
    // ============================================================

    /// Create a PENDING transaction record
    #[allow(clippy::too_many_arguments)]
    pub fn create_transaction(
        &mut self,
        user_id: UserId,
        tx_type: TxType,
        amount: Cents,
        fee: Cents,
        external_payment_id: Option<Uuid>,
        reference: Option<LedgerRef>,
        now: DateTime<Utc>,
    ) -> TxId {
        let tx_id = self.next_tx_id;
        self.next_tx_id += 1;
        let tx = Transaction {
            tx_id,
            user_id,
            tx_type,
            amount,
            fee,
            net_amount: amount.saturating_sub(fee),
            status: TxStatus::Pending,
            external_payment_id,
            reference,
            created_at: now,
            updated_at: now,
        };
        self.tx_index.insert(tx_id, self.transactions.len());
        self.transactions.push(tx);
        tx_id
    }

    /// Transition a PENDING transaction to its terminal state exactly
    /// once. A second transition fails `AlreadyProcessed`.
    pub fn settle_transaction(
        &mut self,
        tx_id: TxId,
        status: TxStatus,
        reference: Option<LedgerRef>,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let idx = *self.tx_index.get(&tx_id).ok_or(MarketError::NotFound {
            entity: "transaction",
            id: tx_id,
        })?;
        let tx = &mut self.transactions[idx];
        if tx.status != TxStatus::Pending {
            return Err(MarketError::AlreadyProcessed);
        }
        tx.status = status;
        if reference.is_some() {
            tx.reference = reference;
        }
        tx.updated_at = now;
        Ok(())
    }

    // ============================================================
    // DEPOSITS
    // ============================================================

    /// Record an initiated deposit as a PENDING transaction. Duplicate
    /// payment-processor ids are rejected so a double-delivered event
    /// can never create two transactions.
    pub fn initiate_deposit(
        &mut self,
        user_id: UserId,
        amount: Cents,
        external_payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> MarketResult<TxId> {
        if amount == 0 {
            return Err(MarketError::InvalidQuantity {
                reason: "deposit amount must be positive",
            });
        }
        if self.seen_payments.contains_key(&external_payment_id) {
            return Err(MarketError::AlreadyProcessed);
        }
        let tx_id = self.create_transaction(
            user_id,
            TxType::Deposit,
            amount,
            0,
            Some(external_payment_id),
            None,
            now,
        );
        self.seen_payments.insert(external_payment_id, tx_id);
        Ok(tx_id)
    }

    /// Confirm a deposit after the payment processor reports success.
    ///
    /// Idempotent against duplicate callbacks: the transaction must be
    /// PENDING, so a second confirmation fails `AlreadyProcessed` and
    /// the balance increments exactly once.
    pub fn confirm_deposit(
        &mut self,
        user_id: UserId,
        amount: Cents,
        tx_id: TxId,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let tx = self.transaction(tx_id).ok_or(MarketError::NotFound {
            entity: "transaction",
            id: tx_id,
        })?;
        if tx.status != TxStatus::Pending {
            return Err(MarketError::AlreadyProcessed);
        }
        if tx.user_id != user_id {
            return Err(MarketError::Forbidden);
        }
        if tx.amount != amount {
            return Err(MarketError::InvalidQuantity {
                reason: "confirmed amount differs from initiated amount",
            });
        }

        // Wallet is created lazily on first deposit
        self.get_or_create_wallet(user_id, now);
        let wallet = self.wallet_mut(user_id)?;
        wallet.deposit(amount).map_err(MarketError::Internal)?;
        wallet.touch(now);
        let balance_after = wallet.balance();

        self.ledger.append(
            user_id,
            Some(tx_id),
            EntryType::Deposit,
            0,
            amount,
            balance_after,
            None,
            None,
            now,
        );
        self.settle_transaction(tx_id, TxStatus::Completed, None, now)?;
        tracing::info!(user_id, amount, tx_id, "deposit confirmed");
        Ok(())
    }

    // ============================================================
    // WITHDRAWAL FUND MOVEMENT
    // ============================================================

    /// Reserve available funds for a withdrawal. Balance is unchanged;
    /// the amount stays in the wallet but becomes unavailable.
    pub fn lock_for_withdrawal(&mut self, user_id: UserId, amount: Cents) -> MarketResult<()> {
        let wallet = self.wallet_mut(user_id)?;
        if wallet.available() < amount {
            return Err(MarketError::InsufficientFunds {
                required: amount,
                available: wallet.available(),
            });
        }
        wallet.lock(amount).map_err(MarketError::Internal)?;
        Ok(())
    }

    /// Finalize a completed withdrawal: balance and locked both drop by
    /// the gross amount. Appends WITHDRAWAL (net) and, if a fee was
    /// charged, FEE_CHARGED entries.
    #[allow(clippy::too_many_arguments)]
    pub fn complete_withdrawal(
        &mut self,
        user_id: UserId,
        gross: Cents,
        fee: Cents,
        tx_id: TxId,
        reference: LedgerRef,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let net = gross.checked_sub(fee).ok_or(MarketError::Internal("fee exceeds gross"))?;
        let wallet = self.wallet_mut(user_id)?;
        if wallet.locked() < gross {
            return Err(MarketError::InsufficientFunds {
                required: gross,
                available: wallet.locked(),
            });
        }
        let balance_before = wallet.balance();
        wallet.withdraw_locked(gross, net).map_err(MarketError::Internal)?;
        wallet.touch(now);

        self.ledger.append(
            user_id,
            Some(tx_id),
            EntryType::Withdrawal,
            net,
            0,
            balance_before - net,
            Some(reference),
            None,
            now,
        );
        if fee > 0 {
            self.ledger.append(
                user_id,
                Some(tx_id),
                EntryType::FeeCharged,
                fee,
                0,
                balance_before - gross,
                Some(reference),
                None,
                now,
            );
        }
        tracing::info!(user_id, gross, fee, "withdrawal completed");
        Ok(())
    }

    /// Return the full locked amount to available after a failed or
    /// cancelled withdrawal. Balance never moved, so the UNLOCK entry
    /// carries zero debit/credit and records the amount as metadata.
    pub fn unlock_failed_withdrawal(
        &mut self,
        user_id: UserId,
        amount: Cents,
        reference: LedgerRef,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let wallet = self.wallet_mut(user_id)?;
        if wallet.locked() < amount {
            return Err(MarketError::InsufficientFunds {
                required: amount,
                available: wallet.locked(),
            });
        }
        wallet.unlock(amount).map_err(MarketError::Internal)?;
        wallet.touch(now);
        let balance_after = wallet.balance();

        self.ledger.append(
            user_id,
            None,
            EntryType::Unlock,
            0,
            0,
            balance_after,
            Some(reference),
            Some(serde_json::json!({ "unlocked_amount": amount })),
            now,
        );
        Ok(())
    }

    // ============================================================
    // TRADING FUND MOVEMENT
    // ============================================================

    /// Debit available funds for a primary-market investment or a
    /// secondary-market buy. `entry_type` distinguishes the two in the
    /// ledger.
    #[allow(clippy::too_many_arguments)]
    pub fn debit_for_investment(
        &mut self,
        user_id: UserId,
        amount: Cents,
        entry_type: EntryType,
        tx_id: TxId,
        reference: LedgerRef,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let wallet = self.wallet_mut(user_id)?;
        if wallet.available() < amount {
            return Err(MarketError::InsufficientFunds {
                required: amount,
                available: wallet.available(),
            });
        }
        wallet.debit(amount).map_err(MarketError::Internal)?;
        wallet.touch(now);
        let balance_after = wallet.balance();

        self.ledger.append(
            user_id,
            Some(tx_id),
            entry_type,
            amount,
            0,
            balance_after,
            Some(reference),
            None,
            now,
        );
        Ok(())
    }

    /// Credit sale proceeds: gross arrives as TRADE_SELL, the platform
    /// fee leaves as FEE_CHARGED. The seller nets `gross - fee`.
    #[allow(clippy::too_many_arguments)]
    pub fn credit_from_sale(
        &mut self,
        user_id: UserId,
        gross: Cents,
        fee: Cents,
        tx_id: TxId,
        reference: LedgerRef,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let wallet = self.wallet_mut(user_id)?;
        let balance_before = wallet.balance();
        wallet.credit_sale(gross, fee).map_err(MarketError::Internal)?;
        wallet.touch(now);

        self.ledger.append(
            user_id,
            Some(tx_id),
            EntryType::TradeSell,
            0,
            gross,
            balance_before + gross,
            Some(reference),
            None,
            now,
        );
        if fee > 0 {
            self.ledger.append(
                user_id,
                Some(tx_id),
                EntryType::FeeCharged,
                fee,
                0,
                balance_before + gross - fee,
                Some(reference),
                None,
                now,
            );
        }
        Ok(())
    }

    /// Credit collected platform fees to the platform revenue wallet
    pub fn credit_platform_fee(
        &mut self,
        platform_id: UserId,
        fee: Cents,
        reference: LedgerRef,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        self.get_or_create_wallet(platform_id, now);
        let wallet = self.wallet_mut(platform_id)?;
        wallet.credit_earning(fee).map_err(MarketError::Internal)?;
        wallet.touch(now);
        let balance_after = wallet.balance();

        self.ledger.append(
            platform_id,
            None,
            EntryType::TradeSell,
            0,
            fee,
            balance_after,
            Some(reference),
            Some(serde_json::json!({ "platform_fee": true })),
            now,
        );
        Ok(())
    }

    /// Credit a revenue-share payout to an investor's wallet
    pub fn credit_payout(
        &mut self,
        user_id: UserId,
        amount: Cents,
        tx_id: TxId,
        reference: LedgerRef,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        self.get_or_create_wallet(user_id, now);
        let wallet = self.wallet_mut(user_id)?;
        wallet.credit_earning(amount).map_err(MarketError::Internal)?;
        wallet.touch(now);
        let balance_after = wallet.balance();

        self.ledger.append(
            user_id,
            Some(tx_id),
            EntryType::PayoutReceived,
            0,
            amount,
            balance_after,
            Some(reference),
            None,
            now,
        );
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================
