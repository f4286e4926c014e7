//! Withdrawal workflow
//!
//! A strict state machine turning a withdrawal request into a
//! completed bank transfer, or a failed/cancelled request with fund
//! unlock. The actual bank transfer is an external collaborator; the
//! core exposes the PROCESSING -> COMPLETED/FAILED transitions as its
//! only mutation points.
//!
//! Fee rule: the fee is realized only on COMPLETED. A failed or
//! cancelled withdrawal returns the FULL locked amount.

use crate::core_types::{BankAccountId, Cents, UserId, WithdrawalId};
use crate::error::{MarketError, MarketResult};
use crate::fee::FeeSchedule;
use crate::models::{BankAccount, LedgerRef, TxStatus, TxType, Withdrawal, WithdrawalStatus};
use crate::wallet::WalletService;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

pub struct WithdrawalDesk {
    fees: FeeSchedule,
    withdrawals: FxHashMap<WithdrawalId, Withdrawal>,
    bank_accounts: FxHashMap<BankAccountId, BankAccount>,
    next_withdrawal_id: WithdrawalId,
    next_bank_account_id: BankAccountId,
}

impl WithdrawalDesk {
    pub fn new(fees: FeeSchedule) -> Self {
        Self {
            fees,
            withdrawals: FxHashMap::default(),
            bank_accounts: FxHashMap::default(),
            next_withdrawal_id: 1,
            next_bank_account_id: 1,
        }
    }

    // ============================================================
    // BANK ACCOUNTS (verification computed externally by KYC)
    // ============================================================

    pub fn register_bank_account(&mut self, user_id: UserId, verified: bool) -> BankAccountId {
        let bank_account_id = self.next_bank_account_id;
        self.next_bank_account_id += 1;
        self.bank_accounts.insert(
            bank_account_id,
            BankAccount {
                bank_account_id,
                user_id,
                verified,
            },
        );
        bank_account_id
    }

    pub fn set_bank_account_verified(
        &mut self,
        bank_account_id: BankAccountId,
        verified: bool,
    ) -> MarketResult<()> {
        let account = self
            .bank_accounts
            .get_mut(&bank_account_id)
            .ok_or(MarketError::NotFound {
                entity: "bank account",
                id: bank_account_id,
            })?;
        account.verified = verified;
        Ok(())
    }

    // ============================================================
    // QUERY
    // ============================================================

    pub fn withdrawal(&self, withdrawal_id: WithdrawalId) -> MarketResult<&Withdrawal> {
        self.withdrawals
            .get(&withdrawal_id)
            .ok_or(MarketError::NotFound {
                entity: "withdrawal",
                id: withdrawal_id,
            })
    }

    /// A user's withdrawal requests, newest first
    pub fn withdrawals_of(&self, user_id: UserId) -> Vec<&Withdrawal> {
        let mut out: Vec<&Withdrawal> = self
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .collect();
        out.sort_by(|a, b| b.withdrawal_id.cmp(&a.withdrawal_id));
        out
    }

    // ============================================================
    // STATE MACHINE
    // ============================================================

    /// Create a PENDING withdrawal, locking the gross amount.
    ///
    /// Preconditions: amount meets the platform minimum, the bank
    /// account exists, belongs to the requester and is verified, and
    /// the user's available balance covers the amount.
    pub fn request(
        &mut self,
        wallets: &mut WalletService,
        user_id: UserId,
        amount: Cents,
        bank_account_id: BankAccountId,
        now: DateTime<Utc>,
    ) -> MarketResult<WithdrawalId> {
        if amount < self.fees.min_withdrawal {
            return Err(MarketError::InvalidQuantity {
                reason: "below minimum withdrawal amount",
            });
        }
        let account = self
            .bank_accounts
            .get(&bank_account_id)
            .ok_or(MarketError::NotFound {
                entity: "bank account",
                id: bank_account_id,
            })?;
        if account.user_id != user_id {
            return Err(MarketError::Forbidden);
        }
        if !account.verified {
            return Err(MarketError::InvalidState {
                entity: "bank account",
                state: "UNVERIFIED",
            });
        }

        // Lock performs the available-balance check
        wallets.lock_for_withdrawal(user_id, amount)?;

        let fee = self.fees.withdrawal_fee(amount);
        let net_amount = amount - fee;
        let withdrawal_id = self.next_withdrawal_id;
        self.next_withdrawal_id += 1;

        let tx_id = wallets.create_transaction(
            user_id,
            TxType::Withdrawal,
            amount,
            fee,
            None,
            Some(LedgerRef::Withdrawal(withdrawal_id)),
            now,
        );
        self.withdrawals.insert(
            withdrawal_id,
            Withdrawal {
                withdrawal_id,
                user_id,
                bank_account_id,
                amount,
                fee,
                net_amount,
                status: WithdrawalStatus::Pending,
                failure_reason: None,
                tx_id,
                created_at: now,
                updated_at: now,
            },
        );
        tracing::info!(withdrawal_id, user_id, amount, fee, "withdrawal requested");
        Ok(withdrawal_id)
    }

    /// Operator approval: PENDING -> PROCESSING. No fund movement; the
    /// amount is already locked.
    pub fn approve_and_process(
        &mut self,
        withdrawal_id: WithdrawalId,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let w = self.withdrawal_mut(withdrawal_id)?;
        if w.status != WithdrawalStatus::Pending {
            return Err(MarketError::InvalidState {
                entity: "withdrawal",
                state: w.status.as_str(),
            });
        }
        w.status = WithdrawalStatus::Processing;
        w.updated_at = now;
        tracing::info!(withdrawal_id, "withdrawal processing");
        Ok(())
    }

    /// Bank transfer succeeded: PROCESSING -> COMPLETED. Moves the
    /// gross amount out of the wallet and realizes the fee.
    pub fn complete(
        &mut self,
        wallets: &mut WalletService,
        withdrawal_id: WithdrawalId,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let w = self.withdrawal_mut(withdrawal_id)?;
        if w.status != WithdrawalStatus::Processing {
            return Err(MarketError::InvalidState {
                entity: "withdrawal",
                state: w.status.as_str(),
            });
        }
        let (user_id, amount, fee, tx_id) = (w.user_id, w.amount, w.fee, w.tx_id);

        wallets.complete_withdrawal(
            user_id,
            amount,
            fee,
            tx_id,
            LedgerRef::Withdrawal(withdrawal_id),
            now,
        )?;
        wallets.settle_transaction(tx_id, TxStatus::Completed, None, now)?;

        let w = self.withdrawal_mut(withdrawal_id)?;
        w.status = WithdrawalStatus::Completed;
        w.updated_at = now;
        Ok(())
    }

    /// Bank rejected or operator failed the request: any non-terminal
    /// state -> FAILED. The full locked amount returns to available;
    /// the fee was computed but never realized.
    pub fn fail(
        &mut self,
        wallets: &mut WalletService,
        withdrawal_id: WithdrawalId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let w = self.withdrawal_mut(withdrawal_id)?;
        if w.status.is_terminal() {
            return Err(MarketError::InvalidState {
                entity: "withdrawal",
                state: w.status.as_str(),
            });
        }
        let (user_id, amount, tx_id) = (w.user_id, w.amount, w.tx_id);

        wallets.unlock_failed_withdrawal(
            user_id,
            amount,
            LedgerRef::Withdrawal(withdrawal_id),
            now,
        )?;
        wallets.settle_transaction(tx_id, TxStatus::Failed, None, now)?;

        let w = self.withdrawal_mut(withdrawal_id)?;
        w.status = WithdrawalStatus::Failed;
        w.failure_reason = Some(reason.to_string());
        w.updated_at = now;
        tracing::warn!(withdrawal_id, reason, "withdrawal failed");
        Ok(())
    }

    /// User cancellation: PENDING only, requester must be the owner.
    /// Unlocks funds identically to failure.
    pub fn cancel(
        &mut self,
        wallets: &mut WalletService,
        withdrawal_id: WithdrawalId,
        requester_id: UserId,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let w = self.withdrawal_mut(withdrawal_id)?;
        if w.user_id != requester_id {
            return Err(MarketError::Forbidden);
        }
        if w.status != WithdrawalStatus::Pending {
            return Err(MarketError::InvalidState {
                entity: "withdrawal",
                state: w.status.as_str(),
            });
        }
        let (user_id, amount, tx_id) = (w.user_id, w.amount, w.tx_id);

        wallets.unlock_failed_withdrawal(
            user_id,
            amount,
            LedgerRef::Withdrawal(withdrawal_id),
            now,
        )?;
        wallets.settle_transaction(tx_id, TxStatus::Failed, None, now)?;

        let w = self.withdrawal_mut(withdrawal_id)?;
        w.status = WithdrawalStatus::Cancelled;
        w.updated_at = now;
        tracing::info!(withdrawal_id, "withdrawal cancelled");
        Ok(())
    }

    fn withdrawal_mut(&mut self, withdrawal_id: WithdrawalId) -> MarketResult<&mut Withdrawal> {
        self.withdrawals
            .get_mut(&withdrawal_id)
            .ok_or(MarketError::NotFound {
                entity: "withdrawal",
                id: withdrawal_id,
            })
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn setup(balance: Cents) -> (WalletService, WithdrawalDesk, BankAccountId) {
        let now = Utc::now();
        let mut wallets = WalletService::new();
        let tx = wallets
            .initiate_deposit(1, balance, Uuid::new_v4(), now)
            .unwrap();
        wallets.confirm_deposit(1, balance, tx, now).unwrap();

        let mut desk = WithdrawalDesk::new(FeeSchedule::default());
        let account = desk.register_bank_account(1, true);
        (wallets, desk, account)
    }

    #[test]
    fn test_request_locks_without_touching_balance() {
        let (mut wallets, mut desk, account) = setup(760_00);
        let now = Utc::now();

        desk.request(&mut wallets, 1, 500_00, account, now).unwrap();
        let w = wallets.wallet(1).unwrap();
        assert_eq!(w.balance(), 760_00);
        assert_eq!(w.locked(), 500_00);
        assert_eq!(w.available(), 260_00);
    }

    #[test]
    fn test_happy_path_completes_once() {
        let (mut wallets, mut desk, account) = setup(1000_00);
        let now = Utc::now();

        let id = desk.request(&mut wallets, 1, 500_00, account, now).unwrap();
        desk.approve_and_process(id, now).unwrap();
        desk.complete(&mut wallets, id, now).unwrap();

        let w = wallets.wallet(1).unwrap();
        assert_eq!(w.balance(), 500_00);
        assert_eq!(w.locked(), 0);
        assert_eq!(w.total_withdrawn(), 492_50); // net of 1.5% fee
        assert!(wallets.reconcile(1));

        // Terminal: cannot complete or fail again
        assert!(matches!(
            desk.complete(&mut wallets, id, now).unwrap_err(),
            MarketError::InvalidState { .. }
        ));
        assert!(matches!(
            desk.fail(&mut wallets, id, "late reject", now).unwrap_err(),
            MarketError::InvalidState { .. }
        ));
    }

    #[test]
    fn test_failed_withdrawal_returns_full_amount() {
        let (mut wallets, mut desk, account) = setup(760_00);
        let now = Utc::now();

        let id = desk.request(&mut wallets, 1, 500_00, account, now).unwrap();
        desk.approve_and_process(id, now).unwrap();
        desk.fail(&mut wallets, id, "bank rejected", now).unwrap();

        // Full amount back, fee never taken
        let w = wallets.wallet(1).unwrap();
        assert_eq!(w.balance(), 760_00);
        assert_eq!(w.locked(), 0);
        assert_eq!(w.available(), 760_00);
        assert_eq!(w.total_withdrawn(), 0);
        assert!(wallets.reconcile(1));

        let record = desk.withdrawal(id).unwrap();
        assert_eq!(record.status, WithdrawalStatus::Failed);
        assert_eq!(record.failure_reason.as_deref(), Some("bank rejected"));
    }

    #[test]
    fn test_cancel_pending_only_and_owner_only() {
        let (mut wallets, mut desk, account) = setup(1000_00);
        let now = Utc::now();

        let id = desk.request(&mut wallets, 1, 200_00, account, now).unwrap();
        assert_eq!(
            desk.cancel(&mut wallets, id, 2, now).unwrap_err(),
            MarketError::Forbidden
        );

        desk.cancel(&mut wallets, id, 1, now).unwrap();
        assert_eq!(wallets.wallet(1).unwrap().locked(), 0);

        // Once PROCESSING, user cancellation is no longer possible
        let id2 = desk.request(&mut wallets, 1, 200_00, account, now).unwrap();
        desk.approve_and_process(id2, now).unwrap();
        assert!(matches!(
            desk.cancel(&mut wallets, id2, 1, now).unwrap_err(),
            MarketError::InvalidState { .. }
        ));
    }

    #[test]
    fn test_request_validations() {
        let (mut wallets, mut desk, account) = setup(1000_00);
        let now = Utc::now();

        // Below minimum
        assert!(matches!(
            desk.request(&mut wallets, 1, 5_00, account, now).unwrap_err(),
            MarketError::InvalidQuantity { .. }
        ));

        // Unverified account
        let unverified = desk.register_bank_account(1, false);
        assert!(matches!(
            desk.request(&mut wallets, 1, 100_00, unverified, now).unwrap_err(),
            MarketError::InvalidState { entity: "bank account", .. }
        ));

        // Someone else's account
        let other = desk.register_bank_account(2, true);
        assert_eq!(
            desk.request(&mut wallets, 1, 100_00, other, now).unwrap_err(),
            MarketError::Forbidden
        );

        // Over available balance
        assert!(matches!(
            desk.request(&mut wallets, 1, 2000_00, account, now).unwrap_err(),
            MarketError::InsufficientFunds { .. }
        ));
    }
}
