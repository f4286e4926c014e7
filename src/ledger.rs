//! Ledger - immutable wallet audit trail
//!
//! Every balance change is recorded as one append-only entry carrying
//! the running balance after the change. Replaying a wallet's entries
//! in creation order must reproduce its current balance exactly.

use crate::core_types::{Cents, LedgerSeq, TxId, UserId};
use crate::models::{EntryType, LedgerRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable ledger row.
///
/// `balance_after` is the wallet balance immediately after this entry
/// was applied - the reconciliation anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: LedgerSeq,
    pub user_id: UserId,
    pub tx_id: Option<TxId>,
    pub entry_type: EntryType,
    pub debit: Cents,
    pub credit: Cents,
    pub balance_after: Cents,
    pub reference: Option<LedgerRef>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Append-only ledger store. No entry is ever updated or deleted.
#[derive(Debug, Default)]
pub struct LedgerStore {
    entries: Vec<LedgerEntry>,
    next_seq: LedgerSeq,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 1,
        }
    }

    /// Append one entry. Must be called inside the same atomic unit as
    /// the wallet mutation it records, or reconciliation breaks.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &mut self,
        user_id: UserId,
        tx_id: Option<TxId>,
        entry_type: EntryType,
        debit: Cents,
        credit: Cents,
        balance_after: Cents,
        reference: Option<LedgerRef>,
        metadata: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> LedgerSeq {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(LedgerEntry {
            seq,
            user_id,
            tx_id,
            entry_type,
            debit,
            credit,
            balance_after,
            reference,
            metadata,
            created_at: now,
        });
        seq
    }

    /// Lazy, restartable sequence of a wallet's entries ordered by
    /// creation, oldest first. `since` resumes after a known seq.
    pub fn entries_for(
        &self,
        user_id: UserId,
        since: Option<LedgerSeq>,
    ) -> impl Iterator<Item = &LedgerEntry> {
        let after = since.unwrap_or(0);
        self.entries
            .iter()
            .filter(move |e| e.user_id == user_id && e.seq > after)
    }

    /// All entries, oldest first
    pub fn all(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Replay a wallet's entries summing `credit - debit`.
    ///
    /// Returns the reconstructed balance. The caller compares it to the
    /// wallet's live balance; a mismatch means an entry was written
    /// outside the mutation it records.
    pub fn replay_balance(&self, user_id: UserId) -> Cents {
        let mut balance: i128 = 0;
        for e in self.entries_for(user_id, None) {
            balance += e.credit as i128;
            balance -= e.debit as i128;
        }
        debug_assert!(balance >= 0, "ledger replay went negative");
        balance.max(0) as Cents
    }

    /// Check the running-balance column: every entry's `balance_after`
    /// must equal the sum of `credit - debit` up to and including it.
    pub fn reconcile(&self, user_id: UserId, live_balance: Cents) -> bool {
        let mut running: i128 = 0;
        for e in self.entries_for(user_id, None) {
            running += e.credit as i128;
            running -= e.debit as i128;
            if running < 0 || running as u128 != e.balance_after as u128 {
                return false;
            }
        }
        running as u128 == live_balance as u128
    }
}
