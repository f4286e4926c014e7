//! Revenue payout distribution
//!
//! Credits monthly channel revenue to shareholders. Each payout names
//! the holding it pays and the revenue month it covers; the pair is the
//! idempotency key, so a retried distribution run never double-pays.

use crate::core_types::{Cents, InvestmentId, PayoutId, UserId};
use crate::error::{MarketError, MarketResult};
use crate::models::{InvestmentStatus, LedgerRef, Payout, PayoutStatus, TxStatus, TxType};
use crate::registry::ShareRegistry;
use crate::wallet::WalletService;
use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};

pub struct PayoutDistributor {
    payouts: FxHashMap<PayoutId, Payout>,
    /// (holding, revenue month) pairs already paid
    paid: FxHashSet<(InvestmentId, String)>,
    next_payout_id: PayoutId,
}

impl Default for PayoutDistributor {
    fn default() -> Self {
        Self::new()
    }
}

impl PayoutDistributor {
    pub fn new() -> Self {
        Self {
            payouts: FxHashMap::default(),
            paid: FxHashSet::default(),
            next_payout_id: 1,
        }
    }

    /// Pay one holding its share of a month's revenue.
    ///
    /// The amount is computed upstream (revenue times the holding's
    /// share percentage); the distributor enforces idempotency, records
    /// the payout and credits the wallet in one step.
    pub fn distribute(
        &mut self,
        wallets: &mut WalletService,
        registry: &ShareRegistry,
        investment_id: InvestmentId,
        amount: Cents,
        revenue_month: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<PayoutId> {
        let investment = registry.investment(investment_id)?;
        if investment.status != InvestmentStatus::Confirmed {
            return Err(MarketError::InvalidState {
                entity: "investment",
                state: "CANCELLED",
            });
        }
        if amount == 0 {
            return Err(MarketError::InvalidQuantity {
                reason: "payout amount must be positive",
            });
        }
        let key = (investment_id, revenue_month.to_string());
        if self.paid.contains(&key) {
            return Err(MarketError::AlreadyProcessed);
        }
        let investor_id = investment.investor_id;

        let payout_id = self.next_payout_id;
        self.next_payout_id += 1;

        let tx_id = wallets.create_transaction(
            investor_id,
            TxType::Earning,
            amount,
            0,
            None,
            Some(LedgerRef::Payout(payout_id)),
            now,
        );
        wallets.credit_payout(investor_id, amount, tx_id, LedgerRef::Payout(payout_id), now)?;
        wallets.settle_transaction(tx_id, TxStatus::Completed, None, now)?;

        self.paid.insert(key);
        self.payouts.insert(
            payout_id,
            Payout {
                payout_id,
                investment_id,
                amount,
                revenue_month: revenue_month.to_string(),
                status: PayoutStatus::Completed,
                paid_at: now,
            },
        );
        tracing::info!(payout_id, investment_id, investor_id, amount, revenue_month, "payout distributed");
        Ok(payout_id)
    }

    pub fn payout(&self, payout_id: PayoutId) -> MarketResult<&Payout> {
        self.payouts.get(&payout_id).ok_or(MarketError::NotFound {
            entity: "payout",
            id: payout_id,
        })
    }

    /// Lifetime earnings credited to one holding. Feeds ROI reporting.
    pub fn total_for_investment(&self, investment_id: InvestmentId) -> Cents {
        self.payouts
            .values()
            .filter(|p| p.investment_id == investment_id)
            .map(|p| p.amount)
            .sum()
    }

    /// Payout history for a user across all holdings, newest first
    pub fn payouts_of(&self, registry: &ShareRegistry, user_id: UserId) -> Vec<&Payout> {
        let mut out: Vec<&Payout> = self
            .payouts
            .values()
            .filter(|p| {
                registry
                    .investment(p.investment_id)
                    .map(|i| i.investor_id == user_id)
                    .unwrap_or(false)
            })
            .collect();
        out.sort_by(|a, b| b.payout_id.cmp(&a.payout_id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (WalletService, ShareRegistry, PayoutDistributor, InvestmentId) {
        let now = Utc::now();
        let mut wallets = WalletService::new();
        wallets.get_or_create_wallet(1, now);
        let mut registry = ShareRegistry::new();
        registry
            .create_offering("techreview", 1000, 10_00, 10_00, 5000_00, 2000, now)
            .unwrap();
        let investment_id = registry.upsert_holding(1, 1, 100, 1000_00, now).unwrap();
        (wallets, registry, PayoutDistributor::new(), investment_id)
    }

    #[test]
    fn test_distribute_credits_earnings() {
        let (mut wallets, registry, mut payouts, inv) = setup();
        let now = Utc::now();

        let id = payouts
            .distribute(&mut wallets, &registry, inv, 42_00, "2025-06", now)
            .unwrap();

        let w = wallets.wallet(1).unwrap();
        assert_eq!(w.balance(), 42_00);
        assert_eq!(w.total_earnings(), 42_00);
        assert!(wallets.reconcile(1));

        let p = payouts.payout(id).unwrap();
        assert_eq!(p.revenue_month, "2025-06");
        assert_eq!(p.status, PayoutStatus::Completed);
    }

    #[test]
    fn test_same_month_pays_once() {
        let (mut wallets, registry, mut payouts, inv) = setup();
        let now = Utc::now();

        payouts
            .distribute(&mut wallets, &registry, inv, 42_00, "2025-06", now)
            .unwrap();
        assert_eq!(
            payouts
                .distribute(&mut wallets, &registry, inv, 42_00, "2025-06", now)
                .unwrap_err(),
            MarketError::AlreadyProcessed
        );
        // Wallet untouched by the retry
        assert_eq!(wallets.wallet(1).unwrap().balance(), 42_00);

        // A different month is a new payout
        payouts
            .distribute(&mut wallets, &registry, inv, 45_00, "2025-07", now)
            .unwrap();
        assert_eq!(payouts.total_for_investment(inv), 87_00);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let (mut wallets, registry, mut payouts, inv) = setup();
        assert!(matches!(
            payouts
                .distribute(&mut wallets, &registry, inv, 0, "2025-06", Utc::now())
                .unwrap_err(),
            MarketError::InvalidQuantity { .. }
        ));
    }

    #[test]
    fn test_unknown_investment_rejected() {
        let (mut wallets, registry, mut payouts, _) = setup();
        assert!(matches!(
            payouts
                .distribute(&mut wallets, &registry, 999, 10_00, "2025-06", Utc::now())
                .unwrap_err(),
            MarketError::NotFound { .. }
        ));
    }
}
