//! Marketplace facade
//!
//! Owns every service and exposes the public operation surface. All
//! mutations funnel through `&mut self`, which serializes them; each
//! operation validates fully before mutating, so a failed call leaves
//! no partial state behind.
//!
//! Every operation has a `*_at` variant taking an explicit clock value.
//! The plain form stamps `Utc::now()`.

use crate::core_types::{
    BankAccountId, Cents, InvestmentId, OfferingId, OrderId, PayoutId, ShareCount, TradeId, TxId,
    UserId, WithdrawalId,
};
use crate::engine::TradeEngine;
use crate::error::MarketResult;
use crate::fee::FeeSchedule;
use crate::market::{MarketTrade, TradeBucket, TradeLog};
use crate::models::{Investment, Offering, SellOrder, Transaction, Withdrawal};
use crate::orderbook::{DepthLevel, SellOrderBook};
use crate::payout::PayoutDistributor;
use crate::registry::ShareRegistry;
use crate::wallet::WalletService;
use crate::withdrawal::WithdrawalDesk;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Wallet state plus lifetime counters, for account pages
#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub user_id: UserId,
    pub balance: Cents,
    pub locked: Cents,
    pub available: Cents,
    pub total_deposited: Cents,
    pub total_invested: Cents,
    pub total_withdrawn: Cents,
    pub total_earnings: Cents,
}

/// One holding with its earnings to date
#[derive(Debug, Clone, Serialize)]
pub struct HoldingView {
    pub investment_id: InvestmentId,
    pub offering_id: OfferingId,
    pub channel_name: String,
    pub shares: ShareCount,
    pub total_amount: Cents,
    pub listed_shares: ShareCount,
    pub total_payouts: Cents,
    /// Payouts as a per-mille-of-cost ratio at 10^6 precision;
    /// None when the cost basis is zero
    pub roi_ppm: Option<u64>,
}

pub struct Marketplace {
    wallets: WalletService,
    registry: ShareRegistry,
    book: SellOrderBook,
    trades: TradeLog,
    engine: TradeEngine,
    withdrawals: WithdrawalDesk,
    payouts: PayoutDistributor,
}

impl Marketplace {
    pub fn new(fees: FeeSchedule) -> Self {
        Self {
            wallets: WalletService::new(),
            registry: ShareRegistry::new(),
            book: SellOrderBook::new(),
            trades: TradeLog::new(),
            engine: TradeEngine::new(fees),
            withdrawals: WithdrawalDesk::new(fees),
            payouts: PayoutDistributor::new(),
        }
    }

    pub fn fees(&self) -> &FeeSchedule {
        self.engine.fees()
    }

    // ============================================================
    // WALLET & DEPOSITS
    // ============================================================

    pub fn open_wallet(&mut self, user_id: UserId) -> WalletSummary {
        self.open_wallet_at(user_id, Utc::now())
    }

    pub fn open_wallet_at(&mut self, user_id: UserId, now: DateTime<Utc>) -> WalletSummary {
        self.wallets.get_or_create_wallet(user_id, now);
        self.wallet_summary(user_id).unwrap_or(WalletSummary {
            user_id,
            balance: 0,
            locked: 0,
            available: 0,
            total_deposited: 0,
            total_invested: 0,
            total_withdrawn: 0,
            total_earnings: 0,
        })
    }

    pub fn initiate_deposit(
        &mut self,
        user_id: UserId,
        amount: Cents,
        external_payment_id: Uuid,
    ) -> MarketResult<TxId> {
        self.initiate_deposit_at(user_id, amount, external_payment_id, Utc::now())
    }

    pub fn initiate_deposit_at(
        &mut self,
        user_id: UserId,
        amount: Cents,
        external_payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> MarketResult<TxId> {
        self.wallets.initiate_deposit(user_id, amount, external_payment_id, now)
    }

    /// Payment-processor success callback
    pub fn confirm_deposit(&mut self, user_id: UserId, amount: Cents, tx_id: TxId) -> MarketResult<()> {
        self.confirm_deposit_at(user_id, amount, tx_id, Utc::now())
    }

    pub fn confirm_deposit_at(
        &mut self,
        user_id: UserId,
        amount: Cents,
        tx_id: TxId,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        self.wallets.confirm_deposit(user_id, amount, tx_id, now)
    }

    // ============================================================
    // OFFERINGS & PRIMARY MARKET
    // ============================================================

    #[allow(clippy::too_many_arguments)]
    pub fn create_offering_at(
        &mut self,
        channel_name: &str,
        total_shares: ShareCount,
        price_per_share: Cents,
        min_investment: Cents,
        max_investment: Cents,
        share_percentage_bps: u32,
        now: DateTime<Utc>,
    ) -> MarketResult<OfferingId> {
        self.registry.create_offering(
            channel_name,
            total_shares,
            price_per_share,
            min_investment,
            max_investment,
            share_percentage_bps,
            now,
        )
    }

    /// Buy unsold shares from the offering itself, fee free
    pub fn invest(
        &mut self,
        buyer_id: UserId,
        offering_id: OfferingId,
        shares: ShareCount,
    ) -> MarketResult<InvestmentId> {
        self.invest_at(buyer_id, offering_id, shares, Utc::now())
    }

    pub fn invest_at(
        &mut self,
        buyer_id: UserId,
        offering_id: OfferingId,
        shares: ShareCount,
        now: DateTime<Utc>,
    ) -> MarketResult<InvestmentId> {
        self.engine.invest_directly(
            &mut self.wallets,
            &mut self.registry,
            buyer_id,
            offering_id,
            shares,
            now,
        )
    }

    // ============================================================
    // SECONDARY MARKET
    // ============================================================

    pub fn list_shares(
        &mut self,
        seller_id: UserId,
        offering_id: OfferingId,
        shares: ShareCount,
        price_per_share: Cents,
        min_shares: ShareCount,
        expires_at: Option<DateTime<Utc>>,
    ) -> MarketResult<OrderId> {
        self.list_shares_at(seller_id, offering_id, shares, price_per_share, min_shares, expires_at, Utc::now())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn list_shares_at(
        &mut self,
        seller_id: UserId,
        offering_id: OfferingId,
        shares: ShareCount,
        price_per_share: Cents,
        min_shares: ShareCount,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> MarketResult<OrderId> {
        let holding = self
            .registry
            .holding(seller_id, offering_id)
            .ok_or(crate::error::MarketError::InsufficientShares {
                requested: shares,
                held: 0,
            })?;
        self.book
            .create_order(seller_id, holding, shares, price_per_share, min_shares, expires_at, now)
    }

    pub fn cancel_listing(&mut self, order_id: OrderId, requester_id: UserId) -> MarketResult<()> {
        self.book.cancel_order(order_id, requester_id, Utc::now())
    }

    pub fn cancel_listing_at(
        &mut self,
        order_id: OrderId,
        requester_id: UserId,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        self.book.cancel_order(order_id, requester_id, now)
    }

    /// Buy from one specific sell order
    pub fn buy_shares(
        &mut self,
        buyer_id: UserId,
        sell_order_id: OrderId,
        shares: ShareCount,
    ) -> MarketResult<TradeId> {
        self.buy_shares_at(buyer_id, sell_order_id, shares, Utc::now())
    }

    pub fn buy_shares_at(
        &mut self,
        buyer_id: UserId,
        sell_order_id: OrderId,
        shares: ShareCount,
        now: DateTime<Utc>,
    ) -> MarketResult<TradeId> {
        self.engine.execute_trade(
            &mut self.wallets,
            &mut self.registry,
            &mut self.book,
            &mut self.trades,
            buyer_id,
            sell_order_id,
            shares,
            now,
        )
    }

    /// Sweep the book best-price-first until the demand is filled or
    /// supply runs out
    pub fn buy_at_market(
        &mut self,
        buyer_id: UserId,
        offering_id: OfferingId,
        shares: ShareCount,
    ) -> MarketResult<Vec<TradeId>> {
        self.buy_at_market_at(buyer_id, offering_id, shares, Utc::now())
    }

    pub fn buy_at_market_at(
        &mut self,
        buyer_id: UserId,
        offering_id: OfferingId,
        shares: ShareCount,
        now: DateTime<Utc>,
    ) -> MarketResult<Vec<TradeId>> {
        self.engine.buy_at_market(
            &mut self.wallets,
            &mut self.registry,
            &mut self.book,
            &mut self.trades,
            buyer_id,
            offering_id,
            shares,
            now,
        )
    }

    /// Expire all past-due sell orders. Run periodically.
    pub fn expire_due_orders_at(&mut self, now: DateTime<Utc>) -> Vec<OrderId> {
        self.book.expire_due(now)
    }

    // ============================================================
    // WITHDRAWALS
    // ============================================================

    pub fn register_bank_account(&mut self, user_id: UserId, verified: bool) -> BankAccountId {
        self.withdrawals.register_bank_account(user_id, verified)
    }

    pub fn request_withdrawal(
        &mut self,
        user_id: UserId,
        amount: Cents,
        bank_account_id: BankAccountId,
    ) -> MarketResult<WithdrawalId> {
        self.request_withdrawal_at(user_id, amount, bank_account_id, Utc::now())
    }

    pub fn request_withdrawal_at(
        &mut self,
        user_id: UserId,
        amount: Cents,
        bank_account_id: BankAccountId,
        now: DateTime<Utc>,
    ) -> MarketResult<WithdrawalId> {
        self.withdrawals
            .request(&mut self.wallets, user_id, amount, bank_account_id, now)
    }

    pub fn approve_withdrawal_at(
        &mut self,
        withdrawal_id: WithdrawalId,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        self.withdrawals.approve_and_process(withdrawal_id, now)
    }

    pub fn complete_withdrawal_at(
        &mut self,
        withdrawal_id: WithdrawalId,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        self.withdrawals.complete(&mut self.wallets, withdrawal_id, now)
    }

    pub fn fail_withdrawal_at(
        &mut self,
        withdrawal_id: WithdrawalId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        self.withdrawals.fail(&mut self.wallets, withdrawal_id, reason, now)
    }

    pub fn cancel_withdrawal_at(
        &mut self,
        withdrawal_id: WithdrawalId,
        requester_id: UserId,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        self.withdrawals
            .cancel(&mut self.wallets, withdrawal_id, requester_id, now)
    }

    // ============================================================
    // PAYOUTS
    // ============================================================

    pub fn distribute_payout_at(
        &mut self,
        investment_id: InvestmentId,
        amount: Cents,
        revenue_month: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<PayoutId> {
        self.payouts.distribute(
            &mut self.wallets,
            &self.registry,
            investment_id,
            amount,
            revenue_month,
            now,
        )
    }

    // ============================================================
    // QUERY SURFACE (Read-Only)
    // ============================================================

    pub fn wallet_summary(&self, user_id: UserId) -> Option<WalletSummary> {
        self.wallets.wallet(user_id).map(|w| WalletSummary {
            user_id,
            balance: w.balance(),
            locked: w.locked(),
            available: w.available(),
            total_deposited: w.total_deposited(),
            total_invested: w.total_invested(),
            total_withdrawn: w.total_withdrawn(),
            total_earnings: w.total_earnings(),
        })
    }

    pub fn transaction_history(&self, user_id: UserId, offset: usize, limit: usize) -> Vec<&Transaction> {
        self.wallets.transaction_history(user_id, offset, limit)
    }

    pub fn offering(&self, offering_id: OfferingId) -> MarketResult<&Offering> {
        self.registry.offering(offering_id)
    }

    pub fn order(&self, order_id: OrderId) -> MarketResult<&SellOrder> {
        self.book.order(order_id)
    }

    pub fn open_orders_at(&self, offering_id: OfferingId, now: DateTime<Utc>) -> Vec<&SellOrder> {
        self.book.open_orders(offering_id, now)
    }

    pub fn depth_at(&self, offering_id: OfferingId, now: DateTime<Utc>) -> Vec<DepthLevel> {
        self.book.depth(offering_id, now)
    }

    pub fn orders_of(&self, seller_id: UserId) -> Vec<&SellOrder> {
        self.book.orders_of(seller_id)
    }

    pub fn recent_trades(&self, offering_id: OfferingId, limit: usize) -> Vec<MarketTrade> {
        self.trades.recent(offering_id, limit)
    }

    pub fn trade_buckets(&self, offering_id: OfferingId, bucket_secs: i64) -> Vec<TradeBucket> {
        self.trades.buckets(offering_id, bucket_secs)
    }

    pub fn withdrawal(&self, withdrawal_id: WithdrawalId) -> MarketResult<&Withdrawal> {
        self.withdrawals.withdrawal(withdrawal_id)
    }

    pub fn withdrawals_of(&self, user_id: UserId) -> Vec<&Withdrawal> {
        self.withdrawals.withdrawals_of(user_id)
    }

    pub fn investment(&self, investment_id: InvestmentId) -> MarketResult<&Investment> {
        self.registry.investment(investment_id)
    }

    /// Portfolio view: every confirmed holding with listed shares and
    /// earnings to date
    pub fn holdings_of(&self, user_id: UserId) -> Vec<HoldingView> {
        self.registry
            .holdings_of(user_id)
            .into_iter()
            .map(|inv| {
                let channel_name = self
                    .registry
                    .offering(inv.offering_id)
                    .map(|o| o.channel_name.clone())
                    .unwrap_or_default();
                let total_payouts = self.payouts.total_for_investment(inv.investment_id);
                let roi_ppm = if inv.total_amount > 0 {
                    Some(
                        ((total_payouts as u128 * crate::fee::FEE_PRECISION as u128)
                            / inv.total_amount as u128) as u64,
                    )
                } else {
                    None
                };
                HoldingView {
                    investment_id: inv.investment_id,
                    offering_id: inv.offering_id,
                    channel_name,
                    shares: inv.shares,
                    total_amount: inv.total_amount,
                    listed_shares: self.book.open_listed(inv.investment_id),
                    total_payouts,
                    roi_ppm,
                }
            })
            .collect()
    }

    // ============================================================
    // INVARIANT CHECKS
    // ============================================================

    /// Ledger replay matches the live balance for one user
    pub fn reconcile(&self, user_id: UserId) -> bool {
        self.wallets.reconcile(user_id)
    }

    /// Confirmed holdings plus unsold shares equal the issuance
    pub fn check_share_conservation(&self, offering_id: OfferingId) -> MarketResult<bool> {
        self.registry.check_conservation(offering_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::PLATFORM_USER_ID;

    fn marketplace_with_offering() -> (Marketplace, OfferingId) {
        let now = Utc::now();
        let mut mp = Marketplace::new(FeeSchedule::default());
        let offering = mp
            .create_offering_at("techreview", 1000, 10_00, 10_00, 100_000_00, 2000, now)
            .unwrap();
        (mp, offering)
    }

    fn fund(mp: &mut Marketplace, user: UserId, amount: Cents) {
        let tx = mp.initiate_deposit(user, amount, Uuid::new_v4()).unwrap();
        mp.confirm_deposit(user, amount, tx).unwrap();
    }

    #[test]
    fn test_full_lifecycle_conserves_money_and_shares() {
        let (mut mp, offering) = marketplace_with_offering();
        let now = Utc::now();
        fund(&mut mp, 1, 2000_00);
        fund(&mut mp, 2, 1000_00);

        // Primary buy, then relist part of it
        mp.invest_at(1, offering, 100, now).unwrap();
        let order = mp.list_shares_at(1, offering, 50, 12_00, 1, None, now).unwrap();
        let trade = mp.buy_shares_at(2, order, 20, now).unwrap();

        let seller = mp.wallet_summary(1).unwrap();
        let buyer = mp.wallet_summary(2).unwrap();
        // 1000_00 spent primary; 234_00 received net of 2.5% fee on 240_00
        assert_eq!(seller.balance, 1234_00);
        assert_eq!(buyer.balance, 760_00);
        assert_eq!(mp.wallet_summary(PLATFORM_USER_ID).unwrap().balance, 6_00);

        assert!(mp.reconcile(1));
        assert!(mp.reconcile(2));
        assert!(mp.reconcile(PLATFORM_USER_ID));
        assert!(mp.check_share_conservation(offering).unwrap());

        let recent = mp.recent_trades(offering, 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].trade_id, trade);

        let holdings = mp.holdings_of(2);
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].shares, 20);
    }

    #[test]
    fn test_holdings_view_tracks_listings_and_roi() {
        let (mut mp, offering) = marketplace_with_offering();
        let now = Utc::now();
        fund(&mut mp, 1, 1000_00);

        let inv = mp.invest_at(1, offering, 100, now).unwrap();
        mp.list_shares_at(1, offering, 40, 11_00, 1, None, now).unwrap();
        mp.distribute_payout_at(inv, 50_00, "2025-06", now).unwrap();

        let holdings = mp.holdings_of(1);
        let view = &holdings[0];
        assert_eq!(view.shares, 100);
        assert_eq!(view.listed_shares, 40);
        assert_eq!(view.total_payouts, 50_00);
        // 50_00 / 1000_00 = 5% of cost basis
        assert_eq!(view.roi_ppm, Some(50_000));
    }

    #[test]
    fn test_withdrawal_roundtrip_through_facade() {
        let (mut mp, _offering) = marketplace_with_offering();
        let now = Utc::now();
        fund(&mut mp, 1, 1000_00);
        let account = mp.register_bank_account(1, true);

        let wid = mp.request_withdrawal_at(1, 500_00, account, now).unwrap();
        mp.approve_withdrawal_at(wid, now).unwrap();
        mp.complete_withdrawal_at(wid, now).unwrap();

        let w = mp.wallet_summary(1).unwrap();
        assert_eq!(w.balance, 500_00);
        assert_eq!(w.total_withdrawn, 492_50);
        assert!(mp.reconcile(1));
    }
}
