//! Trade matching & settlement engine
//!
//! The engine is stateless: it operates on the wallet service, share
//! registry, order book, and trade log passed in by the caller, so all
//! state has a single owner and `&mut` access serializes settlements.
//!
//! # Atomicity
//!
//! Every operation checks ALL preconditions first (read-only, first
//! failure wins, no side effects), then applies mutations that cannot
//! fail. The caller therefore never observes a half-applied settlement.

use crate::core_types::{Cents, InvestmentId, OfferingId, OrderId, ShareCount, TradeId, UserId};
use crate::error::{MarketError, MarketResult};
use crate::fee::FeeSchedule;
use crate::market::TradeLog;
use crate::models::{EntryType, LedgerRef, OfferingStatus, Trade, TradeStatus, TxStatus, TxType};
use crate::orderbook::SellOrderBook;
use crate::registry::ShareRegistry;
use crate::wallet::WalletService;
use crate::PLATFORM_USER_ID;
use chrono::{DateTime, Utc};

pub struct TradeEngine {
    fees: FeeSchedule,
}

impl TradeEngine {
    /// Fee rates are explicit construction-time configuration so they
    /// can change per era without breaking historical reconciliation.
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    // ============================================================
    // SECONDARY MARKET
    // ============================================================

    /// Execute a buy against one already-chosen sell order.
    ///
    /// Preconditions, checked in order (first failure wins, no side
    /// effects on failure):
    /// 1. order exists and is open
    /// 2. order has not expired (a past-due order is transitioned to
    ///    EXPIRED and the call fails)
    /// 3. buyer is not the seller
    /// 4. fill meets the order's minimum
    /// 5. fill does not exceed the order's remaining shares
    /// 6. buyer's available balance covers the gross amount
    #[allow(clippy::too_many_arguments)]
    pub fn execute_trade(
        &self,
        wallets: &mut WalletService,
        registry: &mut ShareRegistry,
        book: &mut SellOrderBook,
        trades: &mut TradeLog,
        buyer_id: UserId,
        sell_order_id: OrderId,
        shares: ShareCount,
        now: DateTime<Utc>,
    ) -> MarketResult<TradeId> {
        // ---- Pre-checks (read-only apart from lazy expiry) ----
        let order = book.open_order(sell_order_id, now)?;
        if buyer_id == order.seller_id {
            return Err(MarketError::SelfTradeForbidden);
        }
        if shares < order.min_shares {
            return Err(MarketError::BelowMinimumFill {
                requested: shares,
                min: order.min_shares,
            });
        }
        if shares > order.shares_remaining {
            return Err(MarketError::InsufficientSupply {
                requested: shares,
                available: order.shares_remaining,
            });
        }
        let seller_id = order.seller_id;
        let seller_investment = order.investment_id;
        let offering_id = order.offering_id;
        let price_per_share = order.price_per_share;
        let total_amount = order.cost_of(shares);

        let available = wallets.wallet(buyer_id).map(|w| w.available()).unwrap_or(0);
        if available < total_amount {
            return Err(MarketError::InsufficientFunds {
                required: total_amount,
                available,
            });
        }
        // The no-over-listing invariant guarantees the seller's holding
        // covers every open listing; verify before mutating anyway.
        let held = registry.investment(seller_investment)?.shares;
        if held < shares {
            return Err(MarketError::InsufficientShares {
                requested: shares,
                held,
            });
        }

        // ---- Settlement (cannot fail past this point) ----
        let platform_fee = self.fees.platform_fee(total_amount);
        let net_amount = total_amount - platform_fee;

        let trade_id = trades.next_id();
        trades.append(Trade {
            trade_id,
            sell_order_id,
            buyer_id,
            seller_id,
            offering_id,
            shares,
            price_per_share,
            total_amount,
            platform_fee,
            net_amount,
            status: TradeStatus::Completed,
            buyer_investment_id: None,
            executed_at: now,
        });
        let trade_ref = LedgerRef::Trade(trade_id);

        // Shares: sell order decrements, seller holding decrements,
        // buyer holding increments (created if absent)
        book.apply_fill(sell_order_id, shares, now)?;
        registry.decrement_holding(seller_investment, shares, now)?;
        let buyer_investment =
            registry.upsert_holding(buyer_id, offering_id, shares, total_amount, now)?;
        trades.attach_buyer_investment(trade_id, buyer_investment)?;

        // Money: buyer pays gross, seller nets price minus fee, the
        // platform wallet collects the fee
        let buyer_tx =
            wallets.create_transaction(buyer_id, TxType::Investment, total_amount, 0, None, Some(trade_ref), now);
        wallets.debit_for_investment(
            buyer_id,
            total_amount,
            EntryType::TradeBuy,
            buyer_tx,
            trade_ref,
            now,
        )?;
        wallets.settle_transaction(buyer_tx, TxStatus::Completed, None, now)?;

        let seller_tx = wallets.create_transaction(
            seller_id,
            TxType::Earning,
            total_amount,
            platform_fee,
            None,
            Some(trade_ref),
            now,
        );
        wallets.credit_from_sale(seller_id, total_amount, platform_fee, seller_tx, trade_ref, now)?;
        wallets.settle_transaction(seller_tx, TxStatus::Completed, None, now)?;

        if platform_fee > 0 {
            wallets.credit_platform_fee(PLATFORM_USER_ID, platform_fee, trade_ref, now)?;
        }

        tracing::info!(
            trade_id,
            buyer_id,
            seller_id,
            shares,
            total_amount,
            platform_fee,
            "trade settled"
        );
        Ok(trade_id)
    }

    /// Fill a market buy across resting orders, lowest price first,
    /// earliest within a price level. Each selected order settles via
    /// [`Self::execute_trade`]; the overall buy may partially fill if
    /// liquidity or funds run out after at least one settlement.
    #[allow(clippy::too_many_arguments)]
    pub fn buy_at_market(
        &self,
        wallets: &mut WalletService,
        registry: &mut ShareRegistry,
        book: &mut SellOrderBook,
        trades: &mut TradeLog,
        buyer_id: UserId,
        offering_id: OfferingId,
        shares: ShareCount,
        now: DateTime<Utc>,
    ) -> MarketResult<Vec<TradeId>> {
        if shares == 0 {
            return Err(MarketError::InvalidQuantity {
                reason: "market buy must request at least one share",
            });
        }
        let mut remaining = shares;
        let mut executed = Vec::new();

        while remaining > 0 {
            let Some(order_id) = book.best_match(offering_id, buyer_id, remaining, now) else {
                break;
            };
            let fill = remaining.min(book.order(order_id)?.shares_remaining);
            match self.execute_trade(wallets, registry, book, trades, buyer_id, order_id, fill, now)
            {
                Ok(trade_id) => {
                    executed.push(trade_id);
                    remaining -= fill;
                }
                Err(e) if executed.is_empty() => return Err(e),
                Err(_) => break,
            }
        }

        if executed.is_empty() {
            let available = book
                .open_orders(offering_id, now)
                .iter()
                .map(|o| o.shares_remaining)
                .sum();
            return Err(MarketError::InsufficientSupply {
                requested: shares,
                available,
            });
        }
        Ok(executed)
    }

    // ============================================================
    // PRIMARY MARKET
    // ============================================================

    /// Buy newly issued shares directly from the offering. No seller
    /// leg and no platform fee: the platform takes a cut only on
    /// resale, not on primary issuance.
    pub fn invest_directly(
        &self,
        wallets: &mut WalletService,
        registry: &mut ShareRegistry,
        buyer_id: UserId,
        offering_id: OfferingId,
        shares: ShareCount,
        now: DateTime<Utc>,
    ) -> MarketResult<InvestmentId> {
        // ---- Pre-checks ----
        if shares == 0 {
            return Err(MarketError::InvalidQuantity {
                reason: "investment must buy at least one share",
            });
        }
        let offering = registry.offering(offering_id)?;
        if offering.status != OfferingStatus::Active {
            return Err(MarketError::InvalidState {
                entity: "offering",
                state: offering.status.as_str(),
            });
        }
        let amount_128 = offering.price_per_share as u128 * shares as u128;
        if amount_128 > u64::MAX as u128 {
            return Err(MarketError::InvalidQuantity {
                reason: "investment amount overflows",
            });
        }
        let amount = amount_128 as Cents;
        if amount < offering.min_investment {
            return Err(MarketError::InvalidQuantity {
                reason: "below the offering's minimum investment",
            });
        }
        if offering.max_investment > 0 && amount > offering.max_investment {
            return Err(MarketError::InvalidQuantity {
                reason: "above the offering's maximum investment",
            });
        }
        if shares > offering.available_shares {
            return Err(MarketError::InsufficientSupply {
                requested: shares,
                available: offering.available_shares,
            });
        }
        let available = wallets.wallet(buyer_id).map(|w| w.available()).unwrap_or(0);
        if available < amount {
            return Err(MarketError::InsufficientFunds {
                required: amount,
                available,
            });
        }

        // ---- Settlement ----
        registry.reserve_available_shares(offering_id, shares)?;
        let investment_id = registry.upsert_holding(buyer_id, offering_id, shares, amount, now)?;
        let inv_ref = LedgerRef::Investment(investment_id);

        let tx_id =
            wallets.create_transaction(buyer_id, TxType::Investment, amount, 0, None, Some(inv_ref), now);
        wallets.debit_for_investment(buyer_id, amount, EntryType::Investment, tx_id, inv_ref, now)?;
        wallets.settle_transaction(tx_id, TxStatus::Completed, None, now)?;

        tracing::info!(buyer_id, offering_id, shares, amount, "primary investment settled");
        Ok(investment_id)
    }
}

// ============================================================
// TESTS
// ============================================================
