//! Trade log and market analytics
//!
//! The trade log is the immutable record of every settlement. All
//! price/volume analytics are derived strictly from it by aggregation;
//! nothing here is ever invented or mutated after the fact.

use crate::core_types::{Cents, InvestmentId, OfferingId, ShareCount, TradeId};
use crate::error::{MarketError, MarketResult};
use crate::models::Trade;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Public view of a settled trade: no PII beyond counterparty ids
#[derive(Debug, Clone, Serialize)]
pub struct MarketTrade {
    pub trade_id: TradeId,
    pub buyer_id: u64,
    pub seller_id: u64,
    pub shares: ShareCount,
    pub price_per_share: Cents,
    pub total_amount: Cents,
    pub status: crate::models::TradeStatus,
    pub executed_at: DateTime<Utc>,
}

impl From<&Trade> for MarketTrade {
    fn from(t: &Trade) -> Self {
        Self {
            trade_id: t.trade_id,
            buyer_id: t.buyer_id,
            seller_id: t.seller_id,
            shares: t.shares,
            price_per_share: t.price_per_share,
            total_amount: t.total_amount,
            status: t.status,
            executed_at: t.executed_at,
        }
    }
}

/// One time bucket of trading activity for an offering
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TradeBucket {
    pub bucket_start: DateTime<Utc>,
    pub open: Cents,
    pub high: Cents,
    pub low: Cents,
    pub close: Cents,
    pub volume_shares: ShareCount,
    pub volume_amount: Cents,
    pub trades: usize,
}

/// Append-only settlement record store
#[derive(Debug, Default)]
pub struct TradeLog {
    trades: Vec<Trade>,
    next_trade_id: TradeId,
}

impl TradeLog {
    pub fn new() -> Self {
        Self {
            trades: Vec::new(),
            next_trade_id: 1,
        }
    }

    pub fn next_id(&self) -> TradeId {
        self.next_trade_id
    }

    /// Record a settled trade. Trades append in settlement order.
    pub fn append(&mut self, trade: Trade) -> TradeId {
        debug_assert_eq!(trade.trade_id, self.next_trade_id);
        let id = trade.trade_id;
        self.next_trade_id += 1;
        self.trades.push(trade);
        id
    }

    /// Attach the buyer's holding id. Only legal immediately after
    /// creation, within the same settlement; a second write is refused.
    pub fn attach_buyer_investment(
        &mut self,
        trade_id: TradeId,
        investment_id: InvestmentId,
    ) -> MarketResult<()> {
        let trade = self
            .trades
            .iter_mut()
            .rev()
            .find(|t| t.trade_id == trade_id)
            .ok_or(MarketError::NotFound {
                entity: "trade",
                id: trade_id,
            })?;
        if trade.buyer_investment_id.is_some() {
            return Err(MarketError::AlreadyProcessed);
        }
        trade.buyer_investment_id = Some(investment_id);
        Ok(())
    }

    pub fn trade(&self, trade_id: TradeId) -> Option<&Trade> {
        self.trades.iter().find(|t| t.trade_id == trade_id)
    }

    pub fn all(&self) -> &[Trade] {
        &self.trades
    }

    // ============================================================
    // ANALYTICS (Read-Only, derived from the log)
    // ============================================================

    /// Last `limit` trades for an offering, newest first
    pub fn recent(&self, offering_id: OfferingId, limit: usize) -> Vec<MarketTrade> {
        self.trades
            .iter()
            .rev()
            .filter(|t| t.offering_id == offering_id)
            .take(limit)
            .map(MarketTrade::from)
            .collect()
    }

    /// Price/volume history grouped into fixed time buckets, oldest
    /// first. Empty buckets are omitted.
    pub fn buckets(&self, offering_id: OfferingId, bucket_secs: i64) -> Vec<TradeBucket> {
        debug_assert!(bucket_secs > 0);
        let mut out: Vec<TradeBucket> = Vec::new();
        // Trades are already in settlement (time) order
        for t in self.trades.iter().filter(|t| t.offering_id == offering_id) {
            let ts = t.executed_at.timestamp();
            let start_ts = ts - ts.rem_euclid(bucket_secs);
            let bucket_start = match Utc.timestamp_opt(start_ts, 0).single() {
                Some(dt) => dt,
                None => continue,
            };
            match out.last_mut() {
                Some(b) if b.bucket_start == bucket_start => {
                    b.high = b.high.max(t.price_per_share);
                    b.low = b.low.min(t.price_per_share);
                    b.close = t.price_per_share;
                    b.volume_shares += t.shares;
                    b.volume_amount += t.total_amount;
                    b.trades += 1;
                }
                _ => out.push(TradeBucket {
                    bucket_start,
                    open: t.price_per_share,
                    high: t.price_per_share,
                    low: t.price_per_share,
                    close: t.price_per_share,
                    volume_shares: t.shares,
                    volume_amount: t.total_amount,
                    trades: 1,
                }),
            }
        }
        out
    }
}
