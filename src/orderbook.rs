//! Sell-order book
//!
//! Per-offering collection of resting sell orders. Shares stay in the
//! seller's holding while listed; the book only tracks the listing.
//!
//! Match selection is price-then-time priority: lowest price first,
//! earliest creation within a price level.

use crate::core_types::{Cents, InvestmentId, OfferingId, OrderId, ShareCount, UserId};
use crate::error::{MarketError, MarketResult};
use crate::models::{Investment, SellOrder, SellOrderStatus};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Aggregated depth level of an offering's live book
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DepthLevel {
    pub price_per_share: Cents,
    pub shares: ShareCount,
    pub orders: usize,
}

pub struct SellOrderBook {
    orders: FxHashMap<OrderId, SellOrder>,
    by_offering: FxHashMap<OfferingId, Vec<OrderId>>,
    next_order_id: OrderId,
}

impl Default for SellOrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl SellOrderBook {
    pub fn new() -> Self {
        Self {
            orders: FxHashMap::default(),
            by_offering: FxHashMap::default(),
            next_order_id: 1,
        }
    }

    // ============================================================
    // LISTING
    // ============================================================

    /// Sum of `shares_remaining` across a holding's open orders.
    /// This is the encumbered portion of the holding.
    pub fn open_listed(&self, investment_id: InvestmentId) -> ShareCount {
        self.orders
            .values()
            .filter(|o| o.investment_id == investment_id && o.status.is_open())
            .map(|o| o.shares_remaining)
            .sum()
    }

    /// Create a resting sell order against the given holding.
    ///
    /// The over-listing guard caps the new listing at the holding's
    /// unencumbered shares, so the seller can never list the same
    /// shares twice.
    #[allow(clippy::too_many_arguments)]
    pub fn create_order(
        &mut self,
        seller_id: UserId,
        holding: &Investment,
        shares: ShareCount,
        price_per_share: Cents,
        min_shares: ShareCount,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> MarketResult<OrderId> {
        if seller_id != holding.investor_id {
            return Err(MarketError::Forbidden);
        }
        if min_shares == 0 {
            return Err(MarketError::InvalidQuantity {
                reason: "minimum fill must be at least one share",
            });
        }
        if shares < min_shares {
            return Err(MarketError::InvalidQuantity {
                reason: "listed shares below the order's own minimum fill",
            });
        }
        if price_per_share == 0 {
            return Err(MarketError::InvalidQuantity {
                reason: "price per share must be positive",
            });
        }

        let listed = self.open_listed(holding.investment_id);
        let listable = holding.shares.saturating_sub(listed);
        if shares > listable {
            return Err(MarketError::OverListed {
                requested: shares,
                listable,
            });
        }

        let order_id = self.next_order_id;
        self.next_order_id += 1;
        self.orders.insert(
            order_id,
            SellOrder {
                order_id,
                seller_id,
                investment_id: holding.investment_id,
                offering_id: holding.offering_id,
                shares_listed: shares,
                shares_remaining: shares,
                price_per_share,
                min_shares,
                status: SellOrderStatus::Active,
                expires_at,
                created_at: now,
                updated_at: now,
            },
        );
        self.by_offering
            .entry(holding.offering_id)
            .or_default()
            .push(order_id);
        tracing::info!(order_id, seller_id, shares, price_per_share, "sell order listed");
        Ok(order_id)
    }

    /// Cancel an open order. Only the seller may cancel.
    pub fn cancel_order(
        &mut self,
        order_id: OrderId,
        requester_id: UserId,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let order = self.orders.get_mut(&order_id).ok_or(MarketError::NotFound {
            entity: "sell order",
            id: order_id,
        })?;
        if order.seller_id != requester_id {
            return Err(MarketError::Forbidden);
        }
        if !order.status.is_open() {
            return Err(MarketError::InvalidState {
                entity: "sell order",
                state: order.status.as_str(),
            });
        }
        order.status = SellOrderStatus::Cancelled;
        order.updated_at = now;
        tracing::info!(order_id, "sell order cancelled");
        Ok(())
    }

    // ============================================================
    // ACCESS & EXPIRY
    // ============================================================

    pub fn order(&self, order_id: OrderId) -> MarketResult<&SellOrder> {
        self.orders.get(&order_id).ok_or(MarketError::NotFound {
            entity: "sell order",
            id: order_id,
        })
    }

    /// Fetch an order for matching. Lazily expires a past-due order,
    /// then reports it as expired.
    pub fn open_order(&mut self, order_id: OrderId, now: DateTime<Utc>) -> MarketResult<&SellOrder> {
        let order = self.orders.get_mut(&order_id).ok_or(MarketError::NotFound {
            entity: "sell order",
            id: order_id,
        })?;
        if !order.status.is_open() {
            return Err(MarketError::OrderUnavailable);
        }
        if order.is_expired(now) {
            order.status = SellOrderStatus::Expired;
            order.updated_at = now;
            tracing::debug!(order_id, "sell order expired on access");
            return Err(MarketError::OrderExpired);
        }
        Ok(order)
    }

    /// Maintenance sweep: expire every open past-due order.
    /// Returns the ids transitioned.
    pub fn expire_due(&mut self, now: DateTime<Utc>) -> Vec<OrderId> {
        let mut expired = Vec::new();
        for order in self.orders.values_mut() {
            if order.status.is_open() && order.is_expired(now) {
                order.status = SellOrderStatus::Expired;
                order.updated_at = now;
                expired.push(order.order_id);
            }
        }
        expired
    }

    // ============================================================
    // MATCHING SUPPORT
    // ============================================================

    /// Decrement an order after a fill; FILLED at zero remaining,
    /// PARTIALLY_FILLED otherwise. The caller has already validated the
    /// fill against the order.
    pub fn apply_fill(
        &mut self,
        order_id: OrderId,
        shares: ShareCount,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let order = self.orders.get_mut(&order_id).ok_or(MarketError::NotFound {
            entity: "sell order",
            id: order_id,
        })?;
        if shares > order.shares_remaining {
            return Err(MarketError::InsufficientSupply {
                requested: shares,
                available: order.shares_remaining,
            });
        }
        order.shares_remaining -= shares;
        order.status = if order.shares_remaining == 0 {
            SellOrderStatus::Filled
        } else {
            SellOrderStatus::PartiallyFilled
        };
        order.updated_at = now;
        Ok(())
    }

    /// Select the best resting order for a market buy: lowest price
    /// first, earliest creation within a level. Skips the buyer's own
    /// orders, expired orders, and orders whose minimum fill cannot be
    /// met by the remaining demand.
    pub fn best_match(
        &self,
        offering_id: OfferingId,
        buyer_id: UserId,
        demand: ShareCount,
        now: DateTime<Utc>,
    ) -> Option<OrderId> {
        self.by_offering
            .get(&offering_id)?
            .iter()
            .filter_map(|id| self.orders.get(id))
            .filter(|o| o.status.is_open() && !o.is_expired(now))
            .filter(|o| o.seller_id != buyer_id)
            .filter(|o| demand.min(o.shares_remaining) >= o.min_shares)
            .min_by_key(|o| (o.price_per_share, o.created_at, o.order_id))
            .map(|o| o.order_id)
    }

    // ============================================================
    // QUERY SURFACE (Read-Only)
    // ============================================================

    /// Live orders for an offering, price-then-time priority order
    pub fn open_orders(&self, offering_id: OfferingId, now: DateTime<Utc>) -> Vec<&SellOrder> {
        let mut out: Vec<&SellOrder> = self
            .by_offering
            .get(&offering_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.orders.get(id))
                    .filter(|o| o.status.is_open() && !o.is_expired(now))
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by_key(|o| (o.price_per_share, o.created_at, o.order_id));
        out
    }

    /// A user's own orders, any status, newest first
    pub fn orders_of(&self, seller_id: UserId) -> Vec<&SellOrder> {
        let mut out: Vec<&SellOrder> = self
            .orders
            .values()
            .filter(|o| o.seller_id == seller_id)
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.order_id.cmp(&a.order_id)));
        out
    }

    /// Aggregated depth: price level -> total remaining shares
    pub fn depth(&self, offering_id: OfferingId, now: DateTime<Utc>) -> Vec<DepthLevel> {
        let mut levels: Vec<DepthLevel> = Vec::new();
        for order in self.open_orders(offering_id, now) {
            match levels.last_mut() {
                Some(level) if level.price_per_share == order.price_per_share => {
                    level.shares += order.shares_remaining;
                    level.orders += 1;
                }
                _ => levels.push(DepthLevel {
                    price_per_share: order.price_per_share,
                    shares: order.shares_remaining,
                    orders: 1,
                }),
            }
        }
        levels
    }
}
