//! Offering / share registry
//!
//! Exclusively owns `Offering.available_shares` and `Investment.shares`
//! mutation. The settlement engine orchestrates cross-entity moves but
//! delegates the actual share writes here so the conservation
//! invariant lives in one place:
//!
//! `sum(confirmed holdings) + available_shares == total_shares`

use crate::core_types::{Cents, InvestmentId, OfferingId, ShareCount, UserId};
use crate::error::{MarketError, MarketResult};
use crate::models::{Investment, InvestmentStatus, Offering, OfferingStatus};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

pub struct ShareRegistry {
    offerings: FxHashMap<OfferingId, Offering>,
    investments: FxHashMap<InvestmentId, Investment>,
    /// Canonical holding index: at most one CONFIRMED investment per
    /// (investor, offering) pair
    by_holder: FxHashMap<(UserId, OfferingId), InvestmentId>,
    next_offering_id: OfferingId,
    next_investment_id: InvestmentId,
}

impl Default for ShareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShareRegistry {
    pub fn new() -> Self {
        Self {
            offerings: FxHashMap::default(),
            investments: FxHashMap::default(),
            by_holder: FxHashMap::default(),
            next_offering_id: 1,
            next_investment_id: 1,
        }
    }

    // ============================================================
    // OFFERINGS
    // ============================================================

    #[allow(clippy::too_many_arguments)]
    pub fn create_offering(
        &mut self,
        channel_name: &str,
        total_shares: ShareCount,
        price_per_share: Cents,
        min_investment: Cents,
        max_investment: Cents,
        share_percentage_bps: u32,
        now: DateTime<Utc>,
    ) -> MarketResult<OfferingId> {
        if total_shares == 0 {
            return Err(MarketError::InvalidQuantity {
                reason: "offering must have at least one share",
            });
        }
        if price_per_share == 0 {
            return Err(MarketError::InvalidQuantity {
                reason: "price per share must be positive",
            });
        }
        let offering_id = self.next_offering_id;
        self.next_offering_id += 1;
        self.offerings.insert(
            offering_id,
            Offering {
                offering_id,
                channel_name: channel_name.to_string(),
                total_shares,
                available_shares: total_shares,
                price_per_share,
                min_investment,
                max_investment,
                share_percentage_bps,
                status: OfferingStatus::Active,
                created_at: now,
            },
        );
        tracing::info!(offering_id, channel_name, total_shares, "offering created");
        Ok(offering_id)
    }

    pub fn offering(&self, offering_id: OfferingId) -> MarketResult<&Offering> {
        self.offerings.get(&offering_id).ok_or(MarketError::NotFound {
            entity: "offering",
            id: offering_id,
        })
    }

    /// Atomically check and decrement unsold primary shares. Used only
    /// for primary-market purchases.
    pub fn reserve_available_shares(
        &mut self,
        offering_id: OfferingId,
        shares: ShareCount,
    ) -> MarketResult<()> {
        let offering = self
            .offerings
            .get_mut(&offering_id)
            .ok_or(MarketError::NotFound {
                entity: "offering",
                id: offering_id,
            })?;
        if shares > offering.available_shares {
            return Err(MarketError::InsufficientSupply {
                requested: shares,
                available: offering.available_shares,
            });
        }
        offering.available_shares -= shares;
        Ok(())
    }

    // ============================================================
    // HOLDINGS
    // ============================================================

    pub fn investment(&self, investment_id: InvestmentId) -> MarketResult<&Investment> {
        self.investments
            .get(&investment_id)
            .ok_or(MarketError::NotFound {
                entity: "investment",
                id: investment_id,
            })
    }

    /// The investor's confirmed holding for an offering, if any
    pub fn holding(&self, investor_id: UserId, offering_id: OfferingId) -> Option<&Investment> {
        self.by_holder
            .get(&(investor_id, offering_id))
            .and_then(|id| self.investments.get(id))
    }

    /// All confirmed holdings of one investor
    pub fn holdings_of(&self, investor_id: UserId) -> Vec<&Investment> {
        let mut out: Vec<&Investment> = self
            .investments
            .values()
            .filter(|i| i.investor_id == investor_id && i.status == InvestmentStatus::Confirmed)
            .collect();
        out.sort_by_key(|i| i.investment_id);
        out
    }

    /// Find the investor's CONFIRMED holding for the offering and
    /// increment it in place, or create one. Never produces two
    /// confirmed rows for the same (investor, offering) pair.
    pub fn upsert_holding(
        &mut self,
        investor_id: UserId,
        offering_id: OfferingId,
        delta_shares: ShareCount,
        delta_amount: Cents,
        now: DateTime<Utc>,
    ) -> MarketResult<InvestmentId> {
        if let Some(&id) = self.by_holder.get(&(investor_id, offering_id)) {
            let inv = self
                .investments
                .get_mut(&id)
                .ok_or(MarketError::Internal("holding index out of sync"))?;
            inv.shares = inv
                .shares
                .checked_add(delta_shares)
                .ok_or(MarketError::Internal("holding shares overflow"))?;
            inv.total_amount = inv
                .total_amount
                .checked_add(delta_amount)
                .ok_or(MarketError::Internal("holding amount overflow"))?;
            inv.updated_at = now;
            return Ok(id);
        }

        let investment_id = self.next_investment_id;
        self.next_investment_id += 1;
        self.investments.insert(
            investment_id,
            Investment {
                investment_id,
                investor_id,
                offering_id,
                shares: delta_shares,
                total_amount: delta_amount,
                status: InvestmentStatus::Confirmed,
                created_at: now,
                updated_at: now,
            },
        );
        self.by_holder.insert((investor_id, offering_id), investment_id);
        Ok(investment_id)
    }

    /// Remove shares from a holding. The holding row survives at zero
    /// shares (it stays the canonical record for the pair).
    pub fn decrement_holding(
        &mut self,
        investment_id: InvestmentId,
        shares: ShareCount,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        let inv = self
            .investments
            .get_mut(&investment_id)
            .ok_or(MarketError::NotFound {
                entity: "investment",
                id: investment_id,
            })?;
        if shares > inv.shares {
            return Err(MarketError::InsufficientShares {
                requested: shares,
                held: inv.shares,
            });
        }
        inv.shares -= shares;
        inv.updated_at = now;
        Ok(())
    }

    // ============================================================
    // INVARIANT CHECKS
    // ============================================================

    /// Conservation of shares: confirmed holdings plus unsold primary
    /// shares must equal the issuance, at all times.
    pub fn check_conservation(&self, offering_id: OfferingId) -> MarketResult<bool> {
        let offering = self.offering(offering_id)?;
        let held: ShareCount = self
            .investments
            .values()
            .filter(|i| i.offering_id == offering_id && i.status == InvestmentStatus::Confirmed)
            .map(|i| i.shares)
            .sum();
        Ok(held + offering.available_shares == offering.total_shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_offering() -> (ShareRegistry, OfferingId) {
        let mut reg = ShareRegistry::new();
        let id = reg
            .create_offering("techreview", 1000, 10_00, 50_00, 10_000_00, 1500, Utc::now())
            .unwrap();
        (reg, id)
    }

    #[test]
    fn test_reserve_decrements_available() {
        let (mut reg, off) = registry_with_offering();
        reg.reserve_available_shares(off, 100).unwrap();
        assert_eq!(reg.offering(off).unwrap().available_shares, 900);
    }

    #[test]
    fn test_reserve_insufficient_supply() {
        let (mut reg, off) = registry_with_offering();
        let err = reg.reserve_available_shares(off, 1001).unwrap_err();
        assert_eq!(
            err,
            MarketError::InsufficientSupply {
                requested: 1001,
                available: 1000
            }
        );
        // No partial decrement
        assert_eq!(reg.offering(off).unwrap().available_shares, 1000);
    }

    #[test]
    fn test_upsert_holding_never_duplicates() {
        let (mut reg, off) = registry_with_offering();
        let now = Utc::now();

        let a = reg.upsert_holding(7, off, 100, 1000_00, now).unwrap();
        let b = reg.upsert_holding(7, off, 20, 240_00, now).unwrap();
        assert_eq!(a, b);

        let inv = reg.investment(a).unwrap();
        assert_eq!(inv.shares, 120);
        assert_eq!(inv.total_amount, 1240_00);
        assert_eq!(reg.holdings_of(7).len(), 1);
    }

    #[test]
    fn test_decrement_holding_insufficient() {
        let (mut reg, off) = registry_with_offering();
        let now = Utc::now();
        let id = reg.upsert_holding(7, off, 50, 500_00, now).unwrap();

        let err = reg.decrement_holding(id, 60, now).unwrap_err();
        assert_eq!(
            err,
            MarketError::InsufficientShares {
                requested: 60,
                held: 50
            }
        );
        assert_eq!(reg.investment(id).unwrap().shares, 50);
    }

    #[test]
    fn test_conservation_holds_through_moves() {
        let (mut reg, off) = registry_with_offering();
        let now = Utc::now();

        reg.reserve_available_shares(off, 100).unwrap();
        let a = reg.upsert_holding(1, off, 100, 1000_00, now).unwrap();
        assert!(reg.check_conservation(off).unwrap());

        // Secondary trade: 20 shares from investor 1 to investor 2
        reg.decrement_holding(a, 20, now).unwrap();
        reg.upsert_holding(2, off, 20, 240_00, now).unwrap();
        assert!(reg.check_conservation(off).unwrap());
    }
}
