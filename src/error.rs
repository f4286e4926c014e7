//! Typed failure taxonomy for the marketplace core.
//!
//! Every business-rule violation is detected before any mutation and
//! surfaced as one of these variants with no partial state change.

use crate::core_types::{Cents, ShareCount};
use thiserror::Error;

/// Result alias used by all core operations
pub type MarketResult<T> = Result<T, MarketError>;

/// Marketplace error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    /// Entity absent
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    /// Spendable balance too low for the requested debit or lock
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Cents, available: Cents },

    /// Offering or sell order cannot supply the requested shares
    #[error("insufficient supply: requested {requested}, available {available}")]
    InsufficientSupply {
        requested: ShareCount,
        available: ShareCount,
    },

    /// Holding has fewer shares than the requested decrement
    #[error("insufficient shares: requested {requested}, held {held}")]
    InsufficientShares {
        requested: ShareCount,
        held: ShareCount,
    },

    /// Listing would exceed the holding's unlisted shares
    #[error("over-listed: requested {requested}, listable {listable}")]
    OverListed {
        requested: ShareCount,
        listable: ShareCount,
    },

    /// Operation not legal for the entity's current lifecycle state
    #[error("{entity} is {state}, operation not allowed")]
    InvalidState {
        entity: &'static str,
        state: &'static str,
    },

    /// Actor mismatch (e.g. cancelling someone else's order)
    #[error("requester is not the owner")]
    Forbidden,

    /// Buyer and seller are the same user
    #[error("self-trade forbidden")]
    SelfTradeForbidden,

    /// Fill size below the sell order's minimum
    #[error("fill below order minimum: requested {requested}, min {min}")]
    BelowMinimumFill {
        requested: ShareCount,
        min: ShareCount,
    },

    /// Sell order expired before the fill could execute
    #[error("sell order has expired")]
    OrderExpired,

    /// Sell order exists but is not in an open state
    #[error("sell order is not open")]
    OrderUnavailable,

    /// Idempotence guard tripped (duplicate confirmation or distribution)
    #[error("already processed")]
    AlreadyProcessed,

    /// Request fails basic quantity/amount validation
    #[error("invalid quantity: {reason}")]
    InvalidQuantity { reason: &'static str },

    /// Checked arithmetic failed - indicates data corruption, never a
    /// caller error
    #[error("internal error: {0}")]
    Internal(&'static str),
}
