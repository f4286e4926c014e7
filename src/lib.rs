//! CrowdStake - Creator Equity Marketplace Core
//!
//! A ledger-consistent trading and wallet engine for fractional
//! creator-channel shares.
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (UserId, Cents, etc.)
//! - [`fee`] - Fee schedule and fixed-point fee math
//! - [`models`] - Domain records and status enums
//! - [`ledger`] - Append-only double-column ledger
//! - [`wallet`] - Enforced balance type and the wallet service
//! - [`registry`] - Offering and share-holding registry
//! - [`orderbook`] - Resting sell-order book
//! - [`engine`] - Trade matching and settlement
//! - [`market`] - Trade log and market analytics
//! - [`withdrawal`] - Withdrawal state machine
//! - [`payout`] - Revenue payout distribution
//! - [`marketplace`] - Facade owning every service

// Core types - must be first!
pub mod core_types;

// Money plumbing
pub mod error;
pub mod fee;
pub mod ledger;
pub mod models;
pub mod wallet;

// Market components
pub mod engine;
pub mod market;
pub mod orderbook;
pub mod payout;
pub mod registry;
pub mod withdrawal;

// Facade and app plumbing
pub mod config;
pub mod logging;
pub mod marketplace;

// Convenient re-exports at crate root
pub use core_types::{
    Cents, InvestmentId, OfferingId, OrderId, ShareCount, TradeId, UserId, WithdrawalId,
    PLATFORM_USER_ID,
};
pub use engine::TradeEngine;
pub use error::{MarketError, MarketResult};
pub use fee::{calculate_fee, FeeSchedule, FEE_PRECISION};
pub use market::{MarketTrade, TradeBucket, TradeLog};
pub use marketplace::{HoldingView, Marketplace, WalletSummary};
pub use models::{
    Investment, LedgerRef, Offering, SellOrder, SellOrderStatus, Trade, Withdrawal,
    WithdrawalStatus,
};
pub use orderbook::SellOrderBook;
pub use payout::PayoutDistributor;
pub use registry::ShareRegistry;
pub use wallet::{Wallet, WalletService};
pub use withdrawal::WithdrawalDesk;
