use chrono::{Duration, Utc};
use crowdstake::marketplace::Marketplace;
use crowdstake::{FeeSchedule, MarketError, PLATFORM_USER_ID};
use uuid::Uuid;

/// Helper: marketplace with a 1000-share offering at $10.00
fn marketplace_with_offering() -> (Marketplace, u64) {
    let mut mp = Marketplace::new(FeeSchedule::default());
    let offering = mp
        .create_offering_at("techreview", 1000, 10_00, 10_00, 100_000_00, 2000, Utc::now())
        .unwrap();
    (mp, offering)
}

/// Helper: deposit and confirm in one step
fn fund(mp: &mut Marketplace, user: u64, amount: u64) {
    let tx = mp.initiate_deposit(user, amount, Uuid::new_v4()).unwrap();
    mp.confirm_deposit(user, amount, tx).unwrap();
}

#[test]
fn qa_tc_trade_settlement_exact_amounts() {
    let (mut mp, offering) = marketplace_with_offering();
    let now = Utc::now();
    fund(&mut mp, 1, 2000_00);
    fund(&mut mp, 2, 1000_00);

    // Seller buys 100 primary (fee free), lists 50 @ $12.00
    mp.invest_at(1, offering, 100, now).unwrap();
    let order = mp.list_shares_at(1, offering, 50, 12_00, 1, None, now).unwrap();

    // Buyer takes 20: gross 240.00, fee 2.5% = 6.00, net 234.00
    mp.buy_shares_at(2, order, 20, now).unwrap();

    assert_eq!(mp.wallet_summary(1).unwrap().balance, 1234_00);
    assert_eq!(mp.wallet_summary(2).unwrap().balance, 760_00);
    assert_eq!(mp.wallet_summary(PLATFORM_USER_ID).unwrap().balance, 6_00);

    // Money conservation: total in equals total held
    let total: u64 = [1, 2, PLATFORM_USER_ID]
        .iter()
        .map(|&u| mp.wallet_summary(u).unwrap().balance)
        .sum();
    assert_eq!(total, 3000_00);

    // Share conservation and ledger reconciliation
    assert!(mp.check_share_conservation(offering).unwrap());
    for user in [1, 2, PLATFORM_USER_ID] {
        assert!(mp.reconcile(user), "ledger mismatch for user {}", user);
    }

    // Holdings moved: 80 / 20
    assert_eq!(mp.holdings_of(1)[0].shares, 80);
    assert_eq!(mp.holdings_of(2)[0].shares, 20);
}

#[test]
fn qa_tc_partial_fill_keeps_order_open() {
    let (mut mp, offering) = marketplace_with_offering();
    let now = Utc::now();
    fund(&mut mp, 1, 1000_00);
    fund(&mut mp, 2, 1000_00);

    mp.invest_at(1, offering, 100, now).unwrap();
    let order = mp.list_shares_at(1, offering, 50, 10_00, 5, None, now).unwrap();

    mp.buy_shares_at(2, order, 20, now).unwrap();
    let o = mp.order(order).unwrap();
    assert_eq!(o.shares_remaining, 30);
    assert!(o.status.is_open());

    // Below the seller's minimum fill
    assert!(matches!(
        mp.buy_shares_at(2, order, 3, now).unwrap_err(),
        MarketError::BelowMinimumFill { .. }
    ));

    // Taking the rest closes the order
    mp.buy_shares_at(2, order, 30, now).unwrap();
    assert!(mp.order(order).unwrap().status.is_terminal());
}

#[test]
fn qa_tc_failed_precondition_has_no_side_effects() {
    let (mut mp, offering) = marketplace_with_offering();
    let now = Utc::now();
    fund(&mut mp, 1, 1000_00);
    fund(&mut mp, 2, 50_00);

    mp.invest_at(1, offering, 100, now).unwrap();
    let order = mp.list_shares_at(1, offering, 50, 12_00, 1, None, now).unwrap();

    // Buyer cannot afford 20 shares
    assert!(matches!(
        mp.buy_shares_at(2, order, 20, now).unwrap_err(),
        MarketError::InsufficientFunds { .. }
    ));

    // Nothing moved
    assert_eq!(mp.wallet_summary(1).unwrap().balance, 0);
    assert_eq!(mp.wallet_summary(2).unwrap().balance, 50_00);
    assert_eq!(mp.order(order).unwrap().shares_remaining, 50);
    assert_eq!(mp.holdings_of(1)[0].shares, 100);
    assert!(mp.holdings_of(2).is_empty());
    assert!(mp.recent_trades(offering, 10).is_empty());
}

#[test]
fn qa_tc_self_trade_rejected() {
    let (mut mp, offering) = marketplace_with_offering();
    let now = Utc::now();
    fund(&mut mp, 1, 2000_00);

    mp.invest_at(1, offering, 100, now).unwrap();
    let order = mp.list_shares_at(1, offering, 50, 12_00, 1, None, now).unwrap();

    assert_eq!(
        mp.buy_shares_at(1, order, 10, now).unwrap_err(),
        MarketError::SelfTradeForbidden
    );
}

#[test]
fn qa_tc_expired_order_cannot_trade() {
    let (mut mp, offering) = marketplace_with_offering();
    let now = Utc::now();
    fund(&mut mp, 1, 1000_00);
    fund(&mut mp, 2, 1000_00);

    mp.invest_at(1, offering, 100, now).unwrap();
    let expiry = now + Duration::hours(1);
    let order = mp
        .list_shares_at(1, offering, 50, 10_00, 1, Some(expiry), now)
        .unwrap();

    // Still live one minute before expiry
    mp.buy_shares_at(2, order, 5, now + Duration::minutes(59)).unwrap();

    // Past expiry the order dies on access
    let late = now + Duration::hours(2);
    assert_eq!(
        mp.buy_shares_at(2, order, 5, late).unwrap_err(),
        MarketError::OrderExpired
    );
    assert!(mp.order(order).unwrap().status.is_terminal());

    // The unsold shares are listable again
    assert_eq!(mp.holdings_of(1)[0].listed_shares, 0);
}

#[test]
fn qa_tc_market_buy_sweeps_price_then_time() {
    let (mut mp, offering) = marketplace_with_offering();
    let now = Utc::now();
    fund(&mut mp, 1, 1000_00);
    fund(&mut mp, 2, 1000_00);
    fund(&mut mp, 3, 2000_00);

    mp.invest_at(1, offering, 60, now).unwrap();
    mp.invest_at(2, offering, 60, now).unwrap();

    // Cheaper order listed later still fills first
    mp.list_shares_at(1, offering, 30, 12_00, 1, None, now).unwrap();
    mp.list_shares_at(2, offering, 30, 11_00, 1, None, now + Duration::seconds(1))
        .unwrap();

    let trades = mp.buy_at_market_at(3, offering, 40, now + Duration::seconds(2)).unwrap();
    assert_eq!(trades.len(), 2);

    let recent = mp.recent_trades(offering, 10);
    // Newest first: second fill was 10 @ 12.00, first was 30 @ 11.00
    assert_eq!(recent[0].price_per_share, 12_00);
    assert_eq!(recent[0].shares, 10);
    assert_eq!(recent[1].price_per_share, 11_00);
    assert_eq!(recent[1].shares, 30);

    assert_eq!(mp.holdings_of(3)[0].shares, 40);
    assert!(mp.check_share_conservation(offering).unwrap());
}

#[test]
fn qa_tc_withdrawal_lifecycle_and_failure_refund() {
    let (mut mp, _offering) = marketplace_with_offering();
    let now = Utc::now();
    fund(&mut mp, 1, 1000_00);
    let account = mp.register_bank_account(1, true);

    // Failure path: full refund, no fee
    let w1 = mp.request_withdrawal_at(1, 400_00, account, now).unwrap();
    mp.approve_withdrawal_at(w1, now).unwrap();
    mp.fail_withdrawal_at(w1, "bank rejected", now).unwrap();
    let summary = mp.wallet_summary(1).unwrap();
    assert_eq!(summary.balance, 1000_00);
    assert_eq!(summary.locked, 0);
    assert_eq!(summary.total_withdrawn, 0);

    // Success path: 1.5% fee on 500.00 = 7.50, net 492.50
    let w2 = mp.request_withdrawal_at(1, 500_00, account, now).unwrap();
    mp.approve_withdrawal_at(w2, now).unwrap();
    mp.complete_withdrawal_at(w2, now).unwrap();
    let summary = mp.wallet_summary(1).unwrap();
    assert_eq!(summary.balance, 500_00);
    assert_eq!(summary.total_withdrawn, 492_50);
    assert!(mp.reconcile(1));

    let history = mp.withdrawals_of(1);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].withdrawal_id, w2);
}

#[test]
fn qa_tc_locked_funds_cannot_be_spent() {
    let (mut mp, offering) = marketplace_with_offering();
    let now = Utc::now();
    fund(&mut mp, 1, 1000_00);
    let account = mp.register_bank_account(1, true);

    mp.request_withdrawal_at(1, 800_00, account, now).unwrap();

    // Only 200.00 available; a 300.00 primary buy must fail
    assert!(matches!(
        mp.invest_at(1, offering, 30, now).unwrap_err(),
        MarketError::InsufficientFunds { .. }
    ));
    mp.invest_at(1, offering, 20, now).unwrap();
}

#[test]
fn qa_tc_payout_idempotent_per_month() {
    let (mut mp, offering) = marketplace_with_offering();
    let now = Utc::now();
    fund(&mut mp, 1, 1000_00);

    let inv = mp.invest_at(1, offering, 100, now).unwrap();
    mp.distribute_payout_at(inv, 42_00, "2025-06", now).unwrap();
    assert_eq!(
        mp.distribute_payout_at(inv, 42_00, "2025-06", now).unwrap_err(),
        MarketError::AlreadyProcessed
    );
    mp.distribute_payout_at(inv, 45_00, "2025-07", now).unwrap();

    let summary = mp.wallet_summary(1).unwrap();
    assert_eq!(summary.balance, 87_00);
    assert_eq!(summary.total_earnings, 87_00);
    assert!(mp.reconcile(1));

    let holdings = mp.holdings_of(1);
    assert_eq!(holdings[0].total_payouts, 87_00);
}

#[test]
fn qa_tc_over_listing_blocked_across_orders() {
    let (mut mp, offering) = marketplace_with_offering();
    let now = Utc::now();
    fund(&mut mp, 1, 1000_00);

    mp.invest_at(1, offering, 100, now).unwrap();
    mp.list_shares_at(1, offering, 70, 11_00, 1, None, now).unwrap();

    // 70 of 100 already listed; a 40-share listing would oversell
    assert!(matches!(
        mp.list_shares_at(1, offering, 40, 12_00, 1, None, now).unwrap_err(),
        MarketError::OverListed { .. }
    ));
    mp.list_shares_at(1, offering, 30, 12_00, 1, None, now).unwrap();
}

#[test]
fn qa_tc_duplicate_deposit_callback_ignored() {
    let (mut mp, _offering) = marketplace_with_offering();
    let payment = Uuid::new_v4();

    let tx = mp.initiate_deposit(1, 100_00, payment).unwrap();
    mp.confirm_deposit(1, 100_00, tx).unwrap();

    // Processor retries the same payment id
    assert_eq!(
        mp.initiate_deposit(1, 100_00, payment).unwrap_err(),
        MarketError::AlreadyProcessed
    );
    // And the same confirmation
    assert_eq!(
        mp.confirm_deposit(1, 100_00, tx).unwrap_err(),
        MarketError::AlreadyProcessed
    );
    assert_eq!(mp.wallet_summary(1).unwrap().balance, 100_00);
}

#[test]
fn qa_tc_transaction_history_pagination() {
    let (mut mp, offering) = marketplace_with_offering();
    let now = Utc::now();
    fund(&mut mp, 1, 1000_00);
    mp.invest_at(1, offering, 10, now).unwrap();
    mp.invest_at(1, offering, 20, now).unwrap();

    let page = mp.transaction_history(1, 0, 2);
    assert_eq!(page.len(), 2);
    // Newest first: the 20-share buy leads
    assert_eq!(page[0].amount, 200_00);

    let rest = mp.transaction_history(1, 2, 10);
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].amount, 1000_00);
}
