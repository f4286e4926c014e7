//! CrowdStake demo driver
//!
//! Runs a scripted marketplace session end to end:
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌───────────┐    ┌──────────┐
//! │ Deposits │───▶│ Offering │───▶│  Trades   │───▶│ Withdraw │
//! │ (wallet) │    │ (primary)│    │(secondary)│    │ + Payout │
//! └──────────┘    └──────────┘    └───────────┘    └──────────┘
//! ```
//!
//! Every step prints the resulting balances and verifies the ledger
//! reconciles against them.

use anyhow::Context;
use chrono::Utc;
use crowdstake::marketplace::Marketplace;
use crowdstake::PLATFORM_USER_ID;
use uuid::Uuid;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = crowdstake::config::AppConfig::load(&env);
    let _log_guard = crowdstake::logging::init_logging(&app_config);

    tracing::info!("Starting CrowdStake core in {} mode", env);
    println!("=== CrowdStake: Marketplace Demo ===\n");

    let mut mp = Marketplace::new(app_config.fees.schedule());

    const ALICE: u64 = 1;
    const BOB: u64 = 2;

    // Step 1: Fund wallets
    println!("[1] Funding wallets...");
    for (user, amount) in [(ALICE, 2000_00u64), (BOB, 1000_00u64)] {
        let tx = mp
            .initiate_deposit(user, amount, Uuid::new_v4())
            .context("deposit initiation")?;
        mp.confirm_deposit(user, amount, tx).context("deposit confirmation")?;
        println!("    user {} deposited ${}.{:02}", user, amount / 100, amount % 100);
    }

    // Step 2: Create an offering and buy primary shares
    println!("\n[2] Creating offering and investing...");
    let offering = mp
        .create_offering_at("techreview", 1000, 10_00, 10_00, 100_000_00, 2000, Utc::now())
        .context("offering creation")?;
    mp.invest(ALICE, offering, 100).context("primary investment")?;
    println!("    user {} bought 100 primary shares at $10.00", ALICE);

    // Step 3: Secondary market
    println!("\n[3] Trading on the secondary market...");
    let order = mp
        .list_shares(ALICE, offering, 50, 12_00, 1, None)
        .context("listing")?;
    mp.buy_shares(BOB, order, 20).context("trade")?;
    let trades = mp.recent_trades(offering, 1);
    let t = &trades[0];
    let fee = mp.fees().platform_fee(t.total_amount);
    println!(
        "    trade {}: {} shares at $12.00, gross ${}.{:02}, fee ${}.{:02}",
        t.trade_id,
        t.shares,
        t.total_amount / 100,
        t.total_amount % 100,
        fee / 100,
        fee % 100,
    );

    // Step 4: Payout and withdrawal
    println!("\n[4] Distributing revenue and withdrawing...");
    let holding = mp.holdings_of(ALICE)[0].investment_id;
    mp.distribute_payout_at(holding, 50_00, "2025-07", Utc::now())
        .context("payout")?;

    let account = mp.register_bank_account(ALICE, true);
    let now = Utc::now();
    let wid = mp
        .request_withdrawal_at(ALICE, 500_00, account, now)
        .context("withdrawal request")?;
    mp.approve_withdrawal_at(wid, now).context("withdrawal approval")?;
    mp.complete_withdrawal_at(wid, now).context("withdrawal completion")?;
    println!("    withdrawal {} completed", wid);

    // Step 5: Final state
    println!("\n[5] Final balances:");
    for user in [ALICE, BOB, PLATFORM_USER_ID] {
        let summary = mp.wallet_summary(user).context("wallet missing")?;
        println!(
            "    user {:>2}: balance ${:>7}.{:02}  locked ${}.{:02}  reconciled: {}",
            user,
            summary.balance / 100,
            summary.balance % 100,
            summary.locked / 100,
            summary.locked % 100,
            mp.reconcile(user),
        );
    }
    println!(
        "    share conservation: {}",
        mp.check_share_conservation(offering).context("offering missing")?
    );

    println!("\n=== Done ===");
    Ok(())
}
