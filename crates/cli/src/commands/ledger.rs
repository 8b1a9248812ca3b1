//! Balance, history, grant, spend and replay commands

use anyhow::{bail, Result};
use fanledger_business::{AddCreditsOptions, LedgerService, ServiceContext, SpendOptions};
use fanledger_core::CreditType;

use crate::{GrantTypeArg, SpendTypeArg};

pub async fn balance(ctx: &ServiceContext, user_id: &str) -> Result<()> {
    let balances = LedgerService::new(ctx).get_credit_balances(user_id).await?;

    println!("💰 Credits for {}", user_id);
    println!("   Paid:  {}", balances.paid);
    println!("   Bonus: {}", balances.bonus);
    println!("   Total: {}", balances.total());
    Ok(())
}

pub async fn history(ctx: &ServiceContext, user_id: &str, limit: i64) -> Result<()> {
    let rows = LedgerService::new(ctx).transaction_history(user_id, limit).await?;
    if rows.is_empty() {
        println!("No transactions for {}", user_id);
        return Ok(());
    }

    println!(
        "{:<20} {:<18} {:>8} {:>8} {:>8}  {}",
        "TIME", "TYPE", "PAID", "BONUS", "BALANCE", "DESCRIPTION"
    );
    for tx in rows {
        println!(
            "{:<20} {:<18} {:>8} {:>8} {:>8}  {}",
            tx.created_at.format("%Y-%m-%d %H:%M:%S"),
            tx.tx_type,
            tx.paid_amount,
            tx.bonus_amount,
            tx.balance_after,
            tx.description.unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn grant(
    ctx: &ServiceContext,
    user_id: &str,
    amount: i64,
    grant_type: GrantTypeArg,
    bonus: bool,
    description: Option<String>,
) -> Result<()> {
    let mut opts = AddCreditsOptions::default();
    if bonus {
        opts = opts.with_credit_type(CreditType::Bonus);
    }
    if let Some(description) = description {
        opts = opts.with_description(description);
    }

    let result = LedgerService::new(ctx)
        .add_credits(user_id, amount, grant_type.to_core_type(), opts)
        .await?;

    println!("✅ Granted {} credits to {}", amount, user_id);
    println!("   Transaction: {}", result.transaction_id);
    println!("   Balance:     {}", result.new_balance);
    Ok(())
}

pub async fn spend(
    ctx: &ServiceContext,
    user_id: &str,
    amount: i64,
    spend_type: SpendTypeArg,
    paid_only: bool,
    media: Option<String>,
) -> Result<()> {
    let mut opts = SpendOptions::default();
    if paid_only {
        opts = opts.paid_only();
    }
    if let Some(media) = media {
        opts = opts.with_media(media);
    }

    let result = LedgerService::new(ctx)
        .spend_credits(user_id, amount, spend_type.to_core_type(), opts)
        .await?;

    println!("✅ Spent {} credits", amount);
    println!("   Transaction: {}", result.transaction_id);
    println!("   Paid/bonus:  {} / {}", result.paid_spent, result.bonus_spent);
    println!("   Balance:     {}", result.new_balance);
    Ok(())
}

pub async fn replay(ctx: &ServiceContext, user_id: &str) -> Result<()> {
    let report = LedgerService::new(ctx).verify_replay(user_id).await?;

    println!("🔍 Replay of {} ({} transactions)", user_id, report.transaction_count);
    println!("   Replayed: {}", report.replayed);
    println!("   Stored:   {}", report.stored);

    if report.is_consistent() {
        println!("✅ Ledger consistent");
        return Ok(());
    }
    for id in &report.snapshot_mismatches {
        println!("   ⚠️  snapshot mismatch at {}", id);
    }
    bail!("Ledger for {} does not replay to the stored balance", user_id)
}
