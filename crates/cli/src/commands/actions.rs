//! Tip, unlock and subscribe commands

use anyhow::Result;
use fanledger_business::{
    ActionReceipt, DistributionStatus, FanActions, ServiceContext, SpendAttribution, UnlockOutcome,
};

use crate::AttributionArgs;

impl AttributionArgs {
    fn to_attribution(&self) -> SpendAttribution {
        SpendAttribution {
            chatter_id: self.chatter.clone(),
            ai_personality_id: self.ai_persona.clone(),
            message_id: self.message.clone(),
        }
    }
}

fn print_receipt(receipt: &ActionReceipt) {
    println!("   Transaction: {}", receipt.spend.transaction_id);
    println!("   Balance:     {}", receipt.spend.new_balance);
    match &receipt.distribution {
        DistributionStatus::Recorded(outcome) => {
            let split = &outcome.split;
            println!(
                "   Split:       creator {} / agency {} / chatter {} / platform {}",
                split.creator_share, split.agency_share, split.chatter_share, split.platform_share
            );
        }
        DistributionStatus::Skipped => println!("   Split:       none (no paid credits)"),
        DistributionStatus::Failed { reason } => {
            println!("   ⚠️  Earnings not recorded: {}", reason);
        }
    }
}

pub async fn tip(
    ctx: &ServiceContext,
    fan_id: &str,
    creator_id: &str,
    amount: i64,
    attribution: &AttributionArgs,
) -> Result<()> {
    let receipt = FanActions::new(ctx)
        .tip(fan_id, creator_id, amount, &attribution.to_attribution())
        .await?;

    println!("✅ {} tipped {} {} credits", fan_id, creator_id, amount);
    print_receipt(&receipt);
    Ok(())
}

pub async fn unlock(
    ctx: &ServiceContext,
    fan_id: &str,
    creator_id: &str,
    message_id: &str,
    price: i64,
    attribution: &AttributionArgs,
) -> Result<()> {
    let outcome = FanActions::new(ctx)
        .unlock_message(fan_id, creator_id, message_id, price, &attribution.to_attribution())
        .await?;

    match outcome {
        UnlockOutcome::Unlocked(receipt) => {
            println!("✅ {} unlocked {}", fan_id, message_id);
            print_receipt(&receipt);
        }
        UnlockOutcome::AlreadyUnlocked => {
            println!("ℹ️  {} already unlocked {}; nothing charged", fan_id, message_id);
        }
    }
    Ok(())
}

pub async fn subscribe(
    ctx: &ServiceContext,
    fan_id: &str,
    creator_id: &str,
    price: i64,
    days: i64,
) -> Result<()> {
    let receipt = FanActions::new(ctx).subscribe(fan_id, creator_id, price, days).await?;

    println!("✅ {} subscribed to {}", fan_id, creator_id);
    if let Some(expires_at) = receipt.subscription_expires_at {
        println!("   Expires:     {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    print_receipt(&receipt);
    Ok(())
}
