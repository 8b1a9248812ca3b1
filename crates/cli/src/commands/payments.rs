//! Payment intake commands

use anyhow::{Context, Result};
use fanledger_business::{
    CompletionAction, IntakeOutcome, PaymentCompletion, PaymentIntake, PaymentIntent, ServiceContext,
};
use fanledger_core::PaymentType;
use fanledger_persistence::PaymentRow;

use crate::{PaymentAction, PaymentArgs};

/// Handle payment subcommands
pub async fn handle(ctx: &ServiceContext, action: PaymentAction) -> Result<()> {
    let intake = PaymentIntake::new(ctx);

    match action {
        PaymentAction::Create { payment } => {
            let intent = to_intent(&payment, PaymentType::CreditPurchase)?;
            let row = intake.create_pending_payment(&intent).await?;
            println!("✅ Payment {} recorded ({})", row.id, row.status);
        }

        PaymentAction::Complete {
            payment,
            unlock_message,
            subscribe_days,
            creator,
        } => {
            let action = match (unlock_message, subscribe_days, creator) {
                (Some(message_id), _, Some(creator_id)) => CompletionAction::UnlockMessage {
                    message_id,
                    creator_id,
                    price: payment.credits,
                },
                (None, Some(days), Some(creator_id)) => {
                    CompletionAction::ActivateSubscription { creator_id, days }
                }
                _ => CompletionAction::CreditPurchase,
            };
            let payment_type = match action {
                CompletionAction::CreditPurchase => PaymentType::CreditPurchase,
                CompletionAction::UnlockMessage { .. } => PaymentType::PpvUnlock,
                CompletionAction::ActivateSubscription { .. } => PaymentType::Subscription,
            };

            let completion = PaymentCompletion {
                intent: to_intent(&payment, payment_type)?,
                action,
            };
            match intake.complete_payment(&completion).await? {
                IntakeOutcome::Completed {
                    payment_id,
                    credit_transaction_id,
                } => {
                    println!("✅ Payment {} completed", payment_id);
                    if let Some(tx) = credit_transaction_id {
                        println!("   Credit transaction: {}", tx);
                    }
                }
                IntakeOutcome::AlreadyProcessed { payment_id } => {
                    println!("ℹ️  Payment {} was already processed; nothing granted", payment_id);
                }
            }
        }

        PaymentAction::Fail {
            provider,
            provider_tx_id,
        } => {
            if intake.fail_payment(provider.to_core_type(), &provider_tx_id).await? {
                println!("✅ Payment {} marked failed", provider_tx_id);
            } else {
                println!("ℹ️  Payment {} is not pending; left unchanged", provider_tx_id);
            }
        }

        PaymentAction::List { user_id } => {
            let payments = intake.payments_for_user(&user_id).await?;
            if payments.is_empty() {
                println!("No payments for {}", user_id);
            }
            for payment in &payments {
                print_payment(payment);
            }
        }
    }

    Ok(())
}

fn to_intent(args: &PaymentArgs, payment_type: PaymentType) -> Result<PaymentIntent> {
    let metadata = serde_json::from_str(&args.metadata).context("--metadata is not valid JSON")?;
    Ok(PaymentIntent {
        provider: args.provider.to_core_type(),
        provider_tx_id: args.provider_tx_id.clone(),
        user_id: args.user_id.clone(),
        credits: args.credits,
        amount_usd: args.usd,
        amount_crypto: args.crypto,
        crypto_currency: args.currency.clone(),
        payment_type,
        metadata,
    })
}

fn print_payment(payment: &PaymentRow) {
    println!(
        "{} {:<8} {:<24} {:<10} {:<16} {:>6} credits  ${}",
        payment.created_at.format("%Y-%m-%d %H:%M"),
        payment.provider,
        payment.provider_tx_id,
        payment.status,
        payment.payment_type,
        payment.credits,
        payment.amount_usd
    );
}
