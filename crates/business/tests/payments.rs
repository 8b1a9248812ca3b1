//! Payment intake integration tests: idempotency, fulfilment, export hand-off

mod common;

use common::{seed_collaborators, ScriptedClient, MANAGED_CREATOR, SOLO_CREATOR};
use fanledger_business::{
    AccountingExporter, AddCreditsOptions, BusinessError, CompletionAction, ConfigLoader,
    FanActions, IntakeOutcome, LedgerService, PaymentCompletion, PaymentIntake, PaymentIntent,
    ServiceContext,
};
use fanledger_core::{
    CreditBalances, GrantType, PaymentProvider, PaymentType, QueueStatus, RecipientType,
};
use fanledger_persistence::{AccessRepo, CreditTransactionRepo, Database, EarningRepo, PaymentRepo};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::TempDir;

fn intent(provider_tx_id: &str, credits: i64) -> PaymentIntent {
    PaymentIntent {
        provider: PaymentProvider::Stripe,
        provider_tx_id: provider_tx_id.to_string(),
        user_id: "fan_1".to_string(),
        credits,
        amount_usd: dec!(9.99),
        amount_crypto: None,
        crypto_currency: None,
        payment_type: PaymentType::CreditPurchase,
        metadata: serde_json::json!({ "package": "starter" }),
    }
}

fn purchase(provider_tx_id: &str, credits: i64) -> PaymentCompletion {
    PaymentCompletion {
        intent: intent(provider_tx_id, credits),
        action: CompletionAction::CreditPurchase,
    }
}

#[tokio::test]
async fn test_duplicate_webhook_grants_once() {
    let ctx = common::context().await;
    let intake = PaymentIntake::new(&ctx);
    let completion = purchase("cs_dup", 500);

    let first = intake.complete_payment(&completion).await.unwrap();
    let second = intake.complete_payment(&completion).await.unwrap();

    assert!(matches!(first, IntakeOutcome::Completed { credit_transaction_id: Some(_), .. }));
    assert_eq!(second, IntakeOutcome::AlreadyProcessed {
        payment_id: first.payment_id().to_string()
    });

    let ledger = LedgerService::new(&ctx);
    assert_eq!(ledger.get_credit_balances("fan_1").await.unwrap(), CreditBalances::new(500, 0));
    assert_eq!(CreditTransactionRepo::count(ctx.pool()).await.unwrap(), 1);
}

/// File-backed database so the deliveries really race on the UNIQUE key
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_grant_once() {
    let temp_dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", temp_dir.path().join("ledger.db").display());
    let db = Database::connect(&url).await.unwrap();
    let config = ConfigLoader::load_str("[ledger]\nmax_cas_retries = 20").unwrap();
    let ctx = Arc::new(ServiceContext::new(&db, config).unwrap());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let ctx = Arc::clone(&ctx);
        handles.push(tokio::spawn(async move {
            PaymentIntake::new(&ctx).complete_payment(&purchase("cs_race", 300)).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(outcomes.iter().filter(|o| !o.is_duplicate()).count(), 1);
    assert!(outcomes.iter().all(|o| o.payment_id() == outcomes[0].payment_id()));
    assert_eq!(
        LedgerService::new(&ctx).get_credit_balances("fan_1").await.unwrap(),
        CreditBalances::new(300, 0)
    );
    assert_eq!(CreditTransactionRepo::count(ctx.pool()).await.unwrap(), 1);
    assert_eq!(PaymentRepo::get_by_user(ctx.pool(), "fan_1").await.unwrap().len(), 1);

    db.close().await;
}

#[tokio::test]
async fn test_pending_intent_then_completion() {
    let ctx = common::context().await;
    let intake = PaymentIntake::new(&ctx);

    let pending = intake.create_pending_payment(&intent("mp_1", 250)).await.unwrap();
    assert_eq!(pending.status, "PENDING");
    let again = intake.create_pending_payment(&intent("mp_1", 250)).await.unwrap();
    assert_eq!(again.id, pending.id);

    let outcome = intake.complete_payment(&purchase("mp_1", 250)).await.unwrap();
    assert_eq!(outcome.payment_id(), pending.id);

    let stored = PaymentRepo::get_by_id(ctx.pool(), &pending.id).await.unwrap();
    assert_eq!(stored.status, "COMPLETED");
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn test_completion_disagreeing_with_pending_intent_is_rejected() {
    let ctx = common::context().await;
    let intake = PaymentIntake::new(&ctx);
    let ledger = LedgerService::new(&ctx);
    ledger.add_credits("fan_1", 80, GrantType::Purchase, AddCreditsOptions::default()).await.unwrap();

    let pending = intake.create_pending_payment(&intent("cs_ppv_50", 50)).await.unwrap();

    let completion = PaymentCompletion {
        intent: PaymentIntent {
            payment_type: PaymentType::PpvUnlock,
            ..intent("cs_ppv_50", 100)
        },
        action: CompletionAction::UnlockMessage {
            message_id: "msg_9".to_string(),
            creator_id: SOLO_CREATOR.to_string(),
            price: 100,
        },
    };
    for _ in 0..2 {
        let err = intake.complete_payment(&completion).await.unwrap_err();
        assert!(matches!(err, BusinessError::PaymentMismatch { ref payment_id, .. } if *payment_id == pending.id));
    }

    // Existing credits untouched, nothing unlocked
    assert_eq!(ledger.get_credit_balances("fan_1").await.unwrap(), CreditBalances::new(80, 0));
    assert!(!AccessRepo::is_unlocked(ctx.pool(), "msg_9", "fan_1").await.unwrap());

    let mut other_fan = purchase("cs_ppv_50", 50);
    other_fan.intent.user_id = "fan_2".to_string();
    assert!(matches!(
        intake.complete_payment(&other_fan).await.unwrap_err(),
        BusinessError::PaymentMismatch { .. }
    ));

    // The notification matching the recorded intent still goes through
    let outcome = intake.complete_payment(&purchase("cs_ppv_50", 50)).await.unwrap();
    assert_eq!(outcome.payment_id(), pending.id);
    assert_eq!(ledger.get_credit_balances("fan_1").await.unwrap(), CreditBalances::new(130, 0));
}

#[tokio::test]
async fn test_failed_payment_cannot_complete() {
    let ctx = common::context().await;
    let intake = PaymentIntake::new(&ctx);

    intake.create_pending_payment(&intent("pg_1", 100)).await.unwrap();
    assert!(intake.fail_payment(PaymentProvider::Stripe, "pg_1").await.unwrap());
    assert!(!intake.fail_payment(PaymentProvider::Stripe, "pg_1").await.unwrap());

    let err = intake.complete_payment(&purchase("pg_1", 100)).await.unwrap_err();
    assert!(matches!(err, BusinessError::InvalidPaymentState { .. }));
    assert_eq!(
        LedgerService::new(&ctx).get_credit_balances("fan_1").await.unwrap(),
        CreditBalances::default()
    );
}

#[tokio::test]
async fn test_completed_payment_ignores_failure_notice() {
    let ctx = common::context().await;
    let intake = PaymentIntake::new(&ctx);

    intake.complete_payment(&purchase("cs_ok", 100)).await.unwrap();
    assert!(!intake.fail_payment(PaymentProvider::Stripe, "cs_ok").await.unwrap());

    let payment = intake.get_payment(PaymentProvider::Stripe, "cs_ok").await.unwrap().unwrap();
    assert_eq!(payment.status, "COMPLETED");
}

#[tokio::test]
async fn test_same_tx_id_different_provider_is_distinct() {
    let ctx = common::context().await;
    let intake = PaymentIntake::new(&ctx);

    intake.complete_payment(&purchase("tx_1", 100)).await.unwrap();
    let mut other = purchase("tx_1", 100);
    other.intent.provider = PaymentProvider::MoonPay;
    other.intent.amount_crypto = Some(dec!(0.0042));
    other.intent.crypto_currency = Some("BTC".to_string());
    let outcome = intake.complete_payment(&other).await.unwrap();

    assert!(!outcome.is_duplicate());
    assert_eq!(intake.payments_for_user("fan_1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_direct_ppv_payment_unlocks_and_distributes() {
    let ctx = common::context().await;
    seed_collaborators(&ctx).await;
    let intake = PaymentIntake::new(&ctx);

    let completion = PaymentCompletion {
        intent: PaymentIntent {
            payment_type: PaymentType::PpvUnlock,
            ..intent("cs_ppv", 100)
        },
        action: CompletionAction::UnlockMessage {
            message_id: "msg_42".to_string(),
            creator_id: MANAGED_CREATOR.to_string(),
            price: 100,
        },
    };
    let outcome = intake.complete_payment(&completion).await.unwrap();

    assert!(AccessRepo::is_unlocked(ctx.pool(), "msg_42", "fan_1").await.unwrap());
    assert_eq!(
        LedgerService::new(&ctx).get_credit_balances("fan_1").await.unwrap(),
        CreditBalances::default()
    );
    assert_eq!(EarningRepo::pending_total(ctx.pool(), RecipientType::Creator, MANAGED_CREATOR).await.unwrap(), 67);

    // Re-delivery neither charges nor unlocks again
    let again = intake.complete_payment(&completion).await.unwrap();
    assert!(again.is_duplicate());
    assert_eq!(again.payment_id(), outcome.payment_id());
    assert_eq!(CreditTransactionRepo::count(ctx.pool()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_subscription_payment_activates_access() {
    let ctx = common::context().await;
    seed_collaborators(&ctx).await;
    let intake = PaymentIntake::new(&ctx);

    let completion = PaymentCompletion {
        intent: PaymentIntent {
            payment_type: PaymentType::Subscription,
            ..intent("cs_sub", 120)
        },
        action: CompletionAction::ActivateSubscription {
            creator_id: SOLO_CREATOR.to_string(),
            days: 30,
        },
    };
    intake.complete_payment(&completion).await.unwrap();

    assert!(FanActions::new(&ctx).has_active_subscription("fan_1", SOLO_CREATOR).await.unwrap());
    // 120 - 5% fee (6)
    assert_eq!(EarningRepo::pending_total(ctx.pool(), RecipientType::Creator, SOLO_CREATOR).await.unwrap(), 114);
}

#[tokio::test]
async fn test_completion_exports_to_accounting() {
    let client = ScriptedClient::succeeding();
    let ctx = common::context().await.with_accounting_client(client.clone());

    let outcome = PaymentIntake::new(&ctx).complete_payment(&purchase("cs_exp", 100)).await.unwrap();

    assert_eq!(client.calls(), 1);
    let payload = &client.received()[0];
    assert_eq!(payload.external_id, outcome.payment_id());
    assert_eq!(payload.status, "COMPLETED");
    assert_eq!(payload.amount_usd, dec!(9.99));
    assert_eq!(payload.metadata["package"], "starter");

    let stats = AccountingExporter::new(&ctx).queue_stats().await.unwrap();
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_export_failure_does_not_fail_intake() {
    let client = ScriptedClient::failing();
    let ctx = common::context().await.with_accounting_client(client.clone());

    let outcome = PaymentIntake::new(&ctx).complete_payment(&purchase("cs_down", 100)).await.unwrap();
    assert!(!outcome.is_duplicate());
    assert_eq!(LedgerService::new(&ctx).get_credit_balances("fan_1").await.unwrap().paid, 100);

    let queued = AccountingExporter::new(&ctx).list_by_status(QueueStatus::Pending).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].payment_id, outcome.payment_id());
    assert_eq!(queued[0].attempts, 1);
}
