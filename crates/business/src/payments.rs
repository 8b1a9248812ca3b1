//! Payment intake
//!
//! Provider webhooks (Stripe, MoonPay, PayGate, MixPay) are normalized into
//! a `PaymentCompletion` before reaching this module. Intake is idempotent
//! on `(provider, provider_tx_id)`: the UNIQUE key decides which delivery
//! creates the record and the `WHERE status = 'PENDING'` claim decides which
//! delivery grants credits. Every other delivery is `AlreadyProcessed`.

use crate::accounting::AccountingExporter;
use crate::actions::extend_subscription;
use crate::distribution::{EarningDistributionParams, EarningDistributor};
use crate::error::{BusinessError, BusinessResult};
use crate::ledger::{apply_grant, apply_spend, AddCreditsOptions, SpendOptions, SpendResult};
use crate::services::ServiceContext;
use chrono::Utc;
use fanledger_core::{GrantType, PaymentProvider, PaymentStatus, PaymentType, SpendType};
use fanledger_persistence::{AccessRepo, MessageUnlockRow, PaymentRepo, PaymentRow, PersistenceError};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

/// A payment as reported by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    pub provider: PaymentProvider,
    /// Provider's transaction id; idempotency key together with `provider`
    pub provider_tx_id: String,
    pub user_id: String,
    /// Credits granted on completion
    pub credits: i64,
    pub amount_usd: Decimal,
    pub amount_crypto: Option<Decimal>,
    pub crypto_currency: Option<String>,
    pub payment_type: PaymentType,
    pub metadata: serde_json::Value,
}

impl PaymentIntent {
    fn to_row(&self) -> PaymentRow {
        PaymentRow {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            amount_usd: self.amount_usd.to_string(),
            amount_crypto: self.amount_crypto.map(|a| a.to_string()),
            crypto_currency: self.crypto_currency.clone(),
            credits: self.credits,
            provider: self.provider.as_str().to_string(),
            provider_tx_id: self.provider_tx_id.clone(),
            status: PaymentStatus::Pending.as_str().to_string(),
            payment_type: self.payment_type.as_str().to_string(),
            metadata: self.metadata.to_string(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// What a completed payment buys besides the credits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionAction {
    /// Credits only
    CreditPurchase,
    /// Direct PPV purchase: `price` of the granted credits unlock the message
    UnlockMessage {
        message_id: String,
        creator_id: String,
        price: i64,
    },
    /// Direct subscription purchase: all granted credits pay for `days`
    ActivateSubscription { creator_id: String, days: i64 },
}

/// Normalized "payment succeeded" notification
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentCompletion {
    pub intent: PaymentIntent,
    pub action: CompletionAction,
}

/// Result of `complete_payment`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Completed {
        payment_id: String,
        /// The PURCHASE grant; `None` for zero-credit payments
        credit_transaction_id: Option<String>,
    },
    /// Duplicate delivery; nothing was granted
    AlreadyProcessed { payment_id: String },
}

impl IntakeOutcome {
    pub fn payment_id(&self) -> &str {
        match self {
            IntakeOutcome::Completed { payment_id, .. }
            | IntakeOutcome::AlreadyProcessed { payment_id } => payment_id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IntakeOutcome::AlreadyProcessed { .. })
    }
}

/// Spend made on behalf of a direct product payment
struct ProductSpend {
    spend: SpendResult,
    spend_type: SpendType,
    creator_id: String,
    message_id: Option<String>,
}

enum Claim {
    Completed {
        payment: PaymentRow,
        grant_id: Option<String>,
        product: Option<ProductSpend>,
    },
    Duplicate {
        payment_id: String,
    },
}

fn validate(completion: &PaymentCompletion) -> BusinessResult<()> {
    let credits = completion.intent.credits;
    if credits < 0 {
        return Err(BusinessError::InvalidAmount(format!(
            "Payment credits must not be negative: {}",
            credits
        )));
    }
    match &completion.action {
        CompletionAction::CreditPurchase => Ok(()),
        CompletionAction::UnlockMessage { price, .. } if *price <= 0 || *price > credits => {
            Err(BusinessError::InvalidAmount(format!(
                "Unlock price {} must be positive and covered by the {} credits purchased",
                price, credits
            )))
        }
        CompletionAction::ActivateSubscription { days, .. } if *days <= 0 || credits == 0 => {
            Err(BusinessError::InvalidAmount(format!(
                "Subscription payment needs positive days ({}) and credits ({})",
                days, credits
            )))
        }
        _ => Ok(()),
    }
}

async fn fulfil_action(
    conn: &mut SqliteConnection,
    payment: &PaymentRow,
    action: &CompletionAction,
) -> BusinessResult<Option<ProductSpend>> {
    let now = Utc::now();
    match action {
        CompletionAction::CreditPurchase => Ok(None),
        CompletionAction::UnlockMessage {
            message_id,
            creator_id,
            price,
        } => {
            if AccessRepo::is_unlocked(&mut *conn, message_id, &payment.user_id).await? {
                tracing::warn!(
                    payment_id = %payment.id,
                    message_id = %message_id,
                    "message already unlocked, purchased credits stay on the balance"
                );
                return Ok(None);
            }

            let opts = SpendOptions::default().with_message(message_id.as_str());
            let spend = apply_spend(&mut *conn, &payment.user_id, *price, SpendType::Ppv, &opts).await?;
            AccessRepo::insert_unlock(
                &mut *conn,
                &MessageUnlockRow {
                    message_id: message_id.clone(),
                    user_id: payment.user_id.clone(),
                    payment_id: Some(payment.id.clone()),
                    credit_transaction_id: Some(spend.transaction_id.clone()),
                    unlocked_at: now,
                },
            )
            .await?;

            Ok(Some(ProductSpend {
                spend,
                spend_type: SpendType::Ppv,
                creator_id: creator_id.clone(),
                message_id: Some(message_id.clone()),
            }))
        }
        CompletionAction::ActivateSubscription { creator_id, days } => {
            let opts = SpendOptions::default().with_description(format!("subscription {} days", days));
            let spend = apply_spend(
                &mut *conn,
                &payment.user_id,
                payment.credits,
                SpendType::Subscription,
                &opts,
            )
            .await?;
            extend_subscription(&mut *conn, &payment.user_id, creator_id, *days).await?;

            Ok(Some(ProductSpend {
                spend,
                spend_type: SpendType::Subscription,
                creator_id: creator_id.clone(),
                message_id: None,
            }))
        }
    }
}

async fn claim_and_fulfil(
    conn: &mut SqliteConnection,
    completion: &PaymentCompletion,
) -> BusinessResult<Claim> {
    let intent = &completion.intent;
    let provider = intent.provider.as_str();

    if PaymentRepo::insert_if_absent(&mut *conn, &intent.to_row()).await? {
        tracing::debug!(provider, provider_tx_id = %intent.provider_tx_id, "payment record created");
    }
    let mut payment = PaymentRepo::get_by_provider_tx(&mut *conn, provider, &intent.provider_tx_id)
        .await?
        .ok_or_else(|| PersistenceError::not_found("Payment", &intent.provider_tx_id))?;

    match payment.payment_status()? {
        PaymentStatus::Completed => {
            return Ok(Claim::Duplicate {
                payment_id: payment.id,
            })
        }
        PaymentStatus::Failed => {
            return Err(BusinessError::InvalidPaymentState {
                payment_id: payment.id,
                status: payment.status,
            })
        }
        PaymentStatus::Pending => {}
    }

    // A pre-created intent fixes who is paid and how much
    if payment.user_id != intent.user_id || payment.credits != intent.credits {
        return Err(BusinessError::PaymentMismatch {
            payment_id: payment.id,
            expected: format!("user {} / {} credits", payment.user_id, payment.credits),
            received: format!("user {} / {} credits", intent.user_id, intent.credits),
        });
    }

    let now = Utc::now();
    if !PaymentRepo::mark_completed(&mut *conn, &payment.id, now).await? {
        return Ok(Claim::Duplicate {
            payment_id: payment.id,
        });
    }
    payment.status = PaymentStatus::Completed.as_str().to_string();
    payment.completed_at = Some(now);

    let grant_id = if payment.credits > 0 {
        let opts = AddCreditsOptions::default()
            .with_description(format!("{} payment {}", provider, intent.provider_tx_id));
        let grant = apply_grant(&mut *conn, &payment.user_id, payment.credits, GrantType::Purchase, &opts).await?;
        Some(grant.transaction_id)
    } else {
        None
    };

    let product = fulfil_action(conn, &payment, &completion.action).await?;

    Ok(Claim::Completed {
        payment,
        grant_id,
        product,
    })
}

/// Payment intake service
pub struct PaymentIntake<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> PaymentIntake<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Record a PENDING payment ahead of the provider's confirmation.
    ///
    /// Returns the existing record when the idempotency key is already known.
    pub async fn create_pending_payment(&self, intent: &PaymentIntent) -> BusinessResult<PaymentRow> {
        let pool = self.ctx.pool();
        let created = PaymentRepo::insert_if_absent(pool, &intent.to_row()).await?;
        let payment = PaymentRepo::get_by_provider_tx(pool, intent.provider.as_str(), &intent.provider_tx_id)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Payment", &intent.provider_tx_id))?;

        tracing::info!(
            payment_id = %payment.id,
            provider = %intent.provider,
            provider_tx_id = %intent.provider_tx_id,
            created,
            "pending payment recorded"
        );
        Ok(payment)
    }

    /// Complete a payment exactly once.
    ///
    /// Credit grant, product fulfilment and the status flip commit together.
    /// The accounting export and earning distribution run afterwards and
    /// never change the outcome.
    pub async fn complete_payment(&self, completion: &PaymentCompletion) -> BusinessResult<IntakeOutcome> {
        validate(completion)?;

        let claim = self
            .ctx
            .run_in_transaction(|mut tx| async move {
                let result = claim_and_fulfil(&mut tx, completion).await;
                (tx, result)
            })
            .await?;

        let (payment, grant_id, product) = match claim {
            Claim::Duplicate { payment_id } => {
                tracing::info!(
                    payment_id = %payment_id,
                    provider = %completion.intent.provider,
                    provider_tx_id = %completion.intent.provider_tx_id,
                    "duplicate payment notification ignored"
                );
                return Ok(IntakeOutcome::AlreadyProcessed { payment_id });
            }
            Claim::Completed {
                payment,
                grant_id,
                product,
            } => (payment, grant_id, product),
        };

        tracing::info!(
            payment_id = %payment.id,
            user_id = %payment.user_id,
            provider = %payment.provider,
            credits = payment.credits,
            "payment completed"
        );

        if let Err(e) = AccountingExporter::new(self.ctx).export_payment(&payment).await {
            tracing::error!(
                target: "fanledger::alert",
                payment_id = %payment.id,
                error = %e,
                "accounting export could not be sent or queued"
            );
        }

        if let Some(product) = product {
            let params = EarningDistributionParams::new(
                &product.spend.transaction_id,
                product.spend_type,
                &product.creator_id,
                product.spend.paid_spent,
            )
            .with_message(product.message_id);
            EarningDistributor::new(self.ctx).record_or_alert(&params).await;
        }

        Ok(IntakeOutcome::Completed {
            payment_id: payment.id,
            credit_transaction_id: grant_id,
        })
    }

    /// PENDING -> FAILED; `false` when the payment had already settled
    pub async fn fail_payment(&self, provider: PaymentProvider, provider_tx_id: &str) -> BusinessResult<bool> {
        let pool = self.ctx.pool();
        let payment = PaymentRepo::get_by_provider_tx(pool, provider.as_str(), provider_tx_id)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Payment", provider_tx_id))?;

        let failed = PaymentRepo::mark_failed(pool, &payment.id).await?;
        if failed {
            tracing::info!(payment_id = %payment.id, provider = %provider, provider_tx_id, "payment failed");
        } else {
            tracing::warn!(payment_id = %payment.id, status = %payment.status, "failure notification for settled payment ignored");
        }
        Ok(failed)
    }

    pub async fn get_payment(&self, provider: PaymentProvider, provider_tx_id: &str) -> BusinessResult<Option<PaymentRow>> {
        Ok(PaymentRepo::get_by_provider_tx(self.ctx.pool(), provider.as_str(), provider_tx_id).await?)
    }

    pub async fn payments_for_user(&self, user_id: &str) -> BusinessResult<Vec<PaymentRow>> {
        Ok(PaymentRepo::get_by_user(self.ctx.pool(), user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn completion(credits: i64, action: CompletionAction) -> PaymentCompletion {
        PaymentCompletion {
            intent: PaymentIntent {
                provider: PaymentProvider::Stripe,
                provider_tx_id: "cs_1".into(),
                user_id: "fan_1".into(),
                credits,
                amount_usd: dec!(10),
                amount_crypto: None,
                crypto_currency: None,
                payment_type: PaymentType::CreditPurchase,
                metadata: serde_json::Value::Null,
            },
            action,
        }
    }

    #[test]
    fn test_validate_rejects_uncovered_unlock_price() {
        let action = CompletionAction::UnlockMessage {
            message_id: "m1".into(),
            creator_id: "c1".into(),
            price: 150,
        };
        assert!(matches!(
            validate(&completion(100, action)),
            Err(BusinessError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_validate_subscription_needs_days() {
        let action = CompletionAction::ActivateSubscription {
            creator_id: "c1".into(),
            days: 0,
        };
        assert!(validate(&completion(100, action)).is_err());
        assert!(validate(&completion(100, CompletionAction::CreditPurchase)).is_ok());
        assert!(validate(&completion(-1, CompletionAction::CreditPurchase)).is_err());
    }

    #[test]
    fn test_intent_row_starts_pending() {
        let row = completion(100, CompletionAction::CreditPurchase).intent.to_row();
        assert_eq!(row.status, "PENDING");
        assert_eq!(row.provider, "stripe");
        assert_eq!(row.amount_usd, "10");
        assert!(row.completed_at.is_none());
    }
}
