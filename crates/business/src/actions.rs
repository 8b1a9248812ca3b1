//! Fan actions - tips, PPV unlocks, subscriptions
//!
//! The only entry points that spend credits on a creator. Each one is rate
//! limited per fan, spends under the spend type's policy, writes the access
//! row in the same transaction as the debit and then records the earning
//! split.

use crate::distribution::{DistributionStatus, EarningDistributionParams, EarningDistributor};
use crate::error::{BusinessError, BusinessResult};
use crate::ledger::{apply_spend, SpendOptions, SpendResult};
use crate::services::ServiceContext;
use chrono::{DateTime, Duration, Utc};
use fanledger_core::SpendType;
use fanledger_persistence::{AccessRepo, MessageUnlockRow};
use sqlx::SqliteConnection;

/// Who brought the sale in, if anyone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpendAttribution {
    pub chatter_id: Option<String>,
    pub ai_personality_id: Option<String>,
    /// Chat message that led to the sale
    pub message_id: Option<String>,
}

impl SpendAttribution {
    pub fn chatter(chatter_id: &str) -> Self {
        Self {
            chatter_id: Some(chatter_id.to_string()),
            ..Self::default()
        }
    }

    pub fn ai_persona(personality_id: &str) -> Self {
        Self {
            ai_personality_id: Some(personality_id.to_string()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message_id: &str) -> Self {
        self.message_id = Some(message_id.to_string());
        self
    }

    fn params(&self, spend: &SpendResult, spend_type: SpendType, creator_id: &str) -> EarningDistributionParams {
        EarningDistributionParams::new(&spend.transaction_id, spend_type, creator_id, spend.paid_spent)
            .with_chatter(self.chatter_id.clone())
            .with_ai_personality(self.ai_personality_id.clone())
            .with_message(self.message_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReceipt {
    pub spend: SpendResult,
    pub distribution: DistributionStatus,
    /// Set by `subscribe`
    pub subscription_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked(ActionReceipt),
    /// Already unlocked earlier; nothing was charged
    AlreadyUnlocked,
}

/// Extend (or start) a subscription by `days` from the later of now and
/// its current expiry.
pub(crate) async fn extend_subscription(
    conn: &mut SqliteConnection,
    user_id: &str,
    creator_id: &str,
    days: i64,
) -> BusinessResult<DateTime<Utc>> {
    let now = Utc::now();
    let current = AccessRepo::get_subscription(&mut *conn, user_id, creator_id).await?;
    let start = current
        .map(|s| s.expires_at)
        .filter(|expires| *expires > now)
        .unwrap_or(now);
    let expires_at = start + Duration::days(days);
    AccessRepo::upsert_subscription(&mut *conn, user_id, creator_id, expires_at).await?;
    Ok(expires_at)
}

/// Fan action service
pub struct FanActions<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> FanActions<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    fn check_rate(&self, fan_id: &str) -> BusinessResult<()> {
        let decision = self.ctx.spend_limiter().check(fan_id);
        if decision.allowed {
            return Ok(());
        }
        tracing::warn!(fan_id, reset_in_secs = decision.reset_in.as_secs(), "spend action rate limited");
        Err(BusinessError::RateLimited {
            key: fan_id.to_string(),
            reset_in: decision.reset_in,
        })
    }

    async fn distribute(&self, params: EarningDistributionParams) -> DistributionStatus {
        EarningDistributor::new(self.ctx).record_or_alert(&params).await
    }

    /// Tip a creator (paid credits only)
    pub async fn tip(
        &self,
        fan_id: &str,
        creator_id: &str,
        amount: i64,
        attribution: &SpendAttribution,
    ) -> BusinessResult<ActionReceipt> {
        self.check_rate(fan_id)?;

        let opts = SpendOptions {
            description: Some(format!("tip to {}", creator_id)),
            message_id: attribution.message_id.clone(),
            ..SpendOptions::default()
        };
        let opts = &opts;
        let spend = self
            .ctx
            .run_in_transaction(|mut tx| async move {
                let result = apply_spend(&mut tx, fan_id, amount, SpendType::Tip, opts).await;
                (tx, result)
            })
            .await?;

        tracing::info!(fan_id, creator_id, amount, transaction_id = %spend.transaction_id, "tip sent");
        let distribution = self
            .distribute(attribution.params(&spend, SpendType::Tip, creator_id))
            .await;

        Ok(ActionReceipt {
            spend,
            distribution,
            subscription_expires_at: None,
        })
    }

    /// Unlock a PPV message; charging twice for the same message is refused
    pub async fn unlock_message(
        &self,
        fan_id: &str,
        creator_id: &str,
        message_id: &str,
        price: i64,
        attribution: &SpendAttribution,
    ) -> BusinessResult<UnlockOutcome> {
        self.check_rate(fan_id)?;

        let opts = SpendOptions::default()
            .with_message(message_id)
            .with_description(format!("ppv unlock from {}", creator_id));
        let opts = &opts;
        let spend = self
            .ctx
            .run_in_transaction(|mut tx| async move {
                let result = async {
                    if AccessRepo::is_unlocked(&mut *tx, message_id, fan_id).await? {
                        return Ok(None);
                    }
                    let spend = apply_spend(&mut tx, fan_id, price, SpendType::Ppv, opts).await?;
                    AccessRepo::insert_unlock(
                        &mut *tx,
                        &MessageUnlockRow {
                            message_id: message_id.to_string(),
                            user_id: fan_id.to_string(),
                            payment_id: None,
                            credit_transaction_id: Some(spend.transaction_id.clone()),
                            unlocked_at: Utc::now(),
                        },
                    )
                    .await?;
                    Ok::<_, BusinessError>(Some(spend))
                }
                .await;
                (tx, result)
            })
            .await?;

        let Some(spend) = spend else {
            tracing::debug!(fan_id, message_id, "message already unlocked");
            return Ok(UnlockOutcome::AlreadyUnlocked);
        };

        tracing::info!(fan_id, creator_id, message_id, price, transaction_id = %spend.transaction_id, "message unlocked");
        let mut attribution = attribution.clone();
        if attribution.message_id.is_none() {
            attribution.message_id = Some(message_id.to_string());
        }
        let distribution = self
            .distribute(attribution.params(&spend, SpendType::Ppv, creator_id))
            .await;

        Ok(UnlockOutcome::Unlocked(ActionReceipt {
            spend,
            distribution,
            subscription_expires_at: None,
        }))
    }

    /// Subscribe to a creator for `days`; extends an active subscription
    pub async fn subscribe(
        &self,
        fan_id: &str,
        creator_id: &str,
        price: i64,
        days: i64,
    ) -> BusinessResult<ActionReceipt> {
        if days <= 0 {
            return Err(BusinessError::InvalidAmount(format!(
                "Subscription length must be positive: {} days",
                days
            )));
        }
        self.check_rate(fan_id)?;

        let opts = SpendOptions::default().with_description(format!("subscription to {} for {} days", creator_id, days));
        let opts = &opts;
        let (spend, expires_at) = self
            .ctx
            .run_in_transaction(|mut tx| async move {
                let result = async {
                    let spend = apply_spend(&mut tx, fan_id, price, SpendType::Subscription, opts).await?;
                    let expires_at = extend_subscription(&mut tx, fan_id, creator_id, days).await?;
                    Ok::<_, BusinessError>((spend, expires_at))
                }
                .await;
                (tx, result)
            })
            .await?;

        tracing::info!(fan_id, creator_id, price, %expires_at, "subscription active");
        // Subscriptions never carry chatter attribution
        let distribution = self
            .distribute(SpendAttribution::default().params(&spend, SpendType::Subscription, creator_id))
            .await;

        Ok(ActionReceipt {
            spend,
            distribution,
            subscription_expires_at: Some(expires_at),
        })
    }

    pub async fn has_active_subscription(&self, fan_id: &str, creator_id: &str) -> BusinessResult<bool> {
        let subscription = AccessRepo::get_subscription(self.ctx.pool(), fan_id, creator_id).await?;
        Ok(subscription.map_or(false, |s| s.expires_at > Utc::now()))
    }

    pub async fn is_unlocked(&self, fan_id: &str, message_id: &str) -> BusinessResult<bool> {
        Ok(AccessRepo::is_unlocked(self.ctx.pool(), message_id, fan_id).await?)
    }
}
