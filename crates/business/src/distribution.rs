//! Earning distribution
//!
//! Turns the paid part of a completed spend into earning records: one for
//! the creator, plus agency and chatter records when they have a non-zero
//! share. Bonus credits never reach this module.
//!
//! Runs after the spend has committed. A failure here must never undo or
//! fail the fan's purchase, so fan-facing code goes through
//! `record_or_alert`, which logs an alert instead of returning the error.

use crate::error::{BusinessError, BusinessResult};
use crate::services::ServiceContext;
use chrono::Utc;
use fanledger_core::{
    compute_split, Attribution, ChatterRef, EarningStatus, RecipientType, SpendType, Split,
};
use fanledger_persistence::{CollaboratorRepo, EarningRepo, EarningRow};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

/// Input for one spend event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarningDistributionParams {
    /// Spend transaction id; every earning row points back to it
    pub source_id: String,
    pub spend_type: SpendType,
    pub creator_id: String,
    /// Paid credits taken by the spend
    pub paid_credits_spent: i64,
    pub chatter_id: Option<String>,
    pub ai_personality_id: Option<String>,
    pub attributed_message_id: Option<String>,
}

impl EarningDistributionParams {
    pub fn new(source_id: &str, spend_type: SpendType, creator_id: &str, paid_credits_spent: i64) -> Self {
        Self {
            source_id: source_id.to_string(),
            spend_type,
            creator_id: creator_id.to_string(),
            paid_credits_spent,
            chatter_id: None,
            ai_personality_id: None,
            attributed_message_id: None,
        }
    }

    pub fn with_chatter(mut self, chatter_id: Option<String>) -> Self {
        self.chatter_id = chatter_id;
        self
    }

    pub fn with_ai_personality(mut self, personality_id: Option<String>) -> Self {
        self.ai_personality_id = personality_id;
        self
    }

    pub fn with_message(mut self, message_id: Option<String>) -> Self {
        self.attributed_message_id = message_id;
        self
    }
}

/// Ids written for one distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionOutcome {
    pub split: Split,
    pub creator_earning_id: String,
    pub agency_earning_id: Option<String>,
    pub chatter_earning_id: Option<String>,
}

/// What `record_or_alert` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionStatus {
    Recorded(DistributionOutcome),
    /// No paid credits were spent
    Skipped,
    /// Logged on the alert target; the spend stands
    Failed { reason: String },
}

/// Resolve agency and chatter terms for the creator
async fn resolve_attribution(
    conn: &mut SqliteConnection,
    params: &EarningDistributionParams,
) -> BusinessResult<Attribution> {
    let creator = CollaboratorRepo::get_creator(&mut *conn, &params.creator_id).await?;
    let mut attribution = Attribution::new(params.spend_type, &creator.id);

    let Some(agency_id) = creator.agency_id.as_deref() else {
        return Ok(attribution);
    };
    let agency = CollaboratorRepo::get_agency(&mut *conn, agency_id).await?;
    attribution = attribution.with_agency(&agency.id, agency.rate()?);

    if !params.spend_type.allows_chatter_attribution() {
        return Ok(attribution);
    }

    let chatter = if let Some(chatter_id) = &params.chatter_id {
        let row = CollaboratorRepo::get_chatter(&mut *conn, chatter_id).await?;
        Some((
            row.agency_id.clone(),
            ChatterRef::Human {
                chatter_id: row.id.clone(),
                commission_rate: row.rate()?,
            },
        ))
    } else if let Some(personality_id) = &params.ai_personality_id {
        let row = CollaboratorRepo::get_ai_personality(&mut *conn, personality_id).await?;
        Some((
            row.agency_id.clone(),
            ChatterRef::AiPersona {
                personality_id: row.id.clone(),
                commission_rate: row.rate()?,
            },
        ))
    } else {
        None
    };

    match chatter {
        Some((chatter_agency, chatter)) if chatter_agency == agency.id => {
            Ok(attribution.with_chatter(chatter))
        }
        Some((chatter_agency, chatter)) => {
            tracing::warn!(
                source_id = %params.source_id,
                chatter = chatter.recipient_id(),
                chatter_agency = %chatter_agency,
                creator_agency = %agency.id,
                "chatter belongs to another agency, attribution ignored"
            );
            Ok(attribution)
        }
        None => Ok(attribution),
    }
}

fn earning_row(
    params: &EarningDistributionParams,
    recipient_id: &str,
    creator_earning_id: Option<&str>,
    share_amount: i64,
    commission_rate: Decimal,
    chatter: Option<&ChatterRef>,
) -> EarningRow {
    EarningRow {
        id: uuid::Uuid::new_v4().to_string(),
        recipient_id: recipient_id.to_string(),
        creator_earning_id: creator_earning_id.map(str::to_string),
        source_id: params.source_id.clone(),
        source_type: params.spend_type.as_str().to_string(),
        gross_amount: params.paid_credits_spent,
        share_amount,
        commission_rate: commission_rate.to_string(),
        status: EarningStatus::Pending.as_str().to_string(),
        chatter_id: chatter.and_then(|c| c.chatter_id()).map(str::to_string),
        ai_personality_id: chatter.and_then(|c| c.ai_personality_id()).map(str::to_string),
        attributed_message_id: params.attributed_message_id.clone(),
        created_at: Utc::now(),
        paid_at: None,
    }
}

async fn write_earnings(
    conn: &mut SqliteConnection,
    params: &EarningDistributionParams,
    attribution: &Attribution,
    split: &Split,
    platform_fee_rate: Decimal,
) -> BusinessResult<DistributionOutcome> {
    let chatter = attribution.effective_chatter();

    let creator = earning_row(
        params,
        &attribution.creator_id,
        None,
        split.creator_share,
        platform_fee_rate,
        chatter,
    );
    EarningRepo::insert(&mut *conn, RecipientType::Creator, &creator).await?;

    let mut agency_earning_id = None;
    if let Some(agency) = attribution.agency.as_ref().filter(|_| split.agency_share > 0) {
        let row = earning_row(
            params,
            &agency.agency_id,
            Some(&creator.id),
            split.agency_share,
            agency.commission_rate,
            chatter,
        );
        EarningRepo::insert(&mut *conn, RecipientType::Agency, &row).await?;
        agency_earning_id = Some(row.id);
    }

    let mut chatter_earning_id = None;
    if let Some(chatter_ref) = chatter.filter(|_| split.chatter_share > 0) {
        let row = earning_row(
            params,
            chatter_ref.recipient_id(),
            Some(&creator.id),
            split.chatter_share,
            chatter_ref.commission_rate(),
            chatter,
        );
        EarningRepo::insert(&mut *conn, RecipientType::Chatter, &row).await?;
        chatter_earning_id = Some(row.id);
    }

    Ok(DistributionOutcome {
        split: split.clone(),
        creator_earning_id: creator.id,
        agency_earning_id,
        chatter_earning_id,
    })
}

/// Earning distribution service
pub struct EarningDistributor<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> EarningDistributor<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Split the paid credits of one spend and write the earning records in
    /// a single transaction. `Ok(None)` when no paid credits were spent.
    pub async fn record_earning_distribution(
        &self,
        params: &EarningDistributionParams,
    ) -> BusinessResult<Option<DistributionOutcome>> {
        if params.paid_credits_spent == 0 {
            return Ok(None);
        }

        let policy = self.ctx.commission_policy();
        let outcome = self
            .ctx
            .run_in_transaction(|mut tx| async move {
                let result = async {
                    let attribution = resolve_attribution(&mut tx, params).await?;
                    let split = compute_split(params.paid_credits_spent, &attribution, &policy)?;
                    write_earnings(&mut tx, params, &attribution, &split, policy.platform_fee_rate)
                        .await
                }
                .await;
                (tx, result)
            })
            .await?;

        tracing::info!(
            source_id = %params.source_id,
            creator_id = %params.creator_id,
            paid = params.paid_credits_spent,
            creator_share = outcome.split.creator_share,
            agency_share = outcome.split.agency_share,
            chatter_share = outcome.split.chatter_share,
            platform_share = outcome.split.platform_share,
            "earnings recorded"
        );
        Ok(Some(outcome))
    }

    /// Like `record_earning_distribution`, but failures are logged on the
    /// `fanledger::alert` target and reported as `DistributionStatus::Failed`.
    pub async fn record_or_alert(&self, params: &EarningDistributionParams) -> DistributionStatus {
        match self.record_earning_distribution(params).await {
            Ok(Some(outcome)) => DistributionStatus::Recorded(outcome),
            Ok(None) => DistributionStatus::Skipped,
            Err(err) => {
                let failure = BusinessError::DistributionFailure {
                    source_id: params.source_id.clone(),
                    reason: err.to_string(),
                };
                tracing::error!(
                    target: "fanledger::alert",
                    source_id = %params.source_id,
                    creator_id = %params.creator_id,
                    spend_type = %params.spend_type,
                    paid = params.paid_credits_spent,
                    error = %failure,
                    "earning distribution failed; spend kept, reconcile manually"
                );
                DistributionStatus::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Sum of PENDING earnings for a recipient
    pub async fn pending_total(&self, recipient: RecipientType, recipient_id: &str) -> BusinessResult<i64> {
        Ok(EarningRepo::pending_total(self.ctx.pool(), recipient, recipient_id).await?)
    }

    pub async fn earnings_for_source(
        &self,
        recipient: RecipientType,
        source_id: &str,
    ) -> BusinessResult<Vec<EarningRow>> {
        Ok(EarningRepo::get_by_source(self.ctx.pool(), recipient, source_id).await?)
    }
}
