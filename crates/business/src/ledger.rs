//! Ledger service - balances, grants, spends
//!
//! Every balance change is one sqlx transaction that does a
//! compare-and-swap on `credit_balances.version` and appends the matching
//! row to `credit_transactions`. A lost swap aborts the transaction and
//! `ServiceContext::run_in_transaction` re-runs it against fresh state.
//!
//! `apply_grant` / `apply_spend` run inside a caller's transaction so other
//! writes (payment status, unlock rows) commit or roll back with the debit.

use crate::error::{BusinessError, BusinessResult};
use crate::services::ServiceContext;
use chrono::Utc;
use fanledger_core::{CreditBalances, CreditType, GrantType, SpendType, TransactionType};
use fanledger_persistence::{
    BalanceRepo, CreditTransactionRepo, CreditTransactionRow, PersistenceError,
};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

/// Options for `add_credits`
#[derive(Debug, Clone, Default)]
pub struct AddCreditsOptions {
    /// Overrides the grant type's natural credit class
    pub credit_type: Option<CreditType>,
    pub description: Option<String>,
    pub media_id: Option<String>,
    pub message_id: Option<String>,
}

impl AddCreditsOptions {
    pub fn with_credit_type(mut self, credit_type: CreditType) -> Self {
        self.credit_type = Some(credit_type);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Options for `spend_credits`
#[derive(Debug, Clone, Default)]
pub struct SpendOptions {
    /// `Some(false)` forbids bonus even where the spend policy allows it.
    /// Never widens the policy.
    pub allow_bonus: Option<bool>,
    pub description: Option<String>,
    pub media_id: Option<String>,
    pub message_id: Option<String>,
}

impl SpendOptions {
    pub fn paid_only(mut self) -> Self {
        self.allow_bonus = Some(false);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_message(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_media(mut self, media_id: impl Into<String>) -> Self {
        self.media_id = Some(media_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCreditsResult {
    pub new_balance: CreditBalances,
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendResult {
    pub new_balance: CreditBalances,
    pub paid_spent: i64,
    pub bonus_spent: i64,
    pub transaction_id: String,
}

/// Outcome of replaying a user's transaction log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub user_id: String,
    pub transaction_count: usize,
    /// Balances obtained by summing the log
    pub replayed: CreditBalances,
    /// Balances in `credit_balances`
    pub stored: CreditBalances,
    /// Transactions whose `*_after` snapshot disagrees with the running sum
    pub snapshot_mismatches: Vec<String>,
}

impl ReplayReport {
    pub fn is_consistent(&self) -> bool {
        self.replayed == self.stored && self.snapshot_mismatches.is_empty()
    }
}

/// Whether a spend of this type may draw bonus credits
pub fn effective_allow_bonus(spend_type: SpendType, opts: &SpendOptions) -> bool {
    spend_type.allows_bonus() && opts.allow_bonus.unwrap_or(true)
}

fn new_transaction_row(
    user_id: &str,
    paid_delta: i64,
    bonus_delta: i64,
    after: CreditBalances,
    tx_type: TransactionType,
    description: Option<String>,
    media_id: Option<String>,
    message_id: Option<String>,
) -> CreditTransactionRow {
    CreditTransactionRow {
        seq: 0,
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        amount: paid_delta + bonus_delta,
        paid_amount: paid_delta,
        bonus_amount: bonus_delta,
        balance_after: after.total(),
        paid_after: after.paid,
        bonus_after: after.bonus,
        tx_type: tx_type.as_str().to_string(),
        description,
        media_id,
        message_id,
        created_at: Utc::now(),
    }
}

async fn load_for_update(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> BusinessResult<(CreditBalances, i64)> {
    // First statement is a write, so SQLite takes the write lock up front
    BalanceRepo::ensure(&mut *conn, user_id).await?;
    let row = BalanceRepo::get(&mut *conn, user_id)
        .await?
        .ok_or_else(|| PersistenceError::not_found("CreditBalance", user_id))?;
    Ok((row.balances(), row.version))
}

/// Increment a balance and log the grant on an open transaction
pub async fn apply_grant(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    grant_type: GrantType,
    opts: &AddCreditsOptions,
) -> BusinessResult<AddCreditsResult> {
    if amount <= 0 {
        return Err(BusinessError::InvalidAmount(format!(
            "Grant amount must be positive: {}",
            amount
        )));
    }

    let (current, version) = load_for_update(conn, user_id).await?;
    if current.total().checked_add(amount).is_none() {
        return Err(BusinessError::InvalidAmount(format!(
            "Grant of {} would overflow the balance",
            amount
        )));
    }

    let credit_type = opts
        .credit_type
        .unwrap_or_else(|| grant_type.default_credit_type());
    let (paid_delta, bonus_delta) = match credit_type {
        CreditType::Paid => (amount, 0),
        CreditType::Bonus => (0, amount),
    };
    let new_balance = current.apply(paid_delta, bonus_delta);

    if !BalanceRepo::compare_and_set(&mut *conn, user_id, version, new_balance).await? {
        return Err(BusinessError::Contention {
            user_id: user_id.to_string(),
        });
    }

    let row = new_transaction_row(
        user_id,
        paid_delta,
        bonus_delta,
        new_balance,
        grant_type.into(),
        opts.description.clone(),
        opts.media_id.clone(),
        opts.message_id.clone(),
    );
    CreditTransactionRepo::insert(&mut *conn, &row).await?;

    Ok(AddCreditsResult {
        new_balance,
        transaction_id: row.id,
    })
}

/// Check sufficiency, decrement and log the spend on an open transaction.
///
/// Bonus is drawn first when the spend type allows it.
pub async fn apply_spend(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    spend_type: SpendType,
    opts: &SpendOptions,
) -> BusinessResult<SpendResult> {
    if amount <= 0 {
        return Err(BusinessError::InvalidAmount(format!(
            "Spend amount must be positive: {}",
            amount
        )));
    }

    let (current, version) = load_for_update(conn, user_id).await?;
    let (paid_spent, bonus_spent) =
        current.plan_spend(amount, effective_allow_bonus(spend_type, opts))?;
    let new_balance = current.apply(-paid_spent, -bonus_spent);

    if !BalanceRepo::compare_and_set(&mut *conn, user_id, version, new_balance).await? {
        return Err(BusinessError::Contention {
            user_id: user_id.to_string(),
        });
    }

    let row = new_transaction_row(
        user_id,
        -paid_spent,
        -bonus_spent,
        new_balance,
        spend_type.into(),
        opts.description.clone(),
        opts.media_id.clone(),
        opts.message_id.clone(),
    );
    CreditTransactionRepo::insert(&mut *conn, &row).await?;

    Ok(SpendResult {
        new_balance,
        paid_spent,
        bonus_spent,
        transaction_id: row.id,
    })
}

/// Ledger Service - balance reads and credit movements
pub struct LedgerService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> LedgerService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Current balances; zero for a user with no history
    pub async fn get_credit_balances(&self, user_id: &str) -> BusinessResult<CreditBalances> {
        let row = BalanceRepo::get(self.ctx.pool(), user_id).await?;
        Ok(row.map(|r| r.balances()).unwrap_or_default())
    }

    /// Advisory pre-check for UI; `spend_credits` re-checks atomically
    pub async fn has_enough_credits(
        &self,
        user_id: &str,
        amount: i64,
        spend_type: SpendType,
    ) -> BusinessResult<bool> {
        let balances = self.get_credit_balances(user_id).await?;
        Ok(balances.spendable(spend_type.allows_bonus()) >= amount)
    }

    pub async fn add_credits(
        &self,
        user_id: &str,
        amount: i64,
        grant_type: GrantType,
        opts: AddCreditsOptions,
    ) -> BusinessResult<AddCreditsResult> {
        let opts = &opts;
        let result = self
            .ctx
            .run_in_transaction(|mut tx| async move {
                let result = apply_grant(&mut tx, user_id, amount, grant_type, opts).await;
                (tx, result)
            })
            .await?;

        tracing::info!(
            user_id,
            amount,
            tx_type = %grant_type,
            transaction_id = %result.transaction_id,
            balance = %result.new_balance,
            "credits added"
        );
        Ok(result)
    }

    pub async fn spend_credits(
        &self,
        user_id: &str,
        amount: i64,
        spend_type: SpendType,
        opts: SpendOptions,
    ) -> BusinessResult<SpendResult> {
        let opts = &opts;
        let outcome = self
            .ctx
            .run_in_transaction(|mut tx| async move {
                let result = apply_spend(&mut tx, user_id, amount, spend_type, opts).await;
                (tx, result)
            })
            .await;

        match &outcome {
            Ok(result) => tracing::info!(
                user_id,
                amount,
                spend_type = %spend_type,
                paid_spent = result.paid_spent,
                bonus_spent = result.bonus_spent,
                transaction_id = %result.transaction_id,
                "credits spent"
            ),
            Err(BusinessError::InsufficientCredits { shortfall, .. }) => {
                tracing::debug!(user_id, amount, spend_type = %spend_type, shortfall, "spend rejected")
            }
            Err(e) => tracing::warn!(user_id, amount, spend_type = %spend_type, error = %e, "spend failed"),
        }
        outcome
    }

    /// Most recent transactions first
    pub async fn transaction_history(
        &self,
        user_id: &str,
        limit: i64,
    ) -> BusinessResult<Vec<CreditTransactionRow>> {
        Ok(CreditTransactionRepo::get_recent(self.ctx.pool(), user_id, limit).await?)
    }

    /// Replay the log in creation order and compare with the balance row
    pub async fn verify_replay(&self, user_id: &str) -> BusinessResult<ReplayReport> {
        let mut tx = self.ctx.pool().begin().await?;
        let log = CreditTransactionRepo::get_ordered(&mut *tx, user_id).await?;
        let stored = BalanceRepo::get(&mut *tx, user_id)
            .await?
            .map(|r| r.balances())
            .unwrap_or_default();
        tx.commit().await?;

        let mut replayed = CreditBalances::default();
        let mut snapshot_mismatches = Vec::new();
        for row in &log {
            replayed = replayed.apply(row.paid_amount, row.bonus_amount);
            let snapshot_ok = row.amount == row.paid_amount + row.bonus_amount
                && row.paid_after == replayed.paid
                && row.bonus_after == replayed.bonus
                && row.balance_after == replayed.total();
            if !snapshot_ok {
                snapshot_mismatches.push(row.id.clone());
            }
        }

        let report = ReplayReport {
            user_id: user_id.to_string(),
            transaction_count: log.len(),
            replayed,
            stored,
            snapshot_mismatches,
        };
        if !report.is_consistent() {
            tracing::error!(
                target: "fanledger::alert",
                user_id,
                replayed = %report.replayed,
                stored = %report.stored,
                mismatches = report.snapshot_mismatches.len(),
                "ledger replay does not match stored balance"
            );
        }
        Ok(report)
    }
}
