//! Repository implementations cho SQLite
//!
//! Mỗi hàm nhận một `Executor` để có thể chạy trên pool hoặc bên trong
//! một transaction (`&mut *tx`).

use crate::error::{PersistenceError, PersistenceResult};
use crate::sqlite::schema::*;
use chrono::{DateTime, Utc};
use fanledger_core::{CreditBalances, QueueStatus, RecipientType};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Executor, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Balance Repository
// ============================================================================

/// Repository cho credit_balances table
pub struct BalanceRepo;

impl BalanceRepo {
    /// Lấy balance row của user
    pub async fn get<'e, E>(executor: E, user_id: &str) -> PersistenceResult<Option<BalanceRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, BalanceRow>("SELECT * FROM credit_balances WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    /// Tạo balance row rỗng nếu chưa có
    pub async fn ensure<'e, E>(executor: E, user_id: &str) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT OR IGNORE INTO credit_balances (user_id, paid_credits, bonus_credits, version, updated_at)
             VALUES (?, 0, 0, 0, ?)",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Compare-and-swap: chỉ ghi nếu version chưa đổi kể từ lúc đọc.
    ///
    /// Trả về `false` khi có writer khác đã ghi trước.
    pub async fn compare_and_set<'e, E>(
        executor: E,
        user_id: &str,
        expected_version: i64,
        balances: CreditBalances,
    ) -> PersistenceResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE credit_balances
            SET paid_credits = ?, bonus_credits = ?, version = version + 1, updated_at = ?
            WHERE user_id = ? AND version = ?
            "#,
        )
        .bind(balances.paid)
        .bind(balances.bonus)
        .bind(Utc::now())
        .bind(user_id)
        .bind(expected_version)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// Credit Transaction Repository
// ============================================================================

/// Repository cho credit_transactions table (append-only, không có update/delete)
pub struct CreditTransactionRepo;

impl CreditTransactionRepo {
    /// Thêm transaction mới, trả về `seq` do SQLite gán
    pub async fn insert<'e, E>(executor: E, tx: &CreditTransactionRow) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO credit_transactions
                (id, user_id, amount, paid_amount, bonus_amount, balance_after, paid_after, bonus_after,
                 tx_type, description, media_id, message_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.user_id)
        .bind(tx.amount)
        .bind(tx.paid_amount)
        .bind(tx.bonus_amount)
        .bind(tx.balance_after)
        .bind(tx.paid_after)
        .bind(tx.bonus_after)
        .bind(&tx.tx_type)
        .bind(&tx.description)
        .bind(&tx.media_id)
        .bind(&tx.message_id)
        .bind(tx.created_at)
        .execute(executor)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Lấy transaction theo ID
    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> PersistenceResult<CreditTransactionRow>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, CreditTransactionRow>("SELECT * FROM credit_transactions WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| PersistenceError::not_found("CreditTransaction", id))
    }

    /// Lịch sử giao dịch, mới nhất trước
    pub async fn get_recent<'e, E>(
        executor: E,
        user_id: &str,
        limit: i64,
    ) -> PersistenceResult<Vec<CreditTransactionRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, CreditTransactionRow>(
            "SELECT * FROM credit_transactions WHERE user_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Toàn bộ log của user theo thứ tự tạo (dùng cho replay)
    pub async fn get_ordered<'e, E>(
        executor: E,
        user_id: &str,
    ) -> PersistenceResult<Vec<CreditTransactionRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, CreditTransactionRow>(
            "SELECT * FROM credit_transactions WHERE user_id = ? ORDER BY seq ASC",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Đếm transactions
    pub async fn count<'e, E>(executor: E) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM credit_transactions")
            .fetch_one(executor)
            .await?;
        Ok(row.0)
    }
}

// ============================================================================
// Collaborator Repository (agencies, creators, chatters, AI personalities)
// ============================================================================

/// Repository cho cấu hình commission của creator / agency / chatter.
///
/// Các bảng này thuộc về hệ thống quản trị bên ngoài; ledger chỉ đọc.
/// Các hàm upsert dùng cho CLI seed và tests.
pub struct CollaboratorRepo;

impl CollaboratorRepo {
    pub async fn upsert_agency<'e, E>(
        executor: E,
        id: &str,
        name: &str,
        commission_rate: Decimal,
    ) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO agencies (id, name, commission_rate) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                commission_rate = excluded.commission_rate
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(commission_rate.to_string())
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn upsert_creator<'e, E>(
        executor: E,
        id: &str,
        slug: &str,
        agency_id: Option<&str>,
    ) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO creators (id, slug, agency_id) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                slug = excluded.slug,
                agency_id = excluded.agency_id
            "#,
        )
        .bind(id)
        .bind(slug)
        .bind(agency_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn upsert_chatter<'e, E>(
        executor: E,
        id: &str,
        agency_id: &str,
        commission_rate: Decimal,
    ) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO chatters (id, agency_id, commission_rate) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                agency_id = excluded.agency_id,
                commission_rate = excluded.commission_rate
            "#,
        )
        .bind(id)
        .bind(agency_id)
        .bind(commission_rate.to_string())
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn upsert_ai_personality<'e, E>(
        executor: E,
        id: &str,
        agency_id: &str,
        commission_rate: Decimal,
    ) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO ai_personalities (id, agency_id, commission_rate) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                agency_id = excluded.agency_id,
                commission_rate = excluded.commission_rate
            "#,
        )
        .bind(id)
        .bind(agency_id)
        .bind(commission_rate.to_string())
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Lấy creator theo ID
    pub async fn get_creator<'e, E>(executor: E, id: &str) -> PersistenceResult<CreatorRow>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, CreatorRow>("SELECT * FROM creators WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Creator", id))
    }

    /// Lấy creator theo slug
    pub async fn get_creator_by_slug<'e, E>(executor: E, slug: &str) -> PersistenceResult<CreatorRow>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, CreatorRow>("SELECT * FROM creators WHERE slug = ?")
            .bind(slug)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Creator", slug))
    }

    pub async fn get_agency<'e, E>(executor: E, id: &str) -> PersistenceResult<AgencyRow>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, AgencyRow>("SELECT * FROM agencies WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Agency", id))
    }

    pub async fn get_chatter<'e, E>(executor: E, id: &str) -> PersistenceResult<ChatterRow>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ChatterRow>("SELECT * FROM chatters WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Chatter", id))
    }

    pub async fn get_ai_personality<'e, E>(executor: E, id: &str) -> PersistenceResult<ChatterRow>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ChatterRow>("SELECT * FROM ai_personalities WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| PersistenceError::not_found("AiPersonality", id))
    }
}

// ============================================================================
// Earning Repository
// ============================================================================

/// Repository cho creator_earnings / agency_earnings / chatter_earnings.
///
/// Ba bảng có cùng cấu trúc cột; `RecipientType::table()` chọn bảng.
pub struct EarningRepo;

impl EarningRepo {
    /// Thêm earning record
    pub async fn insert<'e, E>(
        executor: E,
        recipient: RecipientType,
        row: &EarningRow,
    ) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            r#"
            INSERT INTO {}
                (id, recipient_id, creator_earning_id, source_id, source_type, gross_amount, share_amount,
                 commission_rate, status, chatter_id, ai_personality_id, attributed_message_id, created_at, paid_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            recipient.table()
        );
        sqlx::query(&sql)
            .bind(&row.id)
            .bind(&row.recipient_id)
            .bind(&row.creator_earning_id)
            .bind(&row.source_id)
            .bind(&row.source_type)
            .bind(row.gross_amount)
            .bind(row.share_amount)
            .bind(&row.commission_rate)
            .bind(&row.status)
            .bind(&row.chatter_id)
            .bind(&row.ai_personality_id)
            .bind(&row.attributed_message_id)
            .bind(row.created_at)
            .bind(row.paid_at)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Lấy earnings sinh ra từ một spend event
    pub async fn get_by_source<'e, E>(
        executor: E,
        recipient: RecipientType,
        source_id: &str,
    ) -> PersistenceResult<Vec<EarningRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT * FROM {} WHERE source_id = ? ORDER BY created_at",
            recipient.table()
        );
        let rows = sqlx::query_as::<_, EarningRow>(&sql)
            .bind(source_id)
            .fetch_all(executor)
            .await?;
        Ok(rows)
    }

    /// Lấy earnings của một người nhận
    pub async fn get_by_recipient<'e, E>(
        executor: E,
        recipient: RecipientType,
        recipient_id: &str,
    ) -> PersistenceResult<Vec<EarningRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT * FROM {} WHERE recipient_id = ? ORDER BY created_at DESC",
            recipient.table()
        );
        let rows = sqlx::query_as::<_, EarningRow>(&sql)
            .bind(recipient_id)
            .fetch_all(executor)
            .await?;
        Ok(rows)
    }

    /// Tổng earnings đang PENDING của một người nhận
    pub async fn pending_total<'e, E>(
        executor: E,
        recipient: RecipientType,
        recipient_id: &str,
    ) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT COALESCE(SUM(share_amount), 0) FROM {} WHERE recipient_id = ? AND status = 'PENDING'",
            recipient.table()
        );
        let row: (i64,) = sqlx::query_as(&sql)
            .bind(recipient_id)
            .fetch_one(executor)
            .await?;
        Ok(row.0)
    }

    /// PENDING -> PAID. Đây là mutation duy nhất được phép trên earning record.
    pub async fn mark_paid<'e, E>(
        executor: E,
        recipient: RecipientType,
        id: &str,
        paid_at: DateTime<Utc>,
    ) -> PersistenceResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "UPDATE {} SET status = 'PAID', paid_at = ? WHERE id = ? AND status = 'PENDING'",
            recipient.table()
        );
        let result = sqlx::query(&sql)
            .bind(paid_at)
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn count<'e, E>(executor: E, recipient: RecipientType) -> PersistenceResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT COUNT(*) FROM {}", recipient.table());
        let row: (i64,) = sqlx::query_as(&sql).fetch_one(executor).await?;
        Ok(row.0)
    }
}

// ============================================================================
// Payment Repository
// ============================================================================

/// Repository cho payments table
pub struct PaymentRepo;

impl PaymentRepo {
    /// Insert nếu idempotency key `(provider, provider_tx_id)` chưa tồn tại.
    ///
    /// Trả về `false` khi key đã có (UNIQUE constraint quyết định, không
    /// phải một lần SELECT trước đó).
    pub async fn insert_if_absent<'e, E>(executor: E, payment: &PaymentRow) -> PersistenceResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO payments
                (id, user_id, amount_usd, amount_crypto, crypto_currency, credits, provider, provider_tx_id,
                 status, payment_type, metadata, created_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(provider, provider_tx_id) DO NOTHING
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.user_id)
        .bind(&payment.amount_usd)
        .bind(&payment.amount_crypto)
        .bind(&payment.crypto_currency)
        .bind(payment.credits)
        .bind(&payment.provider)
        .bind(&payment.provider_tx_id)
        .bind(&payment.status)
        .bind(&payment.payment_type)
        .bind(&payment.metadata)
        .bind(payment.created_at)
        .bind(payment.completed_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Lấy payment theo idempotency key
    pub async fn get_by_provider_tx<'e, E>(
        executor: E,
        provider: &str,
        provider_tx_id: &str,
    ) -> PersistenceResult<Option<PaymentRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE provider = ? AND provider_tx_id = ?",
        )
        .bind(provider)
        .bind(provider_tx_id)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// Lấy payment theo ID
    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> PersistenceResult<PaymentRow>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Payment", id))
    }

    /// PENDING -> COMPLETED. `false` nếu payment không còn PENDING.
    pub async fn mark_completed<'e, E>(
        executor: E,
        id: &str,
        completed_at: DateTime<Utc>,
    ) -> PersistenceResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE payments SET status = 'COMPLETED', completed_at = ? WHERE id = ? AND status = 'PENDING'",
        )
        .bind(completed_at)
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// PENDING -> FAILED. `false` nếu payment không còn PENDING.
    pub async fn mark_failed<'e, E>(executor: E, id: &str) -> PersistenceResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result =
            sqlx::query("UPDATE payments SET status = 'FAILED' WHERE id = ? AND status = 'PENDING'")
                .bind(id)
                .execute(executor)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Lấy payments của user
    pub async fn get_by_user<'e, E>(executor: E, user_id: &str) -> PersistenceResult<Vec<PaymentRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }
}

// ============================================================================
// Access Repository (message unlocks, subscriptions)
// ============================================================================

/// Repository cho message_unlocks và subscriptions
pub struct AccessRepo;

impl AccessRepo {
    /// Ghi nhận unlock; `false` nếu user đã unlock message này rồi
    pub async fn insert_unlock<'e, E>(executor: E, unlock: &MessageUnlockRow) -> PersistenceResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO message_unlocks
                (message_id, user_id, payment_id, credit_transaction_id, unlocked_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&unlock.message_id)
        .bind(&unlock.user_id)
        .bind(&unlock.payment_id)
        .bind(&unlock.credit_transaction_id)
        .bind(unlock.unlocked_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn is_unlocked<'e, E>(executor: E, message_id: &str, user_id: &str) -> PersistenceResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM message_unlocks WHERE message_id = ? AND user_id = ?",
        )
        .bind(message_id)
        .bind(user_id)
        .fetch_one(executor)
        .await?;
        Ok(row.0 > 0)
    }

    pub async fn get_subscription<'e, E>(
        executor: E,
        user_id: &str,
        creator_id: &str,
    ) -> PersistenceResult<Option<SubscriptionRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions WHERE user_id = ? AND creator_id = ?",
        )
        .bind(user_id)
        .bind(creator_id)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// Upsert subscription với expires_at mới
    pub async fn upsert_subscription<'e, E>(
        executor: E,
        user_id: &str,
        creator_id: &str,
        expires_at: DateTime<Utc>,
    ) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, creator_id, expires_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, creator_id) DO UPDATE SET
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(creator_id)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(())
    }
}

// ============================================================================
// Accounting Queue Repository
// ============================================================================

/// Repository cho accounting_queue table
pub struct AccountingQueueRepo;

impl AccountingQueueRepo {
    pub async fn insert<'e, E>(executor: E, entry: &AccountingQueueRow) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO accounting_queue
                (id, payment_id, payload, status, attempts, last_error, next_retry_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.payment_id)
        .bind(&entry.payload)
        .bind(&entry.status)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.next_retry_at)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> PersistenceResult<AccountingQueueRow>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, AccountingQueueRow>("SELECT * FROM accounting_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| PersistenceError::not_found("AccountingQueueEntry", id))
    }

    /// Entries đến hạn retry: PENDING, next_retry_at <= now, attempts < max
    pub async fn get_due<'e, E>(
        executor: E,
        now: i64,
        max_attempts: i64,
        limit: i64,
    ) -> PersistenceResult<Vec<AccountingQueueRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, AccountingQueueRow>(
            r#"
            SELECT * FROM accounting_queue
            WHERE status = 'PENDING' AND next_retry_at <= ? AND attempts < ?
            ORDER BY next_retry_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// PENDING -> PROCESSING. `lease_until` là thời điểm entry được coi là bị
    /// bỏ rơi nếu vẫn còn PROCESSING.
    pub async fn claim<'e, E>(executor: E, id: &str, lease_until: i64) -> PersistenceResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE accounting_queue
            SET status = 'PROCESSING', next_retry_at = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(lease_until)
        .bind(Utc::now())
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// PROCESSING -> COMPLETED
    pub async fn mark_completed<'e, E>(executor: E, id: &str, attempts: i64) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            UPDATE accounting_queue
            SET status = 'COMPLETED', attempts = ?, last_error = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(attempts)
        .bind(Utc::now())
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// PROCESSING -> PENDING (retry sau) hoặc FAILED (hết lượt)
    pub async fn record_failure<'e, E>(
        executor: E,
        id: &str,
        status: QueueStatus,
        attempts: i64,
        last_error: &str,
        next_retry_at: i64,
    ) -> PersistenceResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            UPDATE accounting_queue
            SET status = ?, attempts = ?, last_error = ?, next_retry_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(attempts)
        .bind(last_error)
        .bind(next_retry_at)
        .bind(Utc::now())
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Trả các entry PROCESSING đã hết lease về PENDING (process chết giữa chừng)
    pub async fn requeue_expired<'e, E>(executor: E, now: i64) -> PersistenceResult<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE accounting_queue
            SET status = 'PENDING', updated_at = ?
            WHERE status = 'PROCESSING' AND next_retry_at <= ?
            "#,
        )
        .bind(Utc::now())
        .bind(now)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_by_status<'e, E>(
        executor: E,
        status: QueueStatus,
    ) -> PersistenceResult<Vec<AccountingQueueRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, AccountingQueueRow>(
            "SELECT * FROM accounting_queue WHERE status = ? ORDER BY created_at",
        )
        .bind(status.as_str())
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Số entry theo từng status
    pub async fn count_by_status<'e, E>(executor: E) -> PersistenceResult<Vec<(String, i64)>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM accounting_queue GROUP BY status")
                .fetch_all(executor)
                .await?;
        Ok(rows)
    }
}

// ============================================================================
// Database initialization
// ============================================================================

/// Khởi tạo connection pool cho file database (WAL, busy timeout 5s)
pub async fn create_pool(database_url: &str) -> PersistenceResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// In-memory database cho tests.
///
/// Mỗi connection của `sqlite::memory:` là một database riêng, nên pool chỉ
/// giữ đúng một connection và không bao giờ đóng nó.
pub async fn create_memory_pool() -> PersistenceResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Chạy migrations
pub async fn run_migrations(pool: &SqlitePool) -> PersistenceResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Tạo database mới với schema
pub async fn init_database(database_url: &str) -> PersistenceResult<SqlitePool> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
