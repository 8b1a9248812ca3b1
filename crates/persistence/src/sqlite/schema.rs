//! Database schema definitions
//!
//! Row types cho sqlx mapping từ SQLite tables.
//! Schema được định nghĩa trong migrations/20261001000000_init.sql

use crate::error::{PersistenceError, PersistenceResult};
use chrono::{DateTime, Utc};
use fanledger_core::{
    CreditBalances, EarningStatus, PaymentProvider, PaymentStatus, PaymentType, QueueStatus,
    TransactionType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Parse Decimal lưu dạng TEXT
pub fn parse_decimal(value: &str) -> PersistenceResult<Decimal> {
    Decimal::from_str(value).map_err(|e| PersistenceError::InvalidDecimal(format!("{}: {}", value, e)))
}

/// Row type cho bảng `credit_balances`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BalanceRow {
    pub user_id: String,
    pub paid_credits: i64,
    pub bonus_credits: i64,
    /// Tăng mỗi lần ghi, dùng cho compare-and-swap
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl BalanceRow {
    pub fn balances(&self) -> CreditBalances {
        CreditBalances::new(self.paid_credits, self.bonus_credits)
    }
}

/// Row type cho bảng `credit_transactions` (append-only)
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CreditTransactionRow {
    /// Thứ tự tạo, do SQLite gán
    pub seq: i64,
    pub id: String,
    pub user_id: String,
    /// Tổng delta có dấu (paid_amount + bonus_amount)
    pub amount: i64,
    pub paid_amount: i64,
    pub bonus_amount: i64,
    /// Tổng balance sau giao dịch
    pub balance_after: i64,
    pub paid_after: i64,
    pub bonus_after: i64,
    pub tx_type: String,
    pub description: Option<String>,
    pub media_id: Option<String>,
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CreditTransactionRow {
    pub fn transaction_type(&self) -> PersistenceResult<TransactionType> {
        TransactionType::from_str(&self.tx_type)
            .ok_or_else(|| PersistenceError::invalid_enum("tx_type", &self.tx_type))
    }
}

/// Row type cho bảng `agencies`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AgencyRow {
    pub id: String,
    pub name: String,
    pub commission_rate: String, // Decimal stored as TEXT
}

impl AgencyRow {
    pub fn rate(&self) -> PersistenceResult<Decimal> {
        parse_decimal(&self.commission_rate)
    }
}

/// Row type cho bảng `creators`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CreatorRow {
    pub id: String,
    pub slug: String,
    pub agency_id: Option<String>,
}

/// Row type cho bảng `chatters` và `ai_personalities`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ChatterRow {
    pub id: String,
    pub agency_id: String,
    pub commission_rate: String, // Decimal stored as TEXT
}

impl ChatterRow {
    pub fn rate(&self) -> PersistenceResult<Decimal> {
        parse_decimal(&self.commission_rate)
    }
}

/// Row type chung cho `creator_earnings`, `agency_earnings`, `chatter_earnings`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct EarningRow {
    pub id: String,
    pub recipient_id: String,
    /// NULL với creator earning, trỏ về creator earning với agency/chatter
    pub creator_earning_id: Option<String>,
    pub source_id: String,
    pub source_type: String,
    pub gross_amount: i64,
    pub share_amount: i64,
    pub commission_rate: String, // Decimal stored as TEXT
    pub status: String,
    pub chatter_id: Option<String>,
    pub ai_personality_id: Option<String>,
    pub attributed_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl EarningRow {
    pub fn earning_status(&self) -> PersistenceResult<EarningStatus> {
        EarningStatus::from_str(&self.status)
            .ok_or_else(|| PersistenceError::invalid_enum("earning.status", &self.status))
    }
}

/// Row type cho bảng `payments`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PaymentRow {
    pub id: String,
    pub user_id: String,
    pub amount_usd: String, // Decimal stored as TEXT
    pub amount_crypto: Option<String>,
    pub crypto_currency: Option<String>,
    pub credits: i64,
    pub provider: String,
    /// Idempotency key của provider
    pub provider_tx_id: String,
    pub status: String,
    pub payment_type: String,
    /// JSON
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentRow {
    pub fn payment_status(&self) -> PersistenceResult<PaymentStatus> {
        PaymentStatus::from_str(&self.status)
            .ok_or_else(|| PersistenceError::invalid_enum("payment.status", &self.status))
    }

    pub fn payment_provider(&self) -> PersistenceResult<PaymentProvider> {
        PaymentProvider::from_str(&self.provider)
            .ok_or_else(|| PersistenceError::invalid_enum("payment.provider", &self.provider))
    }

    pub fn kind(&self) -> PersistenceResult<PaymentType> {
        PaymentType::from_str(&self.payment_type)
            .ok_or_else(|| PersistenceError::invalid_enum("payment.payment_type", &self.payment_type))
    }

    pub fn usd(&self) -> PersistenceResult<Decimal> {
        parse_decimal(&self.amount_usd)
    }

    pub fn crypto(&self) -> PersistenceResult<Option<Decimal>> {
        self.amount_crypto.as_deref().map(parse_decimal).transpose()
    }

    pub fn metadata_json(&self) -> PersistenceResult<serde_json::Value> {
        Ok(serde_json::from_str(&self.metadata)?)
    }
}

/// Row type cho bảng `message_unlocks`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct MessageUnlockRow {
    pub message_id: String,
    pub user_id: String,
    pub payment_id: Option<String>,
    pub credit_transaction_id: Option<String>,
    pub unlocked_at: DateTime<Utc>,
}

/// Row type cho bảng `subscriptions`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SubscriptionRow {
    pub user_id: String,
    pub creator_id: String,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row type cho bảng `accounting_queue`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AccountingQueueRow {
    pub id: String,
    pub payment_id: String,
    /// JSON payload gửi tới accounting endpoint
    pub payload: String,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    /// Unix seconds
    pub next_retry_at: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountingQueueRow {
    pub fn queue_status(&self) -> PersistenceResult<QueueStatus> {
        QueueStatus::from_str(&self.status)
            .ok_or_else(|| PersistenceError::invalid_enum("accounting_queue.status", &self.status))
    }
}
