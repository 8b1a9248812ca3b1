//! # Fanledger Persistence
//!
//! Persistence layer cho Fanledger - SQLite qua sqlx.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Database                             │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │   balances   │   │ credit log   │   │ payments / queue │  │
//! │  │ (CAS version)│   │ (append-only)│   │ (unique tx key)  │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fanledger_persistence::{BalanceRepo, Database};
//!
//! let db = Database::connect("sqlite:data/fanledger.db").await?;
//!
//! // Repos nhận pool hoặc transaction
//! let mut tx = db.pool().begin().await?;
//! let balance = BalanceRepo::get(&mut *tx, "user_1").await?;
//! tx.commit().await?;
//! ```

pub mod error;
pub mod sqlite;

pub use error::{PersistenceError, PersistenceResult};
pub use sqlite::schema::parse_decimal;
pub use sqlite::{
    init_database, AccessRepo, AccountingQueueRepo, BalanceRepo, CollaboratorRepo,
    CreditTransactionRepo, EarningRepo, PaymentRepo,
};
pub use sqlite::{
    AccountingQueueRow, AgencyRow, BalanceRow, ChatterRow, CreatorRow, CreditTransactionRow,
    EarningRow, MessageUnlockRow, PaymentRow, SubscriptionRow,
};

use sqlx::SqlitePool;

/// Database facade
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Mở (hoặc tạo) file database và chạy migrations
    ///
    /// # Arguments
    /// * `db_url` - SQLite database URL (e.g., "sqlite:fanledger.db")
    pub async fn connect(db_url: &str) -> PersistenceResult<Self> {
        let pool = init_database(db_url).await?;
        Ok(Self { pool })
    }

    /// In-memory database đã migrate (tests, demo)
    pub async fn in_memory() -> PersistenceResult<Self> {
        let pool = sqlite::create_memory_pool().await?;
        sqlite::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap một pool có sẵn (schema phải đã được migrate)
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fanledger_core::{CreditBalances, QueueStatus, RecipientType};
    use rust_decimal_macros::dec;

    fn payment(id: &str, provider_tx_id: &str) -> PaymentRow {
        PaymentRow {
            id: id.to_string(),
            user_id: "fan_1".to_string(),
            amount_usd: "9.99".to_string(),
            amount_crypto: None,
            crypto_currency: None,
            credits: 1000,
            provider: "stripe".to_string(),
            provider_tx_id: provider_tx_id.to_string(),
            status: "PENDING".to_string(),
            payment_type: "CREDIT_PURCHASE".to_string(),
            metadata: "{}".to_string(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_balance_compare_and_set() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();

        assert!(BalanceRepo::get(pool, "fan_1").await.unwrap().is_none());
        BalanceRepo::ensure(pool, "fan_1").await.unwrap();
        BalanceRepo::ensure(pool, "fan_1").await.unwrap();

        let row = BalanceRepo::get(pool, "fan_1").await.unwrap().unwrap();
        assert_eq!(row.version, 0);

        let ok = BalanceRepo::compare_and_set(pool, "fan_1", 0, CreditBalances::new(10, 5))
            .await
            .unwrap();
        assert!(ok);

        // Stale version loses
        let ok = BalanceRepo::compare_and_set(pool, "fan_1", 0, CreditBalances::new(99, 0))
            .await
            .unwrap();
        assert!(!ok);

        let row = BalanceRepo::get(pool, "fan_1").await.unwrap().unwrap();
        assert_eq!(row.balances(), CreditBalances::new(10, 5));
        assert_eq!(row.version, 1);
    }

    #[tokio::test]
    async fn test_negative_balance_rejected_by_schema() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();
        BalanceRepo::ensure(pool, "fan_1").await.unwrap();

        let result =
            BalanceRepo::compare_and_set(pool, "fan_1", 0, CreditBalances::new(-1, 0)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_payment_idempotency_key_unique() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();

        assert!(PaymentRepo::insert_if_absent(pool, &payment("pay_1", "pi_123")).await.unwrap());
        assert!(!PaymentRepo::insert_if_absent(pool, &payment("pay_2", "pi_123")).await.unwrap());

        let row = PaymentRepo::get_by_provider_tx(pool, "stripe", "pi_123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.id, "pay_1");

        assert!(PaymentRepo::mark_completed(pool, "pay_1", Utc::now()).await.unwrap());
        assert!(!PaymentRepo::mark_completed(pool, "pay_1", Utc::now()).await.unwrap());
        assert!(!PaymentRepo::mark_failed(pool, "pay_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_collaborators_and_earnings() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();

        CollaboratorRepo::upsert_agency(pool, "agency_a", "Agency A", dec!(0.30)).await.unwrap();
        CollaboratorRepo::upsert_creator(pool, "creator_1", "luna", Some("agency_a"))
            .await
            .unwrap();
        CollaboratorRepo::upsert_chatter(pool, "chatter_c", "agency_a", dec!(0.20))
            .await
            .unwrap();

        let creator = CollaboratorRepo::get_creator_by_slug(pool, "luna").await.unwrap();
        assert_eq!(creator.agency_id.as_deref(), Some("agency_a"));
        let agency = CollaboratorRepo::get_agency(pool, "agency_a").await.unwrap();
        assert_eq!(agency.rate().unwrap(), dec!(0.30));
        assert!(CollaboratorRepo::get_chatter(pool, "nobody").await.unwrap_err().is_not_found());

        let row = EarningRow {
            id: "earn_1".to_string(),
            recipient_id: "creator_1".to_string(),
            creator_earning_id: None,
            source_id: "tx_1".to_string(),
            source_type: "PPV".to_string(),
            gross_amount: 100,
            share_amount: 67,
            commission_rate: "0.30".to_string(),
            status: "PENDING".to_string(),
            chatter_id: None,
            ai_personality_id: None,
            attributed_message_id: None,
            created_at: Utc::now(),
            paid_at: None,
        };
        EarningRepo::insert(pool, RecipientType::Creator, &row).await.unwrap();

        assert_eq!(
            EarningRepo::pending_total(pool, RecipientType::Creator, "creator_1").await.unwrap(),
            67
        );
        assert!(EarningRepo::mark_paid(pool, RecipientType::Creator, "earn_1", Utc::now())
            .await
            .unwrap());
        assert!(!EarningRepo::mark_paid(pool, RecipientType::Creator, "earn_1", Utc::now())
            .await
            .unwrap());
        assert_eq!(
            EarningRepo::pending_total(pool, RecipientType::Creator, "creator_1").await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_queue_claim_and_requeue() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();
        let now = Utc::now();

        let entry = AccountingQueueRow {
            id: "q_1".to_string(),
            payment_id: "pay_1".to_string(),
            payload: "{}".to_string(),
            status: "PENDING".to_string(),
            attempts: 1,
            last_error: Some("timeout".to_string()),
            next_retry_at: 100,
            created_at: now,
            updated_at: now,
        };
        AccountingQueueRepo::insert(pool, &entry).await.unwrap();

        assert!(AccountingQueueRepo::get_due(pool, 99, 5, 10).await.unwrap().is_empty());
        assert_eq!(AccountingQueueRepo::get_due(pool, 100, 5, 10).await.unwrap().len(), 1);
        assert!(AccountingQueueRepo::get_due(pool, 100, 1, 10).await.unwrap().is_empty());

        assert!(AccountingQueueRepo::claim(pool, "q_1", 400).await.unwrap());
        assert!(!AccountingQueueRepo::claim(pool, "q_1", 400).await.unwrap());

        assert_eq!(AccountingQueueRepo::requeue_expired(pool, 399).await.unwrap(), 0);
        assert_eq!(AccountingQueueRepo::requeue_expired(pool, 400).await.unwrap(), 1);

        let row = AccountingQueueRepo::get_by_id(pool, "q_1").await.unwrap();
        assert_eq!(row.queue_status().unwrap(), QueueStatus::Pending);
    }
}
