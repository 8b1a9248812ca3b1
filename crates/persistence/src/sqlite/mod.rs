//! SQLite persistence module
//!
//! Repository pattern cho SQLite database access.

pub mod repos;
pub mod schema;

pub use repos::{
    create_memory_pool, create_pool, init_database, run_migrations, AccessRepo,
    AccountingQueueRepo, BalanceRepo, CollaboratorRepo, CreditTransactionRepo, EarningRepo,
    PaymentRepo,
};
pub use schema::{
    AccountingQueueRow, AgencyRow, BalanceRow, ChatterRow, CreatorRow, CreditTransactionRow,
    EarningRow, MessageUnlockRow, PaymentRow, SubscriptionRow,
};
