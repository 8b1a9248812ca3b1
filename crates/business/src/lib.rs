//! # Fanledger Business
//!
//! Business logic layer: credit ledger, earning distribution, payment
//! intake, accounting export and rate limiting.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fanledger_business::{LedgerConfig, LedgerService, ServiceContext, SpendOptions};
//! use fanledger_core::SpendType;
//! use fanledger_persistence::Database;
//!
//! let db = Database::connect("sqlite:data/fanledger.db").await?;
//! let ctx = ServiceContext::new(&db, LedgerConfig::default())?;
//!
//! let ledger = LedgerService::new(&ctx);
//! let result = ledger
//!     .spend_credits("fan_1", 25, SpendType::AiMessage, SpendOptions::default())
//!     .await?;
//! ```

pub mod accounting;
pub mod actions;
pub mod config;
pub mod distribution;
pub mod error;
pub mod ledger;
pub mod payments;
pub mod rate_limit;
pub mod services;

pub use accounting::{
    spawn_sweeper, AccountingClient, AccountingExporter, AccountingPayload, ExportError,
    ExportOutcome, HttpAccountingClient, QueueStats, SweepReport,
};
pub use actions::{ActionReceipt, FanActions, SpendAttribution, UnlockOutcome};
pub use config::{ConfigError, ConfigLoader, LedgerConfig};
pub use distribution::{
    DistributionOutcome, DistributionStatus, EarningDistributionParams, EarningDistributor,
};
pub use error::{BusinessError, BusinessResult};
pub use ledger::{
    AddCreditsOptions, AddCreditsResult, LedgerService, ReplayReport, SpendOptions, SpendResult,
};
pub use payments::{CompletionAction, IntakeOutcome, PaymentCompletion, PaymentIntake, PaymentIntent};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use services::ServiceContext;
