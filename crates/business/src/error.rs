//! Business layer errors
//!
//! Typed errors for every ledger operation. Core validation errors are
//! lifted into the matching business variants so callers match on one enum.

use fanledger_core::CoreError;
use fanledger_persistence::PersistenceError;
use std::time::Duration;
use thiserror::Error;

use crate::accounting::ExportError;
use crate::config::ConfigError;

/// Business operation errors
#[derive(Debug, Error)]
pub enum BusinessError {
    // === Validation errors ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient credits: required {required}, available {available}, short by {shortfall}")]
    InsufficientCredits {
        required: i64,
        available: i64,
        shortfall: i64,
    },

    #[error("Invalid commission rate: {0}")]
    InvalidRate(String),

    // === Throttling / contention ===
    #[error("Rate limited: {key} may retry in {}s", .reset_in.as_secs())]
    RateLimited { key: String, reset_in: Duration },

    #[error("Balance for {user_id} kept changing underneath the update")]
    Contention { user_id: String },

    // === Payment errors ===
    #[error("Payment {payment_id} is {status} and cannot be completed")]
    InvalidPaymentState { payment_id: String, status: String },

    #[error("Payment {payment_id} was recorded with {expected} but the notification says {received}")]
    PaymentMismatch {
        payment_id: String,
        expected: String,
        received: String,
    },

    // === Side effects ===
    #[error("Accounting export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Earning distribution failed for {source_id}: {reason}")]
    DistributionFailure { source_id: String, reason: String },

    // === Wrapped errors ===
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Core error: {0}")]
    Core(CoreError),
}

/// Result type alias for business operations
pub type BusinessResult<T> = Result<T, BusinessError>;

impl From<CoreError> for BusinessError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            CoreError::InvalidRate(msg) => Self::InvalidRate(msg),
            CoreError::InsufficientCredits {
                required,
                available,
                shortfall,
            } => Self::InsufficientCredits {
                required,
                available,
                shortfall,
            },
            other => Self::Core(other),
        }
    }
}

impl From<sqlx::Error> for BusinessError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(PersistenceError::from(err))
    }
}

impl BusinessError {
    /// Transaction should be re-run from the start
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Contention { .. } => true,
            Self::Persistence(err) => err.is_contention(),
            _ => false,
        }
    }

    pub fn is_insufficient_credits(&self) -> bool {
        matches!(self, Self::InsufficientCredits { .. })
    }

    /// Message safe to show to a fan.
    ///
    /// Only validation errors carry detail; everything else is generic.
    pub fn user_message(&self) -> String {
        match self {
            Self::InsufficientCredits { shortfall, .. } => {
                format!("Not enough credits. You need {} more.", shortfall)
            }
            Self::InvalidAmount(_) => "The amount must be a positive whole number.".to_string(),
            Self::RateLimited { reset_in, .. } => format!(
                "Too many requests. Try again in {} seconds.",
                reset_in.as_secs().max(1)
            ),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}
