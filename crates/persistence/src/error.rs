//! # Persistence Errors
//!
//! Error types cho persistence layer, wrapping sqlx và serde errors.

use thiserror::Error;

/// Persistence layer errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    // === Database errors ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    // === Serialization errors ===
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // === Conversion errors ===
    #[error("Invalid decimal value: {0}")]
    InvalidDecimal(String),

    #[error("Invalid enum value: {field} = {value}")]
    InvalidEnumValue { field: String, value: String },
}

/// Result type alias cho PersistenceError
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// SQLITE_BUSY
const SQLITE_BUSY: i32 = 5;
/// SQLITE_LOCKED
const SQLITE_LOCKED: i32 = 6;

impl PersistenceError {
    /// Tạo NotFound error
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn invalid_enum(field: &str, value: &str) -> Self {
        Self::InvalidEnumValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Kiểm tra có phải lỗi not found không
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Vi phạm UNIQUE constraint (vd. idempotency key đã tồn tại)
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }

    /// SQLite báo busy/locked: transaction nên được retry
    pub fn is_contention(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
                .unwrap_or(false),
            Self::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found() {
        let err = PersistenceError::not_found("Payment", "pay_1");
        assert!(err.is_not_found());
        assert!(!err.is_contention());
        assert_eq!(err.to_string(), "Record not found: Payment with id pay_1");
    }
}
