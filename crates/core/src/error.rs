//! # Error Module
//!
//! Định nghĩa các domain errors cho Fanledger sử dụng thiserror.

use thiserror::Error;

/// Core domain errors.
///
/// Các lỗi nghiệp vụ cốt lõi, không liên quan đến infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // === Amount errors ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient credits: required {required}, available {available} (short {shortfall})")]
    InsufficientCredits {
        required: i64,
        available: i64,
        shortfall: i64,
    },

    // === Commission errors ===
    #[error("Invalid commission rate: {0}")]
    InvalidRate(String),

    // === Parsing errors ===
    #[error("Unknown {field} value: {value}")]
    UnknownValue { field: &'static str, value: String },
}

/// Result type alias với CoreError
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Tạo InsufficientCredits từ số cần và số có thể dùng
    pub fn insufficient(required: i64, available: i64) -> Self {
        Self::InsufficientCredits {
            required,
            available,
            shortfall: (required - available).max(0),
        }
    }

    pub fn unknown(field: &'static str, value: &str) -> Self {
        Self::UnknownValue {
            field,
            value: value.to_string(),
        }
    }

    /// Kiểm tra có phải lỗi insufficient credits không
    pub fn is_insufficient_credits(&self) -> bool {
        matches!(self, CoreError::InsufficientCredits { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::insufficient(100, 50);
        assert_eq!(
            err.to_string(),
            "Insufficient credits: required 100, available 50 (short 50)"
        );

        let err = CoreError::InvalidRate("agency rate 1.5 outside [0, 1]".to_string());
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn test_shortfall_never_negative() {
        let err = CoreError::insufficient(10, 40);
        assert_eq!(
            err,
            CoreError::InsufficientCredits {
                required: 10,
                available: 40,
                shortfall: 0
            }
        );
        assert!(err.is_insufficient_credits());
    }
}
