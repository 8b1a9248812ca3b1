//! # Payment Module
//!
//! Provider, trạng thái payment và trạng thái accounting queue.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment rail bên ngoài. Mỗi provider tự cung cấp idempotency key
/// (`provider_tx_id`) của nó.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    MoonPay,
    PayGate,
    MixPay,
    /// Ghi nhận tay bởi operator
    Manual,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::MoonPay => "moonpay",
            PaymentProvider::PayGate => "paygate",
            PaymentProvider::MixPay => "mixpay",
            PaymentProvider::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stripe" => Some(PaymentProvider::Stripe),
            "moonpay" => Some(PaymentProvider::MoonPay),
            "paygate" => Some(PaymentProvider::PayGate),
            "mixpay" => Some(PaymentProvider::MixPay),
            "manual" => Some(PaymentProvider::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trạng thái payment: PENDING -> COMPLETED | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(PaymentStatus::Pending),
            "COMPLETED" => Some(PaymentStatus::Completed),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    /// Trạng thái cuối, không chuyển tiếp được nữa
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sản phẩm được thanh toán
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    /// Mua gói credit
    CreditPurchase,
    /// Thanh toán trực tiếp để mở khóa PPV
    PpvUnlock,
    /// Thanh toán trực tiếp cho subscription
    Subscription,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::CreditPurchase => "CREDIT_PURCHASE",
            PaymentType::PpvUnlock => "PPV_UNLOCK",
            PaymentType::Subscription => "SUBSCRIPTION",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREDIT_PURCHASE" => Some(PaymentType::CreditPurchase),
            "PPV_UNLOCK" => Some(PaymentType::PpvUnlock),
            "SUBSCRIPTION" => Some(PaymentType::Subscription),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trạng thái của một Accounting Queue Entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "PENDING",
            QueueStatus::Processing => "PROCESSING",
            QueueStatus::Completed => "COMPLETED",
            QueueStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(QueueStatus::Pending),
            "PROCESSING" => Some(QueueStatus::Processing),
            "COMPLETED" => Some(QueueStatus::Completed),
            "FAILED" => Some(QueueStatus::Failed),
            _ => None,
        }
    }

    pub fn all() -> [QueueStatus; 4] {
        [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Completed,
            QueueStatus::Failed,
        ]
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(PaymentProvider::from_str("MoonPay"), Some(PaymentProvider::MoonPay));
        assert_eq!(PaymentProvider::Stripe.to_string(), "stripe");
        assert!(PaymentProvider::from_str("paypal").is_none());
    }

    #[test]
    fn test_payment_status_terminal() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn test_queue_status_serde() {
        let json = serde_json::to_string(&QueueStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
        assert_eq!(QueueStatus::from_str("failed"), Some(QueueStatus::Failed));
    }
}
