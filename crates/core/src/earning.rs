//! # Earning Module
//!
//! Loại người nhận và trạng thái của Earning Record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Người nhận một phần của spend event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientType {
    Creator,
    Agency,
    /// Chatter người thật hoặc AI persona
    Chatter,
}

impl RecipientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientType::Creator => "CREATOR",
            RecipientType::Agency => "AGENCY",
            RecipientType::Chatter => "CHATTER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREATOR" => Some(RecipientType::Creator),
            "AGENCY" => Some(RecipientType::Agency),
            "CHATTER" => Some(RecipientType::Chatter),
            _ => None,
        }
    }

    /// Tên bảng lưu earning của loại người nhận này
    pub fn table(&self) -> &'static str {
        match self {
            RecipientType::Creator => "creator_earnings",
            RecipientType::Agency => "agency_earnings",
            RecipientType::Chatter => "chatter_earnings",
        }
    }
}

impl fmt::Display for RecipientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trạng thái earning: PENDING cho tới khi payout chạy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EarningStatus {
    Pending,
    Paid,
}

impl EarningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EarningStatus::Pending => "PENDING",
            EarningStatus::Paid => "PAID",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(EarningStatus::Pending),
            "PAID" => Some(EarningStatus::Paid),
            _ => None,
        }
    }
}

impl fmt::Display for EarningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_tables() {
        assert_eq!(RecipientType::Creator.table(), "creator_earnings");
        assert_eq!(RecipientType::from_str("agency"), Some(RecipientType::Agency));
        assert_eq!(EarningStatus::from_str("PAID"), Some(EarningStatus::Paid));
        assert!(EarningStatus::from_str("SETTLED").is_none());
    }
}
