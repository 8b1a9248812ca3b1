//! # Credit Module
//!
//! Hai loại credit trong hệ thống:
//! - Paid: mua bằng tiền thật hoặc kiếm được từ bán hàng, dùng cho mọi thứ
//! - Bonus: credit khuyến mãi, chỉ dùng cho các spend type được phép
//!
//! Bảng spend policy (`SpendType::allows_bonus`) nằm ở đây để không call
//! site nào có thể bỏ qua nó.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Loại credit (class) của một balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditType {
    /// Credit có tiền thật đứng sau
    Paid,
    /// Credit khuyến mãi
    Bonus,
}

impl CreditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditType::Paid => "PAID",
            CreditType::Bonus => "BONUS",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PAID" => Some(CreditType::Paid),
            "BONUS" => Some(CreditType::Bonus),
            _ => None,
        }
    }
}

impl fmt::Display for CreditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Các hành động tiêu credit của fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpendType {
    /// Mở khóa tin nhắn pay-per-view
    Ppv,
    /// Tip cho creator
    Tip,
    /// Đăng ký (subscribe) creator
    Subscription,
    /// Nhắn tin với AI persona
    AiMessage,
    /// Tạo media bằng AI
    MediaGeneration,
}

impl SpendType {
    /// Spend policy: spend type này có được dùng bonus credits không.
    ///
    /// SUBSCRIPTION, PPV và TIP là paid-only: đây là doanh thu thật được
    /// chia cho creator / agency / chatter.
    pub fn allows_bonus(&self) -> bool {
        match self {
            SpendType::Ppv | SpendType::Tip | SpendType::Subscription => false,
            SpendType::AiMessage | SpendType::MediaGeneration => true,
        }
    }

    /// Spend type này có thể được attribute cho chatter không.
    ///
    /// Subscription không phải là sale từ chat.
    pub fn allows_chatter_attribution(&self) -> bool {
        !matches!(self, SpendType::Subscription)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpendType::Ppv => "PPV",
            SpendType::Tip => "TIP",
            SpendType::Subscription => "SUBSCRIPTION",
            SpendType::AiMessage => "AI_MESSAGE",
            SpendType::MediaGeneration => "MEDIA_GENERATION",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PPV" => Some(SpendType::Ppv),
            "TIP" => Some(SpendType::Tip),
            "SUBSCRIPTION" => Some(SpendType::Subscription),
            "AI_MESSAGE" => Some(SpendType::AiMessage),
            "MEDIA_GENERATION" => Some(SpendType::MediaGeneration),
            _ => None,
        }
    }
}

impl fmt::Display for SpendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Các nguồn cộng credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantType {
    /// Mua credit bằng tiền thật
    Purchase,
    /// Tiền bán PPV
    PpvSale,
    /// Admin cộng tay
    AdminGrant,
    /// Hoàn tiền
    Refund,
    /// Khuyến mãi
    Promo,
}

impl GrantType {
    /// Credit class mặc định khi caller không chỉ định.
    pub fn default_credit_type(&self) -> CreditType {
        match self {
            GrantType::Promo => CreditType::Bonus,
            _ => CreditType::Paid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Purchase => "PURCHASE",
            GrantType::PpvSale => "PPV_SALE",
            GrantType::AdminGrant => "ADMIN_GRANT",
            GrantType::Refund => "REFUND",
            GrantType::Promo => "PROMO",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PURCHASE" => Some(GrantType::Purchase),
            "PPV_SALE" => Some(GrantType::PpvSale),
            "ADMIN_GRANT" => Some(GrantType::AdminGrant),
            "REFUND" => Some(GrantType::Refund),
            "PROMO" => Some(GrantType::Promo),
            _ => None,
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Loại của một Credit Transaction trong ledger (grant hoặc spend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionType {
    Grant(GrantType),
    Spend(SpendType),
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Grant(g) => g.as_str(),
            TransactionType::Spend(s) => s.as_str(),
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        GrantType::from_str(s)
            .map(TransactionType::Grant)
            .or_else(|| SpendType::from_str(s).map(TransactionType::Spend))
    }

    pub fn is_spend(&self) -> bool {
        matches!(self, TransactionType::Spend(_))
    }
}

impl From<GrantType> for TransactionType {
    fn from(g: GrantType) -> Self {
        TransactionType::Grant(g)
    }
}

impl From<SpendType> for TransactionType {
    fn from(s: SpendType) -> Self {
        TransactionType::Spend(s)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Số dư credit của một user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalances {
    pub paid: i64,
    pub bonus: i64,
}

impl CreditBalances {
    pub fn new(paid: i64, bonus: i64) -> Self {
        Self { paid, bonus }
    }

    pub fn total(&self) -> i64 {
        self.paid + self.bonus
    }

    /// Số credit có thể dùng cho một spend
    pub fn spendable(&self, allow_bonus: bool) -> i64 {
        if allow_bonus {
            self.total()
        } else {
            self.paid
        }
    }

    /// Tính phần paid / bonus sẽ bị trừ cho một spend.
    ///
    /// Khi được phép dùng bonus thì trừ bonus trước, phần còn lại trừ paid.
    /// Trả về `(paid_spent, bonus_spent)`.
    pub fn plan_spend(&self, amount: i64, allow_bonus: bool) -> CoreResult<(i64, i64)> {
        if amount <= 0 {
            return Err(CoreError::InvalidAmount(format!(
                "Spend amount must be positive: {}",
                amount
            )));
        }

        let available = self.spendable(allow_bonus);
        if available < amount {
            return Err(CoreError::insufficient(amount, available));
        }

        let bonus_spent = if allow_bonus { self.bonus.min(amount) } else { 0 };
        Ok((amount - bonus_spent, bonus_spent))
    }

    /// Số dư sau khi áp dụng delta (có thể âm, caller phải kiểm tra)
    pub fn apply(&self, paid_delta: i64, bonus_delta: i64) -> Self {
        Self {
            paid: self.paid + paid_delta,
            bonus: self.bonus + bonus_delta,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.paid >= 0 && self.bonus >= 0
    }
}

impl fmt::Display for CreditBalances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "paid {} + bonus {} = {}", self.paid, self.bonus, self.total())
    }
}
