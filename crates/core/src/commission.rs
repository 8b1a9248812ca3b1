//! # Commission Module
//!
//! Commission splitter: chia một khoản paid credits thành các phần cho
//! platform, creator, agency và chatter (người thật hoặc AI persona).
//!
//! Thứ tự tính:
//! 1. Platform fee lấy trước trên toàn bộ khoản paid
//! 2. Agency rate áp dụng trên phần còn lại của creator (creator gross)
//! 3. Chatter rate áp dụng trên phần của agency (agency gross)
//!
//! Mỗi bước đều floor về số nguyên credit. Phần dư do làm tròn thuộc về
//! platform.

use crate::credit::SpendType;
use crate::error::{CoreError, CoreResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cấu hình commission phía platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionPolicy {
    /// Platform fee dạng phân số trong [0, 1]
    pub platform_fee_rate: Decimal,
}

impl CommissionPolicy {
    pub fn new(platform_fee_rate: Decimal) -> Self {
        Self { platform_fee_rate }
    }
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        // 5%
        Self::new(Decimal::new(5, 2))
    }
}

/// Agency quản lý creator và rate đã cấu hình.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyTerms {
    pub agency_id: String,
    pub commission_rate: Decimal,
}

/// Chatter được attribute cho sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatterRef {
    /// Chatter là người thật
    Human {
        chatter_id: String,
        commission_rate: Decimal,
    },
    /// AI persona
    AiPersona {
        personality_id: String,
        commission_rate: Decimal,
    },
}

impl ChatterRef {
    pub fn recipient_id(&self) -> &str {
        match self {
            ChatterRef::Human { chatter_id, .. } => chatter_id,
            ChatterRef::AiPersona { personality_id, .. } => personality_id,
        }
    }

    pub fn commission_rate(&self) -> Decimal {
        match self {
            ChatterRef::Human {
                commission_rate, ..
            }
            | ChatterRef::AiPersona {
                commission_rate, ..
            } => *commission_rate,
        }
    }

    pub fn chatter_id(&self) -> Option<&str> {
        match self {
            ChatterRef::Human { chatter_id, .. } => Some(chatter_id),
            ChatterRef::AiPersona { .. } => None,
        }
    }

    pub fn ai_personality_id(&self) -> Option<&str> {
        match self {
            ChatterRef::AiPersona { personality_id, .. } => Some(personality_id),
            ChatterRef::Human { .. } => None,
        }
    }
}

/// Attribution context của một spend event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub spend_type: SpendType,
    pub creator_id: String,
    /// `None` nếu creator không thuộc agency nào
    pub agency: Option<AgencyTerms>,
    pub chatter: Option<ChatterRef>,
}

impl Attribution {
    pub fn new(spend_type: SpendType, creator_id: &str) -> Self {
        Self {
            spend_type,
            creator_id: creator_id.to_string(),
            agency: None,
            chatter: None,
        }
    }

    pub fn with_agency(mut self, agency_id: &str, commission_rate: Decimal) -> Self {
        self.agency = Some(AgencyTerms {
            agency_id: agency_id.to_string(),
            commission_rate,
        });
        self
    }

    pub fn with_chatter(mut self, chatter: ChatterRef) -> Self {
        self.chatter = Some(chatter);
        self
    }

    /// Chatter thực sự được tính commission (không bao giờ cho subscription)
    pub fn effective_chatter(&self) -> Option<&ChatterRef> {
        if !self.spend_type.allows_chatter_attribution() {
            return None;
        }
        self.agency.as_ref().and(self.chatter.as_ref())
    }
}

/// Kết quả chia.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub paid_amount: i64,
    pub platform_share: i64,
    pub creator_gross: i64,
    pub creator_share: i64,
    pub agency_gross: i64,
    pub agency_share: i64,
    pub chatter_share: i64,
}

impl Split {
    pub fn total(&self) -> i64 {
        self.platform_share + self.creator_share + self.agency_share + self.chatter_share
    }
}

fn validate_rate(name: &str, rate: Decimal) -> CoreResult<()> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(CoreError::InvalidRate(format!(
            "{} rate {} outside [0, 1]",
            name, rate
        )));
    }
    Ok(())
}

fn floor_share(amount: i64, rate: Decimal) -> CoreResult<i64> {
    (Decimal::from(amount) * rate)
        .floor()
        .to_i64()
        .ok_or_else(|| CoreError::InvalidAmount(format!("{} x {} overflows", amount, rate)))
}

/// Chia `paid_amount` theo attribution.
///
/// Rate ngoài [0, 1] trả về `InvalidRate`, không bao giờ clamp.
pub fn compute_split(
    paid_amount: i64,
    attribution: &Attribution,
    policy: &CommissionPolicy,
) -> CoreResult<Split> {
    if paid_amount < 0 {
        return Err(CoreError::InvalidAmount(format!(
            "Paid amount must not be negative: {}",
            paid_amount
        )));
    }

    validate_rate("platform fee", policy.platform_fee_rate)?;
    if let Some(agency) = &attribution.agency {
        validate_rate("agency", agency.commission_rate)?;
    }
    if let Some(chatter) = &attribution.chatter {
        validate_rate("chatter", chatter.commission_rate())?;
    }

    let platform_fee = floor_share(paid_amount, policy.platform_fee_rate)?;
    let creator_gross = paid_amount - platform_fee;

    let agency_gross = match &attribution.agency {
        Some(agency) => floor_share(creator_gross, agency.commission_rate)?,
        None => 0,
    };

    let chatter_share = match attribution.effective_chatter() {
        Some(chatter) => floor_share(agency_gross, chatter.commission_rate())?,
        None => 0,
    };

    if platform_fee + agency_gross > paid_amount || chatter_share > agency_gross {
        return Err(CoreError::InvalidRate(format!(
            "deductions exceed gross amount {}",
            paid_amount
        )));
    }

    let creator_share = creator_gross - agency_gross;
    let agency_share = agency_gross - chatter_share;

    Ok(Split {
        paid_amount,
        platform_share: paid_amount - creator_share - agency_share - chatter_share,
        creator_gross,
        creator_share,
        agency_gross,
        agency_share,
        chatter_share,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn human(rate: Decimal) -> ChatterRef {
        ChatterRef::Human {
            chatter_id: "chatter_c".to_string(),
            commission_rate: rate,
        }
    }

    #[test]
    fn test_unmanaged_creator_takes_everything_after_fee() {
        let attribution = Attribution::new(SpendType::Tip, "creator_1");
        let split = compute_split(100, &attribution, &CommissionPolicy::default()).unwrap();

        assert_eq!(split.platform_share, 5);
        assert_eq!(split.creator_share, 95);
        assert_eq!(split.agency_share, 0);
        assert_eq!(split.chatter_share, 0);
    }

    #[test]
    fn test_ppv_with_agency_and_chatter() {
        let attribution = Attribution::new(SpendType::Ppv, "creator_1")
            .with_agency("agency_a", dec!(0.30))
            .with_chatter(human(dec!(0.20)));

        let split = compute_split(100, &attribution, &CommissionPolicy::default()).unwrap();

        assert_eq!(split.platform_share, 5);
        assert_eq!(split.creator_gross, 95);
        assert_eq!(split.agency_gross, 28);
        assert_eq!(split.chatter_share, 5);
        assert_eq!(split.agency_share, 23);
        assert_eq!(split.creator_share, 67);
        assert_eq!(split.total(), 100);
    }

    #[test]
    fn test_subscription_never_pays_chatter() {
        let attribution = Attribution::new(SpendType::Subscription, "creator_1")
            .with_agency("agency_a", dec!(0.30))
            .with_chatter(human(dec!(0.50)));

        let split = compute_split(200, &attribution, &CommissionPolicy::default()).unwrap();

        assert_eq!(split.chatter_share, 0);
        assert_eq!(split.agency_share, split.agency_gross);
    }

    #[test]
    fn test_chatter_without_agency_is_ignored() {
        let attribution =
            Attribution::new(SpendType::Tip, "creator_1").with_chatter(human(dec!(0.20)));
        let split = compute_split(100, &attribution, &CommissionPolicy::default()).unwrap();

        assert_eq!(split.chatter_share, 0);
        assert_eq!(split.creator_share, 95);
    }

    #[test]
    fn test_invalid_rates_rejected() {
        let attribution =
            Attribution::new(SpendType::Ppv, "creator_1").with_agency("agency_a", dec!(1.2));
        let err = compute_split(100, &attribution, &CommissionPolicy::default()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRate(_)));

        let attribution = Attribution::new(SpendType::Ppv, "creator_1");
        let err = compute_split(100, &attribution, &CommissionPolicy::new(dec!(-0.01)))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRate(_)));

        let attribution = Attribution::new(SpendType::Ppv, "creator_1")
            .with_agency("agency_a", dec!(0.3))
            .with_chatter(human(dec!(1.01)));
        assert!(compute_split(100, &attribution, &CommissionPolicy::default()).is_err());
    }

    #[test]
    fn test_shares_never_exceed_paid_amount() {
        let rates = [dec!(0), dec!(0.07), dec!(0.33), dec!(0.5), dec!(0.99), dec!(1)];
        for paid in [0_i64, 1, 3, 7, 19, 100, 101, 999, 12_345] {
            for fee in rates {
                for agency in rates {
                    for chatter in rates {
                        let attribution = Attribution::new(SpendType::Ppv, "c")
                            .with_agency("a", agency)
                            .with_chatter(human(chatter));
                        let split =
                            compute_split(paid, &attribution, &CommissionPolicy::new(fee))
                                .unwrap();
                        assert!(split.total() <= paid);
                        assert!(split.platform_share >= 0);
                        assert!(split.creator_share >= 0);
                        assert!(split.agency_share >= 0);
                        assert!(split.chatter_share >= 0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_rounding_remainder_stays_with_platform() {
        // 7 * 5% = 0.35 -> fee 0; 7 * 30% = 2.1 -> 2
        let attribution =
            Attribution::new(SpendType::Tip, "creator_1").with_agency("agency_a", dec!(0.3));
        let split = compute_split(7, &attribution, &CommissionPolicy::default()).unwrap();

        assert_eq!(split.platform_share, 0);
        assert_eq!(split.agency_share, 2);
        assert_eq!(split.creator_share, 5);
        assert_eq!(split.total(), 7);
    }
}
