//! Fee rules and their evaluation.
//!
//! Rules are matched on the transaction type plus four optional dimensions
//! (source currency, target currency, account type, owner type). A `None`
//! dimension is a wildcard. Evaluation works in `Decimal` and rounds to whole
//! minor units exactly once, after clamping.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::{AccountId, AccountType, OwnerType, impl_str_enum};
use super::journal::{JournalId, TransactionType};
use super::money::Currency;
use crate::error::DomainError;

/// Unique identifier for a FeeRule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeRuleId(Uuid);

impl FeeRuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FeeRuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FeeRuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationMethod {
    Percentage,
    Fixed,
    Tiered,
}

impl_str_enum!(CalculationMethod {
    Percentage => "percentage",
    Fixed => "fixed",
    Tiered => "tiered",
});

/// Who a fee is collected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeType {
    Platform,
    /// Credited to the agent that handled the transaction
    Commission,
    Network,
    Conversion,
}

impl_str_enum!(FeeType {
    Platform => "platform",
    Commission => "commission",
    Network => "network",
    Conversion => "conversion",
});

/// One band of a tiered rule. Amounts are minor units; `rate` is a fraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTier {
    pub min_amount: i64,
    /// `None` means the tier is open-ended
    #[serde(default)]
    pub max_amount: Option<i64>,
    #[serde(default)]
    pub rate: Option<Decimal>,
    #[serde(default)]
    pub fixed_fee: Option<i64>,
}

impl FeeTier {
    pub fn contains(&self, amount: i64) -> bool {
        amount >= self.min_amount && self.max_amount.is_none_or(|max| amount <= max)
    }
}

/// A configured fee policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRule {
    pub id: FeeRuleId,
    pub transaction_type: TransactionType,
    pub source_currency: Option<Currency>,
    pub target_currency: Option<Currency>,
    pub account_type: Option<AccountType>,
    pub owner_type: Option<OwnerType>,
    pub calculation_method: CalculationMethod,
    /// Percentage rate as a fraction, or the fixed fee in minor units
    pub fee_value: Decimal,
    pub min_fee: Option<i64>,
    pub max_fee: Option<i64>,
    #[serde(default)]
    pub tiers: Vec<FeeTier>,
    pub fee_type: FeeType,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// The dimensions a fee is computed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeeQuery {
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub source_currency: Currency,
    pub target_currency: Option<Currency>,
    pub account_type: AccountType,
    pub owner_type: OwnerType,
}

/// Outcome of evaluating a fee rule against an amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeCalculation {
    /// `None` when no rule matched
    pub rule_id: Option<FeeRuleId>,
    pub fee_type: FeeType,
    pub amount: i64,
    pub currency: Currency,
    pub applied_rate: Decimal,
    /// Human-readable derivation, kept for audit
    pub trace: String,
}

impl FeeCalculation {
    /// The zero fee used when no rule applies.
    pub fn none(currency: Currency) -> Self {
        Self {
            rule_id: None,
            fee_type: FeeType::Platform,
            amount: 0,
            currency,
            applied_rate: Decimal::ZERO,
            trace: "no matching fee rule".to_string(),
        }
    }
}

impl FeeRule {
    /// Checks the rule is internally consistent before it is stored.
    pub fn validate(&self) -> Result<(), DomainError> {
        let invalid = |msg: String| Err(DomainError::InvalidFeeRule(msg));

        if self.fee_value.is_sign_negative() {
            return invalid(format!("fee_value cannot be negative: {}", self.fee_value));
        }
        if matches!(self.min_fee, Some(min) if min < 0) || matches!(self.max_fee, Some(max) if max < 0) {
            return invalid("min_fee and max_fee cannot be negative".into());
        }
        if let (Some(min), Some(max)) = (self.min_fee, self.max_fee) {
            if min > max {
                return invalid(format!("min_fee {} exceeds max_fee {}", min, max));
            }
        }

        match self.calculation_method {
            CalculationMethod::Percentage => {}
            CalculationMethod::Fixed => {
                if self.min_fee.is_none() && self.fee_value.is_zero() {
                    return invalid("fixed rule needs min_fee or fee_value".into());
                }
            }
            CalculationMethod::Tiered => {
                if self.tiers.is_empty() {
                    return invalid("tiered rule has no tiers".into());
                }
                for (i, tier) in self.tiers.iter().enumerate() {
                    if tier.min_amount < 0 {
                        return invalid(format!("tier {} has a negative min_amount", i));
                    }
                    if matches!(tier.max_amount, Some(max) if max < tier.min_amount) {
                        return invalid(format!("tier {} has max_amount below min_amount", i));
                    }
                    if matches!(tier.rate, Some(rate) if rate.is_sign_negative())
                        || matches!(tier.fixed_fee, Some(fee) if fee < 0)
                    {
                        return invalid(format!("tier {} has a negative rate or fixed_fee", i));
                    }
                }
            }
        }
        Ok(())
    }

    /// Every non-null dimension of the rule equals the query's.
    pub fn matches(&self, query: &FeeQuery) -> bool {
        self.is_active
            && self.transaction_type == query.transaction_type
            && self.source_currency.is_none_or(|c| c == query.source_currency)
            && self.target_currency.is_none_or(|c| Some(c) == query.target_currency)
            && self.account_type.is_none_or(|t| t == query.account_type)
            && self.owner_type.is_none_or(|t| t == query.owner_type)
    }

    /// Number of non-null match dimensions.
    pub fn specificity(&self) -> usize {
        [
            self.source_currency.is_some(),
            self.target_currency.is_some(),
            self.account_type.is_some(),
            self.owner_type.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    /// Computes the fee for `amount`, charged in `currency`.
    pub fn evaluate(&self, amount: i64, currency: Currency) -> FeeCalculation {
        let base = Decimal::from(amount);
        let (raw, applied_rate, mut trace) = match self.calculation_method {
            CalculationMethod::Percentage => (
                base * self.fee_value,
                self.fee_value,
                format!("percentage: {} x {}", amount, self.fee_value),
            ),
            CalculationMethod::Fixed => {
                let fee = self.min_fee.map(Decimal::from).unwrap_or(self.fee_value);
                (fee, Decimal::ZERO, format!("fixed: {}", fee))
            }
            CalculationMethod::Tiered => match self.tiers.iter().position(|t| t.contains(amount)) {
                Some(index) => {
                    let tier = &self.tiers[index];
                    let rate = tier.rate.unwrap_or(Decimal::ZERO);
                    let fixed = tier.fixed_fee.unwrap_or(0);
                    (
                        base * rate + Decimal::from(fixed),
                        rate,
                        format!("tiered[{}]: {} x {} + {}", index, amount, rate, fixed),
                    )
                }
                None => (
                    Decimal::ZERO,
                    Decimal::ZERO,
                    format!("tiered: no tier covers {}", amount),
                ),
            },
        };

        // Every method is bounded by [min_fee, max_fee].
        let mut fee = raw;
        if let Some(min) = self.min_fee.map(Decimal::from) {
            if fee < min {
                fee = min;
                trace.push_str(" (min applied)");
            }
        }
        if let Some(max) = self.max_fee.map(Decimal::from) {
            if fee > max {
                fee = max;
                trace.push_str(" (max applied)");
            }
        }

        let amount = fee
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(i64::MAX);
        trace.push_str(&format!(" = {}", amount));

        FeeCalculation {
            rule_id: Some(self.id),
            fee_type: self.fee_type,
            amount,
            currency,
            applied_rate,
            trace,
        }
    }
}

/// Picks the best matching rule: most specific, then newest, then highest id.
pub fn select_rule<'a>(rules: &'a [FeeRule], query: &FeeQuery) -> Option<&'a FeeRule> {
    rules
        .iter()
        .filter(|r| r.matches(query))
        .max_by(|a, b| {
            a.specificity()
                .cmp(&b.specificity())
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        })
}

/// A fee to be recorded alongside a journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCharge {
    pub fee_type: FeeType,
    pub rule_id: Option<FeeRuleId>,
    pub amount: i64,
    pub currency: Currency,
    /// Account the fee was credited to
    pub account_id: AccountId,
    pub agent_id: Option<String>,
}

/// A fee as recorded against a posted journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRecord {
    pub id: Uuid,
    pub journal_id: JournalId,
    pub receipt_code: String,
    pub fee_type: FeeType,
    pub rule_id: Option<FeeRuleId>,
    pub amount: i64,
    pub currency: Currency,
    pub account_id: AccountId,
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn rule(method: CalculationMethod) -> FeeRule {
        FeeRule {
            id: FeeRuleId::new(),
            transaction_type: TransactionType::Deposit,
            source_currency: None,
            target_currency: None,
            account_type: None,
            owner_type: None,
            calculation_method: method,
            fee_value: Decimal::ZERO,
            min_fee: None,
            max_fee: None,
            tiers: Vec::new(),
            fee_type: FeeType::Platform,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn query(amount: i64) -> FeeQuery {
        FeeQuery {
            transaction_type: TransactionType::Deposit,
            amount,
            source_currency: Currency::KES,
            target_currency: None,
            account_type: AccountType::Real,
            owner_type: OwnerType::User,
        }
    }

    #[test]
    fn test_percentage_fee() {
        let mut r = rule(CalculationMethod::Percentage);
        r.fee_value = dec!(0.015);
        let calc = r.evaluate(10_000, Currency::KES);
        assert_eq!(calc.amount, 150);
        assert_eq!(calc.applied_rate, dec!(0.015));
        assert_eq!(calc.rule_id, Some(r.id));
    }

    #[test]
    fn test_percentage_rounds_half_away_from_zero() {
        let mut r = rule(CalculationMethod::Percentage);
        r.fee_value = dec!(0.01);
        assert_eq!(r.evaluate(250, Currency::KES).amount, 3);
        assert_eq!(r.evaluate(249, Currency::KES).amount, 2);
    }

    #[test]
    fn test_tiered_fee_picks_first_covering_tier() {
        let mut r = rule(CalculationMethod::Tiered);
        r.tiers = vec![
            FeeTier {
                min_amount: 0,
                max_amount: Some(1000),
                rate: Some(dec!(0.01)),
                fixed_fee: None,
            },
            FeeTier {
                min_amount: 1000,
                max_amount: None,
                rate: Some(dec!(0.005)),
                fixed_fee: Some(5),
            },
        ];
        assert_eq!(r.evaluate(500, Currency::KES).amount, 5);
        assert_eq!(r.evaluate(5000, Currency::KES).amount, 30);
        // The boundary belongs to the first tier.
        assert_eq!(r.evaluate(1000, Currency::KES).amount, 10);
    }

    #[test]
    fn test_min_clamp_is_annotated() {
        let mut r = rule(CalculationMethod::Percentage);
        r.fee_value = dec!(0.01);
        r.min_fee = Some(2);
        r.max_fee = Some(100);
        let calc = r.evaluate(50, Currency::KES);
        assert_eq!(calc.amount, 2);
        assert!(calc.trace.contains("(min applied)"));
    }

    #[test]
    fn test_max_clamp_is_annotated() {
        let mut r = rule(CalculationMethod::Percentage);
        r.fee_value = dec!(0.1);
        r.max_fee = Some(100);
        let calc = r.evaluate(5_000, Currency::KES);
        assert_eq!(calc.amount, 100);
        assert!(calc.trace.contains("(max applied)"));
    }

    #[test]
    fn test_fixed_fee_uses_min_fee_without_annotation() {
        let mut r = rule(CalculationMethod::Fixed);
        r.min_fee = Some(10);
        r.max_fee = Some(100);
        let calc = r.evaluate(1_000, Currency::KES);
        assert_eq!(calc.amount, 10);
        assert!(!calc.trace.contains("applied"));

        let mut by_value = rule(CalculationMethod::Fixed);
        by_value.fee_value = dec!(25);
        assert_eq!(by_value.evaluate(1_000, Currency::KES).amount, 25);
    }

    #[test]
    fn test_fixed_fee_value_is_capped_by_max_fee() {
        let mut r = rule(CalculationMethod::Fixed);
        r.fee_value = dec!(25);
        r.max_fee = Some(10);
        assert!(r.validate().is_ok());

        let calc = r.evaluate(1_000, Currency::KES);
        assert_eq!(calc.amount, 10);
        assert!(calc.trace.contains("(max applied)"));
    }

    #[test]
    fn test_most_specific_rule_wins() {
        let general = rule(CalculationMethod::Percentage);
        let mut specific = rule(CalculationMethod::Percentage);
        specific.source_currency = Some(Currency::KES);
        specific.owner_type = Some(OwnerType::User);
        specific.created_at = general.created_at - Duration::days(1);
        let rules = vec![general, specific.clone()];
        assert_eq!(select_rule(&rules, &query(100)).map(|r| r.id), Some(specific.id));
    }

    #[test]
    fn test_newest_rule_breaks_ties() {
        let older = rule(CalculationMethod::Percentage);
        let mut newer = rule(CalculationMethod::Percentage);
        newer.created_at = older.created_at + Duration::seconds(5);
        let rules = vec![newer.clone(), older];
        assert_eq!(select_rule(&rules, &query(100)).map(|r| r.id), Some(newer.id));
    }

    #[test]
    fn test_mismatched_or_inactive_rules_are_ignored() {
        let mut other_currency = rule(CalculationMethod::Percentage);
        other_currency.source_currency = Some(Currency::USD);
        let mut inactive = rule(CalculationMethod::Percentage);
        inactive.is_active = false;
        let rules = vec![other_currency, inactive];
        assert!(select_rule(&rules, &query(100)).is_none());
    }

    #[test]
    fn test_validate_rejects_bad_rules() {
        assert!(rule(CalculationMethod::Tiered).validate().is_err());

        let mut inverted = rule(CalculationMethod::Percentage);
        inverted.min_fee = Some(50);
        inverted.max_fee = Some(10);
        assert!(matches!(inverted.validate(), Err(DomainError::InvalidFeeRule(_))));

        let mut negative = rule(CalculationMethod::Percentage);
        negative.fee_value = dec!(-0.01);
        assert!(negative.validate().is_err());
    }
}
