//! Fee Calculation Engine
//!
//! Resolves the applicable fee rule for a transaction and evaluates it.
//! Resolutions are cached per dimension tuple; the cached value is the
//! matched rule or the fact that none matched, so a miss is cached too.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use ledger_types::domain::{FeeCalculation, FeeQuery, FeeRecord, FeeRule, FeeType, select_rule};
use ledger_types::ports::FeeRepository;
use ledger_types::{AccountType, AppError, Currency, OwnerType, TransactionType};
use tracing::{debug, instrument};

/// Everything a resolution depends on except the amount.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    transaction_type: TransactionType,
    source_currency: Currency,
    target_currency: Option<Currency>,
    account_type: AccountType,
    owner_type: OwnerType,
}

impl From<&FeeQuery> for CacheKey {
    fn from(query: &FeeQuery) -> Self {
        Self {
            transaction_type: query.transaction_type,
            source_currency: query.source_currency,
            target_currency: query.target_currency,
            account_type: query.account_type,
            owner_type: query.owner_type,
        }
    }
}

#[derive(Debug, Clone)]
struct Resolution {
    /// Overall winner
    best: Option<FeeRule>,
    /// Winner of each fee type, ordered by fee type
    by_type: Vec<FeeRule>,
    loaded_at: Instant,
}

/// Fee rule resolution and evaluation with a TTL cache.
pub struct FeeEngine<R: FeeRepository> {
    store: Arc<R>,
    cache: DashMap<CacheKey, Resolution>,
    ttl: Duration,
}

impl<R: FeeRepository> FeeEngine<R> {
    pub fn new(store: Arc<R>, ttl: Duration) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            ttl,
        }
    }

    /// Fee of the single best matching rule. No rule means a zero fee.
    #[instrument(skip(self, query), fields(tx_type = %query.transaction_type, amount = query.amount))]
    pub async fn calculate_fee(&self, query: &FeeQuery) -> Result<FeeCalculation, AppError> {
        check_amount(query)?;
        let resolution = self.resolve(query).await?;

        Ok(match resolution.best {
            Some(rule) => rule.evaluate(query.amount, query.source_currency),
            None => FeeCalculation::none(query.source_currency),
        })
    }

    /// Best rule of every fee type, evaluated independently. Zero fees are dropped.
    #[instrument(skip(self, query), fields(tx_type = %query.transaction_type, amount = query.amount))]
    pub async fn calculate_multiple_fees(
        &self,
        query: &FeeQuery,
    ) -> Result<Vec<FeeCalculation>, AppError> {
        check_amount(query)?;
        let resolution = self.resolve(query).await?;

        Ok(resolution
            .by_type
            .iter()
            .map(|rule| rule.evaluate(query.amount, query.source_currency))
            .filter(|calc| calc.amount > 0)
            .collect())
    }

    /// Validates and stores a rule, then drops every cached resolution.
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn upsert_fee_rule(&self, rule: FeeRule) -> Result<FeeRule, AppError> {
        rule.validate()?;
        let stored = self.store.upsert_fee_rule(&rule).await?;
        self.invalidate_cache();
        Ok(stored)
    }

    /// Fees recorded against a posted journal.
    pub async fn fee_records_by_receipt(&self, code: &str) -> Result<Vec<FeeRecord>, AppError> {
        self.store
            .list_fee_records_by_receipt(code)
            .await
            .map_err(Into::into)
    }

    pub fn invalidate_cache(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        debug!(dropped, "fee rule cache cleared");
    }

    /// Number of cached resolutions, fresh or stale.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    async fn resolve(&self, query: &FeeQuery) -> Result<Resolution, AppError> {
        let key = CacheKey::from(query);
        if let Some(hit) = self.cache.get(&key) {
            if hit.loaded_at.elapsed() < self.ttl {
                return Ok(hit.clone());
            }
        }

        let rules = self.store.find_fee_rules(query.transaction_type).await?;
        let resolution = Resolution {
            best: select_rule(&rules, query).cloned(),
            by_type: best_per_type(&rules, query),
            loaded_at: Instant::now(),
        };
        debug!(
            candidates = rules.len(),
            matched = resolution.best.is_some(),
            "fee rules resolved"
        );
        self.cache.insert(key, resolution.clone());
        Ok(resolution)
    }
}

fn check_amount(query: &FeeQuery) -> Result<(), AppError> {
    if query.amount < 0 {
        return Err(AppError::BadRequest("Amount cannot be negative".into()));
    }
    Ok(())
}

fn best_per_type(rules: &[FeeRule], query: &FeeQuery) -> Vec<FeeRule> {
    let mut types: Vec<FeeType> = rules.iter().map(|r| r.fee_type).collect();
    types.sort();
    types.dedup();

    types
        .into_iter()
        .filter_map(|fee_type| {
            let candidates: Vec<FeeRule> = rules
                .iter()
                .filter(|r| r.fee_type == fee_type)
                .cloned()
                .collect();
            select_rule(&candidates, query).cloned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledger_repo::SqliteRepo;
    use ledger_types::domain::{CalculationMethod, FeeRuleId, FeeTier};
    use rust_decimal_macros::dec;

    async fn engine() -> FeeEngine<SqliteRepo> {
        let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
        FeeEngine::new(Arc::new(repo), Duration::from_secs(300))
    }

    fn rule(method: CalculationMethod, fee_value: rust_decimal::Decimal) -> FeeRule {
        FeeRule {
            id: FeeRuleId::new(),
            transaction_type: TransactionType::Withdrawal,
            source_currency: None,
            target_currency: None,
            account_type: None,
            owner_type: None,
            calculation_method: method,
            fee_value,
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
            transaction_type: TransactionType::Withdrawal,
            amount,
            source_currency: Currency::KES,
            target_currency: None,
            account_type: AccountType::Real,
            owner_type: OwnerType::User,
        }
    }

    #[tokio::test]
    async fn test_no_rule_is_zero_fee() {
        let engine = engine().await;
        let calc = engine.calculate_fee(&query(1000)).await.unwrap();
        assert_eq!(calc.amount, 0);
        assert!(calc.rule_id.is_none());
        assert_eq!(calc.currency, Currency::KES);
    }

    #[tokio::test]
    async fn test_percentage_clamps_to_min() {
        let engine = engine().await;
        let mut pct = rule(CalculationMethod::Percentage, dec!(0.01));
        pct.min_fee = Some(50);
        engine.upsert_fee_rule(pct).await.unwrap();

        let calc = engine.calculate_fee(&query(1000)).await.unwrap();
        assert_eq!(calc.amount, 50);
        assert!(calc.trace.contains("(min applied)"));
        assert_eq!(calc.applied_rate, dec!(0.01));
    }

    #[tokio::test]
    async fn test_percentage_clamps_to_max() {
        let engine = engine().await;
        let mut pct = rule(CalculationMethod::Percentage, dec!(0.02));
        pct.max_fee = Some(500);
        engine.upsert_fee_rule(pct).await.unwrap();

        let calc = engine.calculate_fee(&query(100_000)).await.unwrap();
        assert_eq!(calc.amount, 500);
        assert!(calc.trace.contains("(max applied)"));
    }

    #[tokio::test]
    async fn test_tiered_picks_covering_tier() {
        let engine = engine().await;
        let mut tiered = rule(CalculationMethod::Tiered, dec!(0));
        tiered.tiers = vec![
            FeeTier {
                min_amount: 0,
                max_amount: Some(9_999),
                rate: None,
                fixed_fee: Some(25),
            },
            FeeTier {
                min_amount: 10_000,
                max_amount: None,
                rate: Some(dec!(0.005)),
                fixed_fee: Some(10),
            },
        ];
        engine.upsert_fee_rule(tiered).await.unwrap();

        assert_eq!(engine.calculate_fee(&query(5_000)).await.unwrap().amount, 25);
        // 20_000 x 0.005 + 10
        assert_eq!(engine.calculate_fee(&query(20_000)).await.unwrap().amount, 110);
    }

    #[tokio::test]
    async fn test_most_specific_rule_wins() {
        let engine = engine().await;
        engine
            .upsert_fee_rule(rule(CalculationMethod::Fixed, dec!(10)))
            .await
            .unwrap();
        let mut specific = rule(CalculationMethod::Fixed, dec!(30));
        specific.source_currency = Some(Currency::KES);
        specific.owner_type = Some(OwnerType::User);
        engine.upsert_fee_rule(specific.clone()).await.unwrap();

        let calc = engine.calculate_fee(&query(1000)).await.unwrap();
        assert_eq!(calc.amount, 30);
        assert_eq!(calc.rule_id, Some(specific.id));

        let mut usd = query(1000);
        usd.source_currency = Currency::USD;
        assert_eq!(engine.calculate_fee(&usd).await.unwrap().amount, 10);
    }

    #[tokio::test]
    async fn test_newest_rule_breaks_ties() {
        let engine = engine().await;
        let mut older = rule(CalculationMethod::Fixed, dec!(10));
        older.created_at = Utc::now() - chrono::Duration::days(1);
        let newer = rule(CalculationMethod::Fixed, dec!(20));
        engine.upsert_fee_rule(older).await.unwrap();
        engine.upsert_fee_rule(newer).await.unwrap();

        assert_eq!(engine.calculate_fee(&query(1000)).await.unwrap().amount, 20);
    }

    #[tokio::test]
    async fn test_multiple_fees_one_per_type() {
        let engine = engine().await;
        engine
            .upsert_fee_rule(rule(CalculationMethod::Fixed, dec!(10)))
            .await
            .unwrap();
        let mut commission = rule(CalculationMethod::Percentage, dec!(0.01));
        commission.fee_type = FeeType::Commission;
        engine.upsert_fee_rule(commission).await.unwrap();
        let mut network = rule(CalculationMethod::Percentage, dec!(0));
        network.fee_type = FeeType::Network;
        engine.upsert_fee_rule(network).await.unwrap();

        let fees = engine.calculate_multiple_fees(&query(5000)).await.unwrap();
        let summary: Vec<(FeeType, i64)> = fees.iter().map(|f| (f.fee_type, f.amount)).collect();
        assert_eq!(
            summary,
            vec![(FeeType::Platform, 10), (FeeType::Commission, 50)]
        );
    }

    #[tokio::test]
    async fn test_cache_serves_until_invalidated() {
        let engine = engine().await;
        assert_eq!(engine.calculate_fee(&query(1000)).await.unwrap().amount, 0);
        assert_eq!(engine.cache_len(), 1);

        // A rule written behind the engine's back stays invisible while cached.
        let store = engine.store.clone();
        store
            .upsert_fee_rule(&rule(CalculationMethod::Fixed, dec!(15)))
            .await
            .unwrap();
        assert_eq!(engine.calculate_fee(&query(1000)).await.unwrap().amount, 0);

        engine.invalidate_cache();
        assert_eq!(engine.cache_len(), 0);
        assert_eq!(engine.calculate_fee(&query(1000)).await.unwrap().amount, 15);
    }

    #[tokio::test]
    async fn test_expired_entries_reload() {
        let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
        let engine = FeeEngine::new(Arc::new(repo), Duration::ZERO);
        assert_eq!(engine.calculate_fee(&query(1000)).await.unwrap().amount, 0);

        engine
            .store
            .upsert_fee_rule(&rule(CalculationMethod::Fixed, dec!(15)))
            .await
            .unwrap();
        assert_eq!(engine.calculate_fee(&query(1000)).await.unwrap().amount, 15);
    }

    #[tokio::test]
    async fn test_invalid_rule_rejected() {
        let engine = engine().await;
        let tiered = rule(CalculationMethod::Tiered, dec!(0));
        let err = engine.upsert_fee_rule(tiered).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_negative_amount_rejected() {
        let engine = engine().await;
        let err = engine.calculate_fee(&query(-1)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
