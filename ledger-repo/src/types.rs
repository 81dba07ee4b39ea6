//! Database row types shared by the SQLite and PostgreSQL adapters.
//!
//! Ids are `Uuid` and timestamps `DateTime<Utc>` on both backends (BLOB/TEXT
//! in SQLite, UUID/TIMESTAMPTZ in Postgres). Enums, decimals and tier lists
//! are stored as text and parsed here.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use ledger_types::domain::{
    Account, AccountId, FeeRecord, FeeRule, FeeRuleId, FeeTier, Journal, JournalId, LedgerEntry,
};
use ledger_types::{EntryTotals, JournalTotals, RepoError};

/// Maps a sqlx error to the repository error space.
pub(crate) fn db_err(e: sqlx::Error) -> RepoError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepoError::Conflict(db.message().to_string())
        }
        _ => RepoError::Database(e.to_string()),
    }
}

pub(crate) fn tx_err(e: sqlx::Error) -> RepoError {
    RepoError::Transaction(e.to_string())
}

fn parse<T>(value: &str, field: &str) -> Result<T, RepoError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| RepoError::Database(format!("invalid {} '{}': {}", field, value, e)))
}

fn parse_opt<T>(value: Option<String>, field: &str) -> Result<Option<T>, RepoError>
where
    T: FromStr,
    T::Err: Display,
{
    value.map(|v| parse(&v, field)).transpose()
}

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// Account row joined with its balance.
#[derive(FromRow)]
pub struct DbAccount {
    pub id: Uuid,
    pub account_number: String,
    pub owner_type: String,
    pub owner_id: String,
    pub currency: String,
    pub purpose: String,
    pub account_type: String,
    pub balance: i64,
    pub overdraft_limit: i64,
    pub commission_rate: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbAccount {
    pub fn into_domain(self) -> Result<Account, RepoError> {
        Ok(Account {
            id: AccountId::from_uuid(self.id),
            account_number: self.account_number,
            owner_type: parse(&self.owner_type, "owner_type")?,
            owner_id: self.owner_id,
            currency: parse(&self.currency, "currency")?,
            purpose: parse(&self.purpose, "purpose")?,
            account_type: parse(&self.account_type, "account_type")?,
            balance: self.balance,
            overdraft_limit: self.overdraft_limit,
            commission_rate: parse_opt::<Decimal>(self.commission_rate, "commission_rate")?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Journal header row.
#[derive(FromRow)]
pub struct DbJournal {
    pub id: Uuid,
    pub receipt_code: String,
    pub transaction_type: String,
    pub status: String,
    pub owner_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub fee_amount: i64,
    pub primary_account_id: Option<Uuid>,
    pub counterparty_account_id: Option<Uuid>,
    pub description: Option<String>,
    pub external_ref: Option<String>,
    pub error_message: Option<String>,
    pub reversal_of: Option<Uuid>,
    pub reversed_by: Option<Uuid>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversal_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DbJournal {
    pub fn into_domain(self) -> Result<Journal, RepoError> {
        Ok(Journal {
            id: JournalId::from_uuid(self.id),
            receipt_code: self.receipt_code,
            transaction_type: parse(&self.transaction_type, "transaction_type")?,
            status: parse(&self.status, "status")?,
            owner_id: self.owner_id,
            amount: self.amount,
            currency: parse(&self.currency, "currency")?,
            fee_amount: self.fee_amount,
            primary_account_id: self.primary_account_id.map(AccountId::from_uuid),
            counterparty_account_id: self.counterparty_account_id.map(AccountId::from_uuid),
            description: self.description,
            external_ref: self.external_ref,
            error_message: self.error_message,
            reversal_of: self.reversal_of.map(JournalId::from_uuid),
            reversed_by: self.reversed_by.map(JournalId::from_uuid),
            reversed_at: self.reversed_at,
            reversal_reason: self.reversal_reason,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

/// Ledger entry row.
#[derive(FromRow)]
pub struct DbLedgerEntry {
    pub id: Uuid,
    pub journal_id: Uuid,
    pub line_no: i32,
    pub account_id: Uuid,
    pub direction: String,
    pub amount: i64,
    pub currency: String,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

impl DbLedgerEntry {
    pub fn into_domain(self) -> Result<LedgerEntry, RepoError> {
        Ok(LedgerEntry {
            id: self.id,
            journal_id: JournalId::from_uuid(self.journal_id),
            line_no: self.line_no,
            account_id: AccountId::from_uuid(self.account_id),
            direction: parse(&self.direction, "direction")?,
            amount: self.amount,
            currency: parse(&self.currency, "currency")?,
            balance_after: self.balance_after,
            created_at: self.created_at,
        })
    }
}

/// Fee rule row. Tiers are a JSON array.
#[derive(FromRow)]
pub struct DbFeeRule {
    pub id: Uuid,
    pub transaction_type: String,
    pub source_currency: Option<String>,
    pub target_currency: Option<String>,
    pub account_type: Option<String>,
    pub owner_type: Option<String>,
    pub calculation_method: String,
    pub fee_value: String,
    pub min_fee: Option<i64>,
    pub max_fee: Option<i64>,
    pub tiers: String,
    pub fee_type: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl DbFeeRule {
    pub fn into_domain(self) -> Result<FeeRule, RepoError> {
        let tiers: Vec<FeeTier> = serde_json::from_str(&self.tiers)
            .map_err(|e| RepoError::Database(format!("invalid tiers: {}", e)))?;

        Ok(FeeRule {
            id: FeeRuleId::from_uuid(self.id),
            transaction_type: parse(&self.transaction_type, "transaction_type")?,
            source_currency: parse_opt(self.source_currency, "source_currency")?,
            target_currency: parse_opt(self.target_currency, "target_currency")?,
            account_type: parse_opt(self.account_type, "account_type")?,
            owner_type: parse_opt(self.owner_type, "owner_type")?,
            calculation_method: parse(&self.calculation_method, "calculation_method")?,
            fee_value: parse(&self.fee_value, "fee_value")?,
            min_fee: self.min_fee,
            max_fee: self.max_fee,
            tiers,
            fee_type: parse(&self.fee_type, "fee_type")?,
            is_active: self.is_active,
            created_at: self.created_at,
        })
    }
}

/// Serializes tiers for the `fee_rules.tiers` column.
pub(crate) fn tiers_json(rule: &FeeRule) -> Result<String, RepoError> {
    serde_json::to_string(&rule.tiers).map_err(|e| RepoError::Database(e.to_string()))
}

/// Fee record row.
#[derive(FromRow)]
pub struct DbFeeRecord {
    pub id: Uuid,
    pub journal_id: Uuid,
    pub receipt_code: String,
    pub fee_type: String,
    pub rule_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub account_id: Uuid,
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DbFeeRecord {
    pub fn into_domain(self) -> Result<FeeRecord, RepoError> {
        Ok(FeeRecord {
            id: self.id,
            journal_id: JournalId::from_uuid(self.journal_id),
            receipt_code: self.receipt_code,
            fee_type: parse(&self.fee_type, "fee_type")?,
            rule_id: self.rule_id.map(FeeRuleId::from_uuid),
            amount: self.amount,
            currency: parse(&self.currency, "currency")?,
            account_id: AccountId::from_uuid(self.account_id),
            agent_id: self.agent_id,
            created_at: self.created_at,
        })
    }
}

/// Aggregate row of `journal_totals`.
#[derive(FromRow)]
pub struct DbJournalTotals {
    pub transaction_type: String,
    pub status: String,
    pub currency: String,
    pub count: i64,
    pub volume: i64,
    pub fees: i64,
}

impl DbJournalTotals {
    pub fn into_domain(self) -> Result<JournalTotals, RepoError> {
        Ok(JournalTotals {
            transaction_type: parse(&self.transaction_type, "transaction_type")?,
            status: parse(&self.status, "status")?,
            currency: parse(&self.currency, "currency")?,
            count: self.count,
            volume: self.volume,
            fees: self.fees,
        })
    }
}

/// Aggregate row of `account_totals`.
#[derive(FromRow)]
pub struct DbEntryTotals {
    pub entry_count: i64,
    pub total_debits: i64,
    pub total_credits: i64,
}

impl From<DbEntryTotals> for EntryTotals {
    fn from(row: DbEntryTotals) -> Self {
        Self {
            entry_count: row.entry_count,
            total_debits: row.total_debits,
            total_credits: row.total_credits,
        }
    }
}

/// Account columns selected for [`DbAccount`].
pub(crate) const ACCOUNT_COLUMNS: &str = "a.id, a.account_number, a.owner_type, a.owner_id, \
     a.currency, a.purpose, a.account_type, b.balance, a.overdraft_limit, a.commission_rate, \
     a.is_active, a.created_at, a.updated_at";

/// Journal columns selected for [`DbJournal`].
pub(crate) const JOURNAL_COLUMNS: &str = "id, receipt_code, transaction_type, status, owner_id, \
     amount, currency, fee_amount, primary_account_id, counterparty_account_id, description, \
     external_ref, error_message, reversal_of, reversed_by, reversed_at, reversal_reason, \
     created_at, completed_at";

/// Entry columns selected for [`DbLedgerEntry`].
pub(crate) const ENTRY_COLUMNS: &str =
    "id, journal_id, line_no, account_id, direction, amount, currency, balance_after, created_at";

/// Fee rule columns selected for [`DbFeeRule`].
pub(crate) const FEE_RULE_COLUMNS: &str = "id, transaction_type, source_currency, \
     target_currency, account_type, owner_type, calculation_method, fee_value, min_fee, max_fee, \
     tiers, fee_type, is_active, created_at";

/// Fee record columns selected for [`DbFeeRecord`].
pub(crate) const FEE_RECORD_COLUMNS: &str = "id, journal_id, receipt_code, fee_type, rule_id, \
     amount, currency, account_id, agent_id, created_at";
