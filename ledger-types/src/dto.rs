//! Data Transfer Objects (DTOs) for requests and responses.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Account, AccountId, AccountPurpose, AccountType, Currency, Direction, FeeRecord, Journal,
    JournalId, JournalStatus, LedgerEntry, OwnerType, TransactionType,
};
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Pagination & filters
// ─────────────────────────────────────────────────────────────────────────────

/// Largest page the read paths will return.
pub const MAX_PAGE_SIZE: u32 = 500;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size.clamp(1, MAX_PAGE_SIZE))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * self.limit()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 50)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: PageRequest) -> Self {
        Self {
            items,
            total,
            page: page.page.max(1),
            page_size: page.limit() as u32,
        }
    }
}

/// Half-open time window `[from, to)`. Missing bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    /// The UTC calendar day `date`.
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
        let end = date
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| t.and_utc());
        Self {
            from: start,
            to: end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at < to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalFilter {
    pub status: Option<JournalStatus>,
    pub transaction_type: Option<TransactionType>,
    pub owner_id: Option<String>,
    #[serde(default)]
    pub range: DateRange,
}

// ─────────────────────────────────────────────────────────────────────────────
// Account DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a new account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    #[serde(default)]
    pub owner_type: OwnerType,
    pub owner_id: String,
    pub currency: Currency,
    pub purpose: AccountPurpose,
    #[serde(default)]
    pub account_type: AccountType,
    /// Opening balance in minor units, funded from system liquidity
    #[serde(default)]
    pub initial_balance: i64,
    #[serde(default)]
    pub overdraft_limit: i64,
    #[serde(default)]
    pub commission_rate: Option<Decimal>,
}

impl CreateAccountRequest {
    /// A zero-balance wallet for a user.
    pub fn wallet(owner_id: impl Into<String>, currency: Currency, account_type: AccountType) -> Self {
        Self {
            owner_type: OwnerType::User,
            owner_id: owner_id.into(),
            currency,
            purpose: AccountPurpose::Wallet,
            account_type,
            initial_balance: 0,
            overdraft_limit: 0,
            commission_rate: None,
        }
    }
}

/// One item of a batch operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem<T> {
    pub index: usize,
    pub result: Result<T, AppError>,
}

/// Per-index outcome of a batch. Every item is attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<T> {
    pub items: Vec<BatchItem<T>>,
}

impl<T> BatchResult<T> {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn errors(&self) -> impl Iterator<Item = (usize, &AppError)> {
        self.items
            .iter()
            .filter_map(|i| i.result.as_ref().err().map(|e| (i.index, e)))
    }
}

impl<T> FromIterator<Result<T, AppError>> for BatchResult<T> {
    fn from_iter<I: IntoIterator<Item = Result<T, AppError>>>(iter: I) -> Self {
        Self {
            items: iter
                .into_iter()
                .enumerate()
                .map(|(index, result)| BatchItem { index, result })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: AccountId,
    pub currency: Currency,
    pub balance: i64,
    /// Balance plus overdraft allowance
    pub available: i64,
    pub overdraft_limit: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for BalanceResponse {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            currency: account.currency,
            balance: account.balance,
            available: account.available(),
            overdraft_limit: account.overdraft_limit,
            updated_at: account.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchBalances {
    pub balances: Vec<BalanceResponse>,
    /// Requested ids with no account
    pub missing: Vec<AccountId>,
}

/// Stored balance compared to the sum of the account's entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub account_id: AccountId,
    pub stored_balance: i64,
    pub ledger_balance: i64,
    pub difference: i64,
    pub is_balanced: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// A request to move money.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub transaction_type: TransactionType,
    /// Owner of the primary (source or credited) wallet
    pub owner_id: String,
    #[serde(default)]
    pub owner_type: OwnerType,
    #[serde(default)]
    pub account_type: AccountType,
    /// Principal in minor units of `currency`
    pub amount: i64,
    pub currency: Currency,
    /// Credited currency of a conversion or trade
    #[serde(default)]
    pub target_currency: Option<Currency>,
    /// Counterparty of a transfer
    #[serde(default)]
    pub destination_owner_id: Option<String>,
    #[serde(default)]
    pub destination_owner_type: Option<OwnerType>,
    /// Agent earning commission on the transaction
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Side of the wallet entry for adjustments
    #[serde(default)]
    pub direction: Option<Direction>,
    /// Caller-assigned idempotency key; generated when absent
    #[serde(default)]
    pub receipt_code: Option<String>,
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransactionRequest {
    pub fn new(
        transaction_type: TransactionType,
        owner_id: impl Into<String>,
        amount: i64,
        currency: Currency,
    ) -> Self {
        Self {
            transaction_type,
            owner_id: owner_id.into(),
            owner_type: OwnerType::User,
            account_type: AccountType::Real,
            amount,
            currency,
            target_currency: None,
            destination_owner_id: None,
            destination_owner_type: None,
            agent_id: None,
            direction: None,
            receipt_code: None,
            external_ref: None,
            description: None,
        }
    }
}

/// Outcome of executing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub receipt_code: String,
    pub journal_id: JournalId,
    pub transaction_type: TransactionType,
    pub status: JournalStatus,
    pub amount: i64,
    pub currency: Currency,
    pub fee_amount: i64,
    /// Primary wallet balance after posting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// True when the receipt code had already been processed
    #[serde(default)]
    pub duplicate: bool,
    pub created_at: DateTime<Utc>,
}

impl TransactionResponse {
    pub fn from_journal(journal: &Journal, balance_after: Option<i64>, duplicate: bool) -> Self {
        Self {
            receipt_code: journal.receipt_code.clone(),
            journal_id: journal.id,
            transaction_type: journal.transaction_type,
            status: journal.status,
            amount: journal.amount,
            currency: journal.currency,
            fee_amount: journal.fee_amount,
            balance_after,
            error_message: journal.error_message.clone(),
            duplicate,
            created_at: journal.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatusResponse {
    pub receipt_code: String,
    pub journal_id: JournalId,
    pub status: JournalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversed_by: Option<JournalId>,
}

impl From<&Journal> for TransactionStatusResponse {
    fn from(journal: &Journal) -> Self {
        Self {
            receipt_code: journal.receipt_code.clone(),
            journal_id: journal.id,
            status: journal.status,
            error_message: journal.error_message.clone(),
            completed_at: journal.completed_at,
            reversed_by: journal.reversed_by,
        }
    }
}

/// A journal with its entries and fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub journal: Journal,
    pub entries: Vec<LedgerEntry>,
    pub fees: Vec<FeeRecord>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Statement & report DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Debit and credit totals over a set of entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryTotals {
    pub entry_count: i64,
    pub total_debits: i64,
    pub total_credits: i64,
}

impl EntryTotals {
    pub fn net(&self) -> i64 {
        self.total_credits - self.total_debits
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStatement {
    pub account: Account,
    pub range: DateRange,
    pub opening_balance: i64,
    pub closing_balance: i64,
    pub totals: EntryTotals,
    pub entries: Paginated<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerStatement {
    pub owner_id: String,
    pub range: DateRange,
    pub accounts: Vec<AccountStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyTotal {
    pub currency: Currency,
    pub account_count: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub owner_id: String,
    pub accounts: Vec<Account>,
    pub totals: Vec<CurrencyTotal>,
}

/// Aggregated journals for one (type, status, currency) bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalTotals {
    pub transaction_type: TransactionType,
    pub status: JournalStatus,
    pub currency: Currency,
    pub count: i64,
    pub volume: i64,
    pub fees: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    /// Completed journals only
    pub rows: Vec<JournalTotals>,
    pub transaction_count: i64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub range: DateRange,
    pub total: i64,
    pub by_status: BTreeMap<JournalStatus, i64>,
    pub by_type: BTreeMap<TransactionType, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHolding {
    pub currency: Currency,
    pub purpose: AccountPurpose,
    pub account_type: AccountType,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHoldings {
    pub holdings: Vec<SystemHolding>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCommissionSummary {
    pub agent_id: String,
    pub range: DateRange,
    pub record_count: i64,
    pub totals: BTreeMap<Currency, i64>,
    pub records: Vec<FeeRecord>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin & monitoring DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Counts produced by a seeding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    pub owners_seen: u64,
    pub created: u64,
    pub existing: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub storage_ok: bool,
    pub event_queue_depth: usize,
    pub event_subscribers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_bounds() {
        let page = PageRequest::new(0, 10_000);
        assert_eq!(page.page, 1);
        assert_eq!(page.limit(), i64::from(MAX_PAGE_SIZE));
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }

    #[test]
    fn test_day_range_is_half_open() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let range = DateRange::day(date);
        let start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        assert!(range.contains(start));
        assert!(!range.contains(start + chrono::Duration::days(1)));
    }

    #[test]
    fn test_batch_result_counts() {
        let batch: BatchResult<u32> = vec![Ok(1), Err(AppError::Conflict("dup".into())), Ok(3)]
            .into_iter()
            .collect();
        assert_eq!(batch.succeeded(), 2);
        assert_eq!(batch.failed(), 1);
        assert_eq!(batch.errors().map(|(i, _)| i).collect::<Vec<_>>(), vec![1]);
    }
}
