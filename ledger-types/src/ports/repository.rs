//! Repository port traits.
//!
//! These are the storage ports of the hexagon. Adapters (Postgres, SQLite)
//! implement all of them and are exposed to the services as a [`LedgerStore`].

use chrono::{DateTime, Utc};

use crate::domain::{
    Account, AccountId, AccountInsert, AccountKey, AccountUpdate, ClaimOutcome, FeeRecord,
    FeeRule, Journal, JournalDraft, JournalId, LedgerEntry, NewAccount, PostOutcome,
    PostedJournal, TransactionType,
};
use crate::dto::{DateRange, EntryTotals, JournalFilter, JournalTotals, PageRequest, Paginated};
use crate::error::RepoError;

/// Account storage.
#[async_trait::async_trait]
pub trait AccountRepository: Send + Sync + 'static {
    /// Inserts an account unless its natural key already exists.
    async fn insert_account(&self, account: NewAccount) -> Result<AccountInsert, RepoError>;

    /// Inserts an account and posts its opening journal in one unit.
    ///
    /// An existing natural key returns the stored account and posts nothing;
    /// a failed posting leaves no account behind.
    async fn insert_account_with_opening(
        &self,
        account: NewAccount,
        opening: JournalDraft,
    ) -> Result<AccountInsert, RepoError>;

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError>;

    /// Loads all the given accounts in one query. Unknown ids are skipped.
    async fn get_accounts(&self, ids: &[AccountId]) -> Result<Vec<Account>, RepoError>;

    async fn find_account(&self, key: &AccountKey) -> Result<Option<Account>, RepoError>;

    async fn list_accounts_by_owner(&self, owner_id: &str) -> Result<Vec<Account>, RepoError>;

    async fn list_system_accounts(&self) -> Result<Vec<Account>, RepoError>;

    /// Applies an attribute update. Balances are never touched here.
    async fn update_account(
        &self,
        id: AccountId,
        update: &AccountUpdate,
    ) -> Result<Account, RepoError>;

    /// Σ signed entries of the account (credit +, debit −).
    async fn sum_entries(&self, id: AccountId) -> Result<i64, RepoError>;
}

/// Journal storage. Every method that writes entries is one atomic unit.
#[async_trait::async_trait]
pub trait JournalRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Posting (MUST be atomic)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Writes journal, entries, balance deltas and fee records together.
    ///
    /// The receipt-code uniqueness check is the journal insert itself; a
    /// duplicate returns the stored journal without writing anything.
    async fn post_journal(&self, draft: JournalDraft) -> Result<PostOutcome, RepoError>;

    /// Inserts the draft's header as a pending journal, claiming its receipt code.
    async fn claim_journal(&self, draft: &JournalDraft) -> Result<ClaimOutcome, RepoError>;

    /// Posts the entries of a claimed journal iff it is still pending.
    async fn complete_pending(&self, draft: JournalDraft) -> Result<PostedJournal, RepoError>;

    /// Marks a pending journal failed.
    async fn fail_pending(&self, id: JournalId, error: &str) -> Result<Journal, RepoError>;

    /// Stores a failed journal with no entries. A duplicate code returns the stored journal.
    async fn record_failed(&self, draft: &JournalDraft, error: &str) -> Result<Journal, RepoError>;

    /// Posts `reversal` and marks `original` reversed in one unit.
    async fn reverse_journal(
        &self,
        original: JournalId,
        reversal: JournalDraft,
        reason: &str,
    ) -> Result<PostedJournal, RepoError>;

    /// Fails pending journals created before `cutoff`.
    async fn sweep_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<Journal>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    async fn get_journal(&self, id: JournalId) -> Result<Option<Journal>, RepoError>;

    async fn get_journal_by_receipt(&self, code: &str) -> Result<Option<Journal>, RepoError>;

    async fn list_journals(
        &self,
        filter: &JournalFilter,
        page: PageRequest,
    ) -> Result<Paginated<Journal>, RepoError>;

    async fn list_entries_by_journal(&self, id: JournalId) -> Result<Vec<LedgerEntry>, RepoError>;

    async fn list_entries_by_account(
        &self,
        account_id: AccountId,
        range: &DateRange,
        page: PageRequest,
    ) -> Result<Paginated<LedgerEntry>, RepoError>;

    /// Balance of the account from entries created strictly before `at`.
    async fn balance_before(
        &self,
        account_id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<i64, RepoError>;
}

/// Fee rules and recorded fees.
#[async_trait::async_trait]
pub trait FeeRepository: Send + Sync + 'static {
    async fn upsert_fee_rule(&self, rule: &FeeRule) -> Result<FeeRule, RepoError>;

    /// Active rules for a transaction type.
    async fn find_fee_rules(&self, tx_type: TransactionType) -> Result<Vec<FeeRule>, RepoError>;

    async fn list_fee_records_by_receipt(&self, code: &str) -> Result<Vec<FeeRecord>, RepoError>;

    async fn list_fee_records_by_agent(
        &self,
        agent_id: &str,
        range: &DateRange,
    ) -> Result<Vec<FeeRecord>, RepoError>;
}

/// Aggregations for statements and reports.
#[async_trait::async_trait]
pub trait ReportRepository: Send + Sync + 'static {
    /// Journal counts, volume and fees grouped by type, status and currency.
    async fn journal_totals(&self, range: &DateRange) -> Result<Vec<JournalTotals>, RepoError>;

    async fn account_totals(
        &self,
        account_id: AccountId,
        range: &DateRange,
    ) -> Result<EntryTotals, RepoError>;
}

/// Monotonic id source for receipt codes.
#[async_trait::async_trait]
pub trait SequenceSource: Send + Sync + 'static {
    async fn next_value(&self) -> Result<u64, RepoError>;
}

/// Everything the services need from storage.
#[async_trait::async_trait]
pub trait LedgerStore:
    AccountRepository + JournalRepository + FeeRepository + ReportRepository + SequenceSource
{
    /// Cheap round trip used by health checks.
    async fn ping(&self) -> Result<(), RepoError>;
}
