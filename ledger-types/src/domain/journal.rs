//! Journal and ledger entry domain model.
//!
//! A journal is the atomic, balanced group of ledger entries produced by one
//! transaction. Entries are append-only; a journal is never edited after it
//! commits, only linked to the compensating journal that reverses it.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::{Account, AccountId, impl_str_enum};
use super::fee::FeeCharge;
use super::money::Currency;
use crate::error::DomainError;

/// Unique identifier for a Journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalId(Uuid);

impl JournalId {
    /// Creates a new random JournalId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a JournalId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the UUID value.
    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for JournalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JournalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JournalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The business kind of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money coming into a wallet from outside the platform
    Deposit,
    /// Money leaving a wallet to an external destination
    Withdrawal,
    /// Money moving between two wallets of the same currency
    Transfer,
    /// Currency exchange between two wallets of one owner
    Conversion,
    Trade,
    Fee,
    Commission,
    /// Compensating journal of an earlier transaction
    Reversal,
    Adjustment,
}

impl_str_enum!(TransactionType {
    Deposit => "deposit",
    Withdrawal => "withdrawal",
    Transfer => "transfer",
    Conversion => "conversion",
    Trade => "trade",
    Fee => "fee",
    Commission => "commission",
    Reversal => "reversal",
    Adjustment => "adjustment",
});

/// Side of a ledger entry. Credits raise a balance, debits lower it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl_str_enum!(Direction {
    Debit => "debit",
    Credit => "credit",
});

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Debit => Direction::Credit,
            Direction::Credit => Direction::Debit,
        }
    }

    /// Balance delta of an entry of `amount` on this side.
    pub fn signed(self, amount: i64) -> i64 {
        match self {
            Direction::Debit => -amount,
            Direction::Credit => amount,
        }
    }
}

/// Lifecycle state of a journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
}

impl_str_enum!(JournalStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Reversed => "reversed",
});

/// One posting line of a journal that has not been written yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub account_id: AccountId,
    pub direction: Direction,
    pub amount: i64,
    pub currency: Currency,
}

impl EntryDraft {
    pub fn debit(account_id: AccountId, amount: i64, currency: Currency) -> Self {
        Self {
            account_id,
            direction: Direction::Debit,
            amount,
            currency,
        }
    }

    pub fn credit(account_id: AccountId, amount: i64, currency: Currency) -> Self {
        Self {
            account_id,
            direction: Direction::Credit,
            amount,
            currency,
        }
    }

    /// The compensating line: same account and amount, opposite side.
    pub fn reversed(&self) -> Self {
        Self {
            direction: self.direction.flip(),
            ..*self
        }
    }
}

/// A journal as submitted for posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalDraft {
    pub id: JournalId,
    pub receipt_code: String,
    pub transaction_type: TransactionType,
    pub owner_id: Option<String>,
    /// Principal amount of the transaction, in `currency` minor units
    pub amount: i64,
    pub currency: Currency,
    pub fee_amount: i64,
    pub primary_account_id: Option<AccountId>,
    pub counterparty_account_id: Option<AccountId>,
    pub description: Option<String>,
    pub external_ref: Option<String>,
    pub reversal_of: Option<JournalId>,
    pub entries: Vec<EntryDraft>,
    pub fees: Vec<FeeCharge>,
    pub created_at: DateTime<Utc>,
}

impl JournalDraft {
    /// Starts a draft with no entries.
    pub fn new(
        receipt_code: impl Into<String>,
        transaction_type: TransactionType,
        amount: i64,
        currency: Currency,
    ) -> Self {
        Self {
            id: JournalId::new(),
            receipt_code: receipt_code.into(),
            transaction_type,
            owner_id: None,
            amount,
            currency,
            fee_amount: 0,
            primary_account_id: None,
            counterparty_account_id: None,
            description: None,
            external_ref: None,
            reversal_of: None,
            entries: Vec::new(),
            fees: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Appends an entry, skipping zero amounts.
    pub fn push(&mut self, entry: EntryDraft) {
        if entry.amount != 0 {
            self.entries.push(entry);
        }
    }

    /// Per-currency totals as `(debits, credits)`.
    pub fn totals(&self) -> Result<BTreeMap<Currency, (i64, i64)>, DomainError> {
        let mut totals: BTreeMap<Currency, (i64, i64)> = BTreeMap::new();
        for entry in &self.entries {
            let slot = totals.entry(entry.currency).or_insert((0, 0));
            let side = match entry.direction {
                Direction::Debit => &mut slot.0,
                Direction::Credit => &mut slot.1,
            };
            *side = side
                .checked_add(entry.amount)
                .ok_or(DomainError::AmountOverflow)?;
        }
        Ok(totals)
    }

    /// Σdebits = Σcredits for every currency in the journal.
    pub fn ensure_balanced(&self) -> Result<(), DomainError> {
        for (currency, (debits, credits)) in self.totals()? {
            if debits != credits {
                return Err(DomainError::UnbalancedJournal {
                    currency,
                    debits,
                    credits,
                });
            }
        }
        Ok(())
    }

    /// Shape checks followed by the balance check.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.entries.is_empty() {
            return Err(DomainError::EmptyJournal);
        }
        if self.entries.iter().any(|e| e.amount <= 0) {
            return Err(DomainError::NonPositiveAmount);
        }
        crate::domain::receipt::ReceiptCode::parse(&self.receipt_code)?;
        self.ensure_balanced()
    }

    /// Accounts touched by the draft, ascending. This is the lock order.
    pub fn account_ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.entries.iter().map(|e| e.account_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Header record in the given state.
    pub fn to_journal(&self, status: JournalStatus) -> Journal {
        Journal {
            id: self.id,
            receipt_code: self.receipt_code.clone(),
            transaction_type: self.transaction_type,
            status,
            owner_id: self.owner_id.clone(),
            amount: self.amount,
            currency: self.currency,
            fee_amount: self.fee_amount,
            primary_account_id: self.primary_account_id,
            counterparty_account_id: self.counterparty_account_id,
            description: self.description.clone(),
            external_ref: self.external_ref.clone(),
            error_message: None,
            reversal_of: self.reversal_of,
            reversed_by: None,
            reversed_at: None,
            reversal_reason: None,
            created_at: self.created_at,
            completed_at: None,
        }
    }
}

/// A journal header as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    pub id: JournalId,
    /// Idempotency and correlation key
    pub receipt_code: String,
    pub transaction_type: TransactionType,
    pub status: JournalStatus,
    pub owner_id: Option<String>,
    pub amount: i64,
    pub currency: Currency,
    pub fee_amount: i64,
    pub primary_account_id: Option<AccountId>,
    pub counterparty_account_id: Option<AccountId>,
    pub description: Option<String>,
    pub external_ref: Option<String>,
    pub error_message: Option<String>,
    pub reversal_of: Option<JournalId>,
    pub reversed_by: Option<JournalId>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversal_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A single debit or credit against one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub journal_id: JournalId,
    /// Position within the journal
    pub line_no: i32,
    pub account_id: AccountId,
    pub direction: Direction,
    pub amount: i64,
    pub currency: Currency,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn signed_amount(&self) -> i64 {
        self.direction.signed(self.amount)
    }

    pub fn as_draft(&self) -> EntryDraft {
        EntryDraft {
            account_id: self.account_id,
            direction: self.direction,
            amount: self.amount,
            currency: self.currency,
        }
    }
}

/// A committed journal together with its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedJournal {
    pub journal: Journal,
    pub entries: Vec<LedgerEntry>,
}

impl PostedJournal {
    /// Balance of `account_id` after this journal, if it was touched.
    pub fn balance_after(&self, account_id: AccountId) -> Option<i64> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.account_id == account_id)
            .map(|e| e.balance_after)
    }
}

/// Result of a posting attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    Posted(PostedJournal),
    /// The receipt code had already been used; nothing was written.
    Duplicate(PostedJournal),
}

impl PostOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, PostOutcome::Duplicate(_))
    }

    pub fn posted(&self) -> &PostedJournal {
        match self {
            PostOutcome::Posted(p) | PostOutcome::Duplicate(p) => p,
        }
    }

    pub fn into_posted(self) -> PostedJournal {
        match self {
            PostOutcome::Posted(p) | PostOutcome::Duplicate(p) => p,
        }
    }
}

/// Result of claiming a receipt code for asynchronous posting.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(Journal),
    Duplicate(Journal),
}

/// Balances computed for a draft against locked accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingPlan {
    /// `balance_after` for each entry, in draft order
    pub balances_after: Vec<i64>,
    /// Final balance per touched account, ascending by id
    pub final_balances: Vec<(AccountId, i64)>,
}

/// Applies `entries` in order to the current balances of `accounts`.
///
/// Every referenced account must be present, active and denominated in the
/// entry's currency. Non-system accounts whose balance decreases must stay
/// within their overdraft limit.
pub fn plan_postings(accounts: &[Account], entries: &[EntryDraft]) -> Result<PostingPlan, DomainError> {
    let by_id: HashMap<AccountId, &Account> = accounts.iter().map(|a| (a.id, a)).collect();
    let mut running: BTreeMap<AccountId, i64> = BTreeMap::new();
    let mut balances_after = Vec::with_capacity(entries.len());

    for entry in entries {
        let account = by_id
            .get(&entry.account_id)
            .ok_or(DomainError::AccountNotFound(entry.account_id))?;
        if !account.is_active {
            return Err(DomainError::AccountInactive(account.id));
        }
        if account.currency != entry.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: account.currency,
                got: entry.currency,
            });
        }
        if entry.amount <= 0 {
            return Err(DomainError::NonPositiveAmount);
        }

        let balance = running.entry(account.id).or_insert(account.balance);
        *balance = balance
            .checked_add(entry.direction.signed(entry.amount))
            .ok_or(DomainError::AmountOverflow)?;
        balances_after.push(*balance);
    }

    for (id, balance) in &running {
        let account = by_id[id];
        if account.is_system() || *balance >= account.balance {
            continue;
        }
        if balance.saturating_add(account.overdraft_limit) < 0 {
            return Err(DomainError::InsufficientFunds {
                available: account.available(),
                requested: account.balance - balance,
            });
        }
    }

    Ok(PostingPlan {
        balances_after,
        final_balances: running.into_iter().collect(),
    })
}
