//! Receipt codes and receipt drafts.
//!
//! A receipt code is the idempotency key of a transaction and the
//! correlation key shared with receipts, notifications and webhooks:
//!
//! ```text
//! [REAL-|DEMO-]<PREFIX>-<YYYY>-<12-digit id>
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::{AccountId, AccountType, OwnerType};
use super::journal::{JournalId, JournalStatus, TransactionType};
use super::money::Currency;
use crate::error::DomainError;

/// Width of the numeric id component.
pub const RECEIPT_ID_WIDTH: usize = 12;

/// Ids wrap at this modulus so they always fit the fixed width.
pub const RECEIPT_ID_MODULUS: u64 = 1_000_000_000_000;

const MIN_RECEIPT_LEN: usize = 17;

impl TransactionType {
    /// Two-letter receipt prefix.
    pub fn receipt_prefix(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DP",
            TransactionType::Withdrawal => "WD",
            TransactionType::Transfer => "TF",
            TransactionType::Conversion => "CV",
            TransactionType::Trade => "TD",
            TransactionType::Fee => "FE",
            TransactionType::Commission => "CM",
            TransactionType::Reversal => "RV",
            TransactionType::Adjustment => "AD",
        }
    }
}

/// Prefix used for codes whose transaction type is unknown.
pub const DEFAULT_RECEIPT_PREFIX: &str = "TX";

/// Prefix for a free-form type name, falling back to `TX`.
pub fn receipt_prefix_for(type_name: &str) -> &'static str {
    type_name
        .parse::<TransactionType>()
        .map(|t| t.receipt_prefix())
        .unwrap_or(DEFAULT_RECEIPT_PREFIX)
}

/// The components of a receipt code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptCode {
    pub account_type: Option<AccountType>,
    pub prefix: String,
    pub year: i32,
    pub id: u64,
}

impl ReceiptCode {
    pub fn new(account_type: Option<AccountType>, prefix: &str, year: i32, id: u64) -> Self {
        Self {
            account_type,
            prefix: prefix.to_string(),
            year,
            id: id % RECEIPT_ID_MODULUS,
        }
    }

    /// Validates and splits a code, reading the fixed-width fields from the right.
    pub fn parse(code: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::InvalidReceiptCode(code.to_string());

        if code.len() < MIN_RECEIPT_LEN || code.matches('-').count() < 2 {
            return Err(invalid());
        }

        let mut parts = code.rsplitn(4, '-');
        let id_part = parts.next().ok_or_else(invalid)?;
        let year_part = parts.next().ok_or_else(invalid)?;
        let prefix = parts.next().ok_or_else(invalid)?;
        let variant = parts.next();

        if id_part.len() != RECEIPT_ID_WIDTH || !id_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if year_part.len() != 4 || !year_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(invalid());
        }
        let account_type = match variant {
            None => None,
            Some("REAL") => Some(AccountType::Real),
            Some("DEMO") => Some(AccountType::Demo),
            Some(_) => return Err(invalid()),
        };

        Ok(Self {
            account_type,
            prefix: prefix.to_string(),
            year: year_part.parse().map_err(|_| invalid())?,
            id: id_part.parse().map_err(|_| invalid())?,
        })
    }

    /// Transaction type named by the prefix, if it is a known one.
    pub fn transaction_type(&self) -> Option<TransactionType> {
        [
            TransactionType::Deposit,
            TransactionType::Withdrawal,
            TransactionType::Transfer,
            TransactionType::Conversion,
            TransactionType::Trade,
            TransactionType::Fee,
            TransactionType::Commission,
            TransactionType::Reversal,
            TransactionType::Adjustment,
        ]
        .into_iter()
        .find(|t| t.receipt_prefix() == self.prefix)
    }
}

impl std::fmt::Display for ReceiptCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(account_type) = self.account_type {
            write!(f, "{}-", account_type.tag())?;
        }
        write!(
            f,
            "{}-{:04}-{:0width$}",
            self.prefix,
            self.year,
            self.id,
            width = RECEIPT_ID_WIDTH
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
}

impl From<JournalStatus> for ReceiptStatus {
    fn from(status: JournalStatus) -> Self {
        match status {
            JournalStatus::Pending => ReceiptStatus::Pending,
            JournalStatus::Completed => ReceiptStatus::Completed,
            JournalStatus::Failed => ReceiptStatus::Failed,
            JournalStatus::Reversed => ReceiptStatus::Reversed,
        }
    }
}

/// Snapshot of one side of a transaction at the time of the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptParty {
    pub owner_id: String,
    pub owner_type: OwnerType,
    pub account_id: AccountId,
    pub account_number: String,
}

/// What the ledger hands to the receipt service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptDraft {
    pub receipt_code: String,
    pub journal_id: Option<JournalId>,
    pub transaction_type: TransactionType,
    pub status: ReceiptStatus,
    pub amount: i64,
    pub fee_amount: i64,
    pub currency: Currency,
    pub creditor: Option<ReceiptParty>,
    pub debitor: Option<ReceiptParty>,
    pub external_ref: Option<String>,
    /// Code of the receipt this one reverses
    pub reversal_of: Option<String>,
    pub reversal_reason: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
