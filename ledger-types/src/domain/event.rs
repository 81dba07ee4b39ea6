//! Transaction lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::{AccountType, OwnerType};
use super::journal::{Journal, JournalId, JournalStatus, TransactionType};
use super::money::Currency;

/// Current layout of [`EventMetadata`].
pub const EVENT_METADATA_VERSION: u32 = 1;

/// Versioned event metadata.
///
/// Version 1 keys:
/// - `account_type`: real or demo books
/// - `owner_type`: type of `user_id`, when known
/// - `external_ref`, `description`: copied from the request
/// - `target_currency`, `target_amount`: credited side of a conversion
/// - `reversal_of`, `reason`: set on reversal events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub version: u32,
    pub account_type: AccountType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_type: Option<OwnerType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_currency: Option<Currency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversal_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EventMetadata {
    pub fn new(account_type: AccountType) -> Self {
        Self {
            version: EVENT_METADATA_VERSION,
            account_type,
            owner_type: None,
            external_ref: None,
            description: None,
            target_currency: None,
            target_amount: None,
            reversal_of: None,
            reason: None,
        }
    }
}

/// Published once per completed, failed, pending or reversed transaction.
///
/// Delivery is at-least-once; consumers dedupe on `receipt_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    /// `<transaction_type>.<status>`, e.g. `deposit.completed`
    pub event_type: String,
    pub user_id: Option<String>,
    pub receipt_code: String,
    pub transaction_id: JournalId,
    pub transaction_type: TransactionType,
    pub status: JournalStatus,
    pub amount: i64,
    pub currency: Currency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub metadata: EventMetadata,
    pub timestamp: DateTime<Utc>,
}

impl TransactionEvent {
    pub fn event_type_for(transaction_type: TransactionType, status: JournalStatus) -> String {
        format!("{}.{}", transaction_type, status)
    }

    /// Event for the journal's current status.
    pub fn from_journal(journal: &Journal, metadata: EventMetadata) -> Self {
        Self {
            event_type: Self::event_type_for(journal.transaction_type, journal.status),
            user_id: journal.owner_id.clone(),
            receipt_code: journal.receipt_code.clone(),
            transaction_id: journal.id,
            transaction_type: journal.transaction_type,
            status: journal.status,
            amount: journal.amount,
            currency: journal.currency,
            account_number: None,
            from_account: None,
            to_account: None,
            balance_after: None,
            fee: (journal.fee_amount > 0).then_some(journal.fee_amount),
            error_message: journal.error_message.clone(),
            metadata,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::journal::JournalDraft;

    #[test]
    fn test_event_type_naming() {
        let mut draft = JournalDraft::new("DP-2025-000000000001", TransactionType::Deposit, 1000, Currency::KES);
        draft.fee_amount = 10;
        let journal = draft.to_journal(JournalStatus::Completed);
        let event = TransactionEvent::from_journal(&journal, EventMetadata::new(AccountType::Real));
        assert_eq!(event.event_type, "deposit.completed");
        assert_eq!(event.fee, Some(10));
        assert_eq!(event.metadata.version, EVENT_METADATA_VERSION);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let journal = JournalDraft::new("WD-2025-000000000002", TransactionType::Withdrawal, 5, Currency::USD)
            .to_journal(JournalStatus::Failed);
        let event = TransactionEvent::from_journal(&journal, EventMetadata::new(AccountType::Demo));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "withdrawal.failed");
        assert!(json.get("balance_after").is_none());
        assert_eq!(json["metadata"]["account_type"], "demo");
    }
}
