//! Domain models for the ledger.

pub mod account;
pub mod event;
pub mod fee;
pub mod journal;
pub mod money;
pub mod receipt;

pub use account::{
    Account, AccountId, AccountInsert, AccountKey, AccountPurpose, AccountType, AccountUpdate,
    NewAccount, OwnerType, SYSTEM_OWNER_ID,
};
pub use event::{EVENT_METADATA_VERSION, EventMetadata, TransactionEvent};
pub use fee::{
    CalculationMethod, FeeCalculation, FeeCharge, FeeQuery, FeeRecord, FeeRule, FeeRuleId,
    FeeTier, FeeType, select_rule,
};
pub use journal::{
    ClaimOutcome, Direction, EntryDraft, Journal, JournalDraft, JournalId, JournalStatus,
    LedgerEntry, PostOutcome, PostedJournal, PostingPlan, TransactionType, plan_postings,
};
pub use money::Currency;
pub use receipt::{
    RECEIPT_ID_MODULUS, ReceiptCode, ReceiptDraft, ReceiptParty, ReceiptStatus,
    receipt_prefix_for,
};
