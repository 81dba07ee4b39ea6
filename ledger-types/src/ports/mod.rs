//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod collaborators;
mod exchange;
mod repository;

pub use collaborators::{CollaboratorError, EventSink, OwnerDirectory, OwnerRef, ReceiptService};
pub use exchange::{ExchangeError, ExchangeRateProvider};
pub use repository::{
    AccountRepository, FeeRepository, JournalRepository, LedgerStore, ReportRepository,
    SequenceSource,
};
