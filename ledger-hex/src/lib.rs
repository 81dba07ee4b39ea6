//! # Ledger Hex
//!
//! Application service layer for the accounting ledger.
//!
//! ## Architecture
//!
//! - `accounts` - Account registry (balances are its source of truth)
//! - `fees` - Fee rule resolution and evaluation, with a TTL cache
//! - `ledger` - Balanced journal posting, reversal and history
//! - `receipts` - Receipt code generation and validation
//! - `transactions` - Orchestrator: sync/async execution, batches, reversals
//! - `events` - Event publisher (live stream + bounded delivery queue)
//! - `statements` - Read-only statements and reports
//! - `seeder` - System, user and partner account bootstrap
//! - `service` - Facade wiring everything around one store
//!
//! Every component is generic over `R: LedgerStore`, allowing different
//! storage adapters to be injected.

pub mod accounts;
pub mod collaborators;
pub mod config;
pub mod events;
pub mod fees;
pub mod ledger;
pub mod receipts;
pub mod seeder;
pub mod service;
pub mod statements;
pub mod transactions;


pub use config::{EngineConfig, RetryPolicy};
pub use events::{EventPublisher, LoggingSink};
pub use service::{Collaborators, LedgerService};
