//! Currencies of the ledger.
//!
//! Amounts are carried as `i64` minor units next to their [`Currency`]; the
//! catalogue of codes, symbols and minor-unit scales lives in
//! `exchange-rates`.

pub use exchange_rates::CurrencyCode as Currency;
