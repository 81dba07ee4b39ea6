//! Error types for the ledger.

use crate::domain::{AccountId, Currency};
use crate::ports::ExchangeError;

/// Domain-level errors (business logic violations).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Amount must be positive")]
    NonPositiveAmount,

    #[error("Amount overflows minor units")]
    AmountOverflow,

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Account is inactive: {0}")]
    AccountInactive(AccountId),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(Currency),

    #[error("Journal has no entries")]
    EmptyJournal,

    #[error("Unbalanced journal in {currency}: debits {debits}, credits {credits}")]
    UnbalancedJournal {
        currency: Currency,
        debits: i64,
        credits: i64,
    },

    #[error("Invalid receipt code: {0}")]
    InvalidReceiptCode(String),

    #[error("Invalid fee rule: {0}")]
    InvalidFeeRule(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl DomainError {
    /// Whether the error signals a broken ledger invariant rather than bad input.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, DomainError::UnbalancedJournal { .. })
    }
}

/// Repository-level errors (data access failures).
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Consistency violation: {0}")]
    Consistency(String),
}

/// Application-level errors returned by the ledger services.
///
/// Maps cleanly to transport status codes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Consistency violation: {0}")]
    Consistency(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Failures caused by the request itself; retrying with the same input
    /// yields the same outcome, so they are recorded against the receipt code.
    pub fn is_business_failure(&self) -> bool {
        matches!(
            self,
            AppError::BadRequest(_) | AppError::NotFound(_) | AppError::InsufficientFunds { .. }
        )
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::from(RepoError::Domain(err))
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(DomainError::InsufficientFunds {
                available,
                requested,
            }) => AppError::InsufficientFunds {
                available,
                requested,
            },
            RepoError::Domain(DomainError::ValidationError(msg)) => AppError::BadRequest(msg),
            RepoError::Domain(DomainError::AccountNotFound(id)) => {
                AppError::NotFound(format!("Account not found: {}", id))
            }
            RepoError::Domain(e) if e.is_consistency_violation() => {
                AppError::Consistency(e.to_string())
            }
            RepoError::Domain(e) => AppError::BadRequest(e.to_string()),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
            RepoError::Consistency(e) => AppError::Consistency(e),
        }
    }
}

impl From<ExchangeError> for AppError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::ServiceUnavailable(msg) => AppError::Internal(msg),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbalanced_journal_maps_to_consistency() {
        let err: AppError = DomainError::UnbalancedJournal {
            currency: Currency::KES,
            debits: 100,
            credits: 90,
        }
        .into();
        assert!(matches!(err, AppError::Consistency(_)));
        assert!(!err.is_business_failure());
    }

    #[test]
    fn test_insufficient_funds_is_business_failure() {
        let err: AppError = RepoError::Domain(DomainError::InsufficientFunds {
            available: 10,
            requested: 20,
        })
        .into();
        assert_eq!(
            err,
            AppError::InsufficientFunds {
                available: 10,
                requested: 20
            }
        );
        assert!(err.is_business_failure());
    }

    #[test]
    fn test_storage_errors_are_internal() {
        let err: AppError = RepoError::Database("connection reset".into()).into();
        assert_eq!(err, AppError::Internal("connection reset".into()));
        assert!(!err.is_business_failure());
    }
}
