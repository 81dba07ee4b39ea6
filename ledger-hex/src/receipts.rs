//! Receipt code generation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use ledger_types::domain::{ReceiptCode, receipt_prefix_for};
use ledger_types::ports::SequenceSource;
use ledger_types::{AccountType, AppError, RepoError, TransactionType};

/// In-process sequence, for tests and single-node tools.
#[derive(Debug, Default)]
pub struct AtomicSequence {
    next: AtomicU64,
}

impl AtomicSequence {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

#[async_trait]
impl SequenceSource for AtomicSequence {
    async fn next_value(&self) -> Result<u64, RepoError> {
        Ok(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Issues `[REAL-|DEMO-]<PREFIX>-<YEAR>-<12-digit id>` codes.
#[derive(Clone)]
pub struct ReceiptGenerator {
    sequence: Arc<dyn SequenceSource>,
}

impl ReceiptGenerator {
    pub fn new(sequence: Arc<dyn SequenceSource>) -> Self {
        Self { sequence }
    }

    /// Code for a transaction type in the current year.
    pub async fn generate(
        &self,
        transaction_type: TransactionType,
        account_type: Option<AccountType>,
    ) -> Result<String, AppError> {
        self.generate_with_prefix(transaction_type.receipt_prefix(), account_type, Utc::now().year())
            .await
    }

    /// Code for a free-form type name; unknown names get the `TX` prefix.
    pub async fn generate_with_type(
        &self,
        type_name: &str,
        account_type: Option<AccountType>,
    ) -> Result<String, AppError> {
        self.generate_with_prefix(receipt_prefix_for(type_name), account_type, Utc::now().year())
            .await
    }

    /// Code with an explicit prefix and year.
    pub async fn generate_with_prefix(
        &self,
        prefix: &str,
        account_type: Option<AccountType>,
        year: i32,
    ) -> Result<String, AppError> {
        let id = self.sequence.next_value().await?;
        Ok(ReceiptCode::new(account_type, prefix, year, id).to_string())
    }

    pub fn validate(code: &str) -> bool {
        ReceiptCode::parse(code).is_ok()
    }

    pub fn parse(code: &str) -> Result<ReceiptCode, AppError> {
        ReceiptCode::parse(code).map_err(AppError::from)
    }
}
