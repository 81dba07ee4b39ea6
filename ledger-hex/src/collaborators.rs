//! In-process collaborator adapters.
//!
//! Used by tests, the admin binary when no remote service is configured,
//! and anywhere a static rate table is good enough.

use std::sync::Mutex;

use async_trait::async_trait;
use exchange_rates::RateTable;
use ledger_types::domain::{OwnerType, ReceiptDraft};
use ledger_types::ports::{
    CollaboratorError, ExchangeError, ExchangeRateProvider, OwnerDirectory, OwnerRef,
    ReceiptService,
};
use ledger_types::Currency;
use rust_decimal::Decimal;

/// Rates from a fixed [`RateTable`].
#[derive(Debug, Clone, Default)]
pub struct StaticRateProvider {
    table: RateTable,
}

impl StaticRateProvider {
    pub fn new(table: RateTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl ExchangeRateProvider for StaticRateProvider {
    async fn get_rate(&self, from: Currency, to: Currency) -> Result<Decimal, ExchangeError> {
        self.table.rate(from, to).map_err(ExchangeError::from)
    }

    async fn convert(&self, amount: i64, from: Currency, to: Currency) -> Result<i64, ExchangeError> {
        self.table
            .convert_minor(amount, from, to)
            .map_err(ExchangeError::from)
    }
}

/// Accepts every draft and keeps a copy of it.
#[derive(Debug, Default)]
pub struct NoopReceiptService {
    submitted: Mutex<Vec<ReceiptDraft>>,
}

impl NoopReceiptService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drafts received so far, oldest first.
    pub fn submitted(&self) -> Vec<ReceiptDraft> {
        self.submitted
            .lock()
            .map(|drafts| drafts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReceiptService for NoopReceiptService {
    async fn submit(&self, draft: &ReceiptDraft) -> Result<String, CollaboratorError> {
        if let Ok(mut drafts) = self.submitted.lock() {
            drafts.push(draft.clone());
        }
        Ok(draft.receipt_code.clone())
    }
}

/// Owner directory backed by a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticOwnerDirectory {
    owners: Vec<OwnerRef>,
}

impl StaticOwnerDirectory {
    pub fn new(owners: Vec<OwnerRef>) -> Self {
        Self { owners }
    }

    /// `count` owners of one type named `<prefix>-<n>`.
    pub fn generated(owner_type: OwnerType, prefix: &str, count: usize) -> Self {
        let owners = (0..count)
            .map(|n| OwnerRef {
                owner_id: format!("{}-{}", prefix, n),
                owner_type,
            })
            .collect();
        Self { owners }
    }

    pub fn with(mut self, other: StaticOwnerDirectory) -> Self {
        self.owners.extend(other.owners);
        self
    }
}

#[async_trait]
impl OwnerDirectory for StaticOwnerDirectory {
    async fn list_owners(
        &self,
        owner_type: OwnerType,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<OwnerRef>, CollaboratorError> {
        Ok(self
            .owners
            .iter()
            .filter(|o| o.owner_type == owner_type)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
