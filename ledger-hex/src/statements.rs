//! Statements and reports: read-only projections over the ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use ledger_types::domain::FeeRecord;
use ledger_types::{
    Account, AccountId, AccountStatement, AgentCommissionSummary, AppError, CurrencyTotal, DailyReport,
    DateRange, JournalStatus, LedgerStore, OwnerStatement, OwnerSummary, PageRequest,
    SystemHolding, SystemHoldings, TransactionSummary,
};
use tracing::instrument;

pub struct StatementService<R: LedgerStore> {
    store: Arc<R>,
}

impl<R: LedgerStore> StatementService<R> {
    pub fn new(store: Arc<R>) -> Self {
        Self { store }
    }

    /// Opening balance, entries and totals of one account over `range`.
    ///
    /// The opening balance is everything posted before `range.from`; the
    /// closing balance adds the net of the entries inside the range.
    #[instrument(skip(self))]
    pub async fn get_account_statement(
        &self,
        account_id: AccountId,
        range: DateRange,
        page: PageRequest,
    ) -> Result<AccountStatement, AppError> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {}", account_id)))?;

        let opening_balance = match range.from {
            Some(from) => self.store.balance_before(account_id, from).await?,
            None => 0,
        };
        let totals = self.store.account_totals(account_id, &range).await?;
        let entries = self
            .store
            .list_entries_by_account(account_id, &range, page)
            .await?;

        Ok(AccountStatement {
            account,
            range,
            opening_balance,
            closing_balance: opening_balance + totals.net(),
            totals,
            entries,
        })
    }

    /// One statement per account of the owner.
    #[instrument(skip(self))]
    pub async fn get_owner_statement(
        &self,
        owner_id: &str,
        range: DateRange,
    ) -> Result<OwnerStatement, AppError> {
        let accounts = self.owner_accounts(owner_id).await?;
        let mut statements = Vec::with_capacity(accounts.len());
        for account in accounts {
            statements.push(
                self.get_account_statement(account.id, range, PageRequest::default())
                    .await?,
            );
        }
        Ok(OwnerStatement {
            owner_id: owner_id.to_string(),
            range,
            accounts: statements,
        })
    }

    pub async fn get_owner_summary(&self, owner_id: &str) -> Result<OwnerSummary, AppError> {
        let accounts = self.owner_accounts(owner_id).await?;

        let mut by_currency: BTreeMap<_, (i64, i64)> = BTreeMap::new();
        for account in &accounts {
            let slot = by_currency.entry(account.currency).or_default();
            slot.0 += 1;
            slot.1 += account.balance;
        }

        Ok(OwnerSummary {
            owner_id: owner_id.to_string(),
            accounts,
            totals: by_currency
                .into_iter()
                .map(|(currency, (account_count, balance))| CurrencyTotal {
                    currency,
                    account_count,
                    balance,
                })
                .collect(),
        })
    }

    /// Completed journals of one UTC day, per currency and type.
    #[instrument(skip(self))]
    pub async fn generate_daily_report(&self, date: NaiveDate) -> Result<DailyReport, AppError> {
        let rows: Vec<_> = self
            .store
            .journal_totals(&DateRange::day(date))
            .await?
            .into_iter()
            .filter(|row| row.status == JournalStatus::Completed)
            .collect();

        Ok(DailyReport {
            date,
            transaction_count: rows.iter().map(|r| r.count).sum(),
            rows,
            generated_at: Utc::now(),
        })
    }

    pub async fn get_transaction_summary(
        &self,
        range: DateRange,
    ) -> Result<TransactionSummary, AppError> {
        let rows = self.store.journal_totals(&range).await?;

        let mut by_status = BTreeMap::new();
        let mut by_type = BTreeMap::new();
        for row in &rows {
            *by_status.entry(row.status).or_insert(0) += row.count;
            *by_type.entry(row.transaction_type).or_insert(0) += row.count;
        }

        Ok(TransactionSummary {
            range,
            total: rows.iter().map(|r| r.count).sum(),
            by_status,
            by_type,
        })
    }

    /// Balances of the system accounts by currency and purpose.
    pub async fn get_system_holdings(&self) -> Result<SystemHoldings, AppError> {
        let mut holdings: Vec<SystemHolding> = self
            .store
            .list_system_accounts()
            .await?
            .into_iter()
            .map(|account| SystemHolding {
                currency: account.currency,
                purpose: account.purpose,
                account_type: account.account_type,
                balance: account.balance,
            })
            .collect();
        holdings.sort_by_key(|h| (h.currency, h.account_type, h.purpose));

        Ok(SystemHoldings {
            holdings,
            generated_at: Utc::now(),
        })
    }

    pub async fn get_agent_commission_summary(
        &self,
        agent_id: &str,
        range: DateRange,
    ) -> Result<AgentCommissionSummary, AppError> {
        let records = self.store.list_fee_records_by_agent(agent_id, &range).await?;

        let mut totals = BTreeMap::new();
        for record in &records {
            *totals.entry(record.currency).or_insert(0) += record.amount;
        }

        Ok(AgentCommissionSummary {
            agent_id: agent_id.to_string(),
            range,
            record_count: records.len() as i64,
            totals,
            records,
        })
    }

    pub async fn get_fees_by_receipt(&self, receipt_code: &str) -> Result<Vec<FeeRecord>, AppError> {
        if self.store.get_journal_by_receipt(receipt_code).await?.is_none() {
            return Err(AppError::NotFound(format!("Journal {}", receipt_code)));
        }
        self.store
            .list_fee_records_by_receipt(receipt_code)
            .await
            .map_err(Into::into)
    }

    async fn owner_accounts(&self, owner_id: &str) -> Result<Vec<Account>, AppError> {
        let accounts = self.store.list_accounts_by_owner(owner_id).await?;
        if accounts.is_empty() {
            return Err(AppError::NotFound(format!("No accounts for owner {}", owner_id)));
        }
        Ok(accounts)
    }
}
