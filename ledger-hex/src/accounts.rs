//! Account Registry
//!
//! Account lifecycle and balance reads. Accounts are unique per
//! (owner, currency, purpose, account type); creation is idempotent on
//! that tuple.

use std::sync::Arc;

use ledger_types::domain::{
    AccountInsert, AccountKey, AccountUpdate, EntryDraft, JournalDraft, NewAccount,
    SYSTEM_OWNER_ID,
};
use ledger_types::{
    Account, AccountId, AccountPurpose, AccountType, AppError, BalanceResponse, BatchBalances,
    BatchResult, CreateAccountRequest, Currency, LedgerStore, OwnerType, Reconciliation,
    TransactionType,
};
use tracing::{error, info, instrument};

use crate::ledger::LedgerEngine;
use crate::receipts::ReceiptGenerator;

pub struct AccountRegistry<R: LedgerStore> {
    store: Arc<R>,
    ledger: Arc<LedgerEngine<R>>,
    receipts: ReceiptGenerator,
}

impl<R: LedgerStore> AccountRegistry<R> {
    pub fn new(store: Arc<R>, ledger: Arc<LedgerEngine<R>>, receipts: ReceiptGenerator) -> Self {
        Self {
            store,
            ledger,
            receipts,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Creation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates an account, or returns the existing one for the same tuple.
    ///
    /// A positive `initial_balance` on a new account is posted as an opening
    /// adjustment against system liquidity in the same storage transaction
    /// as the insert, so the stored balance always equals the sum of the
    /// account's entries.
    #[instrument(skip(self, req), fields(owner_id = %req.owner_id, currency = %req.currency, purpose = %req.purpose))]
    pub async fn create_account(&self, req: CreateAccountRequest) -> Result<Account, AppError> {
        match self.insert_request(&req).await? {
            AccountInsert::Created(account) => {
                info!(account_id = %account.id, account_number = %account.account_number, balance = account.balance, "account created");
                Ok(account)
            }
            AccountInsert::Existing(account) => {
                info!(account_id = %account.id, "account already exists");
                Ok(account)
            }
        }
    }

    /// Creates every account of the batch independently.
    ///
    /// Unlike [`create_account`](Self::create_account), an item whose tuple
    /// already exists is reported as a conflict at its index.
    #[instrument(skip(self, batch), fields(size = batch.len()))]
    pub async fn create_accounts(
        &self,
        batch: Vec<CreateAccountRequest>,
    ) -> BatchResult<Account> {
        let mut results = Vec::with_capacity(batch.len());
        for req in batch {
            let result = match self.insert_request(&req).await {
                Ok(AccountInsert::Created(account)) => Ok(account),
                Ok(AccountInsert::Existing(account)) => Err(AppError::Conflict(format!(
                    "account already exists: {}",
                    account.account_number
                ))),
                Err(e) => Err(e),
            };
            results.push(result);
        }

        let outcome: BatchResult<Account> = results.into_iter().collect();
        info!(
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            "account batch processed"
        );
        outcome
    }

    /// Idempotent insert of a validated account.
    pub async fn insert_account(&self, account: NewAccount) -> Result<AccountInsert, AppError> {
        self.store.insert_account(account).await.map_err(Into::into)
    }

    /// Wallets for `owner_id` in every listed currency, created on first use.
    #[instrument(skip(self, currencies))]
    pub async fn get_or_create_user_accounts(
        &self,
        owner_id: &str,
        currencies: &[Currency],
        account_type: AccountType,
    ) -> Result<Vec<Account>, AppError> {
        let mut accounts = Vec::with_capacity(currencies.len());
        for &currency in currencies {
            let account = self
                .primary_account(owner_id, OwnerType::User, currency, account_type, true)
                .await?;
            accounts.push(account);
        }
        Ok(accounts)
    }

    /// The system bookkeeping account for a purpose, created on first use.
    pub async fn ensure_system_account(
        &self,
        currency: Currency,
        purpose: AccountPurpose,
        account_type: AccountType,
    ) -> Result<Account, AppError> {
        let key = AccountKey::system(currency, purpose, account_type);
        if let Some(account) = self.store.find_account(&key).await? {
            return Ok(account);
        }
        let account = NewAccount::new(
            OwnerType::System,
            SYSTEM_OWNER_ID,
            currency,
            purpose,
            account_type,
            0,
            None,
        )?;
        Ok(self.insert_account(account).await?.into_account())
    }

    /// The customer-facing account of an owner: wallet, settlement or commission.
    ///
    /// With `create` unset a missing account is `NotFound`.
    pub async fn primary_account(
        &self,
        owner_id: &str,
        owner_type: OwnerType,
        currency: Currency,
        account_type: AccountType,
        create: bool,
    ) -> Result<Account, AppError> {
        let purpose = AccountPurpose::primary_for(owner_type);
        let key = AccountKey {
            owner_id: owner_id.to_string(),
            currency,
            purpose,
            account_type,
        };
        if let Some(account) = self.store.find_account(&key).await? {
            return Ok(account);
        }
        if !create {
            return Err(AppError::NotFound(format!(
                "No {} {} {} account for {}",
                account_type, currency, purpose, owner_id
            )));
        }
        let account = NewAccount::new(owner_type, owner_id, currency, purpose, account_type, 0, None)?;
        Ok(self.insert_account(account).await?.into_account())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads & updates
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        self.store
            .get_account(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Account {}", id))))
    }

    pub async fn get_accounts_by_owner(&self, owner_id: &str) -> Result<Vec<Account>, AppError> {
        self.store
            .list_accounts_by_owner(owner_id)
            .await
            .map_err(Into::into)
    }

    pub async fn list_system_accounts(&self) -> Result<Vec<Account>, AppError> {
        self.store.list_system_accounts().await.map_err(Into::into)
    }

    /// Changes overdraft, commission rate or active flag. Never the balance.
    #[instrument(skip(self, update))]
    pub async fn update_account(
        &self,
        id: AccountId,
        update: AccountUpdate,
    ) -> Result<Account, AppError> {
        update.validate()?;
        self.get_account(id).await?;
        let account = self.store.update_account(id, &update).await?;
        info!(account_id = %id, is_active = account.is_active, "account updated");
        Ok(account)
    }

    pub async fn get_balance(&self, id: AccountId) -> Result<BalanceResponse, AppError> {
        let account = self.get_account(id).await?;
        Ok(BalanceResponse::from(&account))
    }

    /// Balances of many accounts in one query; unknown ids are listed, not fatal.
    pub async fn batch_get_balances(&self, ids: &[AccountId]) -> Result<BatchBalances, AppError> {
        let accounts = self.store.get_accounts(ids).await?;

        let mut missing = Vec::new();
        for id in ids {
            if !accounts.iter().any(|a| a.id == *id) && !missing.contains(id) {
                missing.push(*id);
            }
        }

        Ok(BatchBalances {
            balances: accounts.iter().map(BalanceResponse::from).collect(),
            missing,
        })
    }

    /// Compares the stored balance with the sum of the account's entries.
    #[instrument(skip(self))]
    pub async fn reconcile_account(&self, id: AccountId) -> Result<Reconciliation, AppError> {
        let account = self.get_account(id).await?;
        let ledger_balance = self.store.sum_entries(id).await?;
        let difference = account.balance - ledger_balance;

        if difference != 0 {
            error!(
                critical = true,
                account_id = %id,
                stored = account.balance,
                ledger = ledger_balance,
                "stored balance does not match ledger entries"
            );
        }

        Ok(Reconciliation {
            account_id: id,
            stored_balance: account.balance,
            ledger_balance,
            difference,
            is_balanced: difference == 0,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────────

    async fn insert_request(&self, req: &CreateAccountRequest) -> Result<AccountInsert, AppError> {
        if req.initial_balance < 0 {
            return Err(AppError::BadRequest(
                "Initial balance cannot be negative".into(),
            ));
        }
        let account = NewAccount::new(
            req.owner_type,
            req.owner_id.clone(),
            req.currency,
            req.purpose,
            req.account_type,
            req.overdraft_limit,
            req.commission_rate,
        )?;
        if req.initial_balance == 0 {
            return self.insert_account(account).await;
        }
        if let Some(existing) = self.store.find_account(&account.key()).await? {
            return Ok(AccountInsert::Existing(existing));
        }

        let opening = self.opening_draft(&account, req.initial_balance).await?;
        self.ledger.open_account(account, opening).await
    }

    /// Adjustment moving `amount` from system liquidity into the new account.
    async fn opening_draft(
        &self,
        account: &NewAccount,
        amount: i64,
    ) -> Result<JournalDraft, AppError> {
        let liquidity = self
            .ensure_system_account(account.currency, AccountPurpose::Liquidity, account.account_type)
            .await?;
        let code = self
            .receipts
            .generate(TransactionType::Adjustment, Some(account.account_type))
            .await?;

        let mut draft = JournalDraft::new(code, TransactionType::Adjustment, amount, account.currency);
        draft.owner_id = Some(account.owner_id.clone());
        draft.primary_account_id = Some(account.id);
        draft.counterparty_account_id = Some(liquidity.id);
        draft.description = Some("opening balance".into());
        draft.push(EntryDraft::debit(liquidity.id, amount, account.currency));
        draft.push(EntryDraft::credit(account.id, amount, account.currency));
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipts::AtomicSequence;
    use ledger_repo::SqliteRepo;
    use rust_decimal_macros::dec;

    async fn registry() -> AccountRegistry<SqliteRepo> {
        let repo = Arc::new(SqliteRepo::new("sqlite::memory:").await.unwrap());
        let receipts = ReceiptGenerator::new(Arc::new(AtomicSequence::new()));
        let ledger = Arc::new(LedgerEngine::new(repo.clone(), receipts.clone()));
        AccountRegistry::new(repo, ledger, receipts)
    }

    #[tokio::test]
    async fn test_create_account_is_idempotent() {
        let registry = registry().await;
        let req = CreateAccountRequest::wallet("alice", Currency::KES, AccountType::Real);

        let first = registry.create_account(req.clone()).await.unwrap();
        let second = registry.create_account(req).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.account_number.starts_with("WL-KES-"));
        assert_eq!(registry.get_accounts_by_owner("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_initial_balance_is_journaled() {
        let registry = registry().await;
        let mut req = CreateAccountRequest::wallet("bob", Currency::KES, AccountType::Demo);
        req.initial_balance = 2_500;

        let account = registry.create_account(req).await.unwrap();
        assert_eq!(account.balance, 2_500);

        let reconciliation = registry.reconcile_account(account.id).await.unwrap();
        assert!(reconciliation.is_balanced);
        assert_eq!(reconciliation.ledger_balance, 2_500);

        let liquidity = registry
            .ensure_system_account(Currency::KES, AccountPurpose::Liquidity, AccountType::Demo)
            .await
            .unwrap();
        assert_eq!(liquidity.balance, -2_500);
    }

    #[tokio::test]
    async fn test_failed_opening_balance_leaves_no_account() {
        let registry = registry().await;
        let liquidity = registry
            .ensure_system_account(Currency::KES, AccountPurpose::Liquidity, AccountType::Real)
            .await
            .unwrap();
        let deactivate = AccountUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        registry.update_account(liquidity.id, deactivate).await.unwrap();

        let mut req = CreateAccountRequest::wallet("zed", Currency::KES, AccountType::Real);
        req.initial_balance = 500;
        let result = registry.create_account(req.clone()).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(registry.get_accounts_by_owner("zed").await.unwrap().is_empty());

        let reactivate = AccountUpdate {
            is_active: Some(true),
            ..Default::default()
        };
        registry.update_account(liquidity.id, reactivate).await.unwrap();

        let retry = registry.create_account(req).await.unwrap();
        assert_eq!(retry.balance, 500);
        assert!(registry.reconcile_account(retry.id).await.unwrap().is_balanced);
    }

    #[tokio::test]
    async fn test_batch_reports_duplicates_per_index() {
        let registry = registry().await;
        registry
            .create_account(CreateAccountRequest::wallet("carol", Currency::KES, AccountType::Real))
            .await
            .unwrap();

        let mut bad = CreateAccountRequest::wallet("dave", Currency::KES, AccountType::Real);
        bad.overdraft_limit = -1;
        let outcome = registry
            .create_accounts(vec![
                CreateAccountRequest::wallet("dave", Currency::USD, AccountType::Real),
                CreateAccountRequest::wallet("carol", Currency::KES, AccountType::Real),
                bad,
                CreateAccountRequest::wallet("erin", Currency::KES, AccountType::Real),
            ])
            .await;

        assert_eq!(outcome.succeeded(), 2);
        let errors: Vec<_> = outcome.errors().collect();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].0, 1);
        assert!(matches!(errors[0].1, AppError::Conflict(_)));
        assert_eq!(errors[1].0, 2);
        assert!(matches!(errors[1].1, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_get_or_create_user_accounts() {
        let registry = registry().await;
        let accounts = registry
            .get_or_create_user_accounts("frank", &[Currency::KES, Currency::USD], AccountType::Real)
            .await
            .unwrap();
        assert_eq!(accounts.len(), 2);

        let again = registry
            .get_or_create_user_accounts("frank", &[Currency::USD], AccountType::Real)
            .await
            .unwrap();
        assert_eq!(again[0].id, accounts[1].id);
    }

    #[tokio::test]
    async fn test_batch_balances_report_missing() {
        let registry = registry().await;
        let account = registry
            .create_account(CreateAccountRequest::wallet("gina", Currency::KES, AccountType::Real))
            .await
            .unwrap();
        let unknown = AccountId::new();

        let balances = registry
            .batch_get_balances(&[account.id, unknown])
            .await
            .unwrap();
        assert_eq!(balances.balances.len(), 1);
        assert_eq!(balances.missing, vec![unknown]);
    }

    #[tokio::test]
    async fn test_update_account() {
        let registry = registry().await;
        let account = registry
            .create_account(CreateAccountRequest::wallet("hank", Currency::KES, AccountType::Real))
            .await
            .unwrap();

        let updated = registry
            .update_account(
                account.id,
                AccountUpdate {
                    overdraft_limit: Some(1_000),
                    commission_rate: Some(dec!(0.25)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.overdraft_limit, 1_000);
        assert_eq!(updated.commission_rate, Some(dec!(0.25)));
        assert_eq!(registry.get_balance(account.id).await.unwrap().available, 1_000);

        let err = registry
            .update_account(
                account.id,
                AccountUpdate {
                    commission_rate: Some(dec!(1.5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = registry
            .update_account(AccountId::new(), AccountUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
