//! System Seeder
//!
//! Bootstraps the system bookkeeping accounts and the primary accounts of
//! every user and partner known to the owner directory.

use std::sync::Arc;
use std::time::Duration;

use ledger_types::domain::{AccountInsert, NewAccount, SYSTEM_OWNER_ID};
use ledger_types::ports::OwnerDirectory;
use ledger_types::{
    AccountPurpose, AccountType, AppError, Currency, LedgerStore, OwnerType, SeedReport,
};
use tracing::{info, instrument, warn};

use crate::accounts::AccountRegistry;
use crate::config::EngineConfig;

pub struct SystemSeeder<R: LedgerStore> {
    accounts: Arc<AccountRegistry<R>>,
    currencies: Vec<Currency>,
    account_types: Vec<AccountType>,
    batch_size: usize,
    directory_timeout: Duration,
}

impl<R: LedgerStore> SystemSeeder<R> {
    pub fn new(accounts: Arc<AccountRegistry<R>>, config: &EngineConfig) -> Self {
        Self {
            accounts,
            currencies: config.currencies.clone(),
            account_types: config.account_types.clone(),
            batch_size: config.seed_batch_size.max(1),
            directory_timeout: config.collaborator_timeout,
        }
    }

    /// Every system purpose for every configured currency and account type.
    #[instrument(skip(self))]
    pub async fn seed_system_accounts(&self) -> SeedReport {
        let mut report = SeedReport::default();
        let mut batch = Vec::new();
        for &currency in &self.currencies {
            for &account_type in &self.account_types {
                for purpose in AccountPurpose::SYSTEM {
                    batch.push(NewAccount::new(
                        OwnerType::System,
                        SYSTEM_OWNER_ID,
                        currency,
                        purpose,
                        account_type,
                        0,
                        None,
                    ));
                }
            }
        }
        self.flush(&mut batch, &mut report).await;

        info!(
            created = report.created,
            existing = report.existing,
            failed = report.failed,
            "system accounts seeded"
        );
        report
    }

    /// System accounts, then a wallet per user and a settlement account per
    /// partner in every configured currency and account type.
    ///
    /// Owners are paged from the directory and their accounts inserted in
    /// batches. Item failures are counted; a directory failure stops that
    /// owner type only.
    #[instrument(skip(self, directory))]
    pub async fn seed_system(&self, directory: &dyn OwnerDirectory) -> SeedReport {
        let mut report = self.seed_system_accounts().await;
        for owner_type in [OwnerType::User, OwnerType::Partner] {
            self.seed_owners(directory, owner_type, &mut report).await;
        }

        info!(
            owners_seen = report.owners_seen,
            created = report.created,
            existing = report.existing,
            failed = report.failed,
            "seeding finished"
        );
        report
    }

    async fn seed_owners(
        &self,
        directory: &dyn OwnerDirectory,
        owner_type: OwnerType,
        report: &mut SeedReport,
    ) {
        let per_owner = self.currencies.len() * self.account_types.len();
        let flush_at = (self.batch_size * per_owner).max(1);
        let purpose = AccountPurpose::primary_for(owner_type);
        let limit = u32::try_from(self.batch_size).unwrap_or(u32::MAX);

        let mut batch = Vec::with_capacity(flush_at);
        let mut offset: u64 = 0;

        loop {
            let call = directory.list_owners(owner_type, offset, limit);
            let page = match tokio::time::timeout(self.directory_timeout, call).await {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    warn!(%owner_type, offset, error = %e, "owner directory failed, stopping");
                    break;
                }
                Err(_) => {
                    warn!(%owner_type, offset, "owner directory timed out, stopping");
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            offset += page.len() as u64;

            for owner in page {
                report.owners_seen += 1;
                for &currency in &self.currencies {
                    for &account_type in &self.account_types {
                        batch.push(NewAccount::new(
                            owner_type,
                            owner.owner_id.clone(),
                            currency,
                            purpose,
                            account_type,
                            0,
                            None,
                        ));
                    }
                }
                if batch.len() >= flush_at {
                    self.flush(&mut batch, report).await;
                }
            }
        }

        self.flush(&mut batch, report).await;
    }

    async fn flush(
        &self,
        batch: &mut Vec<Result<NewAccount, ledger_types::DomainError>>,
        report: &mut SeedReport,
    ) {
        if batch.is_empty() {
            return;
        }
        let size = batch.len();
        for item in batch.drain(..) {
            let outcome = match item {
                Ok(account) => self.accounts.insert_account(account).await,
                Err(e) => Err(AppError::from(e)),
            };
            match outcome {
                Ok(AccountInsert::Created(_)) => report.created += 1,
                Ok(AccountInsert::Existing(_)) => report.existing += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, "seed item failed");
                }
            }
        }
        info!(size, "seed batch flushed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticOwnerDirectory;
    use crate::ledger::LedgerEngine;
    use crate::receipts::{AtomicSequence, ReceiptGenerator};
    use async_trait::async_trait;
    use ledger_repo::SqliteRepo;
    use ledger_types::ports::{CollaboratorError, OwnerRef};

    async fn seeder(batch_size: usize) -> SystemSeeder<SqliteRepo> {
        let repo = Arc::new(SqliteRepo::new("sqlite::memory:").await.unwrap());
        let receipts = ReceiptGenerator::new(Arc::new(AtomicSequence::new()));
        let ledger = Arc::new(LedgerEngine::new(repo.clone(), receipts.clone()));
        let accounts = Arc::new(AccountRegistry::new(repo, ledger, receipts));
        let config = EngineConfig {
            seed_batch_size: batch_size,
            currencies: vec![Currency::KES, Currency::USD],
            account_types: vec![AccountType::Real],
            ..EngineConfig::default()
        };
        SystemSeeder::new(accounts, &config)
    }

    #[tokio::test]
    async fn test_system_accounts_are_idempotent() {
        let seeder = seeder(10).await;
        let first = seeder.seed_system_accounts().await;
        assert_eq!(first.created, 10);
        assert_eq!(first.failed, 0);

        let second = seeder.seed_system_accounts().await;
        assert_eq!(second.created, 0);
        assert_eq!(second.existing, 10);
    }

    #[tokio::test]
    async fn test_seed_pages_through_owners() {
        let seeder = seeder(3).await;
        let directory = StaticOwnerDirectory::generated(OwnerType::User, "user", 7)
            .with(StaticOwnerDirectory::generated(OwnerType::Partner, "partner", 2));

        let report = seeder.seed_system(&directory).await;
        assert_eq!(report.owners_seen, 9);
        // 10 system + 9 owners x 2 currencies
        assert_eq!(report.created, 28);
        assert_eq!(report.failed, 0);

        let partner = seeder.accounts.get_accounts_by_owner("partner-1").await.unwrap();
        assert_eq!(partner.len(), 2);
        assert!(partner.iter().all(|a| a.purpose == AccountPurpose::Settlement));

        let again = seeder.seed_system(&directory).await;
        assert_eq!(again.created, 0);
        assert_eq!(again.existing, 28);
    }

    /// Serves at most two owners per page whatever limit is asked for.
    struct CappedDirectory(StaticOwnerDirectory);

    #[async_trait]
    impl OwnerDirectory for CappedDirectory {
        async fn list_owners(
            &self,
            owner_type: OwnerType,
            offset: u64,
            limit: u32,
        ) -> Result<Vec<OwnerRef>, CollaboratorError> {
            self.0.list_owners(owner_type, offset, limit.min(2)).await
        }
    }

    #[tokio::test]
    async fn test_short_pages_do_not_end_seeding() {
        let seeder = seeder(500).await;
        let directory = CappedDirectory(StaticOwnerDirectory::generated(OwnerType::User, "user", 6));

        let report = seeder.seed_system(&directory).await;
        assert_eq!(report.owners_seen, 6);
        assert_eq!(report.created, 10 + 6 * 2);
        assert_eq!(seeder.accounts.get_accounts_by_owner("user-5").await.unwrap().len(), 2);
    }

    struct BrokenDirectory;

    #[async_trait]
    impl OwnerDirectory for BrokenDirectory {
        async fn list_owners(
            &self,
            owner_type: OwnerType,
            offset: u64,
            _limit: u32,
        ) -> Result<Vec<OwnerRef>, CollaboratorError> {
            match (owner_type, offset) {
                (OwnerType::User, 0) => Ok(vec![OwnerRef {
                    owner_id: "user-0".into(),
                    owner_type,
                }]),
                _ => Err(CollaboratorError::Unavailable("directory down".into())),
            }
        }
    }

    #[tokio::test]
    async fn test_directory_failure_keeps_seeded_batches() {
        let seeder = seeder(1).await;
        let report = seeder.seed_system(&BrokenDirectory).await;

        assert_eq!(report.owners_seen, 1);
        assert_eq!(report.created, 12);
        assert_eq!(seeder.accounts.get_accounts_by_owner("user-0").await.unwrap().len(), 2);
    }
}
