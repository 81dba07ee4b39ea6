//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use ledger_types::domain::{
        Account, AccountInsert, AccountKey, AccountPurpose, AccountType, AccountUpdate,
        CalculationMethod, ClaimOutcome, Currency, EntryDraft, FeeCharge, FeeRule, FeeRuleId,
        FeeType, JournalDraft, JournalStatus, NewAccount, OwnerType, PostOutcome,
        SYSTEM_OWNER_ID, TransactionType,
    };
    use ledger_types::ports::{
        AccountRepository, FeeRepository, JournalRepository, LedgerStore, ReportRepository,
        SequenceSource,
    };
    use ledger_types::{DateRange, DomainError, JournalFilter, PageRequest, RepoError};
    use rust_decimal_macros::dec;

    use crate::SqliteRepo;

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    async fn system_account(repo: &SqliteRepo, purpose: AccountPurpose) -> Account {
        let account = NewAccount::new(
            OwnerType::System,
            SYSTEM_OWNER_ID,
            Currency::KES,
            purpose,
            AccountType::Real,
            0,
            None,
        )
        .unwrap();
        repo.insert_account(account).await.unwrap().into_account()
    }

    async fn wallet(repo: &SqliteRepo, owner: &str) -> Account {
        let account = NewAccount::new(
            OwnerType::User,
            owner,
            Currency::KES,
            AccountPurpose::Wallet,
            AccountType::Real,
            0,
            None,
        )
        .unwrap();
        repo.insert_account(account).await.unwrap().into_account()
    }

    fn code(prefix: &str, id: u64) -> String {
        format!("{}-2025-{:012}", prefix, id)
    }

    /// Liquidity → wallet (amount − fee) + fees (fee).
    fn deposit_draft(
        receipt: &str,
        liquidity: &Account,
        wallet: &Account,
        fees: &Account,
        amount: i64,
        fee: i64,
    ) -> JournalDraft {
        let mut draft = JournalDraft::new(receipt, TransactionType::Deposit, amount, Currency::KES);
        draft.owner_id = Some(wallet.owner_id.clone());
        draft.primary_account_id = Some(wallet.id);
        draft.fee_amount = fee;
        draft.push(EntryDraft::debit(liquidity.id, amount, Currency::KES));
        draft.push(EntryDraft::credit(wallet.id, amount - fee, Currency::KES));
        draft.push(EntryDraft::credit(fees.id, fee, Currency::KES));
        if fee > 0 {
            draft.fees.push(FeeCharge {
                fee_type: FeeType::Platform,
                rule_id: None,
                amount: fee,
                currency: Currency::KES,
                account_id: fees.id,
                agent_id: None,
            });
        }
        draft
    }

    fn withdrawal_draft(
        receipt: &str,
        wallet: &Account,
        liquidity: &Account,
        amount: i64,
    ) -> JournalDraft {
        let mut draft =
            JournalDraft::new(receipt, TransactionType::Withdrawal, amount, Currency::KES);
        draft.push(EntryDraft::debit(wallet.id, amount, Currency::KES));
        draft.push(EntryDraft::credit(liquidity.id, amount, Currency::KES));
        draft
    }

    async fn balance(repo: &SqliteRepo, account: &Account) -> i64 {
        repo.get_account(account.id).await.unwrap().unwrap().balance
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accounts
    // ─────────────────────────────────────────────────────────────────────────

    fn opening_draft(
        receipt: &str,
        liquidity: &Account,
        account: &NewAccount,
        amount: i64,
    ) -> JournalDraft {
        let mut draft =
            JournalDraft::new(receipt, TransactionType::Adjustment, amount, Currency::KES);
        draft.primary_account_id = Some(account.id);
        draft.push(EntryDraft::debit(liquidity.id, amount, Currency::KES));
        draft.push(EntryDraft::credit(account.id, amount, Currency::KES));
        draft
    }

    #[tokio::test]
    async fn test_opening_balance_commits_with_the_account() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let new = NewAccount::new(
            OwnerType::User,
            "opal",
            Currency::KES,
            AccountPurpose::Wallet,
            AccountType::Real,
            0,
            None,
        )
        .unwrap();

        let draft = opening_draft(&code("AD", 1), &liquidity, &new, 800);
        let created = match repo.insert_account_with_opening(new.clone(), draft).await.unwrap() {
            AccountInsert::Created(account) => account,
            other => panic!("expected a new account, got {:?}", other),
        };
        assert_eq!(created.balance, 800);
        assert_eq!(repo.sum_entries(created.id).await.unwrap(), 800);

        // Same key again: nothing is posted.
        let again = opening_draft(&code("AD", 2), &liquidity, &new, 800);
        let existing = repo.insert_account_with_opening(new, again).await.unwrap();
        assert!(matches!(existing, AccountInsert::Existing(_)));
        assert!(repo.get_journal_by_receipt(&code("AD", 2)).await.unwrap().is_none());
        assert_eq!(balance(&repo, &liquidity).await, -800);
    }

    #[tokio::test]
    async fn test_failed_opening_balance_rolls_back_the_account() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let inactive = AccountUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        repo.update_account(liquidity.id, &inactive).await.unwrap();

        let new = NewAccount::new(
            OwnerType::User,
            "pia",
            Currency::KES,
            AccountPurpose::Wallet,
            AccountType::Real,
            0,
            None,
        )
        .unwrap();
        let key = new.key();
        let draft = opening_draft(&code("AD", 3), &liquidity, &new, 500);

        let result = repo.insert_account_with_opening(new, draft).await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::AccountInactive(_)))
        ));
        assert!(repo.find_account(&key).await.unwrap().is_none());
        assert!(repo.get_journal_by_receipt(&code("AD", 3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_account_is_idempotent_per_key() {
        let repo = setup_repo().await;

        let first = wallet(&repo, "user-1").await;
        let again = NewAccount::new(
            OwnerType::User,
            "user-1",
            Currency::KES,
            AccountPurpose::Wallet,
            AccountType::Real,
            0,
            None,
        )
        .unwrap();

        match repo.insert_account(again).await.unwrap() {
            AccountInsert::Existing(existing) => assert_eq!(existing.id, first.id),
            other => panic!("expected existing account, got {:?}", other),
        }
        assert_eq!(repo.list_accounts_by_owner("user-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_demo_account_is_distinct_from_real() {
        let repo = setup_repo().await;
        let real = wallet(&repo, "user-1").await;

        let demo = NewAccount::new(
            OwnerType::User,
            "user-1",
            Currency::KES,
            AccountPurpose::Wallet,
            AccountType::Demo,
            0,
            None,
        )
        .unwrap();
        let demo = repo.insert_account(demo).await.unwrap();

        assert!(matches!(demo, AccountInsert::Created(_)));
        assert_ne!(demo.account().id, real.id);
    }

    #[tokio::test]
    async fn test_find_and_batch_get_accounts() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let user = wallet(&repo, "user-1").await;

        let found = repo
            .find_account(&AccountKey::system(
                Currency::KES,
                AccountPurpose::Liquidity,
                AccountType::Real,
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, liquidity.id);

        let missing = ledger_types::AccountId::new();
        let batch = repo
            .get_accounts(&[user.id, liquidity.id, missing])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);

        let system = repo.list_system_accounts().await.unwrap();
        assert_eq!(system.len(), 1);
        assert!(system[0].is_system());
    }

    #[tokio::test]
    async fn test_update_account_attributes() {
        let repo = setup_repo().await;
        let user = wallet(&repo, "user-1").await;

        let update = AccountUpdate {
            overdraft_limit: Some(500),
            commission_rate: Some(dec!(0.02)),
            ..Default::default()
        };
        let updated = repo.update_account(user.id, &update).await.unwrap();
        assert_eq!(updated.overdraft_limit, 500);

        let stored = repo.get_account(user.id).await.unwrap().unwrap();
        assert_eq!(stored.overdraft_limit, 500);
        assert_eq!(stored.commission_rate, Some(dec!(0.02)));

        let bad = AccountUpdate {
            overdraft_limit: Some(-1),
            ..Default::default()
        };
        assert!(matches!(
            repo.update_account(user.id, &bad).await,
            Err(RepoError::Domain(DomainError::ValidationError(_)))
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Posting
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_post_deposit_updates_balances_and_fee_records() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let fees = system_account(&repo, AccountPurpose::Fees).await;
        let user = wallet(&repo, "user-1").await;

        let receipt = code("DP", 1);
        let outcome = repo
            .post_journal(deposit_draft(&receipt, &liquidity, &user, &fees, 1000, 10))
            .await
            .unwrap();

        assert!(!outcome.is_duplicate());
        let posted = outcome.into_posted();
        assert_eq!(posted.journal.status, JournalStatus::Completed);
        assert_eq!(posted.entries.len(), 3);
        assert_eq!(posted.balance_after(user.id), Some(990));

        assert_eq!(balance(&repo, &user).await, 990);
        assert_eq!(balance(&repo, &fees).await, 10);
        assert_eq!(balance(&repo, &liquidity).await, -1000);

        let records = repo.list_fee_records_by_receipt(&receipt).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 10);
        assert_eq!(records[0].account_id, fees.id);
    }

    #[tokio::test]
    async fn test_stored_balance_matches_entry_sum() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let fees = system_account(&repo, AccountPurpose::Fees).await;
        let user = wallet(&repo, "user-1").await;

        repo.post_journal(deposit_draft(&code("DP", 1), &liquidity, &user, &fees, 1000, 10))
            .await
            .unwrap();
        repo.post_journal(withdrawal_draft(&code("WD", 2), &user, &liquidity, 300))
            .await
            .unwrap();

        for account in [&liquidity, &fees, &user] {
            assert_eq!(
                balance(&repo, account).await,
                repo.sum_entries(account.id).await.unwrap()
            );
        }
        assert_eq!(balance(&repo, &user).await, 690);
    }

    #[tokio::test]
    async fn test_duplicate_receipt_returns_original_without_reposting() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let fees = system_account(&repo, AccountPurpose::Fees).await;
        let user = wallet(&repo, "user-1").await;

        let receipt = code("DP", 7);
        let first = repo
            .post_journal(deposit_draft(&receipt, &liquidity, &user, &fees, 1000, 0))
            .await
            .unwrap();
        let second = repo
            .post_journal(deposit_draft(&receipt, &liquidity, &user, &fees, 1000, 0))
            .await
            .unwrap();

        assert!(matches!(second, PostOutcome::Duplicate(_)));
        assert_eq!(second.posted().journal.id, first.posted().journal.id);
        assert_eq!(second.posted().entries.len(), 2);
        assert_eq!(balance(&repo, &user).await, 1000);
    }

    #[tokio::test]
    async fn test_unbalanced_journal_is_rejected() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let user = wallet(&repo, "user-1").await;

        let receipt = code("DP", 3);
        let mut draft = JournalDraft::new(&receipt, TransactionType::Deposit, 100, Currency::KES);
        draft.push(EntryDraft::debit(liquidity.id, 100, Currency::KES));
        draft.push(EntryDraft::credit(user.id, 99, Currency::KES));

        let result = repo.post_journal(draft).await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::UnbalancedJournal { .. }))
        ));
        assert!(repo.get_journal_by_receipt(&receipt).await.unwrap().is_none());
        assert_eq!(balance(&repo, &user).await, 0);
    }

    #[tokio::test]
    async fn test_insufficient_funds_rolls_back_everything() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let user = wallet(&repo, "user-1").await;

        let receipt = code("WD", 1);
        let result = repo
            .post_journal(withdrawal_draft(&receipt, &user, &liquidity, 50))
            .await;

        match result {
            Err(RepoError::Domain(DomainError::InsufficientFunds {
                available,
                requested,
            })) => {
                assert_eq!(available, 0);
                assert_eq!(requested, 50);
            }
            other => panic!("expected insufficient funds, got {:?}", other),
        }
        assert!(repo.get_journal_by_receipt(&receipt).await.unwrap().is_none());
        assert_eq!(balance(&repo, &liquidity).await, 0);
    }

    #[tokio::test]
    async fn test_overdraft_allows_negative_balance() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let user = wallet(&repo, "user-1").await;
        repo.update_account(
            user.id,
            &AccountUpdate {
                overdraft_limit: Some(100),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        repo.post_journal(withdrawal_draft(&code("WD", 1), &user, &liquidity, 100))
            .await
            .unwrap();
        assert_eq!(balance(&repo, &user).await, -100);

        let result = repo
            .post_journal(withdrawal_draft(&code("WD", 2), &user, &liquidity, 1))
            .await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::InsufficientFunds { .. }))
        ));
    }

    #[tokio::test]
    async fn test_inactive_account_cannot_post() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let fees = system_account(&repo, AccountPurpose::Fees).await;
        let user = wallet(&repo, "user-1").await;
        repo.update_account(
            user.id,
            &AccountUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let result = repo
            .post_journal(deposit_draft(&code("DP", 1), &liquidity, &user, &fees, 100, 0))
            .await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::AccountInactive(id))) if id == user.id
        ));
    }

    #[tokio::test]
    async fn test_concurrent_withdrawals_never_overdraw() {
        let repo = Arc::new(setup_repo().await);
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let fees = system_account(&repo, AccountPurpose::Fees).await;
        let user = wallet(&repo, "user-1").await;
        repo.post_journal(deposit_draft(&code("DP", 1), &liquidity, &user, &fees, 1000, 0))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..20u64 {
            let repo = Arc::clone(&repo);
            let draft = withdrawal_draft(&code("WD", 100 + i), &user, &liquidity, 100);
            handles.push(tokio::spawn(async move { repo.post_journal(draft).await }));
        }

        let mut succeeded = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(RepoError::Domain(DomainError::InsufficientFunds { .. })) => insufficient += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(insufficient, 10);
        assert_eq!(balance(&repo, &user).await, 0);
        assert_eq!(repo.sum_entries(user.id).await.unwrap(), 0);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reversal
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_reverse_journal_restores_balances() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let fees = system_account(&repo, AccountPurpose::Fees).await;
        let user = wallet(&repo, "user-1").await;

        let original = repo
            .post_journal(deposit_draft(&code("DP", 1), &liquidity, &user, &fees, 1000, 10))
            .await
            .unwrap()
            .into_posted();

        let mut reversal =
            JournalDraft::new(code("RV", 2), TransactionType::Reversal, 1000, Currency::KES);
        reversal.reversal_of = Some(original.journal.id);
        for entry in &original.entries {
            reversal.push(entry.as_draft().reversed());
        }

        let posted = repo
            .reverse_journal(original.journal.id, reversal.clone(), "customer dispute")
            .await
            .unwrap();
        assert_eq!(posted.entries.len(), 3);

        assert_eq!(balance(&repo, &user).await, 0);
        assert_eq!(balance(&repo, &fees).await, 0);
        assert_eq!(balance(&repo, &liquidity).await, 0);

        let stored = repo.get_journal(original.journal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JournalStatus::Reversed);
        assert_eq!(stored.reversed_by, Some(posted.journal.id));
        assert_eq!(stored.reversal_reason.as_deref(), Some("customer dispute"));

        // Original entries are untouched.
        let entries = repo
            .list_entries_by_journal(original.journal.id)
            .await
            .unwrap();
        assert_eq!(entries, original.entries);

        let mut again = reversal;
        again.id = ledger_types::JournalId::new();
        again.receipt_code = code("RV", 3);
        assert!(matches!(
            repo.reverse_journal(original.journal.id, again, "twice").await,
            Err(RepoError::Conflict(_))
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pending journals
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_claim_then_complete_pending() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let fees = system_account(&repo, AccountPurpose::Fees).await;
        let user = wallet(&repo, "user-1").await;

        let draft = deposit_draft(&code("DP", 1), &liquidity, &user, &fees, 500, 5);
        assert!(matches!(
            repo.claim_journal(&draft).await.unwrap(),
            ClaimOutcome::Claimed(j) if j.status == JournalStatus::Pending
        ));
        assert!(matches!(
            repo.claim_journal(&draft).await.unwrap(),
            ClaimOutcome::Duplicate(_)
        ));
        assert_eq!(balance(&repo, &user).await, 0);

        let posted = repo.complete_pending(draft.clone()).await.unwrap();
        assert_eq!(posted.journal.status, JournalStatus::Completed);
        assert!(posted.journal.completed_at.is_some());
        assert_eq!(balance(&repo, &user).await, 495);

        assert!(matches!(
            repo.complete_pending(draft).await,
            Err(RepoError::Conflict(_))
        ));
        assert_eq!(balance(&repo, &user).await, 495);
    }

    #[tokio::test]
    async fn test_fail_pending_and_sweep() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let fees = system_account(&repo, AccountPurpose::Fees).await;
        let user = wallet(&repo, "user-1").await;

        let a = deposit_draft(&code("DP", 1), &liquidity, &user, &fees, 100, 0);
        let b = deposit_draft(&code("DP", 2), &liquidity, &user, &fees, 100, 0);
        repo.claim_journal(&a).await.unwrap();
        repo.claim_journal(&b).await.unwrap();

        let failed = repo.fail_pending(a.id, "collaborator down").await.unwrap();
        assert_eq!(failed.status, JournalStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("collaborator down"));

        let swept = repo
            .sweep_stale_pending(Utc::now() + Duration::minutes(1), "abandoned")
            .await
            .unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, b.id);
        assert_eq!(balance(&repo, &user).await, 0);
    }

    #[tokio::test]
    async fn test_record_failed_keeps_receipt_without_entries() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let user = wallet(&repo, "user-1").await;

        let draft = withdrawal_draft(&code("WD", 9), &user, &liquidity, 100);
        let journal = repo
            .record_failed(&draft, "Insufficient funds: available 0, requested 100")
            .await
            .unwrap();

        assert_eq!(journal.status, JournalStatus::Failed);
        assert!(repo.list_entries_by_journal(journal.id).await.unwrap().is_empty());

        // Same code again returns the stored failure.
        let again = repo.record_failed(&draft, "other").await.unwrap();
        assert_eq!(again.id, journal.id);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads and reports
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_list_journals_filters_and_pages() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let fees = system_account(&repo, AccountPurpose::Fees).await;
        let user = wallet(&repo, "user-1").await;

        for i in 0..5 {
            repo.post_journal(deposit_draft(&code("DP", i), &liquidity, &user, &fees, 100, 1))
                .await
                .unwrap();
        }
        repo.post_journal(withdrawal_draft(&code("WD", 10), &user, &liquidity, 50))
            .await
            .unwrap();

        let deposits = JournalFilter {
            transaction_type: Some(TransactionType::Deposit),
            ..Default::default()
        };
        let page = repo
            .list_journals(&deposits, PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);

        let last = repo
            .list_journals(&deposits, PageRequest::new(3, 2))
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);

        let entries = repo
            .list_entries_by_account(user.id, &DateRange::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(entries.total, 6);
        assert_eq!(entries.items.last().map(|e| e.balance_after), Some(445));
    }

    #[tokio::test]
    async fn test_report_totals() {
        let repo = setup_repo().await;
        let liquidity = system_account(&repo, AccountPurpose::Liquidity).await;
        let fees = system_account(&repo, AccountPurpose::Fees).await;
        let user = wallet(&repo, "user-1").await;

        repo.post_journal(deposit_draft(&code("DP", 1), &liquidity, &user, &fees, 1000, 10))
            .await
            .unwrap();
        repo.post_journal(deposit_draft(&code("DP", 2), &liquidity, &user, &fees, 500, 5))
            .await
            .unwrap();

        let totals = repo.journal_totals(&DateRange::default()).await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].count, 2);
        assert_eq!(totals[0].volume, 1500);
        assert_eq!(totals[0].fees, 15);

        let account = repo
            .account_totals(user.id, &DateRange::default())
            .await
            .unwrap();
        assert_eq!(account.entry_count, 2);
        assert_eq!(account.total_credits, 1485);
        assert_eq!(account.total_debits, 0);

        let later = Utc::now() + Duration::minutes(1);
        assert_eq!(repo.balance_before(user.id, later).await.unwrap(), 1485);
        let earlier = Utc::now() - Duration::days(1);
        assert_eq!(repo.balance_before(user.id, earlier).await.unwrap(), 0);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fee rules, sequence, health
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_upsert_and_find_fee_rules() {
        let repo = setup_repo().await;

        let mut rule = FeeRule {
            id: FeeRuleId::new(),
            transaction_type: TransactionType::Deposit,
            source_currency: Some(Currency::KES),
            target_currency: None,
            account_type: None,
            owner_type: None,
            calculation_method: CalculationMethod::Fixed,
            fee_value: dec!(10),
            min_fee: Some(10),
            max_fee: None,
            tiers: Vec::new(),
            fee_type: FeeType::Platform,
            is_active: true,
            created_at: Utc::now(),
        };
        repo.upsert_fee_rule(&rule).await.unwrap();

        let found = repo.find_fee_rules(TransactionType::Deposit).await.unwrap();
        assert_eq!(found, vec![rule.clone()]);

        rule.is_active = false;
        repo.upsert_fee_rule(&rule).await.unwrap();
        assert!(
            repo.find_fee_rules(TransactionType::Deposit)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            repo.find_fee_rules(TransactionType::Withdrawal)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_sequence_is_monotonic() {
        let repo = setup_repo().await;
        let a = repo.next_value().await.unwrap();
        let b = repo.next_value().await.unwrap();
        let c = repo.next_value().await.unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_ping() {
        let repo = setup_repo().await;
        repo.ping().await.unwrap();
    }
}
