//! End-to-end flows through the ledger service against in-memory SQLite.

use std::sync::Arc;

use chrono::Utc;
use ledger_hex::collaborators::{NoopReceiptService, StaticOwnerDirectory};
use ledger_hex::{Collaborators, EngineConfig, LedgerService};
use ledger_repo::SqliteRepo;
use ledger_types::domain::{CalculationMethod, FeeRule, FeeRuleId, FeeType, ReceiptStatus};
use ledger_types::{
    Account, AccountPurpose, AccountType, AppError, CreateAccountRequest, Currency, DateRange,
    JournalStatus, OwnerType, PageRequest, TransactionRequest, TransactionType,
};
use rust_decimal_macros::dec;

/// Helper to create a service over a fresh in-memory database.
async fn create_service() -> LedgerService<SqliteRepo> {
    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    LedgerService::new(repo, EngineConfig::default(), Collaborators::default())
}

fn fixed_fee(transaction_type: TransactionType, amount: i64) -> FeeRule {
    FeeRule {
        id: FeeRuleId::new(),
        transaction_type,
        source_currency: None,
        target_currency: None,
        account_type: None,
        owner_type: None,
        calculation_method: CalculationMethod::Fixed,
        fee_value: amount.into(),
        min_fee: None,
        max_fee: None,
        tiers: Vec::new(),
        fee_type: FeeType::Platform,
        is_active: true,
        created_at: Utc::now(),
    }
}

async fn fund(
    service: &LedgerService<SqliteRepo>,
    owner: &str,
    currency: Currency,
    amount: i64,
) -> Account {
    let mut req = CreateAccountRequest::wallet(owner, currency, AccountType::Real);
    req.initial_balance = amount;
    service.accounts().create_account(req).await.unwrap()
}

async fn wallet(service: &LedgerService<SqliteRepo>, owner: &str, currency: Currency) -> Account {
    service
        .accounts()
        .primary_account(owner, OwnerType::User, currency, AccountType::Real, false)
        .await
        .unwrap()
}

async fn system(service: &LedgerService<SqliteRepo>, purpose: AccountPurpose) -> Account {
    service
        .accounts()
        .ensure_system_account(Currency::KES, purpose, AccountType::Real)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_transfer_moves_funds_between_wallets() {
    let service = create_service().await;
    fund(&service, "alice", Currency::KES, 1000).await;

    let mut req = TransactionRequest::new(TransactionType::Transfer, "alice", 300, Currency::KES);
    req.destination_owner_id = Some("bob".into());
    let response = service
        .transactions()
        .execute_transaction_sync(req)
        .await
        .unwrap();

    assert_eq!(response.status, JournalStatus::Completed);
    assert_eq!(response.balance_after, Some(700));
    assert_eq!(wallet(&service, "alice", Currency::KES).await.balance, 700);
    assert_eq!(wallet(&service, "bob", Currency::KES).await.balance, 300);

    let details = service
        .transactions()
        .get_transaction_by_receipt(&response.receipt_code)
        .await
        .unwrap();
    assert_eq!(details.entries.len(), 2);
    assert!(details.fees.is_empty());
}

#[tokio::test]
async fn test_conversion_credits_target_wallet() {
    let service = create_service().await;
    fund(&service, "carol", Currency::USD, 10_000).await;

    let mut req =
        TransactionRequest::new(TransactionType::Conversion, "carol", 10_000, Currency::USD);
    req.target_currency = Some(Currency::KES);
    let response = service
        .transactions()
        .execute_transaction_sync(req)
        .await
        .unwrap();

    assert_eq!(response.status, JournalStatus::Completed);
    assert_eq!(wallet(&service, "carol", Currency::USD).await.balance, 0);
    // 100.00 USD / 0.0077
    assert_eq!(wallet(&service, "carol", Currency::KES).await.balance, 1_298_701);

    let details = service
        .transactions()
        .get_transaction_by_receipt(&response.receipt_code)
        .await
        .unwrap();
    assert_eq!(details.entries.len(), 4);
}

#[tokio::test]
async fn test_agent_takes_commission_share_of_fee() {
    let service = create_service().await;
    service
        .fees()
        .upsert_fee_rule(fixed_fee(TransactionType::Withdrawal, 100))
        .await
        .unwrap();
    service
        .accounts()
        .create_account(CreateAccountRequest {
            owner_type: OwnerType::Agent,
            owner_id: "agent-1".into(),
            currency: Currency::KES,
            purpose: AccountPurpose::Commission,
            account_type: AccountType::Real,
            initial_balance: 0,
            overdraft_limit: 0,
            commission_rate: Some(dec!(0.25)),
        })
        .await
        .unwrap();
    fund(&service, "dave", Currency::KES, 2000).await;

    let mut req = TransactionRequest::new(TransactionType::Withdrawal, "dave", 1000, Currency::KES);
    req.agent_id = Some("agent-1".into());
    let response = service
        .transactions()
        .execute_transaction_sync(req)
        .await
        .unwrap();

    assert_eq!(response.fee_amount, 100);
    assert_eq!(wallet(&service, "dave", Currency::KES).await.balance, 900);
    assert_eq!(system(&service, AccountPurpose::Fees).await.balance, 75);
    let agent = service
        .accounts()
        .primary_account("agent-1", OwnerType::Agent, Currency::KES, AccountType::Real, false)
        .await
        .unwrap();
    assert_eq!(agent.balance, 25);

    let fees = service
        .statements()
        .get_fees_by_receipt(&response.receipt_code)
        .await
        .unwrap();
    assert_eq!(fees.len(), 2);
    assert_eq!(fees.iter().map(|f| f.amount).sum::<i64>(), 100);

    let summary = service
        .statements()
        .get_agent_commission_summary("agent-1", DateRange::default())
        .await
        .unwrap();
    assert_eq!(summary.record_count, 1);
    assert_eq!(summary.totals.get(&Currency::KES), Some(&25));
}

#[tokio::test]
async fn test_fee_above_deposit_amount_fails() {
    let service = create_service().await;
    service
        .fees()
        .upsert_fee_rule(fixed_fee(TransactionType::Deposit, 10))
        .await
        .unwrap();

    let req = TransactionRequest::new(TransactionType::Deposit, "erin", 5, Currency::KES);
    let response = service
        .transactions()
        .execute_transaction_sync(req)
        .await
        .unwrap();

    assert_eq!(response.status, JournalStatus::Failed);
    assert_eq!(wallet(&service, "erin", Currency::KES).await.balance, 0);
}

#[tokio::test]
async fn test_reversal_restores_balances() {
    let receipts = Arc::new(NoopReceiptService::new());
    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    let service = LedgerService::new(
        repo,
        EngineConfig::default(),
        Collaborators {
            receipts: receipts.clone(),
            ..Collaborators::default()
        },
    );

    let req = TransactionRequest::new(TransactionType::Deposit, "frank", 1000, Currency::KES);
    let deposit = service
        .transactions()
        .execute_transaction_sync(req)
        .await
        .unwrap();
    assert_eq!(wallet(&service, "frank", Currency::KES).await.balance, 1000);

    let reversal = service
        .transactions()
        .reverse_transaction(&deposit.receipt_code, "customer dispute")
        .await
        .unwrap();

    assert_eq!(reversal.transaction_type, TransactionType::Reversal);
    assert!(reversal.receipt_code.contains("RV-"));
    assert_eq!(reversal.balance_after, Some(0));
    assert_eq!(wallet(&service, "frank", Currency::KES).await.balance, 0);
    assert_eq!(system(&service, AccountPurpose::Liquidity).await.balance, 0);

    let status = service
        .transactions()
        .get_transaction_status(&deposit.receipt_code)
        .await
        .unwrap();
    assert_eq!(status.status, JournalStatus::Reversed);
    assert_eq!(status.reversed_by, Some(reversal.journal_id));

    let again = service
        .transactions()
        .reverse_transaction(&deposit.receipt_code, "customer dispute")
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let submitted = receipts.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[0].status, ReceiptStatus::Completed);
    assert_eq!(
        submitted[1].reversal_of.as_deref(),
        Some(deposit.receipt_code.as_str())
    );
}

#[tokio::test]
async fn test_ledger_reconciles_with_stored_balances() {
    let service = create_service().await;
    service
        .fees()
        .upsert_fee_rule(fixed_fee(TransactionType::Withdrawal, 15))
        .await
        .unwrap();
    let account = fund(&service, "grace", Currency::KES, 5000).await;

    for amount in [100, 250, 400] {
        let req =
            TransactionRequest::new(TransactionType::Withdrawal, "grace", amount, Currency::KES);
        service
            .transactions()
            .execute_transaction_sync(req)
            .await
            .unwrap();
    }

    let reconciliation = service.accounts().reconcile_account(account.id).await.unwrap();
    assert!(reconciliation.is_balanced);
    assert_eq!(reconciliation.stored_balance, 5000 - 750 - 45);
    assert_eq!(reconciliation.difference, 0);

    let fees = system(&service, AccountPurpose::Fees).await;
    let fees_reconciliation = service.accounts().reconcile_account(fees.id).await.unwrap();
    assert!(fees_reconciliation.is_balanced);
    assert_eq!(fees_reconciliation.ledger_balance, 45);
}

#[tokio::test]
async fn test_statements_and_reports() {
    let service = create_service().await;
    let account = fund(&service, "heidi", Currency::KES, 1000).await;
    let req = TransactionRequest::new(TransactionType::Withdrawal, "heidi", 400, Currency::KES);
    service
        .transactions()
        .execute_transaction_sync(req)
        .await
        .unwrap();

    let statement = service
        .statements()
        .get_account_statement(account.id, DateRange::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(statement.opening_balance, 0);
    assert_eq!(statement.closing_balance, 600);
    assert_eq!(statement.totals.entry_count, 2);
    assert_eq!(statement.entries.total, 2);

    let summary = service.statements().get_owner_summary("heidi").await.unwrap();
    assert_eq!(summary.accounts.len(), 1);
    assert_eq!(summary.totals[0].balance, 600);

    let missing = service.statements().get_owner_summary("nobody").await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    let report = service
        .statements()
        .generate_daily_report(Utc::now().date_naive())
        .await
        .unwrap();
    // opening balance adjustment + withdrawal
    assert_eq!(report.transaction_count, 2);
    assert!(report.rows.iter().all(|r| r.status == JournalStatus::Completed));

    let holdings = service.statements().get_system_holdings().await.unwrap();
    let liquidity = holdings
        .holdings
        .iter()
        .find(|h| h.purpose == AccountPurpose::Liquidity && h.currency == Currency::KES)
        .unwrap();
    assert_eq!(liquidity.balance, -600);
}

#[tokio::test]
async fn test_seeding_through_the_service() {
    let service = create_service().await;
    let directory = StaticOwnerDirectory::generated(OwnerType::User, "user", 5)
        .with(StaticOwnerDirectory::generated(OwnerType::Partner, "partner", 1));

    let report = service.seeder().seed_system(&directory).await;

    // 2 currencies x 2 account types: 5 system purposes + 6 owners
    assert_eq!(report.owners_seen, 6);
    assert_eq!(report.created, 4 * 5 + 4 * 6);
    assert_eq!(report.failed, 0);

    let system_accounts = service.accounts().list_system_accounts().await.unwrap();
    assert_eq!(system_accounts.len(), 20);
}
