//! PostgreSQL repository adapter.
//!
//! Postings lock the touched `balances` rows with `SELECT ... FOR UPDATE`,
//! one row at a time in ascending account id order, inside the same
//! transaction that writes the journal.
#![allow(clippy::collapsible_if)]

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use ledger_types::domain::{
    Account, AccountId, AccountInsert, AccountKey, AccountUpdate, ClaimOutcome, FeeRecord,
    FeeRule, Journal, JournalDraft, JournalId, JournalStatus, LedgerEntry, NewAccount,
    PostOutcome, PostedJournal, PostingPlan, TransactionType, plan_postings,
};
use ledger_types::ports::{
    AccountRepository, FeeRepository, JournalRepository, LedgerStore, ReportRepository,
    SequenceSource,
};
use ledger_types::{
    DateRange, EntryTotals, JournalFilter, JournalTotals, PageRequest, Paginated, RepoError,
};

use crate::types::{
    ACCOUNT_COLUMNS, DbAccount, DbEntryTotals, DbFeeRecord, DbFeeRule, DbJournal,
    DbJournalTotals, DbLedgerEntry, ENTRY_COLUMNS, FEE_RECORD_COLUMNS, FEE_RULE_COLUMNS,
    JOURNAL_COLUMNS, db_err, tiers_json, tx_err,
};

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_ledger_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_fees_pg.sql"),
        "0002",
    )
    .await?;

    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the database schema (for testing with existing pool).
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        run_migrations(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))
    }

    async fn existing_account(&self, account: &NewAccount) -> Result<AccountInsert, RepoError> {
        match self.find_account(&account.key()).await? {
            Some(existing) => Ok(AccountInsert::Existing(existing)),
            None => Err(RepoError::Conflict(format!(
                "account number {} already taken",
                account.account_number
            ))),
        }
    }

    async fn existing_posting(&self, receipt_code: &str) -> Result<PostedJournal, RepoError> {
        let journal = self
            .get_journal_by_receipt(receipt_code)
            .await?
            .ok_or_else(|| {
                RepoError::Consistency(format!("receipt {} conflicted but is missing", receipt_code))
            })?;
        let entries = self.list_entries_by_journal(journal.id).await?;
        Ok(PostedJournal { journal, entries })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction-scoped helpers
// ─────────────────────────────────────────────────────────────────────────────

fn ensure_balanced(draft: &JournalDraft) -> Result<(), RepoError> {
    if let Err(e) = draft.ensure_balanced() {
        error!(critical = true, receipt_code = %draft.receipt_code, error = %e, "refusing to post unbalanced journal");
        return Err(RepoError::Domain(e));
    }
    Ok(())
}

/// Locks balance rows in ascending id order.
async fn lock_accounts(conn: &mut PgConnection, ids: &[AccountId]) -> Result<(), RepoError> {
    let mut sorted = ids.to_vec();
    sorted.sort();
    sorted.dedup();
    for id in sorted {
        sqlx::query(r#"SELECT balance FROM balances WHERE account_id = $1 FOR UPDATE"#)
            .bind(id.into_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;
    }
    Ok(())
}

async fn fetch_accounts(
    conn: &mut PgConnection,
    ids: &[AccountId],
) -> Result<Vec<Account>, RepoError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let uuids: Vec<Uuid> = ids.iter().map(|id| id.into_uuid()).collect();
    let sql = format!(
        "SELECT {} FROM accounts a JOIN balances b ON b.account_id = a.id WHERE a.id = ANY($1)",
        ACCOUNT_COLUMNS
    );
    let rows: Vec<DbAccount> = sqlx::query_as(&sql)
        .bind(uuids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;
    rows.into_iter().map(DbAccount::into_domain).collect()
}

async fn fetch_journal(
    conn: &mut PgConnection,
    id: JournalId,
    for_update: bool,
) -> Result<Option<Journal>, RepoError> {
    let sql = format!(
        "SELECT {} FROM journals WHERE id = $1{}",
        JOURNAL_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row: Option<DbJournal> = sqlx::query_as(&sql)
        .bind(id.into_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.map(DbJournal::into_domain).transpose()
}

/// Inserts the journal header. Returns false when the receipt code is taken.
async fn insert_journal(
    conn: &mut PgConnection,
    draft: &JournalDraft,
    status: JournalStatus,
    error_message: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, RepoError> {
    let completed_at = (status != JournalStatus::Pending).then_some(now);
    let result = sqlx::query(
        r#"INSERT INTO journals (id, receipt_code, transaction_type, status, owner_id, amount, currency,
               fee_amount, primary_account_id, counterparty_account_id, description, external_ref,
               error_message, reversal_of, created_at, completed_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
           ON CONFLICT (receipt_code) DO NOTHING"#,
    )
    .bind(draft.id.into_uuid())
    .bind(&draft.receipt_code)
    .bind(draft.transaction_type.as_str())
    .bind(status.as_str())
    .bind(&draft.owner_id)
    .bind(draft.amount)
    .bind(draft.currency.code())
    .bind(draft.fee_amount)
    .bind(draft.primary_account_id.map(AccountId::into_uuid))
    .bind(draft.counterparty_account_id.map(AccountId::into_uuid))
    .bind(&draft.description)
    .bind(&draft.external_ref)
    .bind(error_message)
    .bind(draft.reversal_of.map(JournalId::into_uuid))
    .bind(draft.created_at)
    .bind(completed_at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(result.rows_affected() == 1)
}

/// Locks, plans and writes entries, balances and fee records.
async fn apply_postings(
    conn: &mut PgConnection,
    draft: &JournalDraft,
    now: DateTime<Utc>,
) -> Result<Vec<LedgerEntry>, RepoError> {
    let ids = draft.account_ids();
    lock_accounts(conn, &ids).await?;
    let accounts = fetch_accounts(conn, &ids).await?;
    let PostingPlan {
        balances_after,
        final_balances,
    } = plan_postings(&accounts, &draft.entries)?;
    let opening: HashMap<AccountId, i64> = accounts.iter().map(|a| (a.id, a.balance)).collect();

    let mut entries = Vec::with_capacity(draft.entries.len());
    for (line, (entry, balance_after)) in draft.entries.iter().zip(balances_after).enumerate() {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO ledger_entries (id, journal_id, line_no, account_id, direction, amount, currency, balance_after, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(id)
        .bind(draft.id.into_uuid())
        .bind(line as i32)
        .bind(entry.account_id.into_uuid())
        .bind(entry.direction.as_str())
        .bind(entry.amount)
        .bind(entry.currency.code())
        .bind(balance_after)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

        entries.push(LedgerEntry {
            id,
            journal_id: draft.id,
            line_no: line as i32,
            account_id: entry.account_id,
            direction: entry.direction,
            amount: entry.amount,
            currency: entry.currency,
            balance_after,
            created_at: now,
        });
    }

    for (account_id, balance) in final_balances {
        let result = sqlx::query(
            r#"UPDATE balances SET balance = $1, version = version + 1, updated_at = $2
               WHERE account_id = $3 AND balance = $4"#,
        )
        .bind(balance)
        .bind(now)
        .bind(account_id.into_uuid())
        .bind(opening.get(&account_id).copied().unwrap_or_default())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

        if result.rows_affected() != 1 {
            return Err(RepoError::Consistency(format!(
                "balance of {} changed while locked",
                account_id
            )));
        }
    }

    for fee in &draft.fees {
        sqlx::query(
            r#"INSERT INTO fee_records (id, journal_id, receipt_code, fee_type, rule_id, amount, currency, account_id, agent_id, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(Uuid::new_v4())
        .bind(draft.id.into_uuid())
        .bind(&draft.receipt_code)
        .bind(fee.fee_type.as_str())
        .bind(fee.rule_id.map(|r| *r.as_uuid()))
        .bind(fee.amount)
        .bind(fee.currency.code())
        .bind(fee.account_id.into_uuid())
        .bind(&fee.agent_id)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }

    Ok(entries)
}

/// Inserts the account row with a zero balance. Returns false when its key
/// or number is taken.
async fn insert_account_row(
    conn: &mut PgConnection,
    account: &NewAccount,
) -> Result<bool, RepoError> {
    let result = sqlx::query(
        r#"INSERT INTO accounts (id, account_number, owner_type, owner_id, currency, purpose, account_type,
               overdraft_limit, commission_rate, is_active, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10, $10)
           ON CONFLICT DO NOTHING"#,
    )
    .bind(account.id.into_uuid())
    .bind(&account.account_number)
    .bind(account.owner_type.as_str())
    .bind(&account.owner_id)
    .bind(account.currency.code())
    .bind(account.purpose.as_str())
    .bind(account.account_type.as_str())
    .bind(account.overdraft_limit)
    .bind(account.commission_rate.map(|r| r.to_string()))
    .bind(account.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query(
        r#"INSERT INTO balances (account_id, currency, balance, version, updated_at) VALUES ($1, $2, 0, 0, $3)"#,
    )
    .bind(account.id.into_uuid())
    .bind(account.currency.code())
    .bind(account.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(true)
}

fn push_journal_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &JournalFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(tx_type) = filter.transaction_type {
        qb.push(" AND transaction_type = ").push_bind(tx_type.as_str());
    }
    if let Some(owner_id) = &filter.owner_id {
        qb.push(" AND owner_id = ").push_bind(owner_id.clone());
    }
    push_range(qb, &filter.range);
}

fn push_range(qb: &mut QueryBuilder<'_, Postgres>, range: &DateRange) {
    if let Some(from) = range.from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = range.to {
        qb.push(" AND created_at < ").push_bind(to);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Account repository
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AccountRepository for PostgresRepo {
    #[instrument(skip(self, account), fields(owner_id = %account.owner_id, currency = %account.currency))]
    async fn insert_account(&self, account: NewAccount) -> Result<AccountInsert, RepoError> {
        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        if !insert_account_row(&mut tx, &account).await? {
            tx.rollback().await.map_err(tx_err)?;
            return self.existing_account(&account).await;
        }
        tx.commit().await.map_err(tx_err)?;
        Ok(AccountInsert::Created(account.into_account()))
    }

    #[instrument(skip(self, account, opening), fields(owner_id = %account.owner_id, receipt_code = %opening.receipt_code))]
    async fn insert_account_with_opening(
        &self,
        account: NewAccount,
        opening: JournalDraft,
    ) -> Result<AccountInsert, RepoError> {
        ensure_balanced(&opening)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        if !insert_account_row(&mut tx, &account).await? {
            tx.rollback().await.map_err(tx_err)?;
            return self.existing_account(&account).await;
        }
        if !insert_journal(&mut tx, &opening, JournalStatus::Completed, None, now).await? {
            tx.rollback().await.map_err(tx_err)?;
            return Err(RepoError::Conflict(format!(
                "receipt code {} already used",
                opening.receipt_code
            )));
        }
        apply_postings(&mut tx, &opening, now).await?;
        let created = fetch_accounts(&mut tx, &[account.id])
            .await?
            .pop()
            .ok_or(RepoError::NotFound)?;
        tx.commit().await.map_err(tx_err)?;

        Ok(AccountInsert::Created(created))
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let sql = format!(
            "SELECT {} FROM accounts a JOIN balances b ON b.account_id = a.id WHERE a.id = $1",
            ACCOUNT_COLUMNS
        );
        let row: Option<DbAccount> = sqlx::query_as(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(DbAccount::into_domain).transpose()
    }

    async fn get_accounts(&self, ids: &[AccountId]) -> Result<Vec<Account>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_accounts(&mut conn, ids).await
    }

    async fn find_account(&self, key: &AccountKey) -> Result<Option<Account>, RepoError> {
        let sql = format!(
            "SELECT {} FROM accounts a JOIN balances b ON b.account_id = a.id
             WHERE a.owner_id = $1 AND a.currency = $2 AND a.purpose = $3 AND a.account_type = $4",
            ACCOUNT_COLUMNS
        );
        let row: Option<DbAccount> = sqlx::query_as(&sql)
            .bind(&key.owner_id)
            .bind(key.currency.code())
            .bind(key.purpose.as_str())
            .bind(key.account_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(DbAccount::into_domain).transpose()
    }

    async fn list_accounts_by_owner(&self, owner_id: &str) -> Result<Vec<Account>, RepoError> {
        let sql = format!(
            "SELECT {} FROM accounts a JOIN balances b ON b.account_id = a.id
             WHERE a.owner_id = $1 ORDER BY a.currency, a.purpose, a.account_type",
            ACCOUNT_COLUMNS
        );
        let rows: Vec<DbAccount> = sqlx::query_as(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(DbAccount::into_domain).collect()
    }

    async fn list_system_accounts(&self) -> Result<Vec<Account>, RepoError> {
        let sql = format!(
            "SELECT {} FROM accounts a JOIN balances b ON b.account_id = a.id
             WHERE a.owner_type = 'system' ORDER BY a.currency, a.purpose, a.account_type",
            ACCOUNT_COLUMNS
        );
        let rows: Vec<DbAccount> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(DbAccount::into_domain).collect()
    }

    #[instrument(skip(self, update))]
    async fn update_account(
        &self,
        id: AccountId,
        update: &AccountUpdate,
    ) -> Result<Account, RepoError> {
        update.validate()?;
        let mut account = self.get_account(id).await?.ok_or(RepoError::NotFound)?;
        update.apply_to(&mut account);

        sqlx::query(
            r#"UPDATE accounts SET overdraft_limit = $1, commission_rate = $2, is_active = $3, updated_at = $4 WHERE id = $5"#,
        )
        .bind(account.overdraft_limit)
        .bind(account.commission_rate.map(|r| r.to_string()))
        .bind(account.is_active)
        .bind(account.updated_at)
        .bind(id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(account)
    }

    async fn sum_entries(&self, id: AccountId) -> Result<i64, RepoError> {
        sqlx::query_scalar(
            r#"SELECT COALESCE(SUM(CASE WHEN direction = 'credit' THEN amount ELSE -amount END), 0)::BIGINT
               FROM ledger_entries WHERE account_id = $1"#,
        )
        .bind(id.into_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Journal repository
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl JournalRepository for PostgresRepo {
    #[instrument(skip(self, draft), fields(receipt_code = %draft.receipt_code))]
    async fn post_journal(&self, draft: JournalDraft) -> Result<PostOutcome, RepoError> {
        ensure_balanced(&draft)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        if !insert_journal(&mut tx, &draft, JournalStatus::Completed, None, now).await? {
            tx.rollback().await.map_err(tx_err)?;
            return Ok(PostOutcome::Duplicate(
                self.existing_posting(&draft.receipt_code).await?,
            ));
        }
        let entries = apply_postings(&mut tx, &draft, now).await?;
        tx.commit().await.map_err(tx_err)?;

        let mut journal = draft.to_journal(JournalStatus::Completed);
        journal.completed_at = Some(now);
        Ok(PostOutcome::Posted(PostedJournal { journal, entries }))
    }

    #[instrument(skip(self, draft), fields(receipt_code = %draft.receipt_code))]
    async fn claim_journal(&self, draft: &JournalDraft) -> Result<ClaimOutcome, RepoError> {
        ensure_balanced(draft)?;
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let claimed =
            insert_journal(&mut conn, draft, JournalStatus::Pending, None, Utc::now()).await?;
        drop(conn);

        if claimed {
            return Ok(ClaimOutcome::Claimed(draft.to_journal(JournalStatus::Pending)));
        }
        let existing = self
            .get_journal_by_receipt(&draft.receipt_code)
            .await?
            .ok_or(RepoError::NotFound)?;
        Ok(ClaimOutcome::Duplicate(existing))
    }

    #[instrument(skip(self, draft), fields(receipt_code = %draft.receipt_code))]
    async fn complete_pending(&self, draft: JournalDraft) -> Result<PostedJournal, RepoError> {
        ensure_balanced(&draft)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        let result = sqlx::query(
            r#"UPDATE journals SET status = 'completed', completed_at = $1 WHERE id = $2 AND status = 'pending'"#,
        )
        .bind(now)
        .bind(draft.id.into_uuid())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(tx_err)?;
            return Err(RepoError::Conflict(format!(
                "journal {} is not pending",
                draft.receipt_code
            )));
        }

        let entries = apply_postings(&mut tx, &draft, now).await?;
        let journal = fetch_journal(&mut tx, draft.id, false)
            .await?
            .ok_or(RepoError::NotFound)?;
        tx.commit().await.map_err(tx_err)?;

        Ok(PostedJournal { journal, entries })
    }

    #[instrument(skip(self))]
    async fn fail_pending(&self, id: JournalId, error: &str) -> Result<Journal, RepoError> {
        let result = sqlx::query(
            r#"UPDATE journals SET status = 'failed', error_message = $1, completed_at = $2
               WHERE id = $3 AND status = 'pending'"#,
        )
        .bind(error)
        .bind(Utc::now())
        .bind(id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let journal = self.get_journal(id).await?.ok_or(RepoError::NotFound)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::Conflict(format!(
                "journal {} is {}, not pending",
                journal.receipt_code, journal.status
            )));
        }
        Ok(journal)
    }

    #[instrument(skip(self, draft), fields(receipt_code = %draft.receipt_code))]
    async fn record_failed(&self, draft: &JournalDraft, error: &str) -> Result<Journal, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        insert_journal(&mut conn, draft, JournalStatus::Failed, Some(error), Utc::now()).await?;
        drop(conn);

        self.get_journal_by_receipt(&draft.receipt_code)
            .await?
            .ok_or(RepoError::NotFound)
    }

    #[instrument(skip(self, reversal), fields(receipt_code = %reversal.receipt_code))]
    async fn reverse_journal(
        &self,
        original: JournalId,
        reversal: JournalDraft,
        reason: &str,
    ) -> Result<PostedJournal, RepoError> {
        ensure_balanced(&reversal)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        let target = fetch_journal(&mut tx, original, true)
            .await?
            .ok_or(RepoError::NotFound)?;
        if target.status != JournalStatus::Completed || target.reversed_by.is_some() {
            tx.rollback().await.map_err(tx_err)?;
            return Err(RepoError::Conflict(format!(
                "journal {} is {}, only completed journals can be reversed",
                target.receipt_code, target.status
            )));
        }

        if !insert_journal(&mut tx, &reversal, JournalStatus::Completed, None, now).await? {
            tx.rollback().await.map_err(tx_err)?;
            return Err(RepoError::Conflict(format!(
                "receipt code {} already used",
                reversal.receipt_code
            )));
        }

        let entries = apply_postings(&mut tx, &reversal, now).await?;

        sqlx::query(
            r#"UPDATE journals SET status = 'reversed', reversed_by = $1, reversed_at = $2, reversal_reason = $3
               WHERE id = $4 AND status = 'completed'"#,
        )
        .bind(reversal.id.into_uuid())
        .bind(now)
        .bind(reason)
        .bind(original.into_uuid())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(tx_err)?;

        let mut journal = reversal.to_journal(JournalStatus::Completed);
        journal.completed_at = Some(now);
        Ok(PostedJournal { journal, entries })
    }

    #[instrument(skip(self))]
    async fn sweep_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<Journal>, RepoError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM journals WHERE status = 'pending' AND created_at < $1 ORDER BY created_at"#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut failed = Vec::with_capacity(ids.len());
        for id in ids {
            match self.fail_pending(JournalId::from_uuid(id), error).await {
                Ok(journal) => failed.push(journal),
                Err(RepoError::Conflict(msg)) => warn!(%msg, "skipping swept journal"),
                Err(e) => return Err(e),
            }
        }
        Ok(failed)
    }

    async fn get_journal(&self, id: JournalId) -> Result<Option<Journal>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_journal(&mut conn, id, false).await
    }

    async fn get_journal_by_receipt(&self, code: &str) -> Result<Option<Journal>, RepoError> {
        let sql = format!("SELECT {} FROM journals WHERE receipt_code = $1", JOURNAL_COLUMNS);
        let row: Option<DbJournal> = sqlx::query_as(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(DbJournal::into_domain).transpose()
    }

    async fn list_journals(
        &self,
        filter: &JournalFilter,
        page: PageRequest,
    ) -> Result<Paginated<Journal>, RepoError> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM journals WHERE 1 = 1");
        push_journal_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM journals WHERE 1 = 1",
            JOURNAL_COLUMNS
        ));
        push_journal_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows: Vec<DbJournal> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let items = rows
            .into_iter()
            .map(DbJournal::into_domain)
            .collect::<Result<_, _>>()?;
        Ok(Paginated::new(items, total, page))
    }

    async fn list_entries_by_journal(&self, id: JournalId) -> Result<Vec<LedgerEntry>, RepoError> {
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE journal_id = $1 ORDER BY line_no",
            ENTRY_COLUMNS
        );
        let rows: Vec<DbLedgerEntry> = sqlx::query_as(&sql)
            .bind(id.into_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(DbLedgerEntry::into_domain).collect()
    }

    async fn list_entries_by_account(
        &self,
        account_id: AccountId,
        range: &DateRange,
        page: PageRequest,
    ) -> Result<Paginated<LedgerEntry>, RepoError> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM ledger_entries WHERE account_id = ");
        count.push_bind(account_id.into_uuid());
        push_range(&mut count, range);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM ledger_entries WHERE account_id = ",
            ENTRY_COLUMNS
        ));
        qb.push_bind(account_id.into_uuid());
        push_range(&mut qb, range);
        qb.push(" ORDER BY created_at, line_no LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows: Vec<DbLedgerEntry> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let items = rows
            .into_iter()
            .map(DbLedgerEntry::into_domain)
            .collect::<Result<_, _>>()?;
        Ok(Paginated::new(items, total, page))
    }

    async fn balance_before(
        &self,
        account_id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<i64, RepoError> {
        sqlx::query_scalar(
            r#"SELECT COALESCE(SUM(CASE WHEN direction = 'credit' THEN amount ELSE -amount END), 0)::BIGINT
               FROM ledger_entries WHERE account_id = $1 AND created_at < $2"#,
        )
        .bind(account_id.into_uuid())
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fees, reports, sequence
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl FeeRepository for PostgresRepo {
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    async fn upsert_fee_rule(&self, rule: &FeeRule) -> Result<FeeRule, RepoError> {
        rule.validate()?;
        sqlx::query(
            r#"INSERT INTO fee_rules (id, transaction_type, source_currency, target_currency, account_type, owner_type,
                   calculation_method, fee_value, min_fee, max_fee, tiers, fee_type, is_active, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
               ON CONFLICT (id) DO UPDATE SET
                   transaction_type = EXCLUDED.transaction_type,
                   source_currency = EXCLUDED.source_currency,
                   target_currency = EXCLUDED.target_currency,
                   account_type = EXCLUDED.account_type,
                   owner_type = EXCLUDED.owner_type,
                   calculation_method = EXCLUDED.calculation_method,
                   fee_value = EXCLUDED.fee_value,
                   min_fee = EXCLUDED.min_fee,
                   max_fee = EXCLUDED.max_fee,
                   tiers = EXCLUDED.tiers,
                   fee_type = EXCLUDED.fee_type,
                   is_active = EXCLUDED.is_active"#,
        )
        .bind(*rule.id.as_uuid())
        .bind(rule.transaction_type.as_str())
        .bind(rule.source_currency.map(|c| c.code()))
        .bind(rule.target_currency.map(|c| c.code()))
        .bind(rule.account_type.map(|t| t.as_str()))
        .bind(rule.owner_type.map(|t| t.as_str()))
        .bind(rule.calculation_method.as_str())
        .bind(rule.fee_value.to_string())
        .bind(rule.min_fee)
        .bind(rule.max_fee)
        .bind(tiers_json(rule)?)
        .bind(rule.fee_type.as_str())
        .bind(rule.is_active)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rule.clone())
    }

    async fn find_fee_rules(&self, tx_type: TransactionType) -> Result<Vec<FeeRule>, RepoError> {
        let sql = format!(
            "SELECT {} FROM fee_rules WHERE transaction_type = $1 AND is_active = $2",
            FEE_RULE_COLUMNS
        );
        let rows: Vec<DbFeeRule> = sqlx::query_as(&sql)
            .bind(tx_type.as_str())
            .bind(true)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(DbFeeRule::into_domain).collect()
    }

    async fn list_fee_records_by_receipt(&self, code: &str) -> Result<Vec<FeeRecord>, RepoError> {
        let sql = format!(
            "SELECT {} FROM fee_records WHERE receipt_code = $1 ORDER BY created_at",
            FEE_RECORD_COLUMNS
        );
        let rows: Vec<DbFeeRecord> = sqlx::query_as(&sql)
            .bind(code)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(DbFeeRecord::into_domain).collect()
    }

    async fn list_fee_records_by_agent(
        &self,
        agent_id: &str,
        range: &DateRange,
    ) -> Result<Vec<FeeRecord>, RepoError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM fee_records WHERE agent_id = ",
            FEE_RECORD_COLUMNS
        ));
        qb.push_bind(agent_id.to_string());
        push_range(&mut qb, range);
        qb.push(" ORDER BY created_at");

        let rows: Vec<DbFeeRecord> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(DbFeeRecord::into_domain).collect()
    }
}

#[async_trait]
impl ReportRepository for PostgresRepo {
    async fn journal_totals(&self, range: &DateRange) -> Result<Vec<JournalTotals>, RepoError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT transaction_type, status, currency, COUNT(*) AS count,
                    COALESCE(SUM(amount), 0)::BIGINT AS volume, COALESCE(SUM(fee_amount), 0)::BIGINT AS fees
             FROM journals WHERE 1 = 1",
        );
        push_range(&mut qb, range);
        qb.push(" GROUP BY transaction_type, status, currency ORDER BY currency, transaction_type, status");

        let rows: Vec<DbJournalTotals> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(DbJournalTotals::into_domain).collect()
    }

    async fn account_totals(
        &self,
        account_id: AccountId,
        range: &DateRange,
    ) -> Result<EntryTotals, RepoError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) AS entry_count,
                    COALESCE(SUM(CASE WHEN direction = 'debit' THEN amount ELSE 0 END), 0)::BIGINT AS total_debits,
                    COALESCE(SUM(CASE WHEN direction = 'credit' THEN amount ELSE 0 END), 0)::BIGINT AS total_credits
             FROM ledger_entries WHERE account_id = ",
        );
        qb.push_bind(account_id.into_uuid());
        push_range(&mut qb, range);

        let row: DbEntryTotals = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.into())
    }
}

#[async_trait]
impl SequenceSource for PostgresRepo {
    async fn next_value(&self) -> Result<u64, RepoError> {
        let value: i64 = sqlx::query_scalar(r#"SELECT nextval('receipt_seq')"#)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(value as u64)
    }
}

#[async_trait]
impl LedgerStore for PostgresRepo {
    async fn ping(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
