//! Ledger / Journal Engine
//!
//! Atomic double-entry posting, reversals and the journal read paths.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledger_types::domain::{
    AccountInsert, ClaimOutcome, EntryDraft, JournalDraft, NewAccount, PostOutcome,
    PostedJournal, ReceiptCode,
};
use ledger_types::{
    AccountId, AppError, DateRange, Direction, DomainError, Journal, JournalFilter, JournalId,
    JournalStatus, LedgerEntry, LedgerStore, PageRequest, Paginated, RepoError, TransactionType,
};
use tracing::{error, info, instrument, warn};

use crate::receipts::ReceiptGenerator;

/// Posting and history over the journal store.
pub struct LedgerEngine<R: LedgerStore> {
    store: Arc<R>,
    receipts: ReceiptGenerator,
}

impl<R: LedgerStore> LedgerEngine<R> {
    pub fn new(store: Arc<R>, receipts: ReceiptGenerator) -> Self {
        Self { store, receipts }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Posting
    // ─────────────────────────────────────────────────────────────────────────────

    /// Posts a journal in one storage transaction.
    ///
    /// A reused receipt code returns the stored journal as
    /// [`PostOutcome::Duplicate`] and writes nothing.
    #[instrument(skip(self, draft), fields(receipt_code = %draft.receipt_code, tx_type = %draft.transaction_type))]
    pub async fn post_journal(&self, draft: JournalDraft) -> Result<PostOutcome, AppError> {
        check_draft(&draft)?;
        let receipt_code = draft.receipt_code.clone();

        let outcome = self
            .store
            .post_journal(draft)
            .await
            .map_err(|e| storage_error(e, &receipt_code))?;

        match &outcome {
            PostOutcome::Posted(posted) => info!(
                journal_id = %posted.journal.id,
                entries = posted.entries.len(),
                "journal posted"
            ),
            PostOutcome::Duplicate(posted) => info!(
                journal_id = %posted.journal.id,
                status = %posted.journal.status,
                "duplicate receipt code, returning stored journal"
            ),
        }
        Ok(outcome)
    }

    /// Inserts `account` and posts `opening` in the same storage transaction.
    #[instrument(skip(self, account, opening), fields(receipt_code = %opening.receipt_code))]
    pub async fn open_account(
        &self,
        account: NewAccount,
        opening: JournalDraft,
    ) -> Result<AccountInsert, AppError> {
        check_draft(&opening)?;
        let receipt_code = opening.receipt_code.clone();
        self.store
            .insert_account_with_opening(account, opening)
            .await
            .map_err(|e| storage_error(e, &receipt_code))
    }

    /// Builds and posts a journal from bare entries.
    ///
    /// The journal amount is the debit total of the first entry's currency.
    pub async fn post_entries(
        &self,
        transaction_type: TransactionType,
        receipt_code: &str,
        entries: Vec<EntryDraft>,
    ) -> Result<PostOutcome, AppError> {
        let currency = entries
            .first()
            .map(|e| e.currency)
            .ok_or_else(|| AppError::BadRequest("Journal has no entries".into()))?;
        let amount = entries
            .iter()
            .filter(|e| e.currency == currency && e.direction == Direction::Debit)
            .map(|e| e.amount)
            .sum();

        let mut draft = JournalDraft::new(receipt_code, transaction_type, amount, currency);
        for entry in entries {
            draft.push(entry);
        }
        self.post_journal(draft).await
    }

    /// Posts a compensating journal with every entry flipped and marks the
    /// original reversed. Only completed journals can be reversed, once.
    #[instrument(skip(self, reason))]
    pub async fn reverse_journal(
        &self,
        id: JournalId,
        reason: &str,
    ) -> Result<PostedJournal, AppError> {
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest("Reversal reason is required".into()));
        }

        let original = self.require_journal(id).await?;
        match original.status {
            JournalStatus::Completed => {}
            JournalStatus::Reversed => {
                return Err(AppError::Conflict(format!(
                    "journal {} is already reversed",
                    original.receipt_code
                )));
            }
            other => {
                return Err(AppError::Conflict(format!(
                    "journal {} is {}, only completed journals can be reversed",
                    original.receipt_code, other
                )));
            }
        }

        let entries = self.store.list_entries_by_journal(id).await?;
        let account_type = ReceiptCode::parse(&original.receipt_code)
            .ok()
            .and_then(|code| code.account_type);
        let code = self
            .receipts
            .generate(TransactionType::Reversal, account_type)
            .await?;

        let mut draft =
            JournalDraft::new(code, TransactionType::Reversal, original.amount, original.currency);
        draft.owner_id = original.owner_id.clone();
        draft.fee_amount = original.fee_amount;
        draft.primary_account_id = original.primary_account_id;
        draft.counterparty_account_id = original.counterparty_account_id;
        draft.external_ref = original.external_ref.clone();
        draft.description = Some(reason.to_string());
        draft.reversal_of = Some(original.id);
        for entry in &entries {
            draft.push(entry.as_draft().reversed());
        }
        check_draft(&draft)?;

        let reversal_code = draft.receipt_code.clone();
        let posted = self
            .store
            .reverse_journal(id, draft, reason)
            .await
            .map_err(|e| storage_error(e, &reversal_code))?;

        info!(
            original = %original.receipt_code,
            reversal = %posted.journal.receipt_code,
            "journal reversed"
        );
        Ok(posted)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Pending lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Claims the receipt code with a pending journal.
    #[instrument(skip(self, draft), fields(receipt_code = %draft.receipt_code))]
    pub async fn claim_journal(&self, draft: &JournalDraft) -> Result<ClaimOutcome, AppError> {
        check_draft(draft)?;
        self.store
            .claim_journal(draft)
            .await
            .map_err(|e| storage_error(e, &draft.receipt_code))
    }

    #[instrument(skip(self, draft), fields(receipt_code = %draft.receipt_code))]
    pub async fn complete_pending(&self, draft: JournalDraft) -> Result<PostedJournal, AppError> {
        let receipt_code = draft.receipt_code.clone();
        self.store
            .complete_pending(draft)
            .await
            .map_err(|e| storage_error(e, &receipt_code))
    }

    pub async fn fail_pending(&self, id: JournalId, message: &str) -> Result<Journal, AppError> {
        self.store.fail_pending(id, message).await.map_err(Into::into)
    }

    /// Stores a failed journal so the receipt code keeps its outcome.
    pub async fn record_failed(
        &self,
        draft: &JournalDraft,
        message: &str,
    ) -> Result<Journal, AppError> {
        self.store
            .record_failed(draft, message)
            .await
            .map_err(Into::into)
    }

    /// Fails pending journals created before `cutoff`.
    #[instrument(skip(self))]
    pub async fn sweep_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Journal>, AppError> {
        let swept = self
            .store
            .sweep_stale_pending(cutoff, "pending journal timed out")
            .await?;
        if !swept.is_empty() {
            warn!(count = swept.len(), %cutoff, "stale pending journals failed");
        }
        Ok(swept)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    /// A journal together with its entries.
    pub async fn get_journal(&self, id: JournalId) -> Result<PostedJournal, AppError> {
        let journal = self.require_journal(id).await?;
        let entries = self.store.list_entries_by_journal(id).await?;
        Ok(PostedJournal { journal, entries })
    }

    pub async fn get_journal_by_receipt(&self, code: &str) -> Result<Journal, AppError> {
        self.store
            .get_journal_by_receipt(code)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Journal {}", code))))
    }

    pub async fn find_journal_by_receipt(&self, code: &str) -> Result<Option<Journal>, AppError> {
        self.store
            .get_journal_by_receipt(code)
            .await
            .map_err(Into::into)
    }

    pub async fn list_journals(
        &self,
        filter: &JournalFilter,
        page: PageRequest,
    ) -> Result<Paginated<Journal>, AppError> {
        self.store
            .list_journals(filter, page)
            .await
            .map_err(Into::into)
    }

    pub async fn list_ledgers_by_journal(
        &self,
        id: JournalId,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        self.require_journal(id).await?;
        self.store
            .list_entries_by_journal(id)
            .await
            .map_err(Into::into)
    }

    pub async fn list_ledgers_by_account(
        &self,
        account_id: AccountId,
        range: &DateRange,
        page: PageRequest,
    ) -> Result<Paginated<LedgerEntry>, AppError> {
        self.store
            .list_entries_by_account(account_id, range, page)
            .await
            .map_err(Into::into)
    }

    async fn require_journal(&self, id: JournalId) -> Result<Journal, AppError> {
        self.store
            .get_journal(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Journal {}", id))))
    }
}

/// Shape and balance checks; an unbalanced draft is a critical failure.
fn check_draft(draft: &JournalDraft) -> Result<(), AppError> {
    draft.validate().map_err(|e| {
        if e.is_consistency_violation() {
            error!(
                critical = true,
                receipt_code = %draft.receipt_code,
                error = %e,
                "refusing to post unbalanced journal"
            );
        }
        AppError::from(e)
    })
}

fn storage_error(err: RepoError, receipt_code: &str) -> AppError {
    let consistency = matches!(
        &err,
        RepoError::Consistency(_) | RepoError::Domain(DomainError::UnbalancedJournal { .. })
    );
    if consistency {
        error!(critical = true, %receipt_code, error = %err, "ledger consistency violation");
    }
    err.into()
}
