//! Transaction Orchestrator
//!
//! Turns a [`TransactionRequest`] into a balanced journal: resolves the
//! parties, prices the fees, plans the entries and posts them, then hands
//! the outcome to the receipt service and the event publisher.
//!
//! States: `PENDING -> {COMPLETED, FAILED} -> optionally REVERSED`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ledger_types::domain::{
    ClaimOutcome, EntryDraft, EventMetadata, FeeCharge, FeeQuery, FeeRuleId, FeeType,
    JournalDraft, PostOutcome, PostedJournal, ReceiptDraft, ReceiptParty, TransactionEvent,
};
use ledger_types::ports::{ExchangeRateProvider, ReceiptService};
use ledger_types::{
    Account, AccountPurpose, AccountType, AppError, BatchResult, Currency, Direction, Journal,
    JournalStatus, LedgerStore, OwnerType, TransactionDetails, TransactionRequest,
    TransactionResponse, TransactionStatusResponse, TransactionType,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{error, info, instrument, warn};

use crate::accounts::AccountRegistry;
use crate::events::EventPublisher;
use crate::fees::FeeEngine;
use crate::ledger::LedgerEngine;
use crate::receipts::ReceiptGenerator;

/// Accounts a transaction touches, as seen by receipts and events.
#[derive(Debug, Clone, Default)]
struct Parties {
    /// Account whose balance the response reports
    primary: Option<Account>,
    debitor: Option<Account>,
    creditor: Option<Account>,
}

/// A request resolved into a postable journal.
#[derive(Debug, Clone)]
struct Prepared {
    draft: JournalDraft,
    parties: Parties,
    metadata: EventMetadata,
}

/// How the fees of one transaction are split between the system fees
/// account and an agent.
struct FeeSplit {
    fees_account: Account,
    /// Kept by the platform
    platform: i64,
    agent: Option<(Account, i64)>,
    charges: Vec<FeeCharge>,
}

impl FeeSplit {
    fn total(&self) -> i64 {
        self.platform + self.agent.as_ref().map_or(0, |(_, amount)| *amount)
    }

    fn push_credits(&self, draft: &mut JournalDraft, currency: Currency) {
        draft.push(EntryDraft::credit(self.fees_account.id, self.platform, currency));
        if let Some((agent, amount)) = &self.agent {
            draft.push(EntryDraft::credit(agent.id, *amount, currency));
        }
    }
}

pub struct TransactionOrchestrator<R: LedgerStore> {
    accounts: Arc<AccountRegistry<R>>,
    fees: Arc<FeeEngine<R>>,
    ledger: Arc<LedgerEngine<R>>,
    receipts: ReceiptGenerator,
    rates: Arc<dyn ExchangeRateProvider>,
    receipt_service: Arc<dyn ReceiptService>,
    events: EventPublisher,
    collaborator_timeout: Duration,
    pending_timeout: Duration,
}

impl<R: LedgerStore> Clone for TransactionOrchestrator<R> {
    fn clone(&self) -> Self {
        Self {
            accounts: self.accounts.clone(),
            fees: self.fees.clone(),
            ledger: self.ledger.clone(),
            receipts: self.receipts.clone(),
            rates: self.rates.clone(),
            receipt_service: self.receipt_service.clone(),
            events: self.events.clone(),
            collaborator_timeout: self.collaborator_timeout,
            pending_timeout: self.pending_timeout,
        }
    }
}

impl<R: LedgerStore> TransactionOrchestrator<R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        accounts: Arc<AccountRegistry<R>>,
        fees: Arc<FeeEngine<R>>,
        ledger: Arc<LedgerEngine<R>>,
        receipts: ReceiptGenerator,
        rates: Arc<dyn ExchangeRateProvider>,
        receipt_service: Arc<dyn ReceiptService>,
        events: EventPublisher,
        collaborator_timeout: Duration,
        pending_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            fees,
            ledger,
            receipts,
            rates,
            receipt_service,
            events,
            collaborator_timeout,
            pending_timeout,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────────

    /// Posts the transaction before returning.
    ///
    /// Malformed requests are errors. Business failures (unknown account,
    /// insufficient funds, inactive account) are stored against the receipt
    /// code and returned as a `FAILED` response with no balance change.
    #[instrument(skip(self, req), fields(tx_type = %req.transaction_type, owner_id = %req.owner_id, amount = req.amount))]
    pub async fn execute_transaction_sync(
        &self,
        req: TransactionRequest,
    ) -> Result<TransactionResponse, AppError> {
        validate_request(&req)?;
        let receipt_code = self.assign_receipt_code(&req).await?;
        if let Some(existing) = self.ledger.find_journal_by_receipt(&receipt_code).await? {
            return self.replay(existing).await;
        }

        let prepared = match self.prepare(&req, &receipt_code).await {
            Ok(prepared) => prepared,
            Err(err) if err.is_business_failure() => {
                return self.record_failure(&req, &receipt_code, &err).await;
            }
            Err(err) => return Err(err),
        };

        let outcome = match self.ledger.post_journal(prepared.draft.clone()).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_business_failure() => {
                return self.record_failure(&req, &receipt_code, &err).await;
            }
            Err(err) => return Err(err),
        };

        match outcome {
            PostOutcome::Posted(posted) => {
                let balance_after = primary_balance(&posted, &prepared.parties);
                self.finalize(&posted, &prepared).await;
                Ok(TransactionResponse::from_journal(
                    &posted.journal,
                    balance_after,
                    false,
                ))
            }
            PostOutcome::Duplicate(posted) => {
                let balance_after = posted
                    .journal
                    .primary_account_id
                    .and_then(|id| posted.balance_after(id));
                Ok(TransactionResponse::from_journal(
                    &posted.journal,
                    balance_after,
                    true,
                ))
            }
        }
    }

    /// Claims the receipt code with a pending journal and returns at once;
    /// a detached task posts it, then finalizes the receipt and the event.
    #[instrument(skip(self, req), fields(tx_type = %req.transaction_type, owner_id = %req.owner_id, amount = req.amount))]
    pub async fn execute_transaction(
        &self,
        req: TransactionRequest,
    ) -> Result<TransactionResponse, AppError> {
        validate_request(&req)?;
        let receipt_code = self.assign_receipt_code(&req).await?;
        if let Some(existing) = self.ledger.find_journal_by_receipt(&receipt_code).await? {
            return self.replay(existing).await;
        }

        let prepared = match self.prepare(&req, &receipt_code).await {
            Ok(prepared) => prepared,
            Err(err) if err.is_business_failure() => {
                return self.record_failure(&req, &receipt_code, &err).await;
            }
            Err(err) => return Err(err),
        };

        let pending = match self.ledger.claim_journal(&prepared.draft).await? {
            ClaimOutcome::Claimed(journal) => journal,
            ClaimOutcome::Duplicate(journal) => return self.replay(journal).await,
        };
        self.events
            .publish(event_for(&pending, &prepared.metadata, &prepared.parties, None));

        let this = self.clone();
        let journal = pending.clone();
        tokio::spawn(async move {
            this.complete_detached(journal, prepared).await;
        });

        info!(receipt_code = %pending.receipt_code, "transaction accepted");
        Ok(TransactionResponse::from_journal(&pending, None, false))
    }

    /// Executes every request in order. A failure never stops the batch.
    #[instrument(skip(self, requests), fields(size = requests.len()))]
    pub async fn batch_execute_transactions(
        &self,
        requests: Vec<TransactionRequest>,
    ) -> BatchResult<TransactionResponse> {
        let mut results = Vec::with_capacity(requests.len());
        for req in requests {
            results.push(self.execute_transaction_sync(req).await);
        }

        let outcome: BatchResult<TransactionResponse> = results.into_iter().collect();
        info!(
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            "transaction batch processed"
        );
        outcome
    }

    /// Reverses the journal behind `receipt_code`.
    #[instrument(skip(self, reason))]
    pub async fn reverse_transaction(
        &self,
        receipt_code: &str,
        reason: &str,
    ) -> Result<TransactionResponse, AppError> {
        let original = self.ledger.get_journal_by_receipt(receipt_code).await?;
        let reversal = self.ledger.reverse_journal(original.id, reason).await?;
        let reversed = self.ledger.get_journal(original.id).await?.journal;

        let parties = self.parties_of(&original).await;
        let account_type = account_type_of(receipt_code);

        let mut metadata = EventMetadata::new(account_type);
        metadata.reversal_of = Some(original.receipt_code.clone());
        metadata.reason = Some(reason.to_string());
        let balance_after = primary_balance(&reversal, &parties);

        // The reversal journal credits what the original debited.
        let flipped = Parties {
            primary: parties.primary.clone(),
            debitor: parties.creditor.clone(),
            creditor: parties.debitor.clone(),
        };
        let mut receipt = receipt_draft(&reversal.journal, &flipped);
        receipt.reversal_of = Some(original.receipt_code.clone());
        receipt.reversal_reason = Some(reason.to_string());
        self.submit_receipt(receipt).await;

        self.events
            .publish(event_for(&reversal.journal, &metadata, &flipped, balance_after));
        let mut original_meta = EventMetadata::new(account_type);
        original_meta.reason = Some(reason.to_string());
        self.events
            .publish(event_for(&reversed, &original_meta, &parties, balance_after));

        Ok(TransactionResponse::from_journal(
            &reversal.journal,
            balance_after,
            false,
        ))
    }

    /// Fails pending journals older than the pending timeout.
    pub async fn sweep_stale_pending(&self) -> Result<usize, AppError> {
        let timeout = chrono::Duration::from_std(self.pending_timeout)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let swept = self.ledger.sweep_stale_pending(Utc::now() - timeout).await?;

        for journal in &swept {
            let metadata = EventMetadata::new(account_type_of(&journal.receipt_code));
            let parties = self.parties_of(journal).await;
            self.submit_receipt(receipt_draft(journal, &parties)).await;
            self.events
                .publish(event_for(journal, &metadata, &parties, None));
        }
        Ok(swept.len())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn get_transaction_status(
        &self,
        receipt_code: &str,
    ) -> Result<TransactionStatusResponse, AppError> {
        let journal = self.ledger.get_journal_by_receipt(receipt_code).await?;
        Ok(TransactionStatusResponse::from(&journal))
    }

    /// Journal, entries and recorded fees of a receipt code.
    pub async fn get_transaction_by_receipt(
        &self,
        receipt_code: &str,
    ) -> Result<TransactionDetails, AppError> {
        let journal = self.ledger.get_journal_by_receipt(receipt_code).await?;
        let entries = self.ledger.list_ledgers_by_journal(journal.id).await?;
        let fees = self.fees.fee_records_by_receipt(receipt_code).await?;
        Ok(TransactionDetails {
            journal,
            entries,
            fees,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Planning
    // ─────────────────────────────────────────────────────────────────────────────

    async fn assign_receipt_code(&self, req: &TransactionRequest) -> Result<String, AppError> {
        match &req.receipt_code {
            Some(code) => {
                let parsed = ReceiptGenerator::parse(code)
                    .map_err(|_| AppError::BadRequest(format!("Invalid receipt code: {}", code)))?;
                // A known prefix must name the requested type.
                match parsed.transaction_type() {
                    Some(prefix_type) if prefix_type != req.transaction_type => {
                        Err(AppError::BadRequest(format!(
                            "Receipt code {} is for {}, not {}",
                            code, prefix_type, req.transaction_type
                        )))
                    }
                    _ => Ok(code.clone()),
                }
            }
            None => {
                self.receipts
                    .generate(req.transaction_type, Some(req.account_type))
                    .await
            }
        }
    }

    async fn prepare(
        &self,
        req: &TransactionRequest,
        receipt_code: &str,
    ) -> Result<Prepared, AppError> {
        let currency = req.currency;
        let account_type = req.account_type;
        let amount = req.amount;

        let mut draft = JournalDraft::new(receipt_code, req.transaction_type, amount, currency);
        draft.owner_id = Some(req.owner_id.clone());
        draft.external_ref = req.external_ref.clone();
        draft.description = req.description.clone();
        let mut metadata = request_metadata(req);

        let parties = match req.transaction_type {
            TransactionType::Deposit => {
                let wallet = self.owner_account(req, currency, true).await?;
                let liquidity = self.system(currency, AccountPurpose::Liquidity, account_type).await?;
                let split = self.price(req, None, &mut draft).await?;
                if split.total() >= amount {
                    return Err(AppError::BadRequest(format!(
                        "Fee {} exceeds deposit amount {}",
                        split.total(),
                        amount
                    )));
                }

                draft.push(EntryDraft::debit(liquidity.id, amount, currency));
                draft.push(EntryDraft::credit(wallet.id, amount - split.total(), currency));
                split.push_credits(&mut draft, currency);
                draft.primary_account_id = Some(wallet.id);
                draft.counterparty_account_id = Some(liquidity.id);
                Parties {
                    primary: Some(wallet.clone()),
                    debitor: None,
                    creditor: Some(wallet),
                }
            }
            TransactionType::Withdrawal => {
                let wallet = self.owner_account(req, currency, false).await?;
                let liquidity = self.system(currency, AccountPurpose::Liquidity, account_type).await?;
                let split = self.price(req, None, &mut draft).await?;

                draft.push(EntryDraft::debit(wallet.id, gross(amount, split.total())?, currency));
                draft.push(EntryDraft::credit(liquidity.id, amount, currency));
                split.push_credits(&mut draft, currency);
                draft.primary_account_id = Some(wallet.id);
                draft.counterparty_account_id = Some(liquidity.id);
                Parties {
                    primary: Some(wallet.clone()),
                    debitor: Some(wallet),
                    creditor: None,
                }
            }
            TransactionType::Transfer => {
                let source = self.owner_account(req, currency, false).await?;
                let destination_owner = req.destination_owner_id.as_deref().unwrap_or_default();
                let destination = self
                    .accounts
                    .primary_account(
                        destination_owner,
                        req.destination_owner_type.unwrap_or_default(),
                        currency,
                        account_type,
                        true,
                    )
                    .await?;
                if destination.id == source.id {
                    return Err(AppError::BadRequest(
                        "Cannot transfer to the same account".into(),
                    ));
                }
                let split = self.price(req, None, &mut draft).await?;

                draft.push(EntryDraft::debit(source.id, gross(amount, split.total())?, currency));
                draft.push(EntryDraft::credit(destination.id, amount, currency));
                split.push_credits(&mut draft, currency);
                draft.primary_account_id = Some(source.id);
                draft.counterparty_account_id = Some(destination.id);
                Parties {
                    primary: Some(source.clone()),
                    debitor: Some(source),
                    creditor: Some(destination),
                }
            }
            TransactionType::Conversion | TransactionType::Trade => {
                let target_currency = req.target_currency.ok_or_else(|| {
                    AppError::BadRequest("Target currency is required".into())
                })?;
                let source = self.owner_account(req, currency, false).await?;
                let target = self.owner_account(req, target_currency, true).await?;
                let clearing_source = self.system(currency, AccountPurpose::Clearing, account_type).await?;
                let clearing_target = self
                    .system(target_currency, AccountPurpose::Clearing, account_type)
                    .await?;
                let split = self.price(req, Some(target_currency), &mut draft).await?;

                let converted = self.rates.convert(amount, currency, target_currency).await?;
                if converted <= 0 {
                    return Err(AppError::BadRequest(format!(
                        "{} {} converts to nothing in {}",
                        amount, currency, target_currency
                    )));
                }

                draft.push(EntryDraft::debit(source.id, gross(amount, split.total())?, currency));
                draft.push(EntryDraft::credit(clearing_source.id, amount, currency));
                split.push_credits(&mut draft, currency);
                draft.push(EntryDraft::debit(clearing_target.id, converted, target_currency));
                draft.push(EntryDraft::credit(target.id, converted, target_currency));
                draft.primary_account_id = Some(source.id);
                draft.counterparty_account_id = Some(target.id);
                metadata.target_currency = Some(target_currency);
                metadata.target_amount = Some(converted);
                Parties {
                    primary: Some(source.clone()),
                    debitor: Some(source),
                    creditor: Some(target),
                }
            }
            TransactionType::Fee | TransactionType::Commission => {
                let wallet = self.owner_account(req, currency, false).await?;
                let (collector, fee_type, agent_id) =
                    match (&req.agent_id, req.transaction_type) {
                        (Some(agent_id), TransactionType::Commission) => (
                            self.accounts
                                .primary_account(agent_id, OwnerType::Agent, currency, account_type, true)
                                .await?,
                            FeeType::Commission,
                            Some(agent_id.clone()),
                        ),
                        _ => (
                            self.system(currency, AccountPurpose::Fees, account_type).await?,
                            FeeType::Platform,
                            None,
                        ),
                    };

                draft.push(EntryDraft::debit(wallet.id, amount, currency));
                draft.push(EntryDraft::credit(collector.id, amount, currency));
                draft.fees.push(FeeCharge {
                    fee_type,
                    rule_id: None,
                    amount,
                    currency,
                    account_id: collector.id,
                    agent_id,
                });
                draft.primary_account_id = Some(wallet.id);
                draft.counterparty_account_id = Some(collector.id);
                Parties {
                    primary: Some(wallet.clone()),
                    debitor: Some(wallet),
                    creditor: Some(collector),
                }
            }
            TransactionType::Adjustment => {
                let wallet = self.owner_account(req, currency, true).await?;
                let revenue = self.system(currency, AccountPurpose::Revenue, account_type).await?;
                let direction = req.direction.unwrap_or(Direction::Credit);

                let (debit, credit) = match direction {
                    Direction::Credit => (&revenue, &wallet),
                    Direction::Debit => (&wallet, &revenue),
                };
                draft.push(EntryDraft::debit(debit.id, amount, currency));
                draft.push(EntryDraft::credit(credit.id, amount, currency));
                draft.primary_account_id = Some(wallet.id);
                draft.counterparty_account_id = Some(revenue.id);
                Parties {
                    primary: Some(wallet.clone()),
                    debitor: Some(debit.clone()),
                    creditor: Some(credit.clone()),
                }
            }
            TransactionType::Reversal => {
                return Err(AppError::BadRequest(
                    "Reversals are created by reversing a transaction".into(),
                ));
            }
        };

        Ok(Prepared {
            draft,
            parties,
            metadata,
        })
    }

    /// Prices the request and records the fee charges on the draft.
    ///
    /// Commission-type fees go to the agent when one is named. The agent's
    /// commission rate also carves its share out of every other fee.
    async fn price(
        &self,
        req: &TransactionRequest,
        target_currency: Option<Currency>,
        draft: &mut JournalDraft,
    ) -> Result<FeeSplit, AppError> {
        let currency = req.currency;
        let query = FeeQuery {
            transaction_type: req.transaction_type,
            amount: req.amount,
            source_currency: currency,
            target_currency,
            account_type: req.account_type,
            owner_type: req.owner_type,
        };
        let calculations = self.fees.calculate_multiple_fees(&query).await?;
        let fees_account = self
            .system(currency, AccountPurpose::Fees, req.account_type)
            .await?;
        let agent = match (&req.agent_id, calculations.is_empty()) {
            (Some(agent_id), false) => Some(
                self.accounts
                    .primary_account(agent_id, OwnerType::Agent, currency, req.account_type, true)
                    .await?,
            ),
            _ => None,
        };

        let mut split = FeeSplit {
            fees_account,
            platform: 0,
            agent: None,
            charges: Vec::new(),
        };
        let mut agent_total: i64 = 0;

        for calc in calculations {
            let agent_share = match &agent {
                Some(_) if calc.fee_type == FeeType::Commission => calc.amount,
                Some(agent) => share_of(calc.amount, agent.commission_rate),
                None => 0,
            };
            let kept = calc.amount - agent_share;

            if kept > 0 {
                split.platform = checked(split.platform, kept)?;
                split.charges.push(charge(
                    calc.fee_type,
                    calc.rule_id,
                    kept,
                    currency,
                    &split.fees_account,
                    None,
                ));
            }
            if let (Some(agent), true) = (&agent, agent_share > 0) {
                agent_total = checked(agent_total, agent_share)?;
                split.charges.push(charge(
                    FeeType::Commission,
                    calc.rule_id,
                    agent_share,
                    currency,
                    agent,
                    Some(agent.owner_id.clone()),
                ));
            }
        }

        if let (Some(agent), true) = (agent, agent_total > 0) {
            split.agent = Some((agent, agent_total));
        }
        draft.fee_amount = checked(split.platform, agent_total)?;
        draft.fees = split.charges.clone();
        Ok(split)
    }

    async fn owner_account(
        &self,
        req: &TransactionRequest,
        currency: Currency,
        create: bool,
    ) -> Result<Account, AppError> {
        self.accounts
            .primary_account(&req.owner_id, req.owner_type, currency, req.account_type, create)
            .await
    }

    async fn system(
        &self,
        currency: Currency,
        purpose: AccountPurpose,
        account_type: AccountType,
    ) -> Result<Account, AppError> {
        self.accounts
            .ensure_system_account(currency, purpose, account_type)
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Outcomes
    // ─────────────────────────────────────────────────────────────────────────────

    /// Response for a receipt code that was already processed.
    async fn replay(&self, journal: Journal) -> Result<TransactionResponse, AppError> {
        let balance_after = match (journal.status, journal.primary_account_id) {
            (JournalStatus::Completed | JournalStatus::Reversed, Some(primary)) => {
                let entries = self.ledger.list_ledgers_by_journal(journal.id).await?;
                PostedJournal {
                    journal: journal.clone(),
                    entries,
                }
                .balance_after(primary)
            }
            _ => None,
        };
        info!(receipt_code = %journal.receipt_code, status = %journal.status, "duplicate receipt code");
        Ok(TransactionResponse::from_journal(&journal, balance_after, true))
    }

    async fn record_failure(
        &self,
        req: &TransactionRequest,
        receipt_code: &str,
        err: &AppError,
    ) -> Result<TransactionResponse, AppError> {
        warn!(%receipt_code, error = %err, "transaction failed");

        let mut draft =
            JournalDraft::new(receipt_code, req.transaction_type, req.amount, req.currency);
        draft.owner_id = Some(req.owner_id.clone());
        draft.external_ref = req.external_ref.clone();
        draft.description = req.description.clone();

        let journal = self.ledger.record_failed(&draft, &err.to_string()).await?;
        if journal.id != draft.id {
            return self.replay(journal).await;
        }

        let parties = Parties::default();
        self.submit_receipt(receipt_draft(&journal, &parties)).await;
        self.events
            .publish(event_for(&journal, &request_metadata(req), &parties, None));
        Ok(TransactionResponse::from_journal(&journal, None, false))
    }

    async fn complete_detached(&self, pending: Journal, prepared: Prepared) {
        self.submit_receipt(receipt_draft(&pending, &prepared.parties))
            .await;

        match self.ledger.complete_pending(prepared.draft.clone()).await {
            Ok(posted) => self.finalize(&posted, &prepared).await,
            Err(err) => {
                warn!(receipt_code = %pending.receipt_code, error = %err, "pending transaction failed");
                match self.ledger.fail_pending(pending.id, &err.to_string()).await {
                    Ok(failed) => {
                        self.submit_receipt(receipt_draft(&failed, &prepared.parties))
                            .await;
                        self.events.publish(event_for(
                            &failed,
                            &prepared.metadata,
                            &prepared.parties,
                            None,
                        ));
                    }
                    Err(e) => error!(
                        receipt_code = %pending.receipt_code,
                        error = %e,
                        "could not mark pending journal failed, leaving it to the sweeper"
                    ),
                }
            }
        }
    }

    async fn finalize(&self, posted: &PostedJournal, prepared: &Prepared) {
        let balance_after = primary_balance(posted, &prepared.parties);
        self.submit_receipt(receipt_draft(&posted.journal, &prepared.parties))
            .await;
        self.events.publish(event_for(
            &posted.journal,
            &prepared.metadata,
            &prepared.parties,
            balance_after,
        ));
        info!(
            receipt_code = %posted.journal.receipt_code,
            journal_id = %posted.journal.id,
            fee = posted.journal.fee_amount,
            "transaction completed"
        );
    }

    /// Receipt submission is best effort and bounded by the collaborator timeout.
    async fn submit_receipt(&self, draft: ReceiptDraft) {
        let call = self.receipt_service.submit(&draft);
        match tokio::time::timeout(self.collaborator_timeout, call).await {
            Ok(Ok(reference)) => {
                info!(receipt_code = %draft.receipt_code, %reference, status = ?draft.status, "receipt submitted")
            }
            Ok(Err(e)) => {
                warn!(receipt_code = %draft.receipt_code, error = %e, "receipt submission failed")
            }
            Err(_) => warn!(receipt_code = %draft.receipt_code, "receipt submission timed out"),
        }
    }

    /// Best-effort lookup of the accounts a stored journal names.
    async fn parties_of(&self, journal: &Journal) -> Parties {
        let primary = match journal.primary_account_id {
            Some(id) => self.accounts.get_account(id).await.ok(),
            None => None,
        };
        let counterparty = match journal.counterparty_account_id {
            Some(id) => self.accounts.get_account(id).await.ok(),
            None => None,
        };
        let primary_is_debited = matches!(
            journal.transaction_type,
            TransactionType::Withdrawal
                | TransactionType::Transfer
                | TransactionType::Conversion
                | TransactionType::Trade
                | TransactionType::Fee
                | TransactionType::Commission
        );
        let (debitor, creditor) = if primary_is_debited {
            (primary.clone(), counterparty)
        } else {
            (counterparty, primary.clone())
        };
        Parties {
            primary,
            debitor,
            creditor,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn validate_request(req: &TransactionRequest) -> Result<(), AppError> {
    if req.amount <= 0 {
        return Err(AppError::BadRequest("Amount must be positive".into()));
    }
    if req.owner_id.trim().is_empty() {
        return Err(AppError::BadRequest("Owner id cannot be empty".into()));
    }

    match req.transaction_type {
        TransactionType::Conversion | TransactionType::Trade => match req.target_currency {
            None => return Err(AppError::BadRequest("Target currency is required".into())),
            Some(target) if target == req.currency => {
                return Err(AppError::BadRequest(
                    "Target currency must differ from the source currency".into(),
                ));
            }
            Some(_) => {}
        },
        TransactionType::Transfer => {
            let destination = req.destination_owner_id.as_deref().unwrap_or_default();
            if destination.trim().is_empty() {
                return Err(AppError::BadRequest("Destination owner is required".into()));
            }
        }
        TransactionType::Reversal => {
            return Err(AppError::BadRequest(
                "Reversals are created by reversing a transaction".into(),
            ));
        }
        _ => {}
    }
    Ok(())
}

fn request_metadata(req: &TransactionRequest) -> EventMetadata {
    let mut metadata = EventMetadata::new(req.account_type);
    metadata.owner_type = Some(req.owner_type);
    metadata.external_ref = req.external_ref.clone();
    metadata.description = req.description.clone();
    metadata
}

fn account_type_of(receipt_code: &str) -> AccountType {
    ReceiptGenerator::parse(receipt_code)
        .ok()
        .and_then(|code| code.account_type)
        .unwrap_or_default()
}

fn primary_balance(posted: &PostedJournal, parties: &Parties) -> Option<i64> {
    parties
        .primary
        .as_ref()
        .and_then(|account| posted.balance_after(account.id))
}

fn gross(amount: i64, fee: i64) -> Result<i64, AppError> {
    checked(amount, fee)
}

fn checked(a: i64, b: i64) -> Result<i64, AppError> {
    a.checked_add(b)
        .ok_or_else(|| AppError::BadRequest("Amount overflows minor units".into()))
}

/// `amount x rate`, rounded once, never more than `amount`.
fn share_of(amount: i64, rate: Option<Decimal>) -> i64 {
    let Some(rate) = rate else {
        return 0;
    };
    (Decimal::from(amount) * rate)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
        .clamp(0, amount)
}

fn charge(
    fee_type: FeeType,
    rule_id: Option<FeeRuleId>,
    amount: i64,
    currency: Currency,
    account: &Account,
    agent_id: Option<String>,
) -> FeeCharge {
    FeeCharge {
        fee_type,
        rule_id,
        amount,
        currency,
        account_id: account.id,
        agent_id,
    }
}

fn party(account: &Account) -> ReceiptParty {
    ReceiptParty {
        owner_id: account.owner_id.clone(),
        owner_type: account.owner_type,
        account_id: account.id,
        account_number: account.account_number.clone(),
    }
}

fn receipt_draft(journal: &Journal, parties: &Parties) -> ReceiptDraft {
    ReceiptDraft {
        receipt_code: journal.receipt_code.clone(),
        journal_id: Some(journal.id),
        transaction_type: journal.transaction_type,
        status: journal.status.into(),
        amount: journal.amount,
        fee_amount: journal.fee_amount,
        currency: journal.currency,
        creditor: parties.creditor.as_ref().map(party),
        debitor: parties.debitor.as_ref().map(party),
        external_ref: journal.external_ref.clone(),
        reversal_of: None,
        reversal_reason: None,
        error_message: journal.error_message.clone(),
        created_at: journal.created_at,
    }
}

fn event_for(
    journal: &Journal,
    metadata: &EventMetadata,
    parties: &Parties,
    balance_after: Option<i64>,
) -> TransactionEvent {
    let mut event = TransactionEvent::from_journal(journal, metadata.clone());
    event.account_number = parties.primary.as_ref().map(|a| a.account_number.clone());
    event.from_account = parties.debitor.as_ref().map(|a| a.account_number.clone());
    event.to_account = parties.creditor.as_ref().map(|a| a.account_number.clone());
    event.balance_after = balance_after;
    event
}
