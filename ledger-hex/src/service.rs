//! Ledger Application Service
//!
//! Wires the ledger components around one storage adapter and exposes them
//! to the inbound side. Contains NO infrastructure logic: collaborators are
//! injected as port trait objects.

use std::sync::Arc;

use ledger_types::domain::TransactionEvent;
use ledger_types::ports::{EventSink, ExchangeRateProvider, ReceiptService, SequenceSource};
use ledger_types::{HealthStatus, LedgerStore};
use tokio_stream::Stream;
use tracing::{info, warn};

use crate::accounts::AccountRegistry;
use crate::collaborators::{NoopReceiptService, StaticRateProvider};
use crate::config::EngineConfig;
use crate::events::EventPublisher;
use crate::fees::FeeEngine;
use crate::ledger::LedgerEngine;
use crate::receipts::ReceiptGenerator;
use crate::seeder::SystemSeeder;
use crate::statements::StatementService;
use crate::transactions::TransactionOrchestrator;

/// Outbound ports the service talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub receipts: Arc<dyn ReceiptService>,
    pub sinks: Vec<Arc<dyn EventSink>>,
    pub rates: Arc<dyn ExchangeRateProvider>,
    /// Receipt id source. `None` uses the store's persistent sequence.
    pub sequence: Option<Arc<dyn SequenceSource>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            receipts: Arc::new(NoopReceiptService::new()),
            sinks: Vec::new(),
            rates: Arc::new(StaticRateProvider::default()),
            sequence: None,
        }
    }
}

/// Application service for the ledger.
///
/// Generic over `R: LedgerStore` - the adapter is injected at compile time
/// and shared by every component.
pub struct LedgerService<R: LedgerStore> {
    store: Arc<R>,
    accounts: Arc<AccountRegistry<R>>,
    fees: Arc<FeeEngine<R>>,
    ledger: Arc<LedgerEngine<R>>,
    transactions: TransactionOrchestrator<R>,
    statements: StatementService<R>,
    seeder: SystemSeeder<R>,
    events: EventPublisher,
}

impl<R: LedgerStore> LedgerService<R> {
    /// Builds every component and starts the event workers.
    /// Must be called inside a Tokio runtime.
    pub fn new(store: R, config: EngineConfig, collaborators: Collaborators) -> Self {
        let store = Arc::new(store);
        let sequence: Arc<dyn SequenceSource> = match collaborators.sequence {
            Some(sequence) => sequence,
            None => store.clone(),
        };
        let receipts = ReceiptGenerator::new(sequence);

        let ledger = Arc::new(LedgerEngine::new(store.clone(), receipts.clone()));
        let accounts = Arc::new(AccountRegistry::new(
            store.clone(),
            ledger.clone(),
            receipts.clone(),
        ));
        let fees = Arc::new(FeeEngine::new(store.clone(), config.fee_cache_ttl));
        let events = EventPublisher::start(collaborators.sinks, &config);

        let transactions = TransactionOrchestrator::new(
            accounts.clone(),
            fees.clone(),
            ledger.clone(),
            receipts,
            collaborators.rates,
            collaborators.receipts,
            events.clone(),
            config.collaborator_timeout,
            config.pending_timeout,
        );

        info!(
            currencies = config.currencies.len(),
            event_workers = config.event_workers,
            "ledger service ready"
        );

        Self {
            statements: StatementService::new(store.clone()),
            seeder: SystemSeeder::new(accounts.clone(), &config),
            store,
            accounts,
            fees,
            ledger,
            transactions,
            events,
        }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    pub fn accounts(&self) -> &AccountRegistry<R> {
        &self.accounts
    }

    pub fn fees(&self) -> &FeeEngine<R> {
        &self.fees
    }

    pub fn ledger(&self) -> &LedgerEngine<R> {
        &self.ledger
    }

    pub fn transactions(&self) -> &TransactionOrchestrator<R> {
        &self.transactions
    }

    pub fn statements(&self) -> &StatementService<R> {
        &self.statements
    }

    pub fn seeder(&self) -> &SystemSeeder<R> {
        &self.seeder
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Monitoring
    // ─────────────────────────────────────────────────────────────────────────────

    /// Storage round trip plus event publisher load.
    pub async fn health_check(&self) -> HealthStatus {
        let storage_ok = match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "storage ping failed");
                false
            }
        };

        HealthStatus {
            status: if storage_ok { "ok" } else { "degraded" }.to_string(),
            storage_ok,
            event_queue_depth: self.events.queue_depth(),
            event_subscribers: self.events.subscriber_count(),
        }
    }

    /// Live transaction events from now on.
    pub fn stream_transaction_events(&self) -> impl Stream<Item = TransactionEvent> + Send + 'static {
        self.events.subscribe()
    }
}
