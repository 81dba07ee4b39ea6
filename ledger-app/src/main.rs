//! # Ledger Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter
//! - Create the ledger service with its collaborators
//! - Run the background workers or a one-shot admin command

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use ledger_hex::{Collaborators, LedgerService, LoggingSink};
use ledger_repo::collaborators::{HttpOwnerDirectory, HttpReceiptService};
use ledger_repo::webhooks::WebhookSink;
use ledger_repo::{Repo, build_repo};
use ledger_types::ports::EventSink;
use ledger_types::{AccountId, Reconciliation};

use config::Config;

#[derive(Parser)]
#[command(name = "ledger-server")]
#[command(version, about = "Accounting ledger engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the event workers and the pending sweeper until Ctrl-C (default)
    Serve,
    /// Create the system accounts for every configured currency
    SeedSystem,
    /// Create system accounts, user wallets and partner settlement accounts
    Seed,
    /// Print the report of completed transactions for one day
    DailyReport {
        /// UTC date, YYYY-MM-DD; today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Compare stored balances with ledger entries
    Reconcile {
        /// Account id; every system account when omitted
        #[arg(long)]
        account: Option<Uuid>,
    },
}

fn init_tracer(endpoint: &str) -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to create OTLP span exporter")?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("ledger-service"), provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // OpenTelemetry export only when a collector is configured
    let (telemetry, otel_provider) = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let (tracer, provider) = init_tracer(endpoint)?;
            (
                Some(tracing_opentelemetry::layer().with_tracer(tracer)),
                Some(provider),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ledger_app=debug,ledger_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;
    tracing::info!(backend = repo.backend(), "repository ready");

    let service = LedgerService::new(repo, config.engine_config(), collaborators(&config));

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&service, &config).await,
        Command::SeedSystem => {
            let report = service.seeder().seed_system_accounts().await;
            print_json(&report)
        }
        Command::Seed => {
            let url = config
                .directory_service_url
                .as_deref()
                .context("DIRECTORY_SERVICE_URL is required to seed owners")?;
            let directory = HttpOwnerDirectory::new(url, config.collaborator_timeout);
            let report = service.seeder().seed_system(&directory).await;
            print_json(&report)
        }
        Command::DailyReport { date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let report = service.statements().generate_daily_report(date).await?;
            print_json(&report)
        }
        Command::Reconcile { account } => reconcile(&service, account).await,
    };

    // Deliver what is queued before exiting
    if !service.events().wait_idle(Duration::from_secs(5)).await {
        tracing::warn!(
            pending = service.events().queue_depth(),
            "exiting with undelivered events"
        );
    }

    // Ensure traces are flushed before exit
    if let Some(provider) = otel_provider {
        let _ = provider.shutdown();
    }
    result
}

fn collaborators(config: &Config) -> Collaborators {
    let mut collaborators = Collaborators {
        sinks: vec![Arc::new(LoggingSink) as Arc<dyn EventSink>],
        ..Collaborators::default()
    };
    if let Some(url) = &config.receipt_service_url {
        collaborators.receipts = Arc::new(HttpReceiptService::new(
            url.as_str(),
            config.collaborator_timeout,
        ));
    }
    if let Some(url) = &config.webhook_url {
        if config.webhook_secret.is_none() {
            tracing::warn!("WEBHOOK_SECRET is not set, webhook payloads will be unsigned");
        }
        collaborators.sinks.push(Arc::new(WebhookSink::new(
            url.as_str(),
            config.webhook_secret.clone(),
            config.collaborator_timeout,
        )));
    }
    collaborators
}

/// Fails stale pending journals on an interval until Ctrl-C.
async fn serve(service: &LedgerService<Repo>, config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        sweep_every = ?config.pending_sweep_interval,
        "ledger workers running"
    );

    let mut ticker = tokio::time::interval(config.pending_sweep_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match service.transactions().sweep_stale_pending().await {
                    Ok(0) => {}
                    Ok(swept) => tracing::warn!(swept, "failed stale pending journals"),
                    Err(e) => tracing::error!(error = %e, "pending sweep failed"),
                }
            }
            signal = &mut shutdown => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("shutting down");
                return Ok(());
            }
        }
    }
}

async fn reconcile(service: &LedgerService<Repo>, account: Option<Uuid>) -> anyhow::Result<()> {
    let ids: Vec<AccountId> = match account {
        Some(id) => vec![AccountId::from_uuid(id)],
        None => service
            .accounts()
            .list_system_accounts()
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect(),
    };

    let mut results: Vec<Reconciliation> = Vec::with_capacity(ids.len());
    for id in ids {
        results.push(service.accounts().reconcile_account(id).await?);
    }
    print_json(&results)?;

    let mismatched = results.iter().filter(|r| !r.is_balanced).count();
    if mismatched > 0 {
        anyhow::bail!("{} account(s) do not match their ledger entries", mismatched);
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
