use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payledger::application::coordinator::PaymentCoordinator;
use payledger::application::reconciliation::ReconciliationJob;
use payledger::application::source_types::SourceTypeResolver;
use payledger::config::{Cli, Command, IngestArgs, ReconcileArgs};
use payledger::domain::ports::{LedgerStore, LedgerStoreRef};
use payledger::infrastructure::in_memory::InMemoryLedgerStore;
use payledger::interfaces::csv::balance_writer::BalanceWriter;
use payledger::interfaces::csv::payment_reader::PaymentReader;
use payledger::interfaces::csv::report_writer::ReportWriter;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let store = match &cli.db_path {
        Some(path) => open_persistent(path, &cli).await?,
        None => Arc::new(InMemoryLedgerStore::new()) as LedgerStoreRef,
    };
    store.bootstrap().await.into_diagnostic()?;

    match cli.command {
        Command::Ingest(args) => ingest(store, args).await,
        Command::Balance { account } => {
            let balance = store.balance(account).await.into_diagnostic()?;
            BalanceWriter::new(io::stdout().lock())
                .write_balance(account, balance)
                .into_diagnostic()
        }
        Command::Reconcile(args) => reconcile(store, args).await,
    }
}

async fn ingest(store: LedgerStoreRef, args: IngestArgs) -> Result<()> {
    let resolver = SourceTypeResolver::load(&*store).await.into_diagnostic()?;
    let coordinator = PaymentCoordinator::new(store.clone(), Arc::new(resolver));

    let file = File::open(&args.input).into_diagnostic()?;
    for request in PaymentReader::new(file).requests() {
        match request {
            Ok(request) => {
                let token = request.transaction_id.clone();
                if let Err(e) = coordinator.submit(args.account, request).await {
                    eprintln!("Error processing payment {token}: [{}] {e}", e.kind());
                }
            }
            Err(e) => {
                eprintln!("Error reading payment: {e}");
            }
        }
    }

    if args.reconcile {
        let report = ReconciliationJob::new(store.clone())
            .run_once()
            .await
            .into_diagnostic()?;
        ReportWriter::new(io::stderr().lock())
            .write_report(&report)
            .into_diagnostic()?;
    }

    let balance = coordinator
        .current_balance(args.account)
        .await
        .into_diagnostic()?;
    BalanceWriter::new(io::stdout().lock())
        .write_balance(args.account, balance)
        .into_diagnostic()
}

async fn reconcile(store: LedgerStoreRef, args: ReconcileArgs) -> Result<()> {
    let job = ReconciliationJob::new(store)
        .with_batch_size(args.batch_size)
        .with_interval(args.interval());

    if args.once {
        let report = job.run_once().await.into_diagnostic()?;
        return ReportWriter::new(io::stdout().lock())
            .write_report(&report)
            .into_diagnostic();
    }

    info!(interval_secs = job.interval().as_secs(), "reconciliation scheduled");
    let handle = job.spawn();
    tokio::signal::ctrl_c().await.into_diagnostic()?;
    handle.abort();
    info!("reconciliation stopped");
    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
async fn open_persistent(path: &Path, cli: &Cli) -> Result<LedgerStoreRef> {
    use payledger::infrastructure::connect_with_retry;
    use payledger::infrastructure::rocksdb::RocksDbLedgerStore;

    let store = connect_with_retry(cli.connect_retries, cli.connect_backoff(), || async move {
        RocksDbLedgerStore::open(path)
    })
    .await
    .into_diagnostic()?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "storage-rocksdb"))]
async fn open_persistent(_path: &Path, _cli: &Cli) -> Result<LedgerStoreRef> {
    tracing::warn!(
        "persistent storage requested via --db-path, but the 'storage-rocksdb' feature is not enabled; falling back to in-memory storage"
    );
    Ok(Arc::new(InMemoryLedgerStore::new()))
}
