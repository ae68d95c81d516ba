//! Command-line and environment configuration.

use crate::application::reconciliation::{DEFAULT_BATCH_SIZE, DEFAULT_INTERVAL};
use crate::domain::account::AccountId;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "LEDGER_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// How many times to try opening the store before giving up.
    #[arg(long, env = "LEDGER_CONNECT_RETRIES", default_value_t = 5, global = true)]
    pub connect_retries: u32,

    /// Pause between store connection attempts, in milliseconds.
    #[arg(long, env = "LEDGER_CONNECT_BACKOFF_MS", default_value_t = 500, global = true)]
    pub connect_backoff_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply payment requests from a CSV file and print the resulting balance.
    Ingest(IngestArgs),
    /// Print an account balance.
    Balance {
        #[arg(long, env = "LEDGER_ACCOUNT_ID", default_value_t = 1)]
        account: AccountId,
    },
    /// Reverse eligible payments, once or on a fixed period.
    Reconcile(ReconcileArgs),
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Input payments CSV file (`transaction_id,state,amount,source`)
    pub input: PathBuf,

    /// Account the payments are applied to.
    #[arg(long, env = "LEDGER_ACCOUNT_ID", default_value_t = 1)]
    pub account: AccountId,

    /// Run one reconciliation pass before printing the balance.
    #[arg(long)]
    pub reconcile: bool,
}

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Run a single pass and exit.
    #[arg(long)]
    pub once: bool,

    #[arg(
        long,
        env = "LEDGER_RECONCILE_INTERVAL_SECS",
        default_value_t = DEFAULT_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval_secs: u64,

    #[arg(long, env = "LEDGER_RECONCILE_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
}

impl ReconcileArgs {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
