#![allow(dead_code)]

use payledger::application::coordinator::{PaymentCoordinator, PaymentRequest};
use payledger::application::source_types::SourceTypeResolver;
use payledger::domain::account::{Account, Amount, Balance};
use payledger::domain::payment::PaymentState;
use payledger::domain::ports::LedgerStore;
use payledger::infrastructure::in_memory::InMemoryLedgerStore;
use rust_decimal::Decimal;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// A bootstrapped in-memory store whose account 1 holds `opening`.
pub async fn seeded_store(opening: Decimal) -> Arc<InMemoryLedgerStore> {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.bootstrap().await.unwrap();
    store
        .seed_account(Account::new(1, Balance::new(opening)))
        .await
        .unwrap();
    store
}

pub async fn coordinator_for(store: &Arc<InMemoryLedgerStore>) -> PaymentCoordinator {
    let resolver = SourceTypeResolver::load(&**store).await.unwrap();
    PaymentCoordinator::new(store.clone(), Arc::new(resolver))
}

pub fn request(token: &str, state: PaymentState, amount: Decimal) -> PaymentRequest {
    PaymentRequest {
        transaction_id: token.to_string(),
        state,
        amount: Amount::new(amount).unwrap(),
        source: "payment".to_string(),
    }
}

/// Writes a payments CSV with the standard header followed by `rows`.
pub fn payments_csv(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "transaction_id, state, amount, source").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}
