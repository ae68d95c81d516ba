//! Store adapters implementing the ledger ports.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

use crate::error::{LedgerError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Runs `connect` up to `attempts` times, sleeping `backoff` between tries.
///
/// Returns `StoreUnavailable` carrying the last error once every attempt failed.
pub async fn connect_with_retry<T, F, Fut>(
    attempts: u32,
    backoff: Duration,
    mut connect: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match connect().await {
            Ok(store) => return Ok(store),
            Err(e) => {
                warn!(attempt, attempts, error = %e, "failed to connect to store");
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(LedgerError::StoreUnavailable(last_error))
}
