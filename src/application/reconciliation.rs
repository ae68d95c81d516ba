//! Scheduled reversal of previously applied payments.
//!
//! Each run picks a bounded batch of processed payments accepted by an
//! [`Eligibility`] rule and undoes each one in its own unit of work. A failed
//! item is logged and left `processed = true`; the run moves on.

use super::coordinator::abort;
use crate::domain::account::Balance;
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{Eligibility, LedgerStoreRef};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Accepts payments with an odd id.
#[derive(Debug, Clone, Copy, Default)]
pub struct OddId;

impl Eligibility for OddId {
    fn is_eligible(&self, payment: &Payment) -> bool {
        payment.id.rem_euclid(2) == 1
    }
}

/// Terminal result for one payment of a run.
#[derive(Debug)]
pub struct ReconciliationOutcome {
    pub payment_id: PaymentId,
    pub transaction_id: String,
    /// Account balance after the reversal, or why it was not reversed.
    pub result: Result<Balance>,
}

#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub outcomes: Vec<ReconciliationOutcome>,
}

impl ReconciliationReport {
    pub fn reversed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.reversed()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

pub struct ReconciliationJob {
    store: LedgerStoreRef,
    eligibility: Arc<dyn Eligibility>,
    batch_size: usize,
    interval: Duration,
}

impl ReconciliationJob {
    /// Creates a job selecting odd ids, ten at a time, once a minute.
    pub fn new(store: LedgerStoreRef) -> Self {
        Self {
            store,
            eligibility: Arc::new(OddId),
            batch_size: DEFAULT_BATCH_SIZE,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_eligibility(mut self, eligibility: Arc<dyn Eligibility>) -> Self {
        self.eligibility = eligibility;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs a single reconciliation pass.
    ///
    /// Only the batch selection can fail the run; per-payment failures are
    /// collected in the report.
    pub async fn run_once(&self) -> Result<ReconciliationReport> {
        info!("start of reconciliation");
        let batch = self
            .store
            .reconcilable(self.batch_size, &*self.eligibility)
            .await?;

        let mut report = ReconciliationReport::default();
        for payment in batch {
            let result = self.reverse(&payment).await;
            match &result {
                Ok(balance) => info!(
                    transaction_id = %payment.transaction_id,
                    payment_id = payment.id,
                    balance = %balance,
                    "payment cancelled"
                ),
                Err(e) => warn!(
                    transaction_id = %payment.transaction_id,
                    payment_id = payment.id,
                    kind = %e.kind(),
                    "payment can't be cancelled: {e}"
                ),
            }
            report.outcomes.push(ReconciliationOutcome {
                payment_id: payment.id,
                transaction_id: payment.transaction_id,
                result,
            });
        }

        info!(
            reversed = report.reversed(),
            failed = report.failed(),
            "end of reconciliation"
        );
        Ok(report)
    }

    /// Spawns the job on its fixed period.
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                if let Err(e) = self.run_once().await {
                    error!(kind = %e.kind(), "reconciliation run failed: {e}");
                }
            }
        })
    }

    async fn reverse(&self, payment: &Payment) -> Result<Balance> {
        let mut unit = self.store.begin().await?;

        let balance = match unit
            .apply_delta(payment.account_id, payment.state.reversal(), payment.amount)
            .await
        {
            Ok(balance) => balance,
            Err(e) => return Err(abort(unit, e).await),
        };

        if let Err(e) = unit.mark_unprocessed(payment.id).await {
            return Err(abort(unit, e).await);
        }

        unit.commit().await?;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Account, Amount};
    use crate::domain::payment::{NewPayment, PaymentState};
    use crate::domain::ports::LedgerStore;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use rust_decimal_macros::dec;

    async fn store_with(payments: &[(PaymentState, rust_decimal::Decimal)]) -> Arc<InMemoryLedgerStore> {
        let store = Arc::new(InMemoryLedgerStore::new());
        store.bootstrap().await.unwrap();
        store
            .seed_account(Account::new(1, Balance::new(dec!(1000))))
            .await
            .unwrap();
        for (i, (state, amount)) in payments.iter().enumerate() {
            let mut unit = store.begin().await.unwrap();
            let amount = Amount::new(*amount).unwrap();
            unit.insert_payment(NewPayment::new(1, format!("p{}", i + 1), *state, amount, 1))
                .await
                .unwrap();
            unit.apply_delta(1, state.direction(), amount).await.unwrap();
            unit.commit().await.unwrap();
        }
        store
    }

    #[test]
    fn test_odd_id_rule() {
        let row = |id| Payment {
            id,
            created_at: chrono::Utc::now(),
            account_id: 1,
            transaction_id: String::new(),
            state: PaymentState::Win,
            amount: Amount::ZERO,
            source_type: 1,
            processed: true,
        };
        assert!(OddId.is_eligible(&row(1)));
        assert!(!OddId.is_eligible(&row(2)));
        assert!(OddId.is_eligible(&row(7)));
    }

    #[tokio::test]
    async fn test_run_once_reverses_odd_ids_only() {
        let store = store_with(&[
            (PaymentState::Win, dec!(10)),
            (PaymentState::Win, dec!(20)),
            (PaymentState::Lost, dec!(5)),
        ])
        .await;
        assert_eq!(store.balance(1).await.unwrap(), Balance::new(dec!(1025)));

        let job = ReconciliationJob::new(store.clone());
        let report = job.run_once().await.unwrap();

        // id 3 (lost 5) is credited back, then id 1 (win 10) is debited.
        let ids: Vec<PaymentId> = report.outcomes.iter().map(|o| o.payment_id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(report.reversed(), 2);
        assert_eq!(store.balance(1).await.unwrap(), Balance::new(dec!(1020)));
        assert!(store.payment(2).await.unwrap().unwrap().processed);

        let second = job.run_once().await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_batch_size_bounds_the_run() {
        let payments = vec![(PaymentState::Win, dec!(1)); 30];
        let store = store_with(&payments).await;

        let job = ReconciliationJob::new(store.clone()).with_eligibility(Arc::new(|_: &Payment| true));
        let report = job.run_once().await.unwrap();
        assert_eq!(report.outcomes.len(), DEFAULT_BATCH_SIZE);
        assert_eq!(report.outcomes[0].payment_id, 30);
    }

    #[tokio::test]
    async fn test_spawn_and_abort() {
        let store = store_with(&[(PaymentState::Win, dec!(10))]).await;
        let handle = ReconciliationJob::new(store.clone())
            .with_interval(Duration::from_millis(20))
            .spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(!store.payment(1).await.unwrap().unwrap().processed);
        assert_eq!(store.balance(1).await.unwrap(), Balance::new(dec!(1000)));
    }
}
