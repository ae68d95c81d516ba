use super::source_types::SourceTypeResolver;
use crate::domain::account::{AccountId, Amount, Balance};
use crate::domain::payment::{NewPayment, Payment, PaymentState};
use crate::domain::ports::{LedgerStoreRef, UnitOfWork};
use crate::error::{LedgerError, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// A payment request as handed over by the transport layer, already type-checked.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub transaction_id: String,
    pub state: PaymentState,
    pub amount: Amount,
    /// External source label, resolved against the loaded source types.
    pub source: String,
}

/// What happened to the audit row written after a rejected payment.
#[derive(Debug)]
pub enum AuditOutcome {
    Recorded(Payment),
    /// Another row already owns the transaction id.
    TokenTaken,
    Failed(LedgerError),
}

/// The only code path that mutates payments and balances together.
///
/// Each payment is inserted and applied to its account in one unit of work.
/// The coordinator keeps no locks of its own; concurrent calls are serialised
/// per account by the store's row locks.
#[derive(Clone)]
pub struct PaymentCoordinator {
    store: LedgerStoreRef,
    source_types: Arc<SourceTypeResolver>,
}

impl PaymentCoordinator {
    pub fn new(store: LedgerStoreRef, source_types: Arc<SourceTypeResolver>) -> Self {
        Self {
            store,
            source_types,
        }
    }

    /// Resolves the request's source label and proceeds with the payment.
    pub async fn submit(&self, account_id: AccountId, request: PaymentRequest) -> Result<Payment> {
        let source_type = self.source_types.resolve(&request.source).inspect_err(|e| {
            warn!(
                account = account_id,
                transaction_id = %request.transaction_id,
                kind = %e.kind(),
                "payment rejected: {e}"
            );
        })?;

        self.proceed_payment(NewPayment::new(
            account_id,
            request.transaction_id,
            request.state,
            request.amount,
            source_type,
        ))
        .await
    }

    /// Records the payment and moves the balance atomically.
    ///
    /// On any failure other than a duplicate transaction id, a separate audit
    /// row with `processed = false` is written after the rollback. The caller
    /// always sees the original failure.
    pub async fn proceed_payment(&self, payment: NewPayment) -> Result<Payment> {
        let payment = NewPayment {
            processed: true,
            ..payment
        };
        let result = self.apply(&payment).await;

        match &result {
            Ok(row) => {
                info!(
                    account = row.account_id,
                    transaction_id = %row.transaction_id,
                    state = %row.state,
                    amount = %row.amount,
                    payment_id = row.id,
                    "payment applied"
                );
            }
            Err(e) => {
                warn!(
                    account = payment.account_id,
                    transaction_id = %payment.transaction_id,
                    state = %payment.state,
                    amount = %payment.amount,
                    kind = %e.kind(),
                    "payment rejected: {e}"
                );
                if !matches!(e, LedgerError::DuplicateTransaction(_)) {
                    self.record_attempt(&payment).await;
                }
            }
        }

        result
    }

    /// Writes `payment` as an unprocessed audit row in its own unit of work.
    ///
    /// Never fails: problems are logged and reported through the outcome.
    pub async fn record_attempt(&self, payment: &NewPayment) -> AuditOutcome {
        let outcome = match self.insert_audit(payment.as_audit()).await {
            Ok(row) => AuditOutcome::Recorded(row),
            Err(LedgerError::DuplicateTransaction(_)) => AuditOutcome::TokenTaken,
            Err(e) => AuditOutcome::Failed(e),
        };

        match &outcome {
            AuditOutcome::Recorded(row) => {
                info!(
                    transaction_id = %row.transaction_id,
                    payment_id = row.id,
                    "audit row recorded"
                );
            }
            AuditOutcome::TokenTaken => {
                warn!(
                    transaction_id = %payment.transaction_id,
                    "audit row skipped: transaction id already recorded"
                );
            }
            AuditOutcome::Failed(e) => {
                warn!(
                    transaction_id = %payment.transaction_id,
                    kind = %e.kind(),
                    "audit row not recorded: {e}"
                );
            }
        }

        outcome
    }

    pub async fn current_balance(&self, account_id: AccountId) -> Result<Balance> {
        self.store.balance(account_id).await
    }

    async fn apply(&self, payment: &NewPayment) -> Result<Payment> {
        let mut unit = self.store.begin().await?;

        let row = match unit.insert_payment(payment.clone()).await {
            Ok(row) => row,
            Err(e) => return Err(abort(unit, e).await),
        };

        if let Err(e) = unit
            .apply_delta(payment.account_id, payment.state.direction(), payment.amount)
            .await
        {
            return Err(abort(unit, e).await);
        }

        unit.commit().await?;
        Ok(row)
    }

    async fn insert_audit(&self, payment: NewPayment) -> Result<Payment> {
        let mut unit = self.store.begin().await?;
        match unit.insert_payment(payment).await {
            Ok(row) => {
                unit.commit().await?;
                Ok(row)
            }
            Err(e) => Err(abort(unit, e).await),
        }
    }
}

/// Rolls `unit` back and hands back the error that caused it.
pub(crate) async fn abort(unit: Box<dyn UnitOfWork + '_>, cause: LedgerError) -> LedgerError {
    if let Err(e) = unit.rollback().await {
        warn!(error = %e, "rollback failed");
    }
    cause
}
