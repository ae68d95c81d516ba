use super::account::{Account, AccountId, Amount, Balance, Direction};
use super::payment::{NewPayment, Payment, PaymentId};
use super::source_type::{DEFAULT_SOURCE_TYPES, SourceType};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// One atomic unit of work against the ledger.
///
/// Writes become visible to other units only on [`commit`](UnitOfWork::commit).
/// Dropping a unit without committing discards its writes and releases its row locks.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Inserts a payment row, enforcing the uniqueness of `transaction_id`
    /// and the references to the account and source type.
    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment>;

    /// Moves the account balance in `direction`.
    ///
    /// A debit is guarded: it takes effect only if the balance covers `amount`,
    /// evaluated under the account's row lock. Fails with `InsufficientFunds`
    /// when the guard rejects and `AccountNotFound` when there is no such row.
    async fn apply_delta(
        &mut self,
        account_id: AccountId,
        direction: Direction,
        amount: Amount,
    ) -> Result<Balance>;

    /// Flips `processed` from `true` to `false`.
    ///
    /// Fails with `AlreadyReconciled` when the row is no longer processed.
    async fn mark_unprocessed(&mut self, payment_id: PaymentId) -> Result<Payment>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Decides which processed payments a reconciliation run may reverse.
pub trait Eligibility: Send + Sync {
    fn is_eligible(&self, payment: &Payment) -> bool;
}

impl<F> Eligibility for F
where
    F: Fn(&Payment) -> bool + Send + Sync,
{
    fn is_eligible(&self, payment: &Payment) -> bool {
        self(payment)
    }
}

/// Backing store for accounts, payments and source types.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin<'a>(&'a self) -> Result<Box<dyn UnitOfWork + 'a>>;

    async fn source_types(&self) -> Result<Vec<SourceType>>;

    /// Committed balance of an account.
    async fn balance(&self, account_id: AccountId) -> Result<Balance>;

    async fn payment(&self, payment_id: PaymentId) -> Result<Option<Payment>>;

    async fn payment_by_token(&self, transaction_id: &str) -> Result<Option<Payment>>;

    async fn payments_for_account(&self, account_id: AccountId) -> Result<Vec<Payment>>;

    /// Up to `limit` processed payments accepted by `eligibility`, newest id first.
    async fn reconcilable(
        &self,
        limit: usize,
        eligibility: &dyn Eligibility,
    ) -> Result<Vec<Payment>>;

    /// Creates or replaces an account row outside the ledger rules.
    async fn seed_account(&self, account: Account) -> Result<()>;

    /// Registers a source label, returning the existing row if already present.
    async fn seed_source_type(&self, value: &str) -> Result<SourceType>;

    /// Seeds the default source types and account `1` when missing.
    async fn bootstrap(&self) -> Result<()> {
        for value in DEFAULT_SOURCE_TYPES {
            self.seed_source_type(value).await?;
        }
        match self.balance(1).await {
            Ok(_) => Ok(()),
            Err(LedgerError::AccountNotFound(_)) => {
                self.seed_account(Account::new(1, Balance::new(Decimal::new(0, 2))))
                    .await
            }
            Err(e) => Err(e),
        }
    }
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
