use crate::domain::account::{Account, AccountId, Amount, Balance, Direction};
use crate::domain::payment::{NewPayment, Payment, PaymentId};
use crate::domain::ports::{Eligibility, LedgerStore, UnitOfWork};
use crate::domain::source_type::SourceType;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard, RwLock};

#[derive(Debug, Clone, Copy, PartialEq)]
enum TokenSlot {
    /// Held by a unit that has not finished yet.
    Reserved,
    Committed(PaymentId),
}

#[derive(Default)]
struct Catalog {
    payments: BTreeMap<PaymentId, Payment>,
    tokens: HashMap<String, TokenSlot>,
    source_types: Vec<SourceType>,
}

/// A thread-safe in-memory ledger.
///
/// Every account row sits behind its own async mutex which a unit of work
/// holds from its first touch of the row until it commits or rolls back, so
/// a guarded debit is checked and applied against a balance nobody else can
/// change in between. Payment rows and the token index live in a catalog
/// guarded by a short synchronous lock that is never held across an await.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    accounts: Arc<RwLock<HashMap<AccountId, Arc<RowLock<Account>>>>>,
    catalog: Arc<Mutex<Catalog>>,
    next_payment_id: Arc<AtomicI64>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn catalog(&self) -> Result<MutexGuard<'_, Catalog>> {
        self.catalog
            .lock()
            .map_err(|_| LedgerError::internal("payment catalog lock poisoned"))
    }

    async fn row(&self, account_id: AccountId) -> Option<Arc<RowLock<Account>>> {
        self.accounts.read().await.get(&account_id).cloned()
    }
}

/// A unit of work over [`InMemoryLedgerStore`].
pub struct InMemoryUnit<'a> {
    store: &'a InMemoryLedgerStore,
    locks: HashMap<AccountId, OwnedMutexGuard<Account>>,
    staged: HashMap<AccountId, Account>,
    inserted: Vec<Payment>,
    unprocessed: Vec<PaymentId>,
    reserved: Vec<String>,
}

impl InMemoryUnit<'_> {
    /// Takes the row lock for `account_id` unless this unit already holds it.
    async fn lock_row(&mut self, account_id: AccountId) -> Result<()> {
        if self.locks.contains_key(&account_id) {
            return Ok(());
        }
        let row = self
            .store
            .row(account_id)
            .await
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        let guard = row.lock_owned().await;
        self.locks.insert(account_id, guard);
        Ok(())
    }

    fn release_reservations(&mut self) {
        if self.reserved.is_empty() {
            return;
        }
        if let Ok(mut catalog) = self.store.catalog.lock() {
            for token in self.reserved.drain(..) {
                if catalog.tokens.get(&token) == Some(&TokenSlot::Reserved) {
                    catalog.tokens.remove(&token);
                }
            }
        }
    }
}

impl Drop for InMemoryUnit<'_> {
    fn drop(&mut self) {
        self.release_reservations();
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnit<'_> {
    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        if self.store.row(payment.account_id).await.is_none() {
            return Err(LedgerError::AccountNotFound(payment.account_id));
        }

        let mut catalog = self.store.catalog()?;
        if !catalog
            .source_types
            .iter()
            .any(|st| st.id == payment.source_type)
        {
            return Err(LedgerError::UnknownSourceType(payment.source_type.to_string()));
        }
        if catalog.tokens.contains_key(&payment.transaction_id) {
            return Err(LedgerError::DuplicateTransaction(payment.transaction_id));
        }
        catalog
            .tokens
            .insert(payment.transaction_id.clone(), TokenSlot::Reserved);
        drop(catalog);

        self.reserved.push(payment.transaction_id.clone());
        let id = self.store.next_payment_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = Payment::from_new(id, Utc::now(), payment);
        self.inserted.push(row.clone());
        Ok(row)
    }

    async fn apply_delta(
        &mut self,
        account_id: AccountId,
        direction: Direction,
        amount: Amount,
    ) -> Result<Balance> {
        self.lock_row(account_id).await?;
        let current = match self.staged.get(&account_id) {
            Some(account) => account.clone(),
            None => match self.locks.get(&account_id) {
                Some(guard) => (**guard).clone(),
                None => return Err(LedgerError::AccountNotFound(account_id)),
            },
        };

        let mut next = current;
        let balance = next.apply(direction, amount)?;
        self.staged.insert(account_id, next);
        Ok(balance)
    }

    async fn mark_unprocessed(&mut self, payment_id: PaymentId) -> Result<Payment> {
        if let Some(row) = self.inserted.iter_mut().find(|p| p.id == payment_id) {
            if !row.processed {
                return Err(LedgerError::AlreadyReconciled(payment_id));
            }
            row.processed = false;
            return Ok(row.clone());
        }

        let account_id = self
            .store
            .catalog()?
            .payments
            .get(&payment_id)
            .map(|p| p.account_id)
            .ok_or_else(|| LedgerError::internal(format!("no such payment: {payment_id}")))?;

        // Flag changes on a payment are serialised by its account's row lock.
        self.lock_row(account_id).await?;

        let catalog = self.store.catalog()?;
        let current = catalog
            .payments
            .get(&payment_id)
            .ok_or_else(|| LedgerError::internal(format!("no such payment: {payment_id}")))?;
        if !current.processed || self.unprocessed.contains(&payment_id) {
            return Err(LedgerError::AlreadyReconciled(payment_id));
        }
        let mut updated = current.clone();
        drop(catalog);

        updated.processed = false;
        self.unprocessed.push(payment_id);
        Ok(updated)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        // Nothing is published unless the catalog can take the rows too.
        let mut catalog = self.store.catalog()?;

        for (account_id, account) in self.staged.drain() {
            if let Some(guard) = self.locks.get_mut(&account_id) {
                **guard = account;
            }
        }
        for payment in self.inserted.drain(..) {
            catalog
                .tokens
                .insert(payment.transaction_id.clone(), TokenSlot::Committed(payment.id));
            catalog.payments.insert(payment.id, payment);
        }
        for payment_id in self.unprocessed.drain(..) {
            if let Some(payment) = catalog.payments.get_mut(&payment_id) {
                payment.processed = false;
            }
        }
        drop(catalog);

        self.reserved.clear();
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.staged.clear();
        self.release_reservations();
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn UnitOfWork + 'a>> {
        Ok(Box::new(InMemoryUnit {
            store: self,
            locks: HashMap::new(),
            staged: HashMap::new(),
            inserted: Vec::new(),
            unprocessed: Vec::new(),
            reserved: Vec::new(),
        }))
    }

    async fn source_types(&self) -> Result<Vec<SourceType>> {
        Ok(self.catalog()?.source_types.clone())
    }

    async fn balance(&self, account_id: AccountId) -> Result<Balance> {
        let row = self
            .row(account_id)
            .await
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        let account = row.lock().await;
        Ok(account.balance)
    }

    async fn payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.catalog()?.payments.get(&payment_id).cloned())
    }

    async fn payment_by_token(&self, transaction_id: &str) -> Result<Option<Payment>> {
        let catalog = self.catalog()?;
        match catalog.tokens.get(transaction_id) {
            Some(TokenSlot::Committed(id)) => Ok(catalog.payments.get(id).cloned()),
            _ => Ok(None),
        }
    }

    async fn payments_for_account(&self, account_id: AccountId) -> Result<Vec<Payment>> {
        Ok(self
            .catalog()?
            .payments
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn reconcilable(
        &self,
        limit: usize,
        eligibility: &dyn Eligibility,
    ) -> Result<Vec<Payment>> {
        Ok(self
            .catalog()?
            .payments
            .values()
            .rev()
            .filter(|p| p.processed && eligibility.is_eligible(p))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn seed_account(&self, account: Account) -> Result<()> {
        if let Some(row) = self.row(account.id).await {
            *row.lock().await = account;
            return Ok(());
        }
        self.accounts
            .write()
            .await
            .entry(account.id)
            .or_insert_with(|| Arc::new(RowLock::new(account)));
        Ok(())
    }

    async fn seed_source_type(&self, value: &str) -> Result<SourceType> {
        let mut catalog = self.catalog()?;
        if let Some(existing) = catalog.source_types.iter().find(|st| st.value == value) {
            return Ok(existing.clone());
        }
        let id = catalog.source_types.iter().map(|st| st.id).max().unwrap_or(0) + 1;
        let source_type = SourceType::new(id, value);
        catalog.source_types.push(source_type.clone());
        Ok(source_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::PaymentState;
    use rust_decimal_macros::dec;

    async fn seeded(balance: rust_decimal::Decimal) -> InMemoryLedgerStore {
        let store = InMemoryLedgerStore::new();
        store.bootstrap().await.unwrap();
        store
            .seed_account(Account::new(1, Balance::new(balance)))
            .await
            .unwrap();
        store
    }

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_defaults_once() {
        let store = InMemoryLedgerStore::new();
        store.bootstrap().await.unwrap();
        store.bootstrap().await.unwrap();

        let values: Vec<String> = store
            .source_types()
            .await
            .unwrap()
            .into_iter()
            .map(|st| st.value)
            .collect();
        assert_eq!(values, vec!["game", "server", "payment"]);
        assert_eq!(store.balance(1).await.unwrap(), Balance::new(dec!(0.00)));
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = seeded(dec!(10)).await;
        let mut unit = store.begin().await.unwrap();
        unit.insert_payment(NewPayment::new(1, "a", PaymentState::Win, amount(dec!(5)), 1))
            .await
            .unwrap();
        unit.apply_delta(1, Direction::Credit, amount(dec!(5)))
            .await
            .unwrap();
        unit.rollback().await.unwrap();

        assert_eq!(store.balance(1).await.unwrap(), Balance::new(dec!(10)));
        assert!(store.payment_by_token("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_publishes_balance_and_row() {
        let store = seeded(dec!(10)).await;
        let mut unit = store.begin().await.unwrap();
        let row = unit
            .insert_payment(NewPayment::new(1, "a", PaymentState::Lost, amount(dec!(4)), 1))
            .await
            .unwrap();
        let balance = unit
            .apply_delta(1, Direction::Debit, amount(dec!(4)))
            .await
            .unwrap();
        unit.commit().await.unwrap();

        assert_eq!(balance, Balance::new(dec!(6)));
        assert_eq!(store.balance(1).await.unwrap(), Balance::new(dec!(6)));
        assert_eq!(store.payment(row.id).await.unwrap().unwrap(), row);
    }

    #[tokio::test]
    async fn test_failed_commit_publishes_nothing() {
        let store = seeded(dec!(10)).await;
        let mut unit = store.begin().await.unwrap();
        unit.apply_delta(1, Direction::Credit, amount(dec!(5)))
            .await
            .unwrap();

        let catalog = Arc::clone(&store.catalog);
        let _ = std::thread::spawn(move || {
            let _guard = catalog.lock().unwrap();
            panic!("poison the catalog lock");
        })
        .join();

        assert!(matches!(
            unit.commit().await,
            Err(LedgerError::InternalError(_))
        ));
        assert_eq!(store.balance(1).await.unwrap(), Balance::new(dec!(10)));
    }

    #[tokio::test]
    async fn test_guarded_debit_rejects_without_touching_balance() {
        let store = seeded(dec!(5)).await;
        let mut unit = store.begin().await.unwrap();
        let result = unit.apply_delta(1, Direction::Debit, amount(dec!(10))).await;
        assert!(matches!(result, Err(LedgerError::InsufficientFunds(1))));
        drop(unit);
        assert_eq!(store.balance(1).await.unwrap(), Balance::new(dec!(5)));
    }

    #[tokio::test]
    async fn test_token_reserved_by_open_unit_is_taken() {
        let store = seeded(dec!(0)).await;
        let mut first = store.begin().await.unwrap();
        first
            .insert_payment(NewPayment::new(1, "t", PaymentState::Win, amount(dec!(1)), 1))
            .await
            .unwrap();

        let mut second = store.begin().await.unwrap();
        let result = second
            .insert_payment(NewPayment::new(1, "t", PaymentState::Win, amount(dec!(1)), 1))
            .await;
        assert!(matches!(result, Err(LedgerError::DuplicateTransaction(_))));

        // Dropping the first unit frees the token again.
        drop(first);
        drop(second);
        let mut third = store.begin().await.unwrap();
        assert!(third
            .insert_payment(NewPayment::new(1, "t", PaymentState::Win, amount(dec!(1)), 1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_foreign_keys_are_checked() {
        let store = seeded(dec!(0)).await;
        let mut unit = store.begin().await.unwrap();
        let missing_account = unit
            .insert_payment(NewPayment::new(42, "x", PaymentState::Win, amount(dec!(1)), 1))
            .await;
        assert!(matches!(missing_account, Err(LedgerError::AccountNotFound(42))));

        let missing_source = unit
            .insert_payment(NewPayment::new(1, "y", PaymentState::Win, amount(dec!(1)), 99))
            .await;
        assert!(matches!(missing_source, Err(LedgerError::UnknownSourceType(_))));
    }

    #[tokio::test]
    async fn test_mark_unprocessed_twice_is_rejected() {
        let store = seeded(dec!(0)).await;
        let mut unit = store.begin().await.unwrap();
        let row = unit
            .insert_payment(NewPayment::new(1, "m", PaymentState::Win, amount(dec!(1)), 1))
            .await
            .unwrap();
        unit.commit().await.unwrap();

        let mut unit = store.begin().await.unwrap();
        assert!(!unit.mark_unprocessed(row.id).await.unwrap().processed);
        assert!(matches!(
            unit.mark_unprocessed(row.id).await,
            Err(LedgerError::AlreadyReconciled(_))
        ));
        unit.commit().await.unwrap();

        assert!(!store.payment(row.id).await.unwrap().unwrap().processed);
    }

    #[tokio::test]
    async fn test_reconcilable_orders_newest_first_and_filters() {
        let store = seeded(dec!(0)).await;
        for i in 1..=5 {
            let mut unit = store.begin().await.unwrap();
            unit.insert_payment(NewPayment::new(
                1,
                format!("r{i}"),
                PaymentState::Win,
                amount(dec!(1)),
                1,
            ))
            .await
            .unwrap();
            unit.commit().await.unwrap();
        }

        let even = |p: &Payment| p.id % 2 == 0;
        let ids: Vec<PaymentId> = store
            .reconcilable(10, &even)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![4, 2]);

        let all = |_: &Payment| true;
        assert_eq!(store.reconcilable(3, &all).await.unwrap().len(), 3);
    }
}
