use crate::domain::account::{Account, AccountId, Amount, Balance, Direction};
use crate::domain::payment::{NewPayment, Payment, PaymentId};
use crate::domain::ports::{Eligibility, LedgerStore, UnitOfWork};
use crate::domain::source_type::{SourceType, SourceTypeId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, Transaction, TransactionDB,
    TransactionDBOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Column Family for account rows.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for payment rows, keyed by big-endian id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family acting as the unique index on `transaction_id`.
pub const CF_PAYMENT_TOKENS: &str = "payment_tokens";
/// Column Family for source type reference data.
pub const CF_SOURCE_TYPES: &str = "source_types";

const LOCK_TIMEOUT_MS: i64 = 5_000;

/// A persistent ledger backed by a RocksDB `TransactionDB`.
///
/// Row locks are taken with `get_for_update`, which gives the conditional
/// balance update the same check-then-set atomicity a relational `UPDATE ...
/// WHERE balance >= ?` has. The token column family doubles as the unique
/// constraint: claiming a token locks its key until the owning unit ends.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDbLedgerStore {
    db: Arc<TransactionDB>,
    next_payment_id: Arc<AtomicI64>,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        LedgerError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {}", e),
        )))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        LedgerError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

fn id_from_key(key: &[u8]) -> Result<i64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| LedgerError::internal("malformed payment key"))?;
    Ok(i64::from_be_bytes(bytes))
}

impl RocksDbLedgerStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist and resumes payment id
    /// assignment after the highest stored id.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(LOCK_TIMEOUT_MS);

        let descriptors = [CF_ACCOUNTS, CF_PAYMENTS, CF_PAYMENT_TOKENS, CF_SOURCE_TYPES]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db: TransactionDB = TransactionDB::open_cf_descriptors(&opts, &txn_opts, path, descriptors)?;

        let store = Self {
            db: Arc::new(db),
            next_payment_id: Arc::new(AtomicI64::new(0)),
        };
        let last_id = store.last_payment_id()?;
        store.next_payment_id.store(last_id, Ordering::SeqCst);
        Ok(store)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::internal(format!("{name} column family not found")))
    }

    fn last_payment_id(&self) -> Result<i64> {
        let cf = self.cf(CF_PAYMENTS)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                id_from_key(&key)
            }
            None => Ok(0),
        }
    }

    fn scan_payments(&self) -> Result<Vec<Payment>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let mut payments = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::End) {
            let (_key, value) = item?;
            payments.push(decode::<Payment>(&value)?);
        }
        Ok(payments)
    }
}

/// A unit of work over [`RocksDbLedgerStore`], wrapping one RocksDB transaction.
pub struct RocksDbUnit<'a> {
    store: &'a RocksDbLedgerStore,
    txn: Transaction<'a, TransactionDB>,
}

#[async_trait]
impl UnitOfWork for RocksDbUnit<'_> {
    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        let accounts = self.store.cf(CF_ACCOUNTS)?;
        let source_types = self.store.cf(CF_SOURCE_TYPES)?;
        let tokens = self.store.cf(CF_PAYMENT_TOKENS)?;
        let payments = self.store.cf(CF_PAYMENTS)?;

        if self
            .txn
            .get_cf(accounts, payment.account_id.to_be_bytes())?
            .is_none()
        {
            return Err(LedgerError::AccountNotFound(payment.account_id));
        }
        if self
            .txn
            .get_cf(source_types, payment.source_type.to_be_bytes())?
            .is_none()
        {
            return Err(LedgerError::UnknownSourceType(payment.source_type.to_string()));
        }
        if self
            .txn
            .get_for_update_cf(tokens, payment.transaction_id.as_bytes(), true)?
            .is_some()
        {
            return Err(LedgerError::DuplicateTransaction(payment.transaction_id));
        }

        let id = self.store.next_payment_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = Payment::from_new(id, Utc::now(), payment);
        self.txn
            .put_cf(tokens, row.transaction_id.as_bytes(), id.to_be_bytes())?;
        self.txn.put_cf(payments, id.to_be_bytes(), encode(&row)?)?;
        Ok(row)
    }

    async fn apply_delta(
        &mut self,
        account_id: AccountId,
        direction: Direction,
        amount: Amount,
    ) -> Result<Balance> {
        let cf = self.store.cf(CF_ACCOUNTS)?;
        let key = account_id.to_be_bytes();
        let bytes = self
            .txn
            .get_for_update_cf(cf, key, true)?
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        let mut account: Account = decode(&bytes)?;
        let balance = account.apply(direction, amount)?;
        self.txn.put_cf(cf, key, encode(&account)?)?;
        Ok(balance)
    }

    async fn mark_unprocessed(&mut self, payment_id: PaymentId) -> Result<Payment> {
        let cf = self.store.cf(CF_PAYMENTS)?;
        let key = payment_id.to_be_bytes();
        let bytes = self
            .txn
            .get_for_update_cf(cf, key, true)?
            .ok_or_else(|| LedgerError::internal(format!("no such payment: {payment_id}")))?;

        let mut payment: Payment = decode(&bytes)?;
        if !payment.processed {
            return Err(LedgerError::AlreadyReconciled(payment_id));
        }
        payment.processed = false;
        self.txn.put_cf(cf, key, encode(&payment)?)?;
        Ok(payment)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.txn.rollback()?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for RocksDbLedgerStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn UnitOfWork + 'a>> {
        Ok(Box::new(RocksDbUnit {
            store: self,
            txn: self.db.transaction(),
        }))
    }

    async fn source_types(&self) -> Result<Vec<SourceType>> {
        let cf = self.cf(CF_SOURCE_TYPES)?;
        let mut source_types = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            source_types.push(decode::<SourceType>(&value)?);
        }
        Ok(source_types)
    }

    async fn balance(&self, account_id: AccountId) -> Result<Balance> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let bytes = self
            .db
            .get_cf(cf, account_id.to_be_bytes())?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        Ok(decode::<Account>(&bytes)?.balance)
    }

    async fn payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        let cf = self.cf(CF_PAYMENTS)?;
        match self.db.get_cf(cf, payment_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn payment_by_token(&self, transaction_id: &str) -> Result<Option<Payment>> {
        let payment_id = {
            let cf = self.cf(CF_PAYMENT_TOKENS)?;
            match self.db.get_cf(cf, transaction_id.as_bytes())? {
                Some(key) => id_from_key(&key)?,
                None => return Ok(None),
            }
        };
        self.payment(payment_id).await
    }

    async fn payments_for_account(&self, account_id: AccountId) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .scan_payments()?
            .into_iter()
            .filter(|p| p.account_id == account_id)
            .collect();
        payments.reverse();
        Ok(payments)
    }

    async fn reconcilable(
        &self,
        limit: usize,
        eligibility: &dyn Eligibility,
    ) -> Result<Vec<Payment>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let mut selected = Vec::with_capacity(limit);
        for item in self.db.iterator_cf(cf, IteratorMode::End) {
            if selected.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            let payment: Payment = decode(&value)?;
            if payment.processed && eligibility.is_eligible(&payment) {
                selected.push(payment);
            }
        }
        Ok(selected)
    }

    async fn seed_account(&self, account: Account) -> Result<()> {
        let cf = self.cf(CF_ACCOUNTS)?;
        self.db.put_cf(cf, account.id.to_be_bytes(), encode(&account)?)?;
        Ok(())
    }

    async fn seed_source_type(&self, value: &str) -> Result<SourceType> {
        let existing = self.source_types().await?;
        if let Some(found) = existing.iter().find(|st| st.value == value) {
            return Ok(found.clone());
        }
        let id: SourceTypeId = existing.iter().map(|st| st.id).max().unwrap_or(0) + 1;
        let source_type = SourceType::new(id, value);
        let cf = self.cf(CF_SOURCE_TYPES)?;
        self.db.put_cf(cf, id.to_be_bytes(), encode(&source_type)?)?;
        Ok(source_type)
    }
}
