use crate::domain::account::AccountId;
use crate::domain::payment::PaymentId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("unknown source type: {0}")]
    UnknownSourceType(String),
    #[error("transaction_id already processed: {0}")]
    DuplicateTransaction(String),
    #[error("insufficient funds on account {0}")]
    InsufficientFunds(AccountId),
    #[error("no such account: {0}")]
    AccountNotFound(AccountId),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("payment {0} is not processed")]
    AlreadyReconciled(PaymentId),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

/// Stable classification of a [`LedgerError`].
///
/// Callers branch on this instead of the rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    UnknownSourceType,
    DuplicateTransaction,
    InsufficientFunds,
    AccountNotFound,
    StoreUnavailable,
    AlreadyReconciled,
    InvalidInput,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnknownSourceType => "unknown_source_type",
            FailureKind::DuplicateTransaction => "duplicate_transaction",
            FailureKind::InsufficientFunds => "insufficient_funds",
            FailureKind::AccountNotFound => "account_not_found",
            FailureKind::StoreUnavailable => "store_unavailable",
            FailureKind::AlreadyReconciled => "already_reconciled",
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LedgerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LedgerError::UnknownSourceType(_) => FailureKind::UnknownSourceType,
            LedgerError::DuplicateTransaction(_) => FailureKind::DuplicateTransaction,
            LedgerError::InsufficientFunds(_) => FailureKind::InsufficientFunds,
            LedgerError::AccountNotFound(_) => FailureKind::AccountNotFound,
            LedgerError::StoreUnavailable(_) => FailureKind::StoreUnavailable,
            LedgerError::AlreadyReconciled(_) => FailureKind::AlreadyReconciled,
            LedgerError::ValidationError(_) | LedgerError::CsvError(_) => {
                FailureKind::InvalidInput
            }
            LedgerError::IoError(_) | LedgerError::InternalError(_) => FailureKind::Internal,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        LedgerError::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            rocksdb::ErrorKind::Busy
            | rocksdb::ErrorKind::TimedOut
            | rocksdb::ErrorKind::TryAgain
            | rocksdb::ErrorKind::IOError => LedgerError::StoreUnavailable(err.into_string()),
            _ => LedgerError::InternalError(Box::new(err)),
        }
    }
}
