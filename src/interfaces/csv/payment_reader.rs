use crate::application::coordinator::PaymentRequest;
use crate::domain::account::Amount;
use crate::domain::payment::PaymentState;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;

/// One raw CSV row: `transaction_id, state, amount, source`.
#[derive(Debug, Deserialize)]
struct PaymentRecord {
    transaction_id: String,
    state: String,
    amount: String,
    source: String,
}

impl TryFrom<PaymentRecord> for PaymentRequest {
    type Error = LedgerError;

    fn try_from(record: PaymentRecord) -> Result<Self> {
        if record.transaction_id.is_empty() {
            return Err(LedgerError::ValidationError(
                "transaction_id is required".to_string(),
            ));
        }
        let state = PaymentState::from_str(&record.state)?;
        let amount = Decimal::from_str(&record.amount)
            .map_err(|_| LedgerError::ValidationError("incorrect amount value".to_string()))
            .and_then(Amount::new)?;

        Ok(PaymentRequest {
            transaction_id: record.transaction_id,
            state,
            amount,
            source: record.source,
        })
    }
}

/// Reads payment requests from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<PaymentRequest>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct PaymentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentReader<R> {
    /// Creates a new `PaymentReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and validates requests.
    pub fn requests(self) -> impl Iterator<Item = Result<PaymentRequest>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map_err(LedgerError::from)
                .and_then(|record: PaymentRecord| PaymentRequest::try_from(record))
        })
    }
}
