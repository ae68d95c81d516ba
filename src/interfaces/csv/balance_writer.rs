use crate::domain::account::{AccountId, Balance};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct BalanceRecord {
    account: AccountId,
    balance: String,
}

/// Writes account balances as `account,balance` CSV rows.
pub struct BalanceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BalanceWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_balance(&mut self, account: AccountId, balance: Balance) -> Result<()> {
        self.writer.serialize(BalanceRecord {
            account,
            balance: balance.to_string(),
        })?;
        self.writer.flush()?;
        Ok(())
    }
}
