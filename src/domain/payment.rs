use super::account::{AccountId, Amount, Direction};
use super::source_type::SourceTypeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type PaymentId = i64;

/// Outcome flag carried by a payment request.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Win,
    Lost,
}

impl PaymentState {
    /// Balance movement used when the payment is applied.
    pub fn direction(self) -> Direction {
        match self {
            PaymentState::Win => Direction::Credit,
            PaymentState::Lost => Direction::Debit,
        }
    }

    /// Balance movement that undoes the payment.
    pub fn reversal(self) -> Direction {
        self.direction().inverse()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Win => "win",
            PaymentState::Lost => "lost",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentState {
    type Err = crate::error::LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win" => Ok(PaymentState::Win),
            "lost" => Ok(PaymentState::Lost),
            other => Err(crate::error::LedgerError::ValidationError(format!(
                "state must be 'win' or 'lost', got '{other}'"
            ))),
        }
    }
}

/// Payment data as submitted, before the store assigns an id.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct NewPayment {
    pub account_id: AccountId,
    pub transaction_id: String,
    pub state: PaymentState,
    pub amount: Amount,
    pub source_type: SourceTypeId,
    pub processed: bool,
}

impl NewPayment {
    pub fn new(
        account_id: AccountId,
        transaction_id: impl Into<String>,
        state: PaymentState,
        amount: Amount,
        source_type: SourceTypeId,
    ) -> Self {
        Self {
            account_id,
            transaction_id: transaction_id.into(),
            state,
            amount,
            source_type,
            processed: true,
        }
    }

    /// The same payment data flagged as never applied to the balance.
    pub fn as_audit(&self) -> Self {
        Self {
            processed: false,
            ..self.clone()
        }
    }
}

/// A stored payment row.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub created_at: DateTime<Utc>,
    pub account_id: AccountId,
    pub transaction_id: String,
    pub state: PaymentState,
    pub amount: Amount,
    pub source_type: SourceTypeId,
    /// `true` while the payment's effect is part of the balance.
    pub processed: bool,
}

impl Payment {
    pub fn from_new(id: PaymentId, created_at: DateTime<Utc>, new: NewPayment) -> Self {
        Self {
            id,
            created_at,
            account_id: new.account_id,
            transaction_id: new.transaction_id,
            state: new.state,
            amount: new.amount,
            source_type: new.source_type,
            processed: new.processed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_state_directions() {
        assert_eq!(PaymentState::Win.direction(), Direction::Credit);
        assert_eq!(PaymentState::Lost.direction(), Direction::Debit);
        assert_eq!(PaymentState::Win.reversal(), Direction::Debit);
        assert_eq!(PaymentState::Lost.reversal(), Direction::Credit);
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!("win".parse::<PaymentState>().unwrap(), PaymentState::Win);
        assert_eq!("lost".parse::<PaymentState>().unwrap(), PaymentState::Lost);
        assert!("winwin".parse::<PaymentState>().is_err());
    }

    #[test]
    fn test_audit_copy_keeps_token() {
        let new = NewPayment::new(1, "tx-1", PaymentState::Lost, Amount::new(dec!(10)).unwrap(), 3);
        let audit = new.as_audit();
        assert!(new.processed);
        assert!(!audit.processed);
        assert_eq!(audit.transaction_id, "tx-1");
    }
}
