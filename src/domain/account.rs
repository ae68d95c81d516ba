use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type AccountId = i64;

/// Money held on an account.
///
/// Only [`Account::credit`] and [`Account::debit`] move it, and the debit
/// refuses anything the balance does not cover, so it never drops below zero.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Non-negative sum carried by a payment. Zero is allowed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self> {
        if value < Decimal::ZERO {
            return Err(LedgerError::ValidationError(format!(
                "payment amount {value} is negative"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which way a balance moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn inverse(self) -> Self {
        match self {
            Direction::Credit => Direction::Debit,
            Direction::Debit => Direction::Credit,
        }
    }
}

/// An account row: a stable id and its single mutable field.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub id: AccountId,
    pub balance: Balance,
}

impl Account {
    pub fn new(id: AccountId, balance: Balance) -> Self {
        Self { id, balance }
    }

    /// Credits the balance. Fails only if the result is not representable.
    pub fn credit(&mut self, amount: Amount) -> Result<()> {
        let credited = self.balance.0.checked_add(amount.0).ok_or_else(|| {
            LedgerError::ValidationError(format!("balance overflow on account {}", self.id))
        })?;
        self.balance = Balance(credited);
        Ok(())
    }

    /// Debits the balance only if it covers `amount`.
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        if !self.balance.covers(amount) {
            return Err(LedgerError::InsufficientFunds(self.id));
        }
        self.balance = Balance(self.balance.0 - amount.0);
        Ok(())
    }

    /// Applies `amount` in `direction`, returning the new balance.
    pub fn apply(&mut self, direction: Direction, amount: Amount) -> Result<Balance> {
        match direction {
            Direction::Credit => self.credit(amount)?,
            Direction::Debit => self.debit(amount)?,
        }
        Ok(self.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_credit_then_debit() {
        let mut account = Account::new(1, Balance::new(dec!(10.0)));
        let five = Amount::new(dec!(5.0)).unwrap();
        assert_eq!(
            account.apply(Direction::Credit, five).unwrap(),
            Balance::new(dec!(15.0))
        );
        assert_eq!(
            account.apply(Direction::Debit, five).unwrap(),
            Balance::new(dec!(10.0))
        );
        assert!(account.balance.covers(Amount::new(dec!(10.0)).unwrap()));
        assert!(!account.balance.covers(Amount::new(dec!(10.01)).unwrap()));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(Amount::new(dec!(0.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(LedgerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_account_credit() {
        let mut account = Account::new(1, Balance::ZERO);
        account.credit(Amount::new(dec!(10.0)).unwrap()).unwrap();
        assert_eq!(account.balance, Balance::new(dec!(10.0)));
    }

    #[test]
    fn test_account_credit_overflow_leaves_balance() {
        let mut account = Account::new(1, Balance::new(Decimal::MAX));
        let result = account.credit(Amount::new(dec!(1)).unwrap());
        assert!(matches!(result, Err(LedgerError::ValidationError(_))));
        assert_eq!(account.balance, Balance::new(Decimal::MAX));
    }

    #[test]
    fn test_account_debit_exact_balance() {
        let mut account = Account::new(1, Balance::new(dec!(10.0)));
        let result = account.apply(Direction::Debit, Amount::new(dec!(10.0)).unwrap());
        assert_eq!(result.unwrap(), Balance::ZERO);
    }

    #[test]
    fn test_account_debit_insufficient() {
        let mut account = Account::new(1, Balance::new(dec!(5.0)));
        let result = account.debit(Amount::new(dec!(10.0)).unwrap());
        assert!(matches!(result, Err(LedgerError::InsufficientFunds(1))));
        assert_eq!(account.balance, Balance::new(dec!(5.0)));
    }

    #[test]
    fn test_direction_inverse() {
        assert_eq!(Direction::Credit.inverse(), Direction::Debit);
        assert_eq!(Direction::Debit.inverse(), Direction::Credit);
    }
}
