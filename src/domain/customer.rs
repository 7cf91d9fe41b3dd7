use crate::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type CustomerId = u32;

/// Outstanding amount a customer owes, floor zero.
///
/// Wrapper around `rust_decimal::Decimal` so balance arithmetic stays exact
/// across many small payments and the non-negative invariant lives in one
/// place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// A positive monetary amount, the only valid payment size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, AppError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(AppError::InvalidInput(
                "amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AppError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, AppError> {
        if value < Decimal::ZERO {
            Err(AppError::InvalidInput(
                "balance cannot be negative".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }

    /// Applies a payment: subtracts the amount, clamped at zero.
    /// Any excess over the outstanding balance is dropped, not carried
    /// as credit.
    pub fn settle(self, amount: Amount) -> Self {
        Self((self.0 - amount.0).max(Decimal::ZERO))
    }

    /// Reverses a deleted payment by adding its amount back. This is an
    /// additive reversal; it does not recover value lost to clamping.
    pub fn restore(self, amount: Amount) -> Self {
        Self(self.0 + amount.0)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

/// Customer lifecycle tag, independent of balance and route data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    Lead,
    Active,
    Inactive,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::Lead => "lead",
            CustomerStatus::Active => "active",
            CustomerStatus::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub balance: Balance,
    /// Set only when a stop for this customer is completed; never reverted.
    pub last_visit: Option<NaiveDate>,
    pub status: CustomerStatus,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(id: CustomerId, name: String, status: CustomerStatus) -> Self {
        Self {
            id,
            name,
            city: None,
            address: None,
            phone: None,
            notes: None,
            balance: Balance::ZERO,
            last_visit: None,
            status,
            created_at: Utc::now(),
        }
    }

    pub fn mark_visited(&mut self, date: NaiveDate) {
        self.last_visit = Some(date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_balance_rejects_negative() {
        assert!(Balance::new(dec!(0)).is_ok());
        assert!(matches!(
            Balance::new(dec!(-0.01)),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_settle_subtracts() {
        let balance = Balance::new(dec!(100.00)).unwrap();
        let settled = balance.settle(Amount::new(dec!(30.00)).unwrap());
        assert_eq!(settled.value(), dec!(70.00));
    }

    #[test]
    fn test_settle_clamps_at_zero() {
        let balance = Balance::new(dec!(70.00)).unwrap();
        let settled = balance.settle(Amount::new(dec!(200.00)).unwrap());
        assert_eq!(settled, Balance::ZERO);
    }

    #[test]
    fn test_restore_is_additive_not_exact() {
        // Clamped settle loses the excess; restore adds the full amount back.
        let balance = Balance::new(dec!(70.00)).unwrap();
        let amount = Amount::new(dec!(200.00)).unwrap();
        let restored = balance.settle(amount).restore(amount);
        assert_eq!(restored.value(), dec!(200.00));
    }

    #[test]
    fn test_new_customer_defaults() {
        let customer = Customer::new(1, "Ned".to_string(), CustomerStatus::Active);
        assert_eq!(customer.balance, Balance::ZERO);
        assert!(customer.last_visit.is_none());
        assert_eq!(customer.status.as_str(), "active");
    }
}
