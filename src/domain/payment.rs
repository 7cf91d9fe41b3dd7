use super::customer::{Amount, Balance, CustomerId};
use crate::error::{AppError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type PaymentId = u32;

/// A recorded payment against a customer's balance.
///
/// Payments are created and deleted, never edited. `previous_balance` is a
/// write-once snapshot of the customer's balance immediately before the
/// payment was applied; receipts print it, and the payment commit uses it to
/// detect a concurrent balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub customer_id: CustomerId,
    pub amount: Amount,
    pub payment_date: NaiveDate,
    pub previous_balance: Balance,
    pub receipt_number: Option<String>,
    pub notes: Option<String>,
}

/// Formats a daily receipt identifier, e.g. `RCP-20240601-0003`.
pub fn format_receipt(day: NaiveDate, seq: u64) -> String {
    format!("RCP-{}-{:04}", day.format("%Y%m%d"), seq)
}

/// The `RCP-YYYYMMDD-` prefix shared by all receipts allocated on `day`.
pub fn receipt_prefix(day: NaiveDate) -> String {
    format!("RCP-{}-", day.format("%Y%m%d"))
}

/// Parses a `YYYY-MM-DD` date as exchanged with the outside world.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("invalid date: {s}")))
}
