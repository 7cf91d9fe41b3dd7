use crate::domain::customer::{Amount, Customer, CustomerId};
use crate::domain::payment::{Payment, PaymentId, format_receipt, parse_date, receipt_prefix};
use crate::domain::ports::{CustomerStoreRef, PaymentStoreRef};
use crate::error::{AppError, Result};
use chrono::Local;
use rust_decimal::Decimal;

/// Keeps `Customer::balance` consistent with the payment history.
///
/// The balance is denormalized on purpose: it is mutated only through the
/// two operations here, never recomputed by replaying payments. Receipt
/// numbers are date-scoped (`RCP-YYYYMMDD-NNNN`) and derived by counting
/// existing receipts rather than from a stored counter; a duplicate
/// allocation under a race surfaces as `Conflict` from the store, and the
/// ledger never retries on its own.
pub struct BalanceLedger {
    customers: CustomerStoreRef,
    payments: PaymentStoreRef,
}

impl BalanceLedger {
    pub fn new(customers: CustomerStoreRef, payments: PaymentStoreRef) -> Self {
        Self { customers, payments }
    }

    /// Records a payment and settles it against the customer's balance.
    ///
    /// The balance before the payment is snapshotted into
    /// `previous_balance`, then the new balance is `max(0, previous -
    /// amount)`; an overpayment is dropped, not carried as credit. The
    /// payment date defaults to today when not given.
    pub async fn record_payment(
        &self,
        customer_id: CustomerId,
        amount: Decimal,
        date: Option<&str>,
        notes: Option<String>,
    ) -> Result<Payment> {
        let amount = Amount::new(amount)?;
        let today = Local::now().date_naive();
        let payment_date = match date {
            Some(s) => parse_date(s)?,
            None => today,
        };

        let mut customer = self.require_customer(customer_id).await?;
        let previous_balance = customer.balance;
        customer.balance = previous_balance.settle(amount);

        let seq = self
            .payments
            .receipts_with_prefix(&receipt_prefix(today))
            .await?
            + 1;
        let payment = Payment {
            id: 0,
            customer_id,
            amount,
            payment_date,
            previous_balance,
            receipt_number: Some(format_receipt(today, seq)),
            notes,
        };

        let payment = self.payments.commit(payment, customer.clone()).await?;
        tracing::info!(
            customer = %customer.name,
            amount = %amount.value(),
            receipt = payment.receipt_number.as_deref().unwrap_or(""),
            balance = %customer.balance.value(),
            "payment recorded"
        );
        Ok(payment)
    }

    /// Deletes a payment and reverses its effect on the balance.
    ///
    /// The reversal is additive (`balance += amount`): if the payment had
    /// been clamped, or other payments landed in between, the result is not
    /// an exact restore of `previous_balance`. That is the documented
    /// behavior, not a defect. A payment that commits between this call's
    /// read and its delete surfaces as `Conflict` rather than being erased.
    pub async fn delete_payment(
        &self,
        customer_id: CustomerId,
        payment_id: PaymentId,
    ) -> Result<Customer> {
        let mut customer = self.require_customer(customer_id).await?;
        let payment = self
            .payments
            .get(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {payment_id}")))?;
        if payment.customer_id != customer_id {
            return Err(AppError::InvalidInput(format!(
                "payment {payment_id} does not belong to customer {customer_id}"
            )));
        }

        let snapshot = customer.balance;
        customer.balance = customer.balance.restore(payment.amount);
        self.payments
            .delete_with_customer(payment_id, customer.clone(), snapshot)
            .await?;
        tracing::info!(
            customer = %customer.name,
            amount = %payment.amount.value(),
            balance = %customer.balance.value(),
            "payment deleted"
        );
        Ok(customer)
    }

    /// Payment history for a customer, most recent first.
    pub async fn payments_for(&self, customer_id: CustomerId) -> Result<Vec<Payment>> {
        self.require_customer(customer_id).await?;
        self.payments.list_for_customer(customer_id).await
    }

    async fn require_customer(&self, customer_id: CustomerId) -> Result<Customer> {
        self.customers
            .get(customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("customer {customer_id}")))
    }
}
