use crate::domain::customer::{Balance, Customer, CustomerId};
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{CustomerStore, PaymentStore, StopStore};
use crate::domain::stop::{RouteStop, StopId};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Db {
    customers: HashMap<CustomerId, Customer>,
    stops: HashMap<StopId, RouteStop>,
    payments: HashMap<PaymentId, Payment>,
    next_customer_id: CustomerId,
    next_stop_id: StopId,
    next_payment_id: PaymentId,
}

impl Db {
    fn stops_for_date(&self, route_date: NaiveDate) -> Vec<RouteStop> {
        let mut stops: Vec<RouteStop> = self
            .stops
            .values()
            .filter(|s| s.route_date == route_date)
            .cloned()
            .collect();
        // Sequence order; ids break ties so insertion order wins among
        // duplicate sequences.
        stops.sort_by_key(|s| (s.sequence, s.id));
        stops
    }
}

/// A thread-safe in-memory database implementing all three storage ports.
///
/// One `RwLock` guards the whole dataset, so every multi-record commit runs
/// under a single write-lock acquisition and is all-or-nothing with
/// respect to concurrent readers. `Clone` shares the underlying data.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Db>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    async fn insert(&self, mut customer: Customer) -> Result<Customer> {
        let mut db = self.inner.write().await;
        db.next_customer_id += 1;
        customer.id = db.next_customer_id;
        db.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn get(&self, id: CustomerId) -> Result<Option<Customer>> {
        let db = self.inner.read().await;
        Ok(db.customers.get(&id).cloned())
    }

    async fn put(&self, customer: Customer) -> Result<()> {
        let mut db = self.inner.write().await;
        db.customers.insert(customer.id, customer);
        Ok(())
    }

    async fn delete(&self, id: CustomerId) -> Result<bool> {
        let mut db = self.inner.write().await;
        Ok(db.customers.remove(&id).is_some())
    }

    async fn all(&self) -> Result<Vec<Customer>> {
        let db = self.inner.read().await;
        let mut customers: Vec<Customer> = db.customers.values().cloned().collect();
        customers.sort_by_key(|c| c.id);
        Ok(customers)
    }
}

#[async_trait]
impl StopStore for InMemoryStore {
    async fn insert(&self, mut stop: RouteStop) -> Result<RouteStop> {
        let mut db = self.inner.write().await;
        db.next_stop_id += 1;
        stop.id = db.next_stop_id;
        db.stops.insert(stop.id, stop.clone());
        Ok(stop)
    }

    async fn get(&self, id: StopId) -> Result<Option<RouteStop>> {
        let db = self.inner.read().await;
        Ok(db.stops.get(&id).cloned())
    }

    async fn put(&self, stop: RouteStop) -> Result<()> {
        let mut db = self.inner.write().await;
        db.stops.insert(stop.id, stop);
        Ok(())
    }

    async fn delete(&self, id: StopId) -> Result<bool> {
        let mut db = self.inner.write().await;
        Ok(db.stops.remove(&id).is_some())
    }

    async fn clear_date(&self, route_date: NaiveDate) -> Result<usize> {
        let mut db = self.inner.write().await;
        let before = db.stops.len();
        db.stops.retain(|_, s| s.route_date != route_date);
        Ok(before - db.stops.len())
    }

    async fn delete_for_customer(&self, customer_id: CustomerId) -> Result<usize> {
        let mut db = self.inner.write().await;
        let before = db.stops.len();
        db.stops.retain(|_, s| s.customer_id != customer_id);
        Ok(before - db.stops.len())
    }

    async fn list_by_date(&self, route_date: NaiveDate) -> Result<Vec<RouteStop>> {
        let db = self.inner.read().await;
        Ok(db.stops_for_date(route_date))
    }

    async fn max_sequence(&self, route_date: NaiveDate) -> Result<Option<u32>> {
        let db = self.inner.read().await;
        Ok(db
            .stops
            .values()
            .filter(|s| s.route_date == route_date)
            .map(|s| s.sequence)
            .max())
    }

    async fn put_batch(&self, stops: Vec<RouteStop>) -> Result<()> {
        let mut db = self.inner.write().await;
        for stop in stops {
            db.stops.insert(stop.id, stop);
        }
        Ok(())
    }

    async fn put_with_customer(&self, stop: RouteStop, customer: Customer) -> Result<()> {
        let mut db = self.inner.write().await;
        db.stops.insert(stop.id, stop);
        db.customers.insert(customer.id, customer);
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let db = self.inner.read().await;
        Ok(db.payments.get(&id).cloned())
    }

    async fn list_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Payment>> {
        let db = self.inner.read().await;
        let mut payments: Vec<Payment> = db
            .payments
            .values()
            .filter(|p| p.customer_id == customer_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| {
            b.payment_date
                .cmp(&a.payment_date)
                .then(b.id.cmp(&a.id))
        });
        Ok(payments)
    }

    async fn delete_for_customer(&self, customer_id: CustomerId) -> Result<usize> {
        let mut db = self.inner.write().await;
        let before = db.payments.len();
        db.payments.retain(|_, p| p.customer_id != customer_id);
        Ok(before - db.payments.len())
    }

    async fn receipts_with_prefix(&self, prefix: &str) -> Result<u64> {
        let db = self.inner.read().await;
        Ok(db
            .payments
            .values()
            .filter(|p| {
                p.receipt_number
                    .as_deref()
                    .is_some_and(|r| r.starts_with(prefix))
            })
            .count() as u64)
    }

    async fn commit(&self, mut payment: Payment, customer: Customer) -> Result<Payment> {
        let mut db = self.inner.write().await;

        if let Some(receipt) = payment.receipt_number.as_deref()
            && db
                .payments
                .values()
                .any(|p| p.receipt_number.as_deref() == Some(receipt))
        {
            return Err(AppError::Conflict(format!(
                "receipt {receipt} already allocated"
            )));
        }

        let stored = db
            .customers
            .get(&customer.id)
            .ok_or_else(|| AppError::NotFound(format!("customer {}", customer.id)))?;
        if stored.balance != payment.previous_balance {
            // The balance moved between the snapshot and this commit.
            return Err(AppError::Conflict(format!(
                "balance for customer {} changed since snapshot",
                customer.id
            )));
        }

        db.next_payment_id += 1;
        payment.id = db.next_payment_id;
        db.payments.insert(payment.id, payment.clone());
        db.customers.insert(customer.id, customer);
        Ok(payment)
    }

    async fn delete_with_customer(
        &self,
        id: PaymentId,
        customer: Customer,
        snapshot: Balance,
    ) -> Result<()> {
        let mut db = self.inner.write().await;
        if !db.payments.contains_key(&id) {
            return Err(AppError::NotFound(format!("payment {id}")));
        }

        let stored = db
            .customers
            .get(&customer.id)
            .ok_or_else(|| AppError::NotFound(format!("customer {}", customer.id)))?;
        if stored.balance != snapshot {
            // The balance moved between the reversal's read and this delete.
            return Err(AppError::Conflict(format!(
                "balance for customer {} changed since snapshot",
                customer.id
            )));
        }

        db.payments.remove(&id);
        db.customers.insert(customer.id, customer);
        Ok(())
    }
}
