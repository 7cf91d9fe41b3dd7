use super::customer::{Balance, Customer, CustomerId};
use super::payment::{Payment, PaymentId};
use super::stop::{RouteStop, StopId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Shared handles: the sequencer and the ledger both hold the customer store,
/// so the ports are passed as `Arc<dyn …>` rather than boxed.
pub type CustomerStoreRef = Arc<dyn CustomerStore>;
pub type StopStoreRef = Arc<dyn StopStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;

#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Inserts a new customer, assigning its id.
    async fn insert(&self, customer: Customer) -> Result<Customer>;
    async fn get(&self, id: CustomerId) -> Result<Option<Customer>>;
    async fn put(&self, customer: Customer) -> Result<()>;
    /// Deletes the customer row only; cascading is the caller's job.
    async fn delete(&self, id: CustomerId) -> Result<bool>;
    async fn all(&self) -> Result<Vec<Customer>>;
}

#[async_trait]
pub trait StopStore: Send + Sync {
    /// Inserts a new stop, assigning its id.
    async fn insert(&self, stop: RouteStop) -> Result<RouteStop>;
    async fn get(&self, id: StopId) -> Result<Option<RouteStop>>;
    async fn put(&self, stop: RouteStop) -> Result<()>;
    async fn delete(&self, id: StopId) -> Result<bool>;
    /// Deletes every stop for the date, returning how many went away.
    async fn clear_date(&self, route_date: NaiveDate) -> Result<usize>;
    async fn delete_for_customer(&self, customer_id: CustomerId) -> Result<usize>;
    /// Stops for the date ordered by sequence, insertion order among ties.
    async fn list_by_date(&self, route_date: NaiveDate) -> Result<Vec<RouteStop>>;
    async fn max_sequence(&self, route_date: NaiveDate) -> Result<Option<u32>>;
    /// Persists a whole reordered route in one shot.
    async fn put_batch(&self, stops: Vec<RouteStop>) -> Result<()>;
    /// Persists a stop together with its customer; one transaction, used
    /// when completing a stop also stamps the customer's last visit.
    async fn put_with_customer(&self, stop: RouteStop, customer: Customer) -> Result<()>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn list_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Payment>>;
    async fn delete_for_customer(&self, customer_id: CustomerId) -> Result<usize>;
    /// How many receipts already carry the given `RCP-YYYYMMDD-` prefix.
    async fn receipts_with_prefix(&self, prefix: &str) -> Result<u64>;
    /// Atomically inserts the payment (assigning its id) and stores the
    /// updated customer. Fails with `Conflict` if the receipt number is
    /// already taken, or if the customer's persisted balance no longer
    /// matches the payment's `previous_balance` snapshot.
    async fn commit(&self, payment: Payment, customer: Customer) -> Result<Payment>;
    /// Atomically deletes the payment and stores the updated customer.
    /// `snapshot` is the balance the caller's read-modify-write started
    /// from; the delete fails with `Conflict` when the persisted balance no
    /// longer matches it, so a racing payment cannot be silently erased.
    async fn delete_with_customer(
        &self,
        id: PaymentId,
        customer: Customer,
        snapshot: Balance,
    ) -> Result<()>;
}
