use crate::domain::customer::{Balance, Customer, CustomerId};
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{CustomerStore, PaymentStore, StopStore};
use crate::domain::stop::{RouteStop, StopId};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Column family for customer records.
pub const CF_CUSTOMERS: &str = "customers";
/// Column family for route stops.
pub const CF_STOPS: &str = "stops";
/// Column family for payments.
pub const CF_PAYMENTS: &str = "payments";
/// Column family for id counters.
pub const CF_META: &str = "meta";

/// A persistent backend implementing all three storage ports over RocksDB.
///
/// Each entity lives in its own column family with big-endian id keys and
/// JSON values. Multi-record commits go through a single `WriteBatch`, and
/// a write mutex serializes the read-check-write cycles (id allocation,
/// receipt uniqueness, balance snapshot check) that RocksDB itself does not
/// make atomic. `Clone` shares the underlying handle.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates the database, idempotently ensuring the column
    /// families exist. This is the crate's whole migration step; it runs
    /// once at startup, never per request.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_CUSTOMERS, CF_STOPS, CF_PAYMENTS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cfs).map_err(storage_err)?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Serializes read-check-write cycles. The guard protects no data of
    /// its own, so a lock poisoned by a panicking thread is still safe to
    /// reclaim rather than propagate.
    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| AppError::Internal(format!("column family {name} not found")))
    }

    fn fetch<T: DeserializeOwned>(&self, cf_name: &str, id: u32) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, id.to_be_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item.map_err(storage_err)?;
            records.push(decode(&value)?);
        }
        Ok(records)
    }

    /// Reads the next id for `kind` and stages the incremented counter into
    /// the batch that will also carry the entity insert.
    fn allocate_id(&self, kind: &str, batch: &mut WriteBatch) -> Result<u32> {
        let cf = self.cf(CF_META)?;
        let current = self
            .db
            .get_cf(cf, kind.as_bytes())
            .map_err(storage_err)?
            .map(|bytes| {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes[..4]);
                u32::from_be_bytes(buf)
            })
            .unwrap_or(0);
        let next = current + 1;
        batch.put_cf(cf, kind.as_bytes(), next.to_be_bytes());
        Ok(next)
    }

    fn delete_matching<T, F>(&self, cf_name: &str, keep: F) -> Result<usize>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let _guard = self.write_guard();
        let cf = self.cf(cf_name)?;
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.map_err(storage_err)?;
            let record: T = decode(&value)?;
            if !keep(&record) {
                batch.delete_cf(cf, key);
                removed += 1;
            }
        }
        self.db.write(batch).map_err(storage_err)?;
        Ok(removed)
    }
}

fn storage_err(e: rocksdb::Error) -> AppError {
    AppError::Internal(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AppError::Internal(format!("serialization: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| AppError::Internal(format!("deserialization: {e}")))
}

#[async_trait]
impl CustomerStore for RocksDbStore {
    async fn insert(&self, mut customer: Customer) -> Result<Customer> {
        let _guard = self.write_guard();
        let mut batch = WriteBatch::default();
        customer.id = self.allocate_id("customer", &mut batch)?;
        batch.put_cf(self.cf(CF_CUSTOMERS)?, customer.id.to_be_bytes(), encode(&customer)?);
        self.db.write(batch).map_err(storage_err)?;
        Ok(customer)
    }

    async fn get(&self, id: CustomerId) -> Result<Option<Customer>> {
        self.fetch(CF_CUSTOMERS, id)
    }

    async fn put(&self, customer: Customer) -> Result<()> {
        let cf = self.cf(CF_CUSTOMERS)?;
        self.db
            .put_cf(cf, customer.id.to_be_bytes(), encode(&customer)?)
            .map_err(storage_err)
    }

    async fn delete(&self, id: CustomerId) -> Result<bool> {
        let _guard = self.write_guard();
        let existed = self.fetch::<Customer>(CF_CUSTOMERS, id)?.is_some();
        self.db
            .delete_cf(self.cf(CF_CUSTOMERS)?, id.to_be_bytes())
            .map_err(storage_err)?;
        Ok(existed)
    }

    async fn all(&self) -> Result<Vec<Customer>> {
        let mut customers: Vec<Customer> = self.scan(CF_CUSTOMERS)?;
        customers.sort_by_key(|c| c.id);
        Ok(customers)
    }
}

#[async_trait]
impl StopStore for RocksDbStore {
    async fn insert(&self, mut stop: RouteStop) -> Result<RouteStop> {
        let _guard = self.write_guard();
        let mut batch = WriteBatch::default();
        stop.id = self.allocate_id("stop", &mut batch)?;
        batch.put_cf(self.cf(CF_STOPS)?, stop.id.to_be_bytes(), encode(&stop)?);
        self.db.write(batch).map_err(storage_err)?;
        Ok(stop)
    }

    async fn get(&self, id: StopId) -> Result<Option<RouteStop>> {
        self.fetch(CF_STOPS, id)
    }

    async fn put(&self, stop: RouteStop) -> Result<()> {
        let cf = self.cf(CF_STOPS)?;
        self.db
            .put_cf(cf, stop.id.to_be_bytes(), encode(&stop)?)
            .map_err(storage_err)
    }

    async fn delete(&self, id: StopId) -> Result<bool> {
        let _guard = self.write_guard();
        let existed = self.fetch::<RouteStop>(CF_STOPS, id)?.is_some();
        self.db
            .delete_cf(self.cf(CF_STOPS)?, id.to_be_bytes())
            .map_err(storage_err)?;
        Ok(existed)
    }

    async fn clear_date(&self, route_date: NaiveDate) -> Result<usize> {
        self.delete_matching(CF_STOPS, |s: &RouteStop| s.route_date != route_date)
    }

    async fn delete_for_customer(&self, customer_id: CustomerId) -> Result<usize> {
        self.delete_matching(CF_STOPS, |s: &RouteStop| s.customer_id != customer_id)
    }

    async fn list_by_date(&self, route_date: NaiveDate) -> Result<Vec<RouteStop>> {
        let mut stops: Vec<RouteStop> = self.scan(CF_STOPS)?;
        stops.retain(|s| s.route_date == route_date);
        stops.sort_by_key(|s| (s.sequence, s.id));
        Ok(stops)
    }

    async fn max_sequence(&self, route_date: NaiveDate) -> Result<Option<u32>> {
        let stops: Vec<RouteStop> = self.scan(CF_STOPS)?;
        Ok(stops
            .iter()
            .filter(|s| s.route_date == route_date)
            .map(|s| s.sequence)
            .max())
    }

    async fn put_batch(&self, stops: Vec<RouteStop>) -> Result<()> {
        let _guard = self.write_guard();
        let cf = self.cf(CF_STOPS)?;
        let mut batch = WriteBatch::default();
        for stop in stops {
            batch.put_cf(cf, stop.id.to_be_bytes(), encode(&stop)?);
        }
        self.db.write(batch).map_err(storage_err)
    }

    async fn put_with_customer(&self, stop: RouteStop, customer: Customer) -> Result<()> {
        let _guard = self.write_guard();
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_STOPS)?, stop.id.to_be_bytes(), encode(&stop)?);
        batch.put_cf(self.cf(CF_CUSTOMERS)?, customer.id.to_be_bytes(), encode(&customer)?);
        self.db.write(batch).map_err(storage_err)
    }
}

#[async_trait]
impl PaymentStore for RocksDbStore {
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.fetch(CF_PAYMENTS, id)
    }

    async fn list_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self.scan(CF_PAYMENTS)?;
        payments.retain(|p| p.customer_id == customer_id);
        payments.sort_by(|a, b| b.payment_date.cmp(&a.payment_date).then(b.id.cmp(&a.id)));
        Ok(payments)
    }

    async fn delete_for_customer(&self, customer_id: CustomerId) -> Result<usize> {
        self.delete_matching(CF_PAYMENTS, |p: &Payment| p.customer_id != customer_id)
    }

    async fn receipts_with_prefix(&self, prefix: &str) -> Result<u64> {
        let payments: Vec<Payment> = self.scan(CF_PAYMENTS)?;
        Ok(payments
            .iter()
            .filter(|p| {
                p.receipt_number
                    .as_deref()
                    .is_some_and(|r| r.starts_with(prefix))
            })
            .count() as u64)
    }

    async fn commit(&self, mut payment: Payment, customer: Customer) -> Result<Payment> {
        let _guard = self.write_guard();

        if let Some(receipt) = payment.receipt_number.as_deref() {
            let payments: Vec<Payment> = self.scan(CF_PAYMENTS)?;
            if payments
                .iter()
                .any(|p| p.receipt_number.as_deref() == Some(receipt))
            {
                return Err(AppError::Conflict(format!(
                    "receipt {receipt} already allocated"
                )));
            }
        }

        let stored: Customer = self
            .fetch(CF_CUSTOMERS, customer.id)?
            .ok_or_else(|| AppError::NotFound(format!("customer {}", customer.id)))?;
        if stored.balance != payment.previous_balance {
            return Err(AppError::Conflict(format!(
                "balance for customer {} changed since snapshot",
                customer.id
            )));
        }

        let mut batch = WriteBatch::default();
        payment.id = self.allocate_id("payment", &mut batch)?;
        batch.put_cf(self.cf(CF_PAYMENTS)?, payment.id.to_be_bytes(), encode(&payment)?);
        batch.put_cf(self.cf(CF_CUSTOMERS)?, customer.id.to_be_bytes(), encode(&customer)?);
        self.db.write(batch).map_err(storage_err)?;
        Ok(payment)
    }

    async fn delete_with_customer(
        &self,
        id: PaymentId,
        customer: Customer,
        snapshot: Balance,
    ) -> Result<()> {
        let _guard = self.write_guard();
        if self.fetch::<Payment>(CF_PAYMENTS, id)?.is_none() {
            return Err(AppError::NotFound(format!("payment {id}")));
        }

        let stored: Customer = self
            .fetch(CF_CUSTOMERS, customer.id)?
            .ok_or_else(|| AppError::NotFound(format!("customer {}", customer.id)))?;
        if stored.balance != snapshot {
            return Err(AppError::Conflict(format!(
                "balance for customer {} changed since snapshot",
                customer.id
            )));
        }

        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_PAYMENTS)?, id.to_be_bytes());
        batch.put_cf(self.cf(CF_CUSTOMERS)?, customer.id.to_be_bytes(), encode(&customer)?);
        self.db.write(batch).map_err(storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::{Balance, CustomerStatus};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_column_families() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).expect("failed to open RocksDB");
        for name in [CF_CUSTOMERS, CF_STOPS, CF_PAYMENTS, CF_META] {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_customer_roundtrip_and_ids() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let ned = Customer::new(0, "Ned".to_string(), CustomerStatus::Active);
        let rod = Customer::new(0, "Rod".to_string(), CustomerStatus::Lead);
        let ned = CustomerStore::insert(&store, ned).await.unwrap();
        let rod = CustomerStore::insert(&store, rod).await.unwrap();
        assert_eq!((ned.id, rod.id), (1, 2));

        let fetched = CustomerStore::get(&store, ned.id).await.unwrap().unwrap();
        assert_eq!(fetched, ned);
        assert_eq!(CustomerStore::all(&store).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stops_survive_reopen() {
        let dir = tempdir().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            StopStore::insert(&store, RouteStop::new(1, day, 1)).await.unwrap();
            StopStore::insert(&store, RouteStop::new(2, day, 2)).await.unwrap();
        }
        let store = RocksDbStore::open(dir.path()).unwrap();
        let stops = StopStore::list_by_date(&store, day).await.unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(StopStore::max_sequence(&store, day).await.unwrap(), Some(2));

        // Counter survives too: the next insert does not reuse an id.
        let next = StopStore::insert(&store, RouteStop::new(3, day, 3)).await.unwrap();
        assert_eq!(next.id, 3);
    }

    #[tokio::test]
    async fn test_payment_commit_is_batched() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let mut customer = Customer::new(0, "Ned".to_string(), CustomerStatus::Active);
        customer.balance = Balance::new(dec!(50.00)).unwrap();
        let customer = CustomerStore::insert(&store, customer).await.unwrap();

        let payment = Payment {
            id: 0,
            customer_id: customer.id,
            amount: dec!(5.00).try_into().unwrap(),
            payment_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            previous_balance: customer.balance,
            receipt_number: Some("RCP-20240601-0001".to_string()),
            notes: None,
        };
        let mut updated = customer.clone();
        updated.balance = Balance::new(dec!(45.00)).unwrap();

        let stored = PaymentStore::commit(&store, payment.clone(), updated).await.unwrap();
        assert_eq!(stored.id, 1);
        let balance = CustomerStore::get(&store, customer.id)
            .await
            .unwrap()
            .unwrap()
            .balance;
        assert_eq!(balance.value(), dec!(45.00));

        // Same receipt again is refused.
        let result = PaymentStore::commit(&store, payment, customer.clone()).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_rejects_stale_balance_snapshot() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let mut customer = Customer::new(0, "Ned".to_string(), CustomerStatus::Active);
        customer.balance = Balance::new(dec!(100.00)).unwrap();
        let customer = CustomerStore::insert(&store, customer).await.unwrap();

        let payment = |previous: Balance| Payment {
            id: 0,
            customer_id: customer.id,
            amount: dec!(10.00).try_into().unwrap(),
            payment_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            previous_balance: previous,
            receipt_number: None,
            notes: None,
        };

        // First payment settles 100 -> 90.
        let mut after_first = customer.clone();
        after_first.balance = Balance::new(dec!(90.00)).unwrap();
        let first = PaymentStore::commit(&store, payment(customer.balance), after_first.clone())
            .await
            .unwrap();

        // A delete of that payment reads 90 and computes 100; before it
        // lands, a second payment settles 90 -> 80.
        let stale_snapshot = after_first.balance;
        let mut reversed = after_first.clone();
        reversed.balance = Balance::new(dec!(100.00)).unwrap();

        let mut after_second = after_first.clone();
        after_second.balance = Balance::new(dec!(80.00)).unwrap();
        PaymentStore::commit(&store, payment(after_first.balance), after_second)
            .await
            .unwrap();

        // The stale delete must not erase the second payment's subtraction.
        let result =
            PaymentStore::delete_with_customer(&store, first.id, reversed, stale_snapshot).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let balance = CustomerStore::get(&store, customer.id)
            .await
            .unwrap()
            .unwrap()
            .balance;
        assert_eq!(balance.value(), dec!(80.00));
        assert!(PaymentStore::get(&store, first.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_repeated_delete_reports_absence() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let stop = StopStore::insert(&store, RouteStop::new(1, day, 1)).await.unwrap();

        assert!(StopStore::delete(&store, stop.id).await.unwrap());
        assert!(!StopStore::delete(&store, stop.id).await.unwrap());

        let ned = Customer::new(0, "Ned".to_string(), CustomerStatus::Active);
        let ned = CustomerStore::insert(&store, ned).await.unwrap();
        assert!(CustomerStore::delete(&store, ned.id).await.unwrap());
        assert!(!CustomerStore::delete(&store, ned.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_survives_poisoned_write_lock() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        // A thread panicking while holding the guard poisons the mutex;
        // subsequent operations must return errors, not panic.
        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.write_lock.lock().unwrap();
            panic!("boom");
        })
        .join();

        let ned = Customer::new(0, "Ned".to_string(), CustomerStatus::Active);
        let ned = CustomerStore::insert(&store, ned).await.unwrap();
        assert!(CustomerStore::get(&store, ned.id).await.unwrap().is_some());
    }
}
