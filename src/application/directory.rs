use crate::domain::customer::{Balance, Customer, CustomerId, CustomerStatus};
use crate::domain::ports::{CustomerStoreRef, PaymentStoreRef, StopStoreRef};
use crate::error::{AppError, Result};
use rust_decimal::Decimal;

/// Customer lifecycle CRUD: creation, lead conversion, archiving, and the
/// cascading delete that keeps stops and payments from outliving their
/// customer.
pub struct CustomerDirectory {
    customers: CustomerStoreRef,
    stops: StopStoreRef,
    payments: PaymentStoreRef,
}

impl CustomerDirectory {
    pub fn new(
        customers: CustomerStoreRef,
        stops: StopStoreRef,
        payments: PaymentStoreRef,
    ) -> Self {
        Self {
            customers,
            stops,
            payments,
        }
    }

    pub async fn add_customer(
        &self,
        name: &str,
        city: Option<String>,
        opening_balance: Option<Decimal>,
    ) -> Result<Customer> {
        let mut customer = self.build(name, city, CustomerStatus::Active)?;
        if let Some(balance) = opening_balance {
            customer.balance = Balance::new(balance)?;
        }
        let customer = self.customers.insert(customer).await?;
        tracing::info!(customer = %customer.name, id = customer.id, "customer added");
        Ok(customer)
    }

    /// A prospective customer; starts with a zero balance and no route data.
    pub async fn add_lead(&self, name: &str, city: Option<String>) -> Result<Customer> {
        let lead = self.build(name, city, CustomerStatus::Lead)?;
        let lead = self.customers.insert(lead).await?;
        tracing::info!(lead = %lead.name, id = lead.id, "lead added");
        Ok(lead)
    }

    pub async fn convert_lead(&self, id: CustomerId) -> Result<Customer> {
        let mut customer = self.require(id).await?;
        if customer.status != CustomerStatus::Lead {
            return Err(AppError::InvalidInput(format!(
                "customer {id} is not a lead"
            )));
        }
        customer.status = CustomerStatus::Active;
        self.customers.put(customer.clone()).await?;
        tracing::info!(customer = %customer.name, "lead converted");
        Ok(customer)
    }

    pub async fn archive(&self, id: CustomerId) -> Result<Customer> {
        self.set_status(id, CustomerStatus::Inactive).await
    }

    pub async fn reactivate(&self, id: CustomerId) -> Result<Customer> {
        self.set_status(id, CustomerStatus::Active).await
    }

    /// Deletes a customer together with its stops and payments. The cascade
    /// runs first so no stop or payment is left pointing at a missing row.
    pub async fn remove_customer(&self, id: CustomerId) -> Result<()> {
        let customer = self.require(id).await?;
        let stops = self.stops.delete_for_customer(id).await?;
        let payments = self.payments.delete_for_customer(id).await?;
        self.customers.delete(id).await?;
        tracing::info!(customer = %customer.name, stops, payments, "customer removed");
        Ok(())
    }

    pub async fn all_customers(&self) -> Result<Vec<Customer>> {
        self.customers.all().await
    }

    fn build(&self, name: &str, city: Option<String>, status: CustomerStatus) -> Result<Customer> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("name is required".to_string()));
        }
        let mut customer = Customer::new(0, name.to_string(), status);
        customer.city = city.filter(|c| !c.trim().is_empty());
        Ok(customer)
    }

    async fn set_status(&self, id: CustomerId, status: CustomerStatus) -> Result<Customer> {
        let mut customer = self.require(id).await?;
        customer.status = status;
        self.customers.put(customer.clone()).await?;
        Ok(customer)
    }

    async fn require(&self, id: CustomerId) -> Result<Customer> {
        self.customers
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("customer {id}")))
    }
}
