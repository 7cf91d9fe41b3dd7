use crate::domain::customer::CustomerId;
use crate::domain::payment::parse_date;
use crate::domain::ports::{CustomerStoreRef, StopStoreRef};
use crate::domain::stop::{RouteStop, StopId};
use crate::error::{AppError, Result};
use chrono::Local;
use std::collections::HashMap;

/// Maintains the stop ordering within each route date.
///
/// This is the sole writer of `RouteStop::sequence`. Appends take the next
/// sequence after the current maximum, removals leave gaps, and
/// `optimize_route` reassigns a dense `1..N` ordering.
pub struct RouteSequencer {
    customers: CustomerStoreRef,
    stops: StopStoreRef,
}

impl RouteSequencer {
    pub fn new(customers: CustomerStoreRef, stops: StopStoreRef) -> Self {
        Self { customers, stops }
    }

    /// Schedules a customer on a route date, after every existing stop.
    ///
    /// There is no duplicate guard: the same customer may be appended twice
    /// on the same date, and preventing that is the caller's business.
    pub async fn append_stop(&self, customer_id: CustomerId, route_date: &str) -> Result<RouteStop> {
        let route_date = parse_date(route_date)?;
        let customer = self
            .customers
            .get(customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("customer {customer_id}")))?;

        let sequence = self
            .stops
            .max_sequence(route_date)
            .await?
            .map_or(1, |max| max + 1);

        let stop = self
            .stops
            .insert(RouteStop::new(customer.id, route_date, sequence))
            .await?;
        tracing::info!(
            stop = stop.id,
            customer = %customer.name,
            date = %route_date,
            sequence,
            "stop appended"
        );
        Ok(stop)
    }

    /// Deletes a stop. Remaining stops keep their sequence numbers; gaps
    /// are expected.
    pub async fn remove_stop(&self, stop_id: StopId) -> Result<()> {
        if self.stops.delete(stop_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("stop {stop_id}")))
        }
    }

    /// Deletes every stop on the date, returning how many were removed.
    pub async fn clear_route(&self, route_date: &str) -> Result<usize> {
        let route_date = parse_date(route_date)?;
        let removed = self.stops.clear_date(route_date).await?;
        tracing::info!(date = %route_date, removed, "route cleared");
        Ok(removed)
    }

    /// Marks a stop completed and stamps the owning customer's `last_visit`
    /// with today's date, in one transaction.
    pub async fn complete_stop(&self, stop_id: StopId) -> Result<RouteStop> {
        let mut stop = self.require_stop(stop_id).await?;
        let mut customer = self
            .customers
            .get(stop.customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("customer {}", stop.customer_id)))?;

        stop.completed = true;
        customer.mark_visited(Local::now().date_naive());
        tracing::info!(stop = stop.id, customer = %customer.name, "stop completed");
        self.stops.put_with_customer(stop.clone(), customer).await?;
        Ok(stop)
    }

    /// Clears the completed flag. `last_visit` is left as-is: completion's
    /// side effect is one-directional.
    pub async fn uncomplete_stop(&self, stop_id: StopId) -> Result<RouteStop> {
        let mut stop = self.require_stop(stop_id).await?;
        stop.completed = false;
        self.stops.put(stop.clone()).await?;
        Ok(stop)
    }

    /// Reorders the date's stops with a batching-by-locality heuristic:
    /// stops are grouped by customer city ("Unknown" when missing), groups
    /// are visited largest first (first-seen order breaks ties), and each
    /// group is sorted by customer name ascending. Sequences are then
    /// reassigned 1..N. Applying the pass twice yields the same order.
    pub async fn optimize_route(&self, route_date: &str) -> Result<Vec<RouteStop>> {
        let route_date = parse_date(route_date)?;
        let stops = self.stops.list_by_date(route_date).await?;
        if stops.len() <= 1 {
            return Ok(stops);
        }

        let mut labels: HashMap<CustomerId, (String, String)> = HashMap::new();
        for stop in &stops {
            if !labels.contains_key(&stop.customer_id) {
                let customer = self.customers.get(stop.customer_id).await?.ok_or_else(|| {
                    AppError::NotFound(format!("customer {}", stop.customer_id))
                })?;
                let city = customer.city.unwrap_or_else(|| "Unknown".to_string());
                labels.insert(stop.customer_id, (customer.name, city));
            }
        }

        // Group by city, keeping the first-seen order of cities.
        let mut groups: Vec<(&str, Vec<RouteStop>)> = Vec::new();
        for stop in stops {
            let city = labels[&stop.customer_id].1.as_str();
            match groups.iter_mut().find(|(c, _)| *c == city) {
                Some((_, group)) => group.push(stop),
                None => groups.push((city, vec![stop])),
            }
        }

        // Larger groups first; the sort is stable, so tied groups stay in
        // first-seen order and the whole pass is idempotent.
        groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        let mut ordered = Vec::new();
        for (_, mut group) in groups {
            group.sort_by(|a, b| labels[&a.customer_id].0.cmp(&labels[&b.customer_id].0));
            ordered.append(&mut group);
        }
        for (idx, stop) in ordered.iter_mut().enumerate() {
            stop.sequence = idx as u32 + 1;
        }

        self.stops.put_batch(ordered.clone()).await?;
        tracing::info!(date = %route_date, stops = ordered.len(), "route optimized");
        Ok(ordered)
    }

    /// The date's stops ordered by sequence.
    pub async fn route_for(&self, route_date: &str) -> Result<Vec<RouteStop>> {
        let route_date = parse_date(route_date)?;
        self.stops.list_by_date(route_date).await
    }

    async fn require_stop(&self, stop_id: StopId) -> Result<RouteStop> {
        self.stops
            .get(stop_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("stop {stop_id}")))
    }
}
