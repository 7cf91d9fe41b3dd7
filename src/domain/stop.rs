use super::customer::CustomerId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type StopId = u32;

/// A scheduled visit to a customer on a specific route date.
///
/// `sequence` is the ordinal position within the route date. The sequencer
/// is the sole writer of this field; it is not unique by construction, so
/// concurrent appends may produce ties, and removal leaves gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    pub id: StopId,
    pub customer_id: CustomerId,
    pub route_date: NaiveDate,
    pub sequence: u32,
    pub completed: bool,
    pub notes: Option<String>,
}

impl RouteStop {
    pub fn new(customer_id: CustomerId, route_date: NaiveDate, sequence: u32) -> Self {
        Self {
            id: 0,
            customer_id,
            route_date,
            sequence,
            completed: false,
            notes: None,
        }
    }
}
