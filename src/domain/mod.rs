//! Domain entities, value objects and storage ports.

pub mod customer;
pub mod payment;
pub mod ports;
pub mod stop;
