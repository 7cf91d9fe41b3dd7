//! Application services: the route sequencer, the balance ledger, and the
//! customer directory. Each service owns shared handles to the storage ports
//! and performs one load-mutate-persist cycle per call.

pub mod directory;
pub mod ledger;
pub mod sequencer;
