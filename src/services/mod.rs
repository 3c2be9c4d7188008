//! Listing, batching, transfer and merge logic, plus the store backends it
//! runs against.

pub mod aggregator;
pub mod invocation;
pub mod lister;
pub mod local_store;
pub mod merge;
pub mod mover;
pub mod partition;
pub mod planner;
pub mod retry;
pub mod store;
pub mod transfer;
