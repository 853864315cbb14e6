//! Order lifecycle management between the decision gate and the broker.
//!
//! The coordinator is the only component that turns an approved decision
//! into broker orders, and the only one that settles reservations held
//! against the risk ledger. End-of-day flattening lives here too, with
//! its own bounded retry policy; entries are never retried.

mod coordinator;
mod error;
mod paper;

pub use coordinator::ExecutionCoordinator;
pub use error::{ExecutionError, FlattenError};
pub use paper::PaperBroker;
