//! Signal aggregation.
//!
//! Combines per-source scores into one composite decision input. Scorer
//! failures are non-fatal: a timed-out or errored source degrades the
//! composite (weights renormalize over the rest) instead of blocking the
//! cycle.

mod aggregator;
mod fetch;

pub use aggregator::aggregate;
pub use fetch::fetch_scores;
