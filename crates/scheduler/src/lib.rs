//! Clock & session scheduler.
//!
//! Drives the daily state machine from wall-clock time. The phase is
//! always a function of absolute time against the configured boundaries
//! (`TradingDay::phase_at`), so a missed or delayed tick can never
//! postpone the forced-close cutoff.

mod clock;

pub use clock::{SessionClock, Tick};
