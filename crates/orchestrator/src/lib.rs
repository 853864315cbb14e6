//! Session orchestration: owns the daily loop and wires the scheduler,
//! signal aggregation, risk gate, and execution coordinator together.
//!
//! The orchestrator is the only writer of the decision log and the only
//! caller of the gate. One decision cycle runs per scheduler tick; a
//! separate monitoring cadence watches open positions for stop-loss
//! breaches between cycles.

mod engine;
mod log;

pub use engine::Orchestrator;
pub use log::{JsonlDecisionLog, MemoryDecisionLog};
