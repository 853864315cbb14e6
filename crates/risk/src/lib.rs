//! Risk enforcement: the ledger and the gate.
//!
//! All capital mutation funnels through the ledger's exclusive
//! reserve/commit/release protocol; the gate is the ordered decision
//! policy that turns a composite signal into an auditable verdict.

mod error;
mod gate;
mod ledger;

pub use error::RiskError;
pub use gate::{GateContext, GateOutcome, RiskGate};
pub use ledger::{Candidate, CandidateKind, LedgerSnapshot, ReservationToken, RiskLedger};
