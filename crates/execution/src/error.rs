use intraday_risk::RiskError;
use thiserror::Error;

/// Failures on the single-order path. The coordinator releases the
/// ledger reservation before returning any of these, so capacity is
/// never stranded behind a failed order.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("order placement failed for {instrument}: {reason}")]
    PlacementFailed { instrument: String, reason: String },

    #[error("order {order_id} not filled within {timeout_secs}s, cancelled")]
    FillTimeout { order_id: String, timeout_secs: u64 },

    #[error("broker error: {0}")]
    Broker(String),

    #[error(transparent)]
    Risk(#[from] RiskError),
}

/// One or more positions survived every flatten attempt. This is the
/// escalation signal: the caller must halt new entries and surface the
/// stuck instruments to an operator.
#[derive(Debug, Error)]
#[error("failed to flatten {} position(s): {}", failed.len(), summary(failed))]
pub struct FlattenError {
    /// Instrument and the last error seen for it.
    pub failed: Vec<(String, String)>,
}

fn summary(failed: &[(String, String)]) -> String {
    failed
        .iter()
        .map(|(instrument, reason)| format!("{instrument} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}
