use crate::order::Fill;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The per-cycle verdict. `NoTrade` is the default outcome, not a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionOutcome {
    Execute,
    NoTrade,
}

/// The per-cycle decision, immutable once emitted and appended to the
/// decision log. `reason` is always populated, including for `Execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDecision {
    pub outcome: DecisionOutcome,
    pub reason: String,
    pub instrument: String,
    /// Approved size as a percentage of capital (zero for `NoTrade`).
    pub size_pct: Decimal,
    pub stop_loss: Decimal,
    pub composite_score: f64,
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
}

impl TradeDecision {
    /// Builds a `NoTrade` decision with the given audit reason.
    #[must_use]
    pub fn no_trade(
        instrument: impl Into<String>,
        reason: impl Into<String>,
        composite_score: f64,
        cycle: u64,
    ) -> Self {
        Self {
            outcome: DecisionOutcome::NoTrade,
            reason: reason.into(),
            instrument: instrument.into(),
            size_pct: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            composite_score,
            cycle,
            timestamp: Utc::now(),
        }
    }
}

/// One record in the append-only decision log.
///
/// The log carries execution outcomes and close P&L alongside decisions so
/// that replaying it reconstructs the Risk Ledger's daily aggregates
/// (`trades_today`, `realized_pnl`) without any read path into the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionRecord {
    Decision(TradeDecision),
    Executed {
        instrument: String,
        fill: Fill,
        size_pct: Decimal,
        stop_loss: Decimal,
        correlation_group: String,
    },
    ExecuteFailed {
        instrument: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    Closed {
        instrument: String,
        realized_pnl: Decimal,
        timestamp: DateTime<Utc>,
    },
    ForcedCloseEntered {
        timestamp: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn no_trade_has_zero_size_and_a_reason() {
        let d = TradeDecision::no_trade("TCS", "score below threshold", 6.9, 4);
        assert_eq!(d.outcome, DecisionOutcome::NoTrade);
        assert_eq!(d.size_pct, Decimal::ZERO);
        assert_eq!(d.reason, "score below threshold");
        assert_eq!(d.cycle, 4);
    }

    #[test]
    fn records_round_trip_through_json() {
        let record = DecisionRecord::Closed {
            instrument: "INFY".to_string(),
            realized_pnl: dec!(-312.50),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: DecisionRecord = serde_json::from_str(&json).unwrap();
        match back {
            DecisionRecord::Closed { realized_pnl, .. } => {
                assert_eq!(realized_pnl, dec!(-312.50));
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }
}
