use rust_decimal::Decimal;
use thiserror::Error;

/// Reasons the ledger refuses a reservation.
///
/// These are expected outcomes, logged as NO_TRADE reasons — not faults.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RiskError {
    /// Another reservation is in flight. Overlapping cycles skip rather
    /// than run on a stale capital picture.
    #[error("risk capacity busy: a reservation is already in flight")]
    Busy,

    /// New-trade acceptance was halted for the rest of the day
    /// (flatten failure escalation).
    #[error("new trades halted for the remainder of the day")]
    Halted,

    #[error("daily loss limit reached: realized {realized} <= -{limit}")]
    DailyLossExceeded { realized: Decimal, limit: Decimal },

    #[error("daily trade count limit reached: {trades} of {max}")]
    TradeCountExceeded { trades: u32, max: u32 },

    #[error("cooldown active: {remaining_mins} minutes remaining")]
    CooldownActive { remaining_mins: i64 },

    #[error(
        "correlation-group exposure for '{group}': adjusted {adjusted_pct}% exceeds cap {cap_pct}%"
    )]
    CorrelationExposure {
        group: String,
        adjusted_pct: Decimal,
        cap_pct: Decimal,
    },

    #[error("position size {requested_pct}% exceeds per-position cap {cap_pct}%")]
    PositionCapExceeded {
        requested_pct: Decimal,
        cap_pct: Decimal,
    },

    #[error("total exposure would reach {total_pct}%, above 100% of capital")]
    TotalExposureExceeded { total_pct: Decimal },

    /// A token was committed or released that the ledger did not issue,
    /// or that was already consumed.
    #[error("unknown or already-consumed reservation token")]
    UnknownReservation,

    /// A close candidate referenced an instrument with no open position.
    #[error("no open position for instrument '{0}'")]
    NoOpenPosition(String),
}
