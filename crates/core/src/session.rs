use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the trading session, strictly monotonic over the day:
/// `Setup` → `Active` → `ForcedClose` → `Closed`.
///
/// The phase is always derived from absolute wall-clock time against the
/// configured boundaries, never from tick counting, so delayed or missed
/// ticks cannot postpone the mandatory cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    /// Before the active window opens. No decisions are made.
    Setup,
    /// The decision loop runs at its configured cadence.
    Active,
    /// The end-of-day cutoff has been crossed. Only flattening may run.
    ForcedClose,
    /// All positions confirmed closed (or escalated). Day is over.
    Closed,
}

/// The session envelope for one calendar trading day.
///
/// Created at process start for the current date, immutable once trading
/// begins apart from the cycle counter and the irrevocable
/// `forced_close_entered` latch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingDay {
    pub date: NaiveDate,
    pub active_start: NaiveTime,
    /// End-of-day closure boundary. Crossing it forces flattening.
    pub eod_closure: NaiveTime,
    /// End of the session. After this the day is archived.
    pub close: NaiveTime,
    /// Monotonically increasing decision-cycle counter.
    pub cycle: u64,
    /// Latched once the forced-close boundary is crossed. Survives restarts
    /// through the decision log; it is never cleared for the rest of the day.
    pub forced_close_entered: bool,
}

impl TradingDay {
    #[must_use]
    pub fn new(
        date: NaiveDate,
        active_start: NaiveTime,
        eod_closure: NaiveTime,
        close: NaiveTime,
    ) -> Self {
        Self {
            date,
            active_start,
            eod_closure,
            close,
            cycle: 0,
            forced_close_entered: false,
        }
    }

    /// Returns the phase at `now`, computed purely from absolute time.
    ///
    /// Once `forced_close_entered` is latched the result can never move
    /// backwards before `ForcedClose`, even if the clock skews.
    #[must_use]
    pub fn phase_at(&self, now: DateTime<Utc>) -> Phase {
        let time = now.time();
        let phase = if now.date_naive() > self.date || time >= self.close {
            Phase::Closed
        } else if time >= self.eod_closure {
            Phase::ForcedClose
        } else if time >= self.active_start {
            Phase::Active
        } else {
            Phase::Setup
        };

        if self.forced_close_entered && phase < Phase::ForcedClose {
            Phase::ForcedClose
        } else {
            phase
        }
    }

    /// Absolute timestamp of the forced-close boundary for this day.
    #[must_use]
    pub fn eod_deadline(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(self.eod_closure))
    }

    /// Latches the forced-close transition. Irrevocable for this day.
    pub fn enter_forced_close(&mut self) {
        self.forced_close_entered = true;
    }

    /// Advances the cycle counter, returning the new cycle number.
    pub fn next_cycle(&mut self) -> u64 {
        self.cycle += 1;
        self.cycle
    }
}
