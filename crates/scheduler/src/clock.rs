use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use intraday_core::{Phase, SessionConfig, TradingDay};
use std::time::Duration;
use tracing::info;

/// One scheduler wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub at: DateTime<Utc>,
    pub phase: Phase,
    /// Decision-cycle number; only advanced for `Active` ticks.
    pub cycle: u64,
}

/// Session clock owning the `TradingDay` and yielding ticks at the
/// configured cadence during the active window, plus exactly one tick at
/// the instant the forced-close boundary is crossed and one at close.
///
/// Cycle targets are absolute instants on a grid anchored at the session
/// open, held in `next_cycle_at`. Polling `next_deadline` never moves a
/// pending target, so an abandoned wait (another timer winning a race)
/// cannot postpone the cadence; only delivering the tick advances it.
pub struct SessionClock {
    day: TradingDay,
    tick_interval: ChronoDuration,
    /// Absolute target of the next decision cycle.
    next_cycle_at: DateTime<Utc>,
    forced_close_delivered: bool,
    closed_delivered: bool,
}

impl SessionClock {
    #[must_use]
    pub fn new(config: &SessionConfig, today: chrono::NaiveDate) -> Self {
        let day = TradingDay::new(
            today,
            config.active_start,
            config.eod_closure_time,
            config.close_time,
        );
        Self::from_day(config, day)
    }

    /// Resumes a day recovered from the decision log. If the forced-close
    /// latch was already set, the clock will never yield another `Active`
    /// tick for this day. Resuming mid-session yields one immediate
    /// catch-up cycle, then settles back onto the session-open grid.
    #[must_use]
    pub fn resume(config: &SessionConfig, day: TradingDay) -> Self {
        Self {
            forced_close_delivered: day.forced_close_entered,
            ..Self::from_day(config, day)
        }
    }

    fn from_day(config: &SessionConfig, day: TradingDay) -> Self {
        let first_cycle = Utc.from_utc_datetime(&day.date.and_time(day.active_start));
        Self {
            day,
            tick_interval: ChronoDuration::minutes(i64::from(config.tick_interval_minutes)),
            next_cycle_at: first_cycle,
            forced_close_delivered: false,
            closed_delivered: false,
        }
    }

    #[must_use]
    pub fn day(&self) -> &TradingDay {
        &self.day
    }

    pub fn day_mut(&mut self) -> &mut TradingDay {
        &mut self.day
    }

    /// Current phase from absolute wall-clock time.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.day.phase_at(Utc::now())
    }

    /// The next wake-up target from `now`. Pure and idempotent: repeated
    /// polls return the same pending target until `next_tick` delivers
    /// it. The returned phase is the phase of the tick to deliver and is
    /// never `Setup` — before the open, the target is the first `Active`
    /// cycle at the session open.
    ///
    /// Returns `None` once the closed tick has been delivered.
    #[must_use]
    pub fn next_deadline(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Phase)> {
        if self.closed_delivered {
            return None;
        }

        let eod = self.day.eod_deadline();
        let close = Utc.from_utc_datetime(&self.day.date.and_time(self.day.close));

        match self.day.phase_at(now) {
            Phase::Setup => Some((self.next_cycle_at, Phase::Active)),
            Phase::Active => {
                // The forced-close boundary always wins over the cadence.
                if self.next_cycle_at >= eod {
                    Some((eod, Phase::ForcedClose))
                } else {
                    Some((self.next_cycle_at, Phase::Active))
                }
            }
            Phase::ForcedClose => {
                if self.forced_close_delivered {
                    Some((close, Phase::Closed))
                } else {
                    // Fire immediately, regardless of when the last regular
                    // tick ran.
                    Some((now, Phase::ForcedClose))
                }
            }
            Phase::Closed => Some((now, Phase::Closed)),
        }
    }

    /// Sleeps until the next boundary or cadence tick and returns it.
    ///
    /// Cancel-safe: all state changes happen after the sleep completes,
    /// in the same poll that returns the tick, so dropping the future
    /// mid-wait leaves the pending target exactly where it was.
    ///
    /// Yields `None` after the `Closed` tick; the day is over.
    pub async fn next_tick(&mut self) -> Option<Tick> {
        let (target, phase) = self.next_deadline(Utc::now())?;

        let wait = (target - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let at = Utc::now();
        match phase {
            Phase::Active => {
                self.schedule_next_cycle(at);
                let cycle = self.day.next_cycle();
                Some(Tick {
                    at,
                    phase: Phase::Active,
                    cycle,
                })
            }
            Phase::ForcedClose => {
                self.forced_close_delivered = true;
                self.day.enter_forced_close();
                info!(at = %at, "Forced-close boundary crossed");
                Some(Tick {
                    at,
                    phase,
                    cycle: self.day.cycle,
                })
            }
            Phase::Closed => {
                self.closed_delivered = true;
                Some(Tick {
                    at,
                    phase,
                    cycle: self.day.cycle,
                })
            }
            // next_deadline never schedules a Setup wake-up; before the
            // open it targets the first Active cycle instead.
            Phase::Setup => None,
        }
    }

    /// Advances the cadence target to the next grid slot strictly after
    /// `now`, skipping slots missed while the process was busy.
    fn schedule_next_cycle(&mut self, now: DateTime<Utc>) {
        self.next_cycle_at = self.next_cycle_at + self.tick_interval;
        while self.next_cycle_at <= now {
            self.next_cycle_at = self.next_cycle_at + self.tick_interval;
        }
    }
}
