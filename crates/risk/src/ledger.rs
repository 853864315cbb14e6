use crate::error::RiskError;
use chrono::{DateTime, Duration, Utc};
use intraday_core::{DecisionRecord, Fill, Position, RiskConfig};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// An exclusive, releasable hold on risk capacity.
///
/// Move-only by design: committing or releasing consumes the token, so a
/// reservation cannot be double-spent across overlapping cycles.
#[derive(Debug, PartialEq, Eq)]
pub struct ReservationToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// A new entry; subject to every ledger rule.
    Entry,
    /// Closing an existing position; always allowed (closing reduces
    /// risk), but still serialized through the reservation.
    Close,
}

/// A candidate trade presented to `reserve`.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub instrument: String,
    pub kind: CandidateKind,
    /// Requested size as a percentage of capital (entries only).
    pub size_pct: Decimal,
    pub correlation_group: String,
}

impl Candidate {
    #[must_use]
    pub fn close(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            kind: CandidateKind::Close,
            size_pct: Decimal::ZERO,
            correlation_group: String::new(),
        }
    }
}

/// Read-only view of the ledger for monitoring and reporting.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub capital: Decimal,
    pub realized_pnl: Decimal,
    pub trades_today: u32,
    pub open_positions: Vec<Position>,
    pub halted: bool,
}

#[derive(Debug)]
struct LedgerState {
    capital: Decimal,
    realized_pnl: Decimal,
    trades_today: u32,
    last_trade_at: Option<DateTime<Utc>>,
    open_positions: Vec<Position>,
    /// At most one reservation may be outstanding system-wide.
    in_flight: Option<(u64, Candidate)>,
    next_token: u64,
    halted: bool,
}

/// In-memory, transactionally-updated record of the day's risk state.
///
/// All mutation goes through `reserve` → `commit_entry` / `commit_close`
/// / `release`; `reserve` is the single point enforcing every limit, and
/// it is exclusive — a second call while a reservation is outstanding is
/// rejected with [`RiskError::Busy`].
pub struct RiskLedger {
    config: RiskConfig,
    state: RwLock<LedgerState>,
}

impl RiskLedger {
    #[must_use]
    pub fn new(config: RiskConfig) -> Self {
        let capital = config.starting_capital;
        Self {
            config,
            state: RwLock::new(LedgerState {
                capital,
                realized_pnl: Decimal::ZERO,
                trades_today: 0,
                last_trade_at: None,
                open_positions: Vec::new(),
                in_flight: None,
                next_token: 1,
                halted: false,
            }),
        }
    }

    /// Rebuilds the day's aggregates from the decision log, taking open
    /// positions from the broker — the broker is the source of truth for
    /// positions, never the replayed log alone.
    #[must_use]
    pub fn restore(
        config: RiskConfig,
        records: &[DecisionRecord],
        broker_positions: Vec<Position>,
    ) -> Self {
        let ledger = Self::new(config);
        {
            let mut state = ledger.state.write();
            for record in records {
                match record {
                    DecisionRecord::Executed { fill, .. } => {
                        state.trades_today += 1;
                        state.last_trade_at = Some(fill.timestamp);
                    }
                    DecisionRecord::Closed { realized_pnl, .. } => {
                        state.realized_pnl += *realized_pnl;
                        state.capital += *realized_pnl;
                    }
                    DecisionRecord::Decision(_)
                    | DecisionRecord::ExecuteFailed { .. }
                    | DecisionRecord::ForcedCloseEntered { .. } => {}
                }
            }
            state.open_positions = broker_positions;
        }
        info!(
            trades = ledger.snapshot().trades_today,
            realized = %ledger.snapshot().realized_pnl,
            positions = ledger.snapshot().open_positions.len(),
            "Risk ledger restored from decision log"
        );
        ledger
    }

    /// Attempts to reserve capacity for a candidate trade.
    ///
    /// Checks run in a fixed order and short-circuit on the first failure:
    /// busy, halted, daily loss limit, trade count, cooldown, correlation
    /// exposure, per-position cap, total exposure. Close candidates skip
    /// the entry rules — a losing position may always be closed.
    ///
    /// # Errors
    /// The specific [`RiskError`] for the first rule that failed.
    pub fn reserve(&self, candidate: &Candidate, now: DateTime<Utc>) -> Result<ReservationToken, RiskError> {
        let mut state = self.state.write();

        if state.in_flight.is_some() {
            return Err(RiskError::Busy);
        }

        if candidate.kind == CandidateKind::Entry {
            self.check_entry(&state, candidate, now)?;
        } else if !state
            .open_positions
            .iter()
            .any(|p| p.instrument == candidate.instrument)
        {
            return Err(RiskError::NoOpenPosition(candidate.instrument.clone()));
        }

        let token = state.next_token;
        state.next_token += 1;
        state.in_flight = Some((token, candidate.clone()));
        Ok(ReservationToken(token))
    }

    fn check_entry(
        &self,
        state: &LedgerState,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> Result<(), RiskError> {
        if state.halted {
            return Err(RiskError::Halted);
        }

        let limit = self.config.starting_capital * self.config.daily_loss_limit_pct
            / Decimal::ONE_HUNDRED;
        if state.realized_pnl <= -limit {
            return Err(RiskError::DailyLossExceeded {
                realized: state.realized_pnl,
                limit,
            });
        }

        if state.trades_today >= self.config.max_daily_trades {
            return Err(RiskError::TradeCountExceeded {
                trades: state.trades_today,
                max: self.config.max_daily_trades,
            });
        }

        if let Some(last) = state.last_trade_at {
            let cooldown = Duration::minutes(i64::from(self.config.cooldown_minutes));
            let elapsed = now.signed_duration_since(last);
            if elapsed < cooldown {
                return Err(RiskError::CooldownActive {
                    remaining_mins: (cooldown - elapsed).num_minutes().max(1),
                });
            }
        }

        // Same-group positions are exposure-equivalent, discounted by the
        // correlation threshold; the adjusted figure must fit inside the
        // per-position cap.
        let group_exposure: Decimal = state
            .open_positions
            .iter()
            .filter(|p| {
                !candidate.correlation_group.is_empty()
                    && p.correlation_group == candidate.correlation_group
            })
            .map(|p| p.size_pct)
            .sum();
        let adjusted = candidate.size_pct + self.config.correlation_threshold * group_exposure;
        if group_exposure > Decimal::ZERO && adjusted > self.config.max_position_pct {
            return Err(RiskError::CorrelationExposure {
                group: candidate.correlation_group.clone(),
                adjusted_pct: adjusted,
                cap_pct: self.config.max_position_pct,
            });
        }

        if candidate.size_pct > self.config.max_position_pct {
            return Err(RiskError::PositionCapExceeded {
                requested_pct: candidate.size_pct,
                cap_pct: self.config.max_position_pct,
            });
        }

        let total: Decimal = state.open_positions.iter().map(|p| p.size_pct).sum();
        if total + candidate.size_pct > Decimal::ONE_HUNDRED {
            return Err(RiskError::TotalExposureExceeded {
                total_pct: total + candidate.size_pct,
            });
        }

        Ok(())
    }

    /// Commits an entry reservation: records the filled position, counts
    /// the trade, and starts the cooldown.
    ///
    /// # Errors
    /// [`RiskError::UnknownReservation`] if the token is not the one in
    /// flight.
    pub fn commit_entry(&self, token: ReservationToken, position: Position, fill: &Fill) -> Result<(), RiskError> {
        let mut state = self.state.write();
        Self::take_reservation(&mut state, &token)?;

        state.trades_today += 1;
        state.last_trade_at = Some(fill.timestamp);
        info!(
            instrument = %position.instrument,
            size_pct = %position.size_pct,
            price = %fill.avg_price,
            trades_today = state.trades_today,
            "Position opened"
        );
        state.open_positions.push(position);
        Ok(())
    }

    /// Commits a close reservation: removes the position and realizes its
    /// P&L at `exit_price`.
    ///
    /// # Errors
    /// [`RiskError::UnknownReservation`] or [`RiskError::NoOpenPosition`].
    pub fn commit_close(
        &self,
        token: ReservationToken,
        instrument: &str,
        exit_price: Decimal,
    ) -> Result<Decimal, RiskError> {
        let mut state = self.state.write();
        Self::take_reservation(&mut state, &token)?;
        Self::close_position(&mut state, instrument, exit_price)
    }

    /// Releases a reservation without committing, restoring capacity.
    /// Must be called when execution fails or times out.
    pub fn release(&self, token: ReservationToken) {
        let mut state = self.state.write();
        if Self::take_reservation(&mut state, &token).is_err() {
            warn!(token = token.0, "Released a reservation the ledger did not hold");
        }
    }

    /// Closes a position outside the reservation protocol. Reserved for
    /// end-of-day flattening, which runs after new-trade acceptance has
    /// stopped and only ever reduces exposure.
    ///
    /// # Errors
    /// [`RiskError::NoOpenPosition`] if the instrument is not open.
    pub fn flatten_close(&self, instrument: &str, exit_price: Decimal) -> Result<Decimal, RiskError> {
        let mut state = self.state.write();
        Self::close_position(&mut state, instrument, exit_price)
    }

    /// Stops accepting new entries for the remainder of the day.
    pub fn halt_new_entries(&self) {
        self.state.write().halted = true;
        warn!("New-trade acceptance halted for the remainder of the day");
    }

    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read();
        LedgerSnapshot {
            capital: state.capital,
            realized_pnl: state.realized_pnl,
            trades_today: state.trades_today,
            open_positions: state.open_positions.clone(),
            halted: state.halted,
        }
    }

    fn take_reservation(state: &mut LedgerState, token: &ReservationToken) -> Result<(), RiskError> {
        match state.in_flight {
            Some((held, _)) if held == token.0 => {
                state.in_flight = None;
                Ok(())
            }
            _ => Err(RiskError::UnknownReservation),
        }
    }

    fn close_position(
        state: &mut LedgerState,
        instrument: &str,
        exit_price: Decimal,
    ) -> Result<Decimal, RiskError> {
        let idx = state
            .open_positions
            .iter()
            .position(|p| p.instrument == instrument)
            .ok_or_else(|| RiskError::NoOpenPosition(instrument.to_string()))?;
        let position = state.open_positions.remove(idx);
        let pnl = position.pnl_at(exit_price);
        state.realized_pnl += pnl;
        state.capital += pnl;
        info!(
            instrument = %instrument,
            exit_price = %exit_price,
            pnl = %pnl,
            realized_today = %state.realized_pnl,
            "Position closed"
        );
        Ok(pnl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> RiskConfig {
        RiskConfig::default()
    }

    fn entry(instrument: &str, size_pct: Decimal, group: &str) -> Candidate {
        Candidate {
            instrument: instrument.to_string(),
            kind: CandidateKind::Entry,
            size_pct,
            correlation_group: group.to_string(),
        }
    }

    fn position(instrument: &str, size_pct: Decimal, group: &str) -> Position {
        Position {
            instrument: instrument.to_string(),
            quantity: dec!(10),
            entry_price: dec!(100),
            size_pct,
            correlation_group: group.to_string(),
            stop_loss: dec!(98),
            opened_at: Utc::now(),
        }
    }

    fn fill(instrument: &str, price: Decimal) -> Fill {
        Fill {
            order_id: "ord-1".to_string(),
            instrument: instrument.to_string(),
            side: intraday_core::Side::Buy,
            quantity: dec!(10),
            avg_price: price,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn reserve_is_exclusive() {
        let ledger = RiskLedger::new(config());
        let first = ledger.reserve(&entry("TCS", dec!(10), "it"), Utc::now());
        assert!(first.is_ok());
        let second = ledger.reserve(&entry("INFY", dec!(10), "it"), Utc::now());
        assert_eq!(second.unwrap_err(), RiskError::Busy);
        // Releasing restores capacity.
        ledger.release(first.unwrap());
        assert!(ledger.reserve(&entry("INFY", dec!(10), "it"), Utc::now()).is_ok());
    }

    #[test]
    fn trade_count_limit_blocks_fourth_trade() {
        let ledger = RiskLedger::new(config());
        let mut now = Utc::now();
        for i in 0..3 {
            let name = format!("SYM{i}");
            let token = ledger.reserve(&entry(&name, dec!(5), ""), now).unwrap();
            let mut pos = position(&name, dec!(5), "");
            let mut f = fill(&name, dec!(100));
            f.timestamp = now;
            pos.opened_at = now;
            ledger.commit_entry(token, pos, &f).unwrap();
            now += Duration::minutes(90);
        }
        let err = ledger.reserve(&entry("SYM4", dec!(5), ""), now).unwrap_err();
        assert_eq!(
            err,
            RiskError::TradeCountExceeded { trades: 3, max: 3 }
        );
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let ledger = RiskLedger::new(config());
        let start = Utc::now();
        let token = ledger.reserve(&entry("TCS", dec!(5), ""), start).unwrap();
        ledger
            .commit_entry(token, position("TCS", dec!(5), ""), &fill("TCS", dec!(100)))
            .unwrap();

        let err = ledger
            .reserve(&entry("INFY", dec!(5), ""), start + Duration::minutes(30))
            .unwrap_err();
        assert!(matches!(err, RiskError::CooldownActive { .. }));

        assert!(ledger
            .reserve(&entry("INFY", dec!(5), ""), start + Duration::minutes(61))
            .is_ok());
    }

    #[test]
    fn correlated_exposure_is_rejected() {
        // First position already at 15% in the group; a 10% candidate is
        // adjusted to 10 + 0.7*15 = 20.5 > 20 and rejected.
        let ledger = RiskLedger::new(config());
        let token = ledger
            .reserve(&entry("RELIANCE", dec!(15), "energy"), Utc::now())
            .unwrap();
        ledger
            .commit_entry(
                token,
                position("RELIANCE", dec!(15), "energy"),
                &fill("RELIANCE", dec!(100)),
            )
            .unwrap();

        let later = Utc::now() + Duration::minutes(90);
        let err = ledger
            .reserve(&entry("ONGC", dec!(10), "energy"), later)
            .unwrap_err();
        assert!(matches!(err, RiskError::CorrelationExposure { .. }));

        // The same size in an unrelated group passes.
        assert!(ledger.reserve(&entry("TCS", dec!(10), "it"), later).is_ok());
    }

    #[test]
    fn loss_limit_blocks_entries_but_not_closes() {
        let ledger = RiskLedger::new(config());
        let token = ledger
            .reserve(&entry("TCS", dec!(10), "it"), Utc::now())
            .unwrap();
        let mut pos = position("TCS", dec!(10), "it");
        pos.quantity = dec!(100);
        ledger.commit_entry(token, pos, &fill("TCS", dec!(100))).unwrap();

        // Breach the 3% daily loss limit on 100k capital (-3000).
        let later = Utc::now() + Duration::minutes(90);
        let close_token = ledger.reserve(&Candidate::close("TCS"), later).unwrap();
        let pnl = ledger.commit_close(close_token, "TCS", dec!(68)).unwrap();
        assert_eq!(pnl, dec!(-3200));

        let err = ledger
            .reserve(&entry("INFY", dec!(5), "it"), later + Duration::minutes(1))
            .unwrap_err();
        assert!(matches!(err, RiskError::DailyLossExceeded { .. }));
    }

    #[test]
    fn per_position_cap_applies() {
        let ledger = RiskLedger::new(config());
        let err = ledger
            .reserve(&entry("TCS", dec!(25), ""), Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            RiskError::PositionCapExceeded {
                requested_pct: dec!(25),
                cap_pct: dec!(20),
            }
        );
    }

    #[test]
    fn halt_blocks_entries() {
        let ledger = RiskLedger::new(config());
        ledger.halt_new_entries();
        let err = ledger
            .reserve(&entry("TCS", dec!(5), ""), Utc::now())
            .unwrap_err();
        assert_eq!(err, RiskError::Halted);
    }

    #[test]
    fn flatten_close_bypasses_reservation() {
        let ledger = RiskLedger::new(config());
        let token = ledger
            .reserve(&entry("TCS", dec!(10), "it"), Utc::now())
            .unwrap();
        ledger
            .commit_entry(token, position("TCS", dec!(10), "it"), &fill("TCS", dec!(100)))
            .unwrap();

        let pnl = ledger.flatten_close("TCS", dec!(101)).unwrap();
        assert_eq!(pnl, dec!(10));
        assert!(ledger.snapshot().open_positions.is_empty());
    }

    #[test]
    fn stale_token_is_rejected() {
        let ledger = RiskLedger::new(config());
        let token = ledger
            .reserve(&entry("TCS", dec!(10), "it"), Utc::now())
            .unwrap();
        ledger.release(token);
        // A forged/stale token cannot commit.
        let err = ledger
            .commit_close(ReservationToken(999), "TCS", dec!(100))
            .unwrap_err();
        assert_eq!(err, RiskError::UnknownReservation);
    }

    #[test]
    fn restore_replays_counters_and_trusts_broker_positions() {
        let records = vec![
            DecisionRecord::Executed {
                instrument: "TCS".to_string(),
                fill: fill("TCS", dec!(100)),
                size_pct: dec!(10),
                stop_loss: dec!(98),
                correlation_group: "it".to_string(),
            },
            DecisionRecord::Closed {
                instrument: "TCS".to_string(),
                realized_pnl: dec!(-500),
                timestamp: Utc::now(),
            },
            DecisionRecord::Executed {
                instrument: "INFY".to_string(),
                fill: fill("INFY", dec!(1500)),
                size_pct: dec!(10),
                stop_loss: dec!(1470),
                correlation_group: "it".to_string(),
            },
        ];
        let broker_positions = vec![position("INFY", dec!(10), "it")];
        let ledger = RiskLedger::restore(config(), &records, broker_positions);

        let snap = ledger.snapshot();
        assert_eq!(snap.trades_today, 2);
        assert_eq!(snap.realized_pnl, dec!(-500));
        assert_eq!(snap.open_positions.len(), 1);
        assert_eq!(snap.open_positions[0].instrument, "INFY");
    }
}
