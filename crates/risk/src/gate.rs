use crate::ledger::{Candidate, CandidateKind, ReservationToken, RiskLedger};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use intraday_core::{
    CompositeInput, DecisionOutcome, Phase, RiskConfig, SessionConfig, TradeDecision,
};
use rust_decimal::Decimal;
use tracing::debug;

/// Everything the gate needs to judge one cycle.
pub struct GateContext<'a> {
    pub input: &'a CompositeInput,
    pub instrument: &'a str,
    pub phase: Phase,
    pub now: DateTime<Utc>,
    pub entry_price: Decimal,
    pub cycle: u64,
}

/// The gate's verdict plus, for approvals, the reservation the Execution
/// Coordinator must commit or release.
pub struct GateOutcome {
    pub decision: TradeDecision,
    pub reservation: Option<ReservationToken>,
}

/// Ordered, short-circuiting decision policy. NO_TRADE is the default
/// outcome; every rejection carries the reason that stopped it.
pub struct RiskGate {
    risk: RiskConfig,
    session: SessionConfig,
}

impl RiskGate {
    #[must_use]
    pub fn new(risk: RiskConfig, session: SessionConfig) -> Self {
        Self { risk, session }
    }

    /// Evaluates one cycle. Policy order:
    ///
    /// 1. degraded input, 2. score threshold, 3. timing/event restrictions,
    /// 4. ledger reservation, 5. approve and size.
    ///
    /// The threshold comparison is the single documented boundary: a
    /// composite exactly equal to `min_signal_score` passes (`>=`);
    /// anything below does not.
    #[must_use]
    pub fn evaluate(&self, ledger: &RiskLedger, ctx: &GateContext<'_>) -> GateOutcome {
        if ctx.input.degraded && ctx.input.contributions.is_empty() {
            return self.no_trade(ctx, "insufficient signal coverage: no usable sources");
        }
        if ctx.input.degraded {
            return self.no_trade(ctx, "insufficient signal coverage: degraded inputs");
        }

        if ctx.input.composite < self.risk.min_signal_score {
            return self.no_trade(
                ctx,
                format!(
                    "score below threshold: {:.1} < {:.1}",
                    ctx.input.composite, self.risk.min_signal_score
                ),
            );
        }

        if let Some(restriction) = self.timing_restriction(ctx) {
            return self.no_trade(ctx, restriction);
        }

        let size_pct = self.position_size(ctx.input);
        let candidate = Candidate {
            instrument: ctx.instrument.to_string(),
            kind: CandidateKind::Entry,
            size_pct,
            correlation_group: self
                .risk
                .correlation_groups
                .get(ctx.instrument)
                .cloned()
                .unwrap_or_default(),
        };

        match ledger.reserve(&candidate, ctx.now) {
            Err(e) => self.no_trade(ctx, e.to_string()),
            Ok(token) => {
                let stop_loss = ctx.entry_price
                    * (Decimal::ONE - self.risk.stop_loss_pct / Decimal::ONE_HUNDRED);
                debug!(
                    instrument = ctx.instrument,
                    composite = ctx.input.composite,
                    size_pct = %size_pct,
                    "Candidate approved"
                );
                GateOutcome {
                    decision: TradeDecision {
                        outcome: DecisionOutcome::Execute,
                        reason: format!(
                            "composite {:.1} >= {:.1}, risk capacity reserved",
                            ctx.input.composite, self.risk.min_signal_score
                        ),
                        instrument: ctx.instrument.to_string(),
                        size_pct,
                        stop_loss,
                        composite_score: ctx.input.composite,
                        cycle: ctx.cycle,
                        timestamp: ctx.now,
                    },
                    reservation: Some(token),
                }
            }
        }
    }

    /// Bounded, explainable sizing rule: base `max_position_pct`, halved
    /// under the high-volatility regime, scaled by average confidence,
    /// clamped to `[0, max_position_pct]`.
    #[must_use]
    pub fn position_size(&self, input: &CompositeInput) -> Decimal {
        let mut size = self.risk.max_position_pct;
        if self.risk.high_volatility {
            size /= Decimal::TWO;
        }
        let confidence =
            Decimal::try_from(input.confidence_avg.clamp(0.0, 1.0)).unwrap_or(Decimal::ZERO);
        size *= confidence;
        size.clamp(Decimal::ZERO, self.risk.max_position_pct)
    }

    fn timing_restriction(&self, ctx: &GateContext<'_>) -> Option<String> {
        if ctx.phase != Phase::Active {
            return Some(format!(
                "timing restriction: phase is {:?}, not Active",
                ctx.phase
            ));
        }

        let time = ctx.now.time();
        let open_end = self.session.active_start
            + Duration::minutes(i64::from(self.session.opening_blackout_minutes));
        if time < open_end {
            return Some("timing restriction: within opening blackout".to_string());
        }

        let close_start = blackout_start(
            self.session.eod_closure_time,
            self.session.closing_blackout_minutes,
        );
        if time >= close_start {
            return Some("timing restriction: within closing blackout".to_string());
        }

        for blackout in &self.session.event_blackouts {
            if blackout.instrument == ctx.instrument
                && time >= blackout.start
                && time < blackout.end
            {
                return Some(format!("event restriction: {}", blackout.label));
            }
        }

        None
    }

    fn no_trade(&self, ctx: &GateContext<'_>, reason: impl Into<String>) -> GateOutcome {
        let reason = reason.into();
        debug!(
            instrument = ctx.instrument,
            composite = ctx.input.composite,
            reason = %reason,
            "Cycle yields NO_TRADE"
        );
        GateOutcome {
            decision: TradeDecision::no_trade(
                ctx.instrument,
                reason,
                ctx.input.composite,
                ctx.cycle,
            ),
            reservation: None,
        }
    }
}

fn blackout_start(boundary: NaiveTime, minutes: u32) -> NaiveTime {
    boundary - Duration::minutes(i64::from(minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, TimeZone};
    use intraday_core::SourceContribution;
    use rust_decimal_macros::dec;

    fn input(composite: f64, confidence_avg: f64) -> CompositeInput {
        CompositeInput {
            composite,
            contributions: vec![SourceContribution {
                source: intraday_core::SignalSource::Technical,
                value: composite,
                confidence: confidence_avg,
                normalized_weight: 1.0,
            }],
            confidence_avg,
            degraded: false,
        }
    }

    fn midday() -> DateTime<Utc> {
        let dt = NaiveDateTime::new(
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        );
        Utc.from_utc_datetime(&dt)
    }

    fn gate() -> RiskGate {
        RiskGate::new(RiskConfig::default(), SessionConfig::default())
    }

    fn ctx<'a>(input: &'a CompositeInput, now: DateTime<Utc>) -> GateContext<'a> {
        GateContext {
            input,
            instrument: "TCS",
            phase: Phase::Active,
            now,
            entry_price: dec!(4000),
            cycle: 1,
        }
    }

    #[test]
    fn degraded_input_is_rejected_first() {
        let ledger = RiskLedger::new(RiskConfig::default());
        let mut degraded = input(9.0, 0.9);
        degraded.degraded = true;
        let outcome = gate().evaluate(&ledger, &ctx(&degraded, midday()));
        assert_eq!(outcome.decision.outcome, DecisionOutcome::NoTrade);
        assert!(outcome.decision.reason.contains("insufficient signal coverage"));
        assert!(outcome.reservation.is_none());
    }

    #[test]
    fn six_point_nine_is_below_threshold() {
        let ledger = RiskLedger::new(RiskConfig::default());
        let outcome = gate().evaluate(&ledger, &ctx(&input(6.9, 0.9), midday()));
        assert_eq!(outcome.decision.outcome, DecisionOutcome::NoTrade);
        assert!(outcome.decision.reason.contains("score below threshold"));
    }

    #[test]
    fn exact_threshold_passes_to_ledger() {
        let ledger = RiskLedger::new(RiskConfig::default());
        let outcome = gate().evaluate(&ledger, &ctx(&input(7.0, 0.9), midday()));
        assert_eq!(outcome.decision.outcome, DecisionOutcome::Execute);
        assert!(outcome.reservation.is_some());
    }

    #[test]
    fn threshold_precedes_ledger_state() {
        // A busy ledger must not be consulted for a below-threshold score.
        let ledger = RiskLedger::new(RiskConfig::default());
        let held = ledger
            .reserve(
                &Candidate {
                    instrument: "INFY".to_string(),
                    kind: CandidateKind::Entry,
                    size_pct: dec!(5),
                    correlation_group: String::new(),
                },
                midday(),
            )
            .unwrap();
        let outcome = gate().evaluate(&ledger, &ctx(&input(6.9, 0.9), midday()));
        assert!(outcome.decision.reason.contains("score below threshold"));
        ledger.release(held);
    }

    #[test]
    fn busy_ledger_yields_no_trade() {
        let ledger = RiskLedger::new(RiskConfig::default());
        let _held = ledger
            .reserve(
                &Candidate {
                    instrument: "INFY".to_string(),
                    kind: CandidateKind::Entry,
                    size_pct: dec!(5),
                    correlation_group: String::new(),
                },
                midday(),
            )
            .unwrap();
        let outcome = gate().evaluate(&ledger, &ctx(&input(8.0, 0.9), midday()));
        assert_eq!(outcome.decision.outcome, DecisionOutcome::NoTrade);
        assert!(outcome.decision.reason.contains("busy"));
    }

    #[test]
    fn non_active_phase_is_rejected() {
        let ledger = RiskLedger::new(RiskConfig::default());
        let composite = input(8.0, 0.9);
        let mut context = ctx(&composite, midday());
        context.phase = Phase::ForcedClose;
        let outcome = gate().evaluate(&ledger, &context);
        assert!(outcome.decision.reason.contains("timing restriction"));
    }

    #[test]
    fn closing_blackout_is_enforced() {
        let ledger = RiskLedger::new(RiskConfig::default());
        let composite = input(8.0, 0.9);
        // 15:00 is inside the default 30-minute blackout before 15:15.
        let dt = NaiveDateTime::new(
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        );
        let mut context = ctx(&composite, Utc.from_utc_datetime(&dt));
        context.phase = Phase::Active;
        let outcome = gate().evaluate(&ledger, &context);
        assert!(outcome.decision.reason.contains("closing blackout"));
    }

    #[test]
    fn event_blackout_names_the_event() {
        let ledger = RiskLedger::new(RiskConfig::default());
        let mut session = SessionConfig::default();
        session.event_blackouts.push(intraday_core::config::EventBlackout {
            instrument: "TCS".to_string(),
            start: NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
            end: NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
            label: "Q4 earnings".to_string(),
        });
        let gate = RiskGate::new(RiskConfig::default(), session);
        let composite = input(8.0, 0.9);
        let outcome = gate.evaluate(&ledger, &ctx(&composite, midday()));
        assert!(outcome.decision.reason.contains("Q4 earnings"));
    }

    #[test]
    fn sizing_scales_with_confidence_and_volatility() {
        let calm = gate();
        assert_eq!(calm.position_size(&input(8.0, 1.0)), dec!(20));
        assert_eq!(calm.position_size(&input(8.0, 0.5)), dec!(10.0));

        let mut risk = RiskConfig::default();
        risk.high_volatility = true;
        let stormy = RiskGate::new(risk, SessionConfig::default());
        assert_eq!(stormy.position_size(&input(8.0, 1.0)), dec!(10));
        assert_eq!(stormy.position_size(&input(8.0, 0.5)), dec!(5.0));
    }

    #[test]
    fn execute_decisions_still_carry_a_reason() {
        let ledger = RiskLedger::new(RiskConfig::default());
        let outcome = gate().evaluate(&ledger, &ctx(&input(7.4, 0.8), midday()));
        assert_eq!(outcome.decision.outcome, DecisionOutcome::Execute);
        assert!(!outcome.decision.reason.is_empty());
        // Stop loss is 2% under the entry price.
        assert_eq!(outcome.decision.stop_loss, dec!(3920.0000));
    }
}
