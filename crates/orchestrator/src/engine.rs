use anyhow::Result;
use chrono::{DateTime, Utc};
use intraday_core::{
    AppConfig, BrokerClient, DecisionLog, DecisionOutcome, DecisionRecord, Phase, Scorer,
    SessionConfig, TradeDecision, TradingDay,
};
use intraday_execution::ExecutionCoordinator;
use intraday_risk::{Candidate, GateContext, RiskError, RiskGate, RiskLedger};
use intraday_scheduler::{SessionClock, Tick};
use intraday_signals::{aggregate, fetch_scores};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Drives one trading day end to end: decision cycles during the active
/// window, stop-loss monitoring between them, mandatory flattening at
/// the cutoff, and a clean exit at close.
pub struct Orchestrator {
    config: AppConfig,
    scorers: Vec<Box<dyn Scorer>>,
    broker: Arc<dyn BrokerClient>,
    ledger: Arc<RiskLedger>,
    gate: RiskGate,
    coordinator: ExecutionCoordinator,
    log: Arc<dyn DecisionLog>,
    clock: SessionClock,
    shutdown: mpsc::Receiver<()>,
    flatten_failure: Option<String>,
}

enum Wake {
    Scheduler(Option<Tick>),
    Monitor,
    Shutdown,
}

impl Orchestrator {
    /// Wires the session up, replaying `history` (today's decision log)
    /// into the risk ledger and taking open positions from the broker.
    /// On a fresh start `history` is empty and this reduces to a clean
    /// day. A replayed forced-close marker keeps the day latched: the
    /// scheduler will never yield another decision cycle for it.
    ///
    /// # Errors
    /// Broker errors while querying open positions.
    pub async fn start(
        config: AppConfig,
        scorers: Vec<Box<dyn Scorer>>,
        broker: Arc<dyn BrokerClient>,
        log: Arc<dyn DecisionLog>,
        history: &[DecisionRecord],
        shutdown: mpsc::Receiver<()>,
    ) -> Result<Self> {
        let positions = broker.open_positions().await?;
        let ledger = Arc::new(RiskLedger::restore(
            config.risk.clone(),
            history,
            positions,
        ));

        let today = Utc::now().date_naive();
        let mut day = day_from_config(&config.session, today);
        if history.iter().any(|record| {
            matches!(record, DecisionRecord::ForcedCloseEntered { timestamp }
                if timestamp.date_naive() == today)
        }) {
            day.enter_forced_close();
            info!("Resumed a day already past its forced-close boundary");
        }
        let clock = SessionClock::resume(&config.session, day);

        let gate = RiskGate::new(config.risk.clone(), config.session.clone());
        let coordinator = ExecutionCoordinator::new(
            Arc::clone(&broker),
            Arc::clone(&ledger),
            config.execution.clone(),
        );

        Ok(Self {
            config,
            scorers,
            broker,
            ledger,
            gate,
            coordinator,
            log,
            clock,
            shutdown,
            flatten_failure: None,
        })
    }

    /// Runs the day to completion. Returns after the close tick or a
    /// shutdown signal.
    ///
    /// # Errors
    /// A flatten failure is the one per-cycle error that surfaces here:
    /// the loop keeps running so the operator retains monitoring, but
    /// the day ends with the error. Everything else is logged and
    /// absorbed so one bad cycle never ends the day.
    pub async fn run(mut self) -> Result<()> {
        let monitor_period = Duration::from_secs(
            u64::from(self.config.session.monitoring_interval_minutes) * 60,
        );
        let mut monitor = tokio::time::interval(monitor_period);
        monitor.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first interval tick fires immediately; swallow it.
        monitor.tick().await;

        info!(
            instrument = %self.config.session.instrument,
            phase = ?self.clock.phase(),
            "Session loop started"
        );

        loop {
            // Race the clock directly: next_tick is cancel-safe, so a
            // monitor or shutdown wake-up abandons the wait without
            // moving the pending cycle target.
            let wake = tokio::select! {
                tick = self.clock.next_tick() => Wake::Scheduler(tick),
                _ = monitor.tick() => Wake::Monitor,
                _ = self.shutdown.recv() => Wake::Shutdown,
            };

            match wake {
                Wake::Scheduler(None) => break,
                Wake::Scheduler(Some(tick)) => match tick.phase {
                    Phase::Active => self.run_cycle(tick.at, tick.cycle).await,
                    Phase::ForcedClose => self.enter_forced_close(tick.at).await,
                    Phase::Closed => {
                        info!("Session closed");
                        break;
                    }
                    Phase::Setup => {}
                },
                Wake::Monitor => {
                    if self.clock.phase() == Phase::Active {
                        self.monitor_positions().await;
                    }
                }
                Wake::Shutdown => {
                    info!("Shutdown requested; leaving the session loop");
                    break;
                }
            }
        }

        match self.flatten_failure {
            Some(reason) => Err(anyhow::anyhow!(
                "end-of-day flattening incomplete: {reason}"
            )),
            None => Ok(()),
        }
    }

    /// One decision cycle: fetch scores, aggregate, gate, execute.
    /// Every cycle appends exactly one `Decision` record, plus an
    /// execution outcome record when the gate approves.
    async fn run_cycle(&self, at: DateTime<Utc>, cycle: u64) {
        let instrument = self.config.session.instrument.clone();
        let scores = fetch_scores(
            &self.scorers,
            &instrument,
            at,
            Duration::from_secs(self.config.signals.scorer_timeout_secs),
        )
        .await;
        let input = aggregate(&scores, &self.config.signals, at);

        let entry_price = match self.broker.last_price(&instrument).await {
            Ok(price) => price,
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "No quote for this cycle");
                self.append(DecisionRecord::Decision(TradeDecision::no_trade(
                    &instrument,
                    format!("quote unavailable: {e}"),
                    input.composite,
                    cycle,
                )))
                .await;
                return;
            }
        };

        let outcome = self.gate.evaluate(
            &self.ledger,
            &GateContext {
                input: &input,
                instrument: &instrument,
                phase: Phase::Active,
                now: at,
                entry_price,
                cycle,
            },
        );
        info!(
            cycle,
            composite = input.composite,
            outcome = ?outcome.decision.outcome,
            reason = %outcome.decision.reason,
            "Decision emitted"
        );
        self.append(DecisionRecord::Decision(outcome.decision.clone()))
            .await;

        let Some(token) = outcome.reservation else {
            return;
        };
        debug_assert_eq!(outcome.decision.outcome, DecisionOutcome::Execute);

        let correlation_group = self
            .config
            .risk
            .correlation_groups
            .get(&instrument)
            .cloned()
            .unwrap_or_default();
        match self
            .coordinator
            .execute_entry(&outcome.decision, token, correlation_group.clone())
            .await
        {
            Ok(fill) => {
                self.append(DecisionRecord::Executed {
                    instrument,
                    fill,
                    size_pct: outcome.decision.size_pct,
                    stop_loss: outcome.decision.stop_loss,
                    correlation_group,
                })
                .await;
            }
            // Entries are never retried; the cycle ends here and the
            // next tick starts from a clean ledger.
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Entry execution failed");
                self.append(DecisionRecord::ExecuteFailed {
                    instrument,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                })
                .await;
            }
        }
    }

    /// Checks every open position against its stop level. A triggered
    /// stop is closed through the normal reservation protocol; if the
    /// ledger is busy the close waits for the next monitoring pass.
    async fn monitor_positions(&self) {
        for position in self.ledger.snapshot().open_positions {
            let price = match self.broker.last_price(&position.instrument).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(instrument = %position.instrument, error = %e, "No quote while monitoring");
                    continue;
                }
            };
            if !position.stop_triggered(price) {
                continue;
            }
            info!(
                instrument = %position.instrument,
                price = %price,
                stop = %position.stop_loss,
                "Stop-loss triggered"
            );

            let token = match self
                .ledger
                .reserve(&Candidate::close(position.instrument.as_str()), Utc::now())
            {
                Ok(token) => token,
                Err(RiskError::Busy) => {
                    warn!(
                        instrument = %position.instrument,
                        "Stop hit while risk capacity is busy; retrying next pass"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(instrument = %position.instrument, error = %e, "Stop close rejected");
                    continue;
                }
            };
            match self.coordinator.close_position(&position, token).await {
                Ok((_fill, pnl)) => {
                    self.append(DecisionRecord::Closed {
                        instrument: position.instrument.clone(),
                        realized_pnl: pnl,
                        timestamp: Utc::now(),
                    })
                    .await;
                }
                Err(e) => {
                    warn!(instrument = %position.instrument, error = %e, "Stop close failed");
                }
            }
        }
    }

    /// Crosses the forced-close boundary: the marker is logged first so
    /// a crash mid-flatten still replays into a latched day, then every
    /// open position is flattened. If any position survives the retry
    /// budget, new entries are halted and the failure is escalated.
    async fn enter_forced_close(&mut self, at: DateTime<Utc>) {
        self.append(DecisionRecord::ForcedCloseEntered { timestamp: at })
            .await;
        match self.coordinator.flatten_all().await {
            Ok(closed) => {
                for (instrument, pnl) in closed {
                    self.append(DecisionRecord::Closed {
                        instrument,
                        realized_pnl: pnl,
                        timestamp: Utc::now(),
                    })
                    .await;
                }
                info!("End-of-day flattening complete");
            }
            Err(e) => {
                error!(error = %e, "End-of-day flattening incomplete; operator action required");
                self.ledger.halt_new_entries();
                self.flatten_failure = Some(e.to_string());
            }
        }
    }

    /// The log is the audit trail, not the control path: a failed
    /// append is reported but never stops trading.
    async fn append(&self, record: DecisionRecord) {
        if let Err(e) = self.log.append(&record).await {
            warn!(error = %e, "Decision log append failed");
        }
    }
}

fn day_from_config(session: &SessionConfig, date: chrono::NaiveDate) -> TradingDay {
    TradingDay::new(
        date,
        session.active_start,
        session.eod_closure_time,
        session.close_time,
    )
}
