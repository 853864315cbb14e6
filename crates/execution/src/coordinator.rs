use crate::error::{ExecutionError, FlattenError};
use chrono::Utc;
use intraday_core::{
    BrokerClient, ExecutionConfig, Fill, FillStatus, OrderIntent, OrderType, Position, Side,
    TradeDecision,
};
use intraday_risk::{ReservationToken, RiskLedger};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

/// Turns approved decisions into broker orders and settles the ledger
/// reservation either way.
///
/// Two distinct retry policies apply. Entries are fire-once: a failed or
/// timed-out entry releases its reservation and is reported, never
/// retried. Flattening is retried with backoff because an unflattened
/// position past the cutoff is the one state the system must not end
/// the day in.
pub struct ExecutionCoordinator {
    broker: Arc<dyn BrokerClient>,
    ledger: Arc<RiskLedger>,
    config: ExecutionConfig,
}

impl ExecutionCoordinator {
    #[must_use]
    pub fn new(broker: Arc<dyn BrokerClient>, ledger: Arc<RiskLedger>, config: ExecutionConfig) -> Self {
        Self {
            broker,
            ledger,
            config,
        }
    }

    /// Executes an approved entry decision, holding `token` until the
    /// order settles.
    ///
    /// Places a market order, polls for the fill, and commits the
    /// resulting position against the reservation. Any failure or
    /// timeout releases the token first.
    ///
    /// # Errors
    /// [`ExecutionError`] describing where the order path failed.
    pub async fn execute_entry(
        &self,
        decision: &TradeDecision,
        token: ReservationToken,
        correlation_group: String,
    ) -> Result<Fill, ExecutionError> {
        let price = match self.broker.last_price(&decision.instrument).await {
            Ok(price) => price,
            Err(e) => {
                self.ledger.release(token);
                return Err(ExecutionError::Broker(e.to_string()));
            }
        };

        let capital = self.ledger.snapshot().capital;
        let quantity = (capital * decision.size_pct / Decimal::ONE_HUNDRED / price).floor();
        if quantity <= Decimal::ZERO {
            self.ledger.release(token);
            return Err(ExecutionError::PlacementFailed {
                instrument: decision.instrument.clone(),
                reason: format!("size {}% yields zero quantity at price {price}", decision.size_pct),
            });
        }

        let intent = OrderIntent {
            instrument: decision.instrument.clone(),
            side: Side::Buy,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
            timestamp: Utc::now(),
        };

        let order_id = match self.broker.place_order(&intent).await {
            Ok(id) => id,
            Err(e) => {
                self.ledger.release(token);
                return Err(ExecutionError::PlacementFailed {
                    instrument: decision.instrument.clone(),
                    reason: e.to_string(),
                });
            }
        };
        info!(
            instrument = %decision.instrument,
            order_id = %order_id,
            quantity = %quantity,
            "Entry order placed"
        );

        let fill = match self.await_fill(&order_id).await {
            Ok(fill) => fill,
            Err(e) => {
                self.ledger.release(token);
                return Err(e);
            }
        };

        let position = Position {
            instrument: decision.instrument.clone(),
            quantity: fill.quantity,
            entry_price: fill.avg_price,
            size_pct: decision.size_pct,
            correlation_group,
            stop_loss: decision.stop_loss,
            opened_at: fill.timestamp,
        };
        self.ledger.commit_entry(token, position, &fill)?;
        Ok(fill)
    }

    /// Closes an open position under an already-held reservation (the
    /// stop-loss path). Returns the fill and the realized P&L.
    ///
    /// # Errors
    /// [`ExecutionError`]; the token is released on any failure.
    pub async fn close_position(
        &self,
        position: &Position,
        token: ReservationToken,
    ) -> Result<(Fill, Decimal), ExecutionError> {
        match self.place_and_await_close(position).await {
            Ok(fill) => {
                let pnl = self
                    .ledger
                    .commit_close(token, &position.instrument, fill.avg_price)?;
                Ok((fill, pnl))
            }
            Err(e) => {
                self.ledger.release(token);
                Err(e)
            }
        }
    }

    /// Flattens every open position, retrying each up to the configured
    /// limit with backoff between attempts. Positions that survive all
    /// attempts are returned in [`FlattenError`] for escalation.
    ///
    /// Runs outside the reservation protocol: by the time this is
    /// called, new-trade acceptance has already stopped.
    ///
    /// # Errors
    /// [`FlattenError`] listing every instrument still open.
    pub async fn flatten_all(&self) -> Result<Vec<(String, Decimal)>, FlattenError> {
        let positions = self.ledger.snapshot().open_positions;
        if positions.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = positions.len(), "Flattening all open positions");

        let mut closed = Vec::new();
        let mut failed = Vec::new();
        for position in positions {
            match self.flatten_one(&position).await {
                Ok(pnl) => closed.push((position.instrument.clone(), pnl)),
                Err(reason) => {
                    error!(
                        instrument = %position.instrument,
                        reason = %reason,
                        "Position could not be flattened"
                    );
                    failed.push((position.instrument.clone(), reason));
                }
            }
        }

        if failed.is_empty() {
            Ok(closed)
        } else {
            Err(FlattenError { failed })
        }
    }

    async fn flatten_one(&self, position: &Position) -> Result<Decimal, String> {
        let attempts = self.config.flatten_max_retries.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.place_and_await_close(position).await {
                Ok(fill) => {
                    let pnl = self
                        .ledger
                        .flatten_close(&position.instrument, fill.avg_price)
                        .map_err(|e| e.to_string())?;
                    return Ok(pnl);
                }
                Err(e) => {
                    warn!(
                        instrument = %position.instrument,
                        attempt,
                        error = %e,
                        "Flatten attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        sleep(Duration::from_secs(self.config.flatten_backoff_secs)).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn place_and_await_close(&self, position: &Position) -> Result<Fill, ExecutionError> {
        let intent = OrderIntent {
            instrument: position.instrument.clone(),
            side: Side::Sell,
            quantity: position.quantity,
            order_type: OrderType::Market,
            limit_price: None,
            timestamp: Utc::now(),
        };
        let order_id = self
            .broker
            .place_order(&intent)
            .await
            .map_err(|e| ExecutionError::PlacementFailed {
                instrument: position.instrument.clone(),
                reason: e.to_string(),
            })?;
        self.await_fill(&order_id).await
    }

    /// Polls the broker until the order fills or the timeout elapses.
    /// On timeout the order is cancelled before the error is returned.
    async fn await_fill(&self, order_id: &str) -> Result<Fill, ExecutionError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.fill_timeout_secs);
        loop {
            match self.broker.fill_status(order_id).await {
                Ok(FillStatus::Filled(fill)) => return Ok(fill),
                Ok(FillStatus::Pending) => {}
                Err(e) => return Err(ExecutionError::Broker(e.to_string())),
            }
            if Instant::now() >= deadline {
                if let Err(e) = self.broker.cancel_order(order_id).await {
                    warn!(order_id, error = %e, "Cancel after fill timeout failed");
                }
                return Err(ExecutionError::FillTimeout {
                    order_id: order_id.to_string(),
                    timeout_secs: self.config.fill_timeout_secs,
                });
            }
            sleep(Duration::from_secs(self.config.fill_poll_interval_secs)).await;
        }
    }
}
