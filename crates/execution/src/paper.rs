use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use intraday_core::{BrokerClient, Fill, FillStatus, OrderIntent, Position, Side};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::info;

/// In-process broker for dry runs. Makes zero network calls: orders
/// fill instantly at the last set price, and the position book is kept
/// locally so restart recovery can be exercised against it.
pub struct PaperBroker {
    state: Mutex<PaperState>,
}

#[derive(Default)]
struct PaperState {
    prices: std::collections::HashMap<String, Decimal>,
    fills: std::collections::HashMap<String, Fill>,
    positions: std::collections::HashMap<String, Position>,
    next_id: u64,
    fail_next_order: bool,
}

impl PaperBroker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PaperState::default()),
        }
    }

    /// Sets the quote every subsequent order and price query sees.
    pub fn set_price(&self, instrument: &str, price: Decimal) {
        self.state.lock().prices.insert(instrument.to_string(), price);
    }

    /// Makes the next `place_order` call fail once.
    pub fn fail_next_order(&self) {
        self.state.lock().fail_next_order = true;
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for PaperBroker {
    async fn place_order(&self, intent: &OrderIntent) -> Result<String> {
        let mut state = self.state.lock();
        if state.fail_next_order {
            state.fail_next_order = false;
            bail!("simulated order rejection");
        }

        let price = *state
            .prices
            .get(&intent.instrument)
            .ok_or_else(|| anyhow!("no quote for {}", intent.instrument))?;

        state.next_id += 1;
        let order_id = format!("paper-{}", state.next_id);
        let fill = Fill {
            order_id: order_id.clone(),
            instrument: intent.instrument.clone(),
            side: intent.side,
            quantity: intent.quantity,
            avg_price: price,
            timestamp: Utc::now(),
        };

        match intent.side {
            Side::Buy => {
                state.positions.insert(
                    intent.instrument.clone(),
                    Position {
                        instrument: intent.instrument.clone(),
                        quantity: intent.quantity,
                        entry_price: price,
                        size_pct: Decimal::ZERO,
                        correlation_group: String::new(),
                        stop_loss: Decimal::ZERO,
                        opened_at: fill.timestamp,
                    },
                );
            }
            Side::Sell => {
                state.positions.remove(&intent.instrument);
            }
        }

        info!(
            order_id = %order_id,
            instrument = %intent.instrument,
            side = ?intent.side,
            quantity = %intent.quantity,
            price = %price,
            "Paper order filled"
        );
        state.fills.insert(order_id.clone(), fill);
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        // Paper orders fill instantly, so there is never anything to cancel.
        self.state.lock().fills.remove(order_id);
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<Position>> {
        Ok(self.state.lock().positions.values().cloned().collect())
    }

    async fn fill_status(&self, order_id: &str) -> Result<FillStatus> {
        self.state
            .lock()
            .fills
            .get(order_id)
            .map(|fill| FillStatus::Filled(fill.clone()))
            .ok_or_else(|| anyhow!("unknown order {order_id}"))
    }

    async fn last_price(&self, instrument: &str) -> Result<Decimal> {
        self.state
            .lock()
            .prices
            .get(instrument)
            .copied()
            .ok_or_else(|| anyhow!("no quote for {instrument}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intraday_core::OrderType;
    use rust_decimal_macros::dec;

    fn buy(instrument: &str, quantity: Decimal) -> OrderIntent {
        OrderIntent {
            instrument: instrument.to_string(),
            side: Side::Buy,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn orders_fill_at_the_set_price() {
        let broker = PaperBroker::new();
        broker.set_price("NIFTYBEES", dec!(250));

        let order_id = broker.place_order(&buy("NIFTYBEES", dec!(40))).await.unwrap();
        let status = broker.fill_status(&order_id).await.unwrap();
        let FillStatus::Filled(fill) = status else {
            panic!("expected a fill");
        };
        assert_eq!(fill.avg_price, dec!(250));
        assert_eq!(broker.open_positions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn selling_clears_the_position_book() {
        let broker = PaperBroker::new();
        broker.set_price("NIFTYBEES", dec!(250));
        broker.place_order(&buy("NIFTYBEES", dec!(40))).await.unwrap();

        let sell = OrderIntent {
            side: Side::Sell,
            ..buy("NIFTYBEES", dec!(40))
        };
        broker.place_order(&sell).await.unwrap();
        assert!(broker.open_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unquoted_instrument_is_rejected() {
        let broker = PaperBroker::new();
        assert!(broker.place_order(&buy("UNKNOWN", dec!(1))).await.is_err());
        assert!(broker.last_price("UNKNOWN").await.is_err());
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let broker = PaperBroker::new();
        broker.set_price("NIFTYBEES", dec!(250));
        broker.fail_next_order();
        assert!(broker.place_order(&buy("NIFTYBEES", dec!(1))).await.is_err());
        assert!(broker.place_order(&buy("NIFTYBEES", dec!(1))).await.is_ok());
    }
}
