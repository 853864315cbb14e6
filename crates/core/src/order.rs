use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side that closes a position opened on this side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// An order intent submitted to the broker collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub instrument: String,
    pub side: Side,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// A confirmed (possibly partial) fill reported by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub instrument: String,
    pub side: Side,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Broker-reported status of a submitted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FillStatus {
    Pending,
    Filled(Fill),
}

/// An open position. Owned exclusively by the Risk Ledger; the broker's
/// open-positions query is the source of truth on restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    /// Size as a percentage of capital at entry (0–100).
    pub size_pct: Decimal,
    /// Sector/group id for correlation limits.
    pub correlation_group: String,
    pub stop_loss: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Realized P&L if the position were closed at `price`.
    #[must_use]
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.quantity
    }

    /// Whether `price` has crossed the stop-loss level for a long position.
    #[must_use]
    pub fn stop_triggered(&self, price: Decimal) -> bool {
        self.stop_loss > Decimal::ZERO && price <= self.stop_loss
    }
}
