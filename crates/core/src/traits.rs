use crate::decision::DecisionRecord;
use crate::order::{FillStatus, OrderIntent, Position};
use crate::signal::{SignalScore, SignalSource};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// One independent scoring collaborator. Must be idempotent and
/// side-effect-free; the core only consumes its numeric output.
#[async_trait]
pub trait Scorer: Send + Sync {
    fn source(&self) -> SignalSource;

    async fn score(&self, instrument: &str, as_of: DateTime<Utc>) -> Result<SignalScore>;
}

/// The broker collaborator. A remote service with its own auth and rate
/// limits; every call the core makes carries an explicit timeout.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn place_order(&self, intent: &OrderIntent) -> Result<String>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Authoritative open positions. The source of truth on restart is
    /// always the broker, never the in-memory ledger alone.
    async fn open_positions(&self) -> Result<Vec<Position>>;

    async fn fill_status(&self, order_id: &str) -> Result<FillStatus>;

    /// Last traded price, used by the stop-loss monitor.
    async fn last_price(&self, instrument: &str) -> Result<Decimal>;
}

/// Append-only decision/trade log. No read path is required by the core;
/// replay at startup is a pure fold over previously appended records.
#[async_trait]
pub trait DecisionLog: Send + Sync {
    async fn append(&self, record: &DecisionRecord) -> Result<()>;
}
