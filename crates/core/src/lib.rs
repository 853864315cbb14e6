pub mod config;
pub mod config_loader;
pub mod decision;
pub mod order;
pub mod session;
pub mod signal;
pub mod traits;

pub use config::{
    AppConfig, ConfigError, ExecutionConfig, RiskConfig, SessionConfig, SignalConfig,
};
pub use config_loader::ConfigLoader;
pub use decision::{DecisionOutcome, DecisionRecord, TradeDecision};
pub use order::{Fill, FillStatus, OrderIntent, OrderType, Position, Side};
pub use session::{Phase, TradingDay};
pub use signal::{CompositeInput, SignalScore, SignalSource, SourceContribution};
pub use traits::{BrokerClient, DecisionLog, Scorer};
