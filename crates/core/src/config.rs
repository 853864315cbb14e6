use crate::signal::SignalSource;
use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Configuration problems are fatal at startup, never at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("signal weights sum to {sum:.6}, expected 1.0")]
    WeightsNotNormalized { sum: f64 },

    #[error("missing weight for signal source {0}")]
    MissingWeight(SignalSource),

    #[error("{field} = {value} is out of range ({expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("session boundaries out of order: {0}")]
    SessionOrder(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub signals: SignalConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub instrument: String,
    pub active_start: NaiveTime,
    /// Mandatory end-of-day flattening boundary.
    pub eod_closure_time: NaiveTime,
    pub close_time: NaiveTime,
    /// Decision-cycle cadence during the active window (1–5 minutes).
    pub tick_interval_minutes: u32,
    pub monitoring_interval_minutes: u32,
    /// No new entries within this many minutes after the open.
    pub opening_blackout_minutes: u32,
    /// No new entries within this many minutes before the cutoff.
    pub closing_blackout_minutes: u32,
    /// Scheduled event windows (earnings, macro releases) that block entries.
    #[serde(default)]
    pub event_blackouts: Vec<EventBlackout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBlackout {
    pub instrument: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub starting_capital: Decimal,
    pub min_signal_score: f64,
    pub max_daily_trades: u32,
    /// Daily loss limit as a percentage of starting capital.
    pub daily_loss_limit_pct: Decimal,
    /// Per-position cap as a percentage of capital.
    pub max_position_pct: Decimal,
    pub cooldown_minutes: u32,
    pub correlation_threshold: Decimal,
    /// Regime flag; halves the base position size when set.
    pub high_volatility: bool,
    /// Instrument → correlation group (sector) id.
    #[serde(default)]
    pub correlation_groups: HashMap<String, String>,
    /// Stop-loss distance as a percentage below entry.
    pub stop_loss_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Source weights; must sum to 1 over the full source set.
    pub weights: HashMap<SignalSource, f64>,
    /// A source below this confidence is treated as missing.
    pub confidence_floor: f64,
    pub stale_after_secs: u64,
    pub scorer_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub fill_timeout_secs: u64,
    pub fill_poll_interval_secs: u64,
    pub flatten_max_retries: u32,
    pub flatten_backoff_secs: u64,
    /// Paper broker instead of a live broker client.
    pub dry_run: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            instrument: "NIFTYBEES".to_string(),
            active_start: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            eod_closure_time: NaiveTime::from_hms_opt(15, 15, 0).unwrap(),
            close_time: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            tick_interval_minutes: 5,
            monitoring_interval_minutes: 5,
            opening_blackout_minutes: 15,
            closing_blackout_minutes: 30,
            event_blackouts: Vec::new(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            starting_capital: Decimal::new(100_000, 0),
            min_signal_score: 7.0,
            max_daily_trades: 3,
            daily_loss_limit_pct: Decimal::new(3, 0),
            max_position_pct: Decimal::new(20, 0),
            cooldown_minutes: 60,
            correlation_threshold: Decimal::new(7, 1),
            high_volatility: false,
            correlation_groups: HashMap::new(),
            stop_loss_pct: Decimal::new(2, 0),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert(SignalSource::MarketContext, 0.4);
        weights.insert(SignalSource::Technical, 0.4);
        weights.insert(SignalSource::Sentiment, 0.2);
        Self {
            weights,
            confidence_floor: 0.3,
            stale_after_secs: 300,
            scorer_timeout_secs: 30,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fill_timeout_secs: 60,
            fill_poll_interval_secs: 2,
            flatten_max_retries: 3,
            flatten_backoff_secs: 5,
            dry_run: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            risk: RiskConfig::default(),
            signals: SignalConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Validates the configuration. Called once at startup; any error here
    /// aborts the process before the session begins.
    ///
    /// # Errors
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for source in SignalSource::ALL {
            if !self.signals.weights.contains_key(&source) {
                return Err(ConfigError::MissingWeight(source));
            }
        }
        let sum: f64 = self.signals.weights.values().sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(ConfigError::WeightsNotNormalized { sum });
        }

        if !(0.0..=10.0).contains(&self.risk.min_signal_score) {
            return Err(ConfigError::OutOfRange {
                field: "risk.min_signal_score",
                value: self.risk.min_signal_score.to_string(),
                expected: "0..=10",
            });
        }
        if !(0.0..=1.0).contains(&self.signals.confidence_floor) {
            return Err(ConfigError::OutOfRange {
                field: "signals.confidence_floor",
                value: self.signals.confidence_floor.to_string(),
                expected: "0..=1",
            });
        }
        if self.risk.max_position_pct <= Decimal::ZERO
            || self.risk.max_position_pct > Decimal::new(100, 0)
        {
            return Err(ConfigError::OutOfRange {
                field: "risk.max_position_pct",
                value: self.risk.max_position_pct.to_string(),
                expected: "(0, 100]",
            });
        }
        if self.risk.daily_loss_limit_pct <= Decimal::ZERO {
            return Err(ConfigError::OutOfRange {
                field: "risk.daily_loss_limit_pct",
                value: self.risk.daily_loss_limit_pct.to_string(),
                expected: "> 0",
            });
        }
        if self.risk.correlation_threshold <= Decimal::ZERO
            || self.risk.correlation_threshold > Decimal::ONE
        {
            return Err(ConfigError::OutOfRange {
                field: "risk.correlation_threshold",
                value: self.risk.correlation_threshold.to_string(),
                expected: "(0, 1]",
            });
        }
        if self.risk.max_daily_trades == 0 {
            return Err(ConfigError::OutOfRange {
                field: "risk.max_daily_trades",
                value: "0".to_string(),
                expected: ">= 1",
            });
        }
        if !(1..=5).contains(&self.session.tick_interval_minutes) {
            return Err(ConfigError::OutOfRange {
                field: "session.tick_interval_minutes",
                value: self.session.tick_interval_minutes.to_string(),
                expected: "1..=5",
            });
        }

        if self.session.active_start >= self.session.eod_closure_time {
            return Err(ConfigError::SessionOrder(format!(
                "active_start {} must precede eod_closure_time {}",
                self.session.active_start, self.session.eod_closure_time
            )));
        }
        if self.session.eod_closure_time >= self.session.close_time {
            return Err(ConfigError::SessionOrder(format!(
                "eod_closure_time {} must precede close_time {}",
                self.session.eod_closure_time, self.session.close_time
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn unnormalized_weights_are_rejected() {
        let mut config = AppConfig::default();
        config
            .signals
            .weights
            .insert(SignalSource::Sentiment, 0.5);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::WeightsNotNormalized { .. }));
    }

    #[test]
    fn missing_source_weight_is_rejected() {
        let mut config = AppConfig::default();
        config.signals.weights.remove(&SignalSource::Technical);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingWeight(SignalSource::Technical)
        ));
    }

    #[test]
    fn session_order_is_enforced() {
        let mut config = AppConfig::default();
        config.session.eod_closure_time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::SessionOrder(_)));
    }

    #[test]
    fn tick_cadence_must_be_within_window() {
        let mut config = AppConfig::default();
        config.session.tick_interval_minutes = 30;
        assert!(config.validate().is_err());
    }
}
