use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The fixed set of independent signal sources.
///
/// Adding a source means adding a variant here plus a weight entry in
/// `SignalConfig` — there is no open-ended hierarchy behind this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    MarketContext,
    Technical,
    Sentiment,
}

impl SignalSource {
    pub const ALL: [Self; 3] = [Self::MarketContext, Self::Technical, Self::Sentiment];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarketContext => "market_context",
            Self::Technical => "technical",
            Self::Sentiment => "sentiment",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scorer's output for a single cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalScore {
    pub source: SignalSource,
    /// Score in `[0, 10]`.
    pub value: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    /// A score older than this is treated as missing.
    #[serde(with = "duration_secs")]
    pub stale_after: Duration,
}

impl SignalScore {
    /// Returns true when the score has aged past its `stale_after` window.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.timestamp);
        age > chrono::Duration::from_std(self.stale_after).unwrap_or(chrono::Duration::MAX)
    }
}

/// Contribution of one source to the composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceContribution {
    pub source: SignalSource,
    pub value: f64,
    pub confidence: f64,
    /// The weight actually applied after renormalization over the
    /// available sources.
    pub normalized_weight: f64,
}

/// The Signal Aggregator's output for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeInput {
    /// Weighted composite score in `[0, 10]`, rounded to one decimal.
    /// Zero and `degraded` when no usable source was available.
    pub composite: f64,
    pub contributions: Vec<SourceContribution>,
    /// Mean confidence over the sources that contributed.
    pub confidence_avg: f64,
    /// Set when one or more sources were missing, stale, or below the
    /// confidence floor (weights were renormalized over the rest).
    pub degraded: bool,
}

impl CompositeInput {
    /// A composite with no usable sources. Always rejected by the gate.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            composite: 0.0,
            contributions: Vec::new(),
            confidence_avg: 0.0,
            degraded: true,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_uses_the_score_window() {
        let score = SignalScore {
            source: SignalSource::Technical,
            value: 8.0,
            confidence: 0.9,
            timestamp: Utc::now() - chrono::Duration::seconds(120),
            stale_after: Duration::from_secs(300),
        };
        assert!(!score.is_stale(Utc::now()));

        let old = SignalScore {
            timestamp: Utc::now() - chrono::Duration::seconds(600),
            ..score
        };
        assert!(old.is_stale(Utc::now()));
    }

    #[test]
    fn empty_composite_is_degraded() {
        let input = CompositeInput::empty();
        assert!(input.degraded);
        assert_eq!(input.composite, 0.0);
        assert!(input.contributions.is_empty());
    }

    #[test]
    fn source_serde_uses_snake_case() {
        let json = serde_json::to_string(&SignalSource::MarketContext).unwrap();
        assert_eq!(json, "\"market_context\"");
    }
}
