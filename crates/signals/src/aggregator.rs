use chrono::{DateTime, Utc};
use intraday_core::{CompositeInput, SignalConfig, SignalScore, SignalSource, SourceContribution};
use tracing::debug;

/// Combines the available per-source scores into one composite input.
///
/// A source is unusable when it is absent, stale, or below the configured
/// confidence floor; its weight is redistributed proportionally over the
/// remaining sources and the result is flagged `degraded`. With zero
/// usable sources the composite is 0.0 and `degraded` — the gate rejects
/// that by construction.
///
/// The composite is rounded to one decimal. The approval comparison
/// against the threshold lives in the Risk Gate as a single inclusive
/// check; nothing here biases the boundary.
#[must_use]
pub fn aggregate(
    scores: &[SignalScore],
    config: &SignalConfig,
    now: DateTime<Utc>,
) -> CompositeInput {
    let usable: Vec<&SignalScore> = scores
        .iter()
        .filter(|s| {
            if s.is_stale(now) {
                debug!(source = %s.source, age_ok = false, "Dropping stale score");
                return false;
            }
            if s.confidence < config.confidence_floor {
                debug!(
                    source = %s.source,
                    confidence = s.confidence,
                    floor = config.confidence_floor,
                    "Dropping low-confidence score"
                );
                return false;
            }
            true
        })
        .collect();

    if usable.is_empty() {
        return CompositeInput::empty();
    }

    let degraded = usable.len() < SignalSource::ALL.len();

    let weight_sum: f64 = usable
        .iter()
        .map(|s| config.weights.get(&s.source).copied().unwrap_or(0.0))
        .sum();
    if weight_sum <= 0.0 {
        return CompositeInput::empty();
    }

    let mut composite = 0.0;
    let mut confidence_sum = 0.0;
    let mut contributions = Vec::with_capacity(usable.len());
    for score in &usable {
        let weight = config.weights.get(&score.source).copied().unwrap_or(0.0);
        let normalized = weight / weight_sum;
        composite += score.value * normalized;
        confidence_sum += score.confidence;
        contributions.push(SourceContribution {
            source: score.source,
            value: score.value,
            confidence: score.confidence,
            normalized_weight: normalized,
        });
    }

    CompositeInput {
        composite: (composite * 10.0).round() / 10.0,
        contributions,
        confidence_avg: confidence_sum / usable.len() as f64,
        degraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn score(source: SignalSource, value: f64, confidence: f64) -> SignalScore {
        SignalScore {
            source,
            value,
            confidence,
            timestamp: Utc::now(),
            stale_after: Duration::from_secs(300),
        }
    }

    fn config() -> SignalConfig {
        SignalConfig::default()
    }

    #[test]
    fn full_coverage_weights_apply_directly() {
        let scores = vec![
            score(SignalSource::MarketContext, 8.0, 0.9),
            score(SignalSource::Technical, 7.0, 0.8),
            score(SignalSource::Sentiment, 6.0, 0.7),
        ];
        let input = aggregate(&scores, &config(), Utc::now());
        // 8*0.4 + 7*0.4 + 6*0.2 = 7.2
        assert_eq!(input.composite, 7.2);
        assert!(!input.degraded);
        assert!((input.confidence_avg - 0.8).abs() < 1e-9);
    }

    #[test]
    fn missing_source_renormalizes_and_degrades() {
        let scores = vec![
            score(SignalSource::MarketContext, 8.0, 0.9),
            score(SignalSource::Technical, 7.0, 0.8),
        ];
        let input = aggregate(&scores, &config(), Utc::now());
        // weights 0.4/0.4 renormalize to 0.5/0.5 -> 7.5
        assert_eq!(input.composite, 7.5);
        assert!(input.degraded);
        assert_eq!(input.contributions.len(), 2);
        for c in &input.contributions {
            assert!((c.normalized_weight - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn stale_source_is_treated_as_missing() {
        let mut stale = score(SignalSource::Sentiment, 9.0, 0.9);
        stale.timestamp = Utc::now() - chrono::Duration::seconds(600);
        let scores = vec![
            score(SignalSource::MarketContext, 8.0, 0.9),
            score(SignalSource::Technical, 8.0, 0.9),
            stale,
        ];
        let input = aggregate(&scores, &config(), Utc::now());
        assert!(input.degraded);
        assert_eq!(input.composite, 8.0);
    }

    #[test]
    fn below_floor_confidence_is_treated_as_missing() {
        let scores = vec![
            score(SignalSource::MarketContext, 8.0, 0.9),
            score(SignalSource::Technical, 2.0, 0.1),
        ];
        let input = aggregate(&scores, &config(), Utc::now());
        assert!(input.degraded);
        assert_eq!(input.composite, 8.0);
    }

    #[test]
    fn zero_sources_yield_degraded_zero() {
        let input = aggregate(&[], &config(), Utc::now());
        assert!(input.degraded);
        assert_eq!(input.composite, 0.0);
    }

    #[test]
    fn composite_rounds_to_one_decimal() {
        let scores = vec![
            score(SignalSource::MarketContext, 6.9, 0.9),
            score(SignalSource::Technical, 7.0, 0.9),
            score(SignalSource::Sentiment, 7.2, 0.9),
        ];
        let input = aggregate(&scores, &config(), Utc::now());
        // 6.9*0.4 + 7.0*0.4 + 7.2*0.2 = 7.0
        assert_eq!(input.composite, 7.0);
    }
}
