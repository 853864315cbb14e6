//! Deterministic stand-in scorers for dry runs. Real deployments wire
//! their own `Scorer` implementations; these exist so a paper session
//! produces a realistic mix of decisions.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intraday_core::{Scorer, SignalScore, SignalSource};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

struct DemoScorer {
    source: SignalSource,
}

#[async_trait]
impl Scorer for DemoScorer {
    fn source(&self) -> SignalSource {
        self.source
    }

    async fn score(&self, instrument: &str, as_of: DateTime<Utc>) -> Result<SignalScore> {
        // Stable within a minute so repeated fetches in one cycle agree.
        let mut hasher = DefaultHasher::new();
        self.source.as_str().hash(&mut hasher);
        instrument.hash(&mut hasher);
        (as_of.timestamp() / 60).hash(&mut hasher);
        let seed = hasher.finish();

        let value = 4.0 + (seed % 600) as f64 / 100.0;
        let confidence = 0.6 + (seed % 35) as f64 / 100.0;
        Ok(SignalScore {
            source: self.source,
            value,
            confidence,
            timestamp: as_of,
            stale_after: Duration::from_secs(300),
        })
    }
}

/// One demo scorer per source.
#[must_use]
pub fn scorers() -> Vec<Box<dyn Scorer>> {
    SignalSource::ALL
        .into_iter()
        .map(|source| Box::new(DemoScorer { source }) as Box<dyn Scorer>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[tokio::test]
    async fn scores_are_stable_within_a_minute_and_in_range() {
        let scorer = DemoScorer {
            source: SignalSource::Technical,
        };
        let now = Utc::now().with_nanosecond(0).unwrap();
        let a = scorer.score("NIFTYBEES", now).await.unwrap();
        let b = scorer.score("NIFTYBEES", now).await.unwrap();
        assert_eq!(a.value, b.value);
        assert!((4.0..10.0).contains(&a.value));
        assert!((0.6..=0.95).contains(&a.confidence));
    }
}
