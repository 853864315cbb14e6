use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use intraday_core::{Scorer, SignalScore};
use std::time::Duration;
use tracing::warn;

/// Fetches all scorers concurrently, each under its own timeout, and joins
/// the results before aggregation runs (fan-out/fan-in, no partial
/// re-entry downstream).
///
/// A timed-out or errored scorer is simply absent from the result; the
/// aggregator treats it as a missing source.
pub async fn fetch_scores(
    scorers: &[Box<dyn Scorer>],
    instrument: &str,
    as_of: DateTime<Utc>,
    timeout: Duration,
) -> Vec<SignalScore> {
    let futures = scorers.iter().map(|scorer| async move {
        match tokio::time::timeout(timeout, scorer.score(instrument, as_of)).await {
            Ok(Ok(score)) => Some(score),
            Ok(Err(e)) => {
                warn!(source = %scorer.source(), error = %e, "Scorer failed");
                None
            }
            Err(_) => {
                warn!(source = %scorer.source(), timeout = ?timeout, "Scorer timed out");
                None
            }
        }
    });

    join_all(futures).await.into_iter().flatten().collect()
}
