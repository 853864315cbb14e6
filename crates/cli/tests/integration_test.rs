use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intraday_core::{BrokerClient, ConfigLoader, DecisionLog, Scorer, SignalScore, SignalSource};
use intraday_execution::PaperBroker;
use intraday_orchestrator::{MemoryDecisionLog, Orchestrator};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct FlatScorer {
    source: SignalSource,
}

#[async_trait]
impl Scorer for FlatScorer {
    fn source(&self) -> SignalSource {
        self.source
    }

    async fn score(&self, _instrument: &str, as_of: DateTime<Utc>) -> Result<SignalScore> {
        Ok(SignalScore {
            source: self.source,
            value: 5.0,
            confidence: 0.8,
            timestamp: as_of,
            stale_after: Duration::from_secs(300),
        })
    }
}

#[tokio::test]
async fn config_file_feeds_a_runnable_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Config.toml");
    std::fs::write(
        &path,
        r#"
[session]
instrument = "RELIANCE"

[risk]
min_signal_score = 6.5
max_daily_trades = 2

[execution]
dry_run = true
"#,
    )
    .unwrap();

    let config = ConfigLoader::load(path.to_str().unwrap()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.session.instrument, "RELIANCE");
    assert_eq!(config.risk.max_daily_trades, 2);
    // Unspecified fields keep their defaults.
    assert_eq!(config.risk.cooldown_minutes, 60);

    let broker = Arc::new(PaperBroker::new());
    broker.set_price("RELIANCE", Decimal::from(2500));
    let log = Arc::new(MemoryDecisionLog::new());
    let scorers: Vec<Box<dyn Scorer>> = SignalSource::ALL
        .into_iter()
        .map(|source| Box::new(FlatScorer { source }) as Box<dyn Scorer>)
        .collect();

    let (tx, rx) = mpsc::channel(1);
    let orchestrator = Orchestrator::start(
        config,
        scorers,
        broker as Arc<dyn BrokerClient>,
        log as Arc<dyn DecisionLog>,
        &[],
        rx,
    )
    .await
    .unwrap();

    // A queued shutdown makes the session loop exit on its first wake.
    tx.send(()).await.unwrap();
    orchestrator.run().await.unwrap();
}
