use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use intraday_core::{AppConfig, BrokerClient, ConfigLoader, DecisionLog};
use intraday_execution::PaperBroker;
use intraday_orchestrator::{JsonlDecisionLog, Orchestrator};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

mod demo;

#[derive(Parser)]
#[command(name = "intraday")]
#[command(about = "Intraday decision orchestration and risk enforcement", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading session for today
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Validate the configuration and exit
    CheckConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::CheckConfig { config } => check_config(&config),
    }
}

async fn run(config_path: &str) -> Result<()> {
    let config = load(config_path)?;
    if !config.execution.dry_run {
        bail!(
            "no live broker client is wired in this build; set execution.dry_run = true \
             to run against the paper broker"
        );
    }

    let broker = Arc::new(PaperBroker::new());
    // The paper broker needs a quote to fill against.
    broker.set_price(&config.session.instrument, Decimal::from(250));

    let log_path = format!("decisions-{}.jsonl", Utc::now().date_naive());
    let history = JsonlDecisionLog::replay(&log_path)?;
    if !history.is_empty() {
        info!(records = history.len(), path = %log_path, "Resuming from today's decision log");
    }
    let log: Arc<dyn DecisionLog> = Arc::new(JsonlDecisionLog::open(&log_path)?);

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    let orchestrator = Orchestrator::start(
        config,
        demo::scorers(),
        broker as Arc<dyn BrokerClient>,
        log,
        &history,
        shutdown_rx,
    )
    .await?;
    orchestrator.run().await
}

fn check_config(config_path: &str) -> Result<()> {
    let config = load(config_path)?;
    println!("configuration OK");
    println!("  instrument:        {}", config.session.instrument);
    println!(
        "  active window:     {} - {} (close {})",
        config.session.active_start, config.session.eod_closure_time, config.session.close_time
    );
    println!("  min signal score:  {}", config.risk.min_signal_score);
    println!("  max daily trades:  {}", config.risk.max_daily_trades);
    println!("  daily loss limit:  {}%", config.risk.daily_loss_limit_pct);
    println!("  max position size: {}%", config.risk.max_position_pct);
    println!("  dry run:           {}", config.execution.dry_run);
    Ok(())
}

fn load(config_path: &str) -> Result<AppConfig> {
    let config = ConfigLoader::load(config_path)?;
    config.validate()?;
    Ok(config)
}
