use anyhow::Context;
use clap::Parser;
use fvgbot::api::{AlpacaBrokerClient, AlpacaMarketDataClient};
use fvgbot::execution::{Trader, TradingServices};
use fvgbot::persistence::JsonTradeStore;
use fvgbot::strategy::FvgDetector;
use fvgbot::TraderConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fair value gap trader")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Trade only these symbols (repeatable), overriding the configured list
    #[arg(short, long = "symbol")]
    symbols: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();

    let mut config = TraderConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if !args.symbols.is_empty() {
        config.symbols = args.symbols;
        config.validate()?;
    }

    tracing::info!("🚀 FVG trader starting");
    tracing::info!("  Symbols: {}", config.symbols.join(", "));
    tracing::info!("  Timeframe: {}", config.timeframe);
    tracing::info!("  Max Drawdown: {}%", config.max_drawdown_pct);
    tracing::info!("  Break-even Trigger: {}%", config.break_even_trigger_pct);
    tracing::info!("  Take Profit: {}%", config.take_profit_ratio_pct);
    tracing::info!("  Poll Interval: {}s", config.poll_interval_secs);

    let services = TradingServices {
        market: Arc::new(AlpacaMarketDataClient::new(&config)?),
        broker: Arc::new(AlpacaBrokerClient::new(&config)?),
        store: Arc::new(JsonTradeStore::new(config.trades_dir.clone()).await?),
        detector: Arc::new(FvgDetector),
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("⚠️  Received Ctrl+C, stopping workers at the next poll...");
                cancel.cancel();
            }
        });
    }

    let trader = Trader::new(config, services, cancel);
    let summary = trader.run().await;

    for outcome in &summary.outcomes {
        match &outcome.result {
            Ok(state) => tracing::info!("  {}: {:?}", outcome.symbol, state),
            Err(e) => tracing::error!("  {}: {}", outcome.symbol, e),
        }
    }

    summary.into_result()?;
    tracing::info!("👋 FVG trader stopped");
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fvgbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
