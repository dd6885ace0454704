use chrono::{Duration, Utc};
use clap::Parser;
use fvgbot::api::{AlpacaMarketDataClient, MarketData};
use fvgbot::config::MAX_LOOKBACK_DAYS;
use fvgbot::strategy::detect_fvg;
use fvgbot::{BotError, Result, TraderConfig};
use std::path::PathBuf;

/// Fetch recent bars for one symbol and show any fair value gap in them
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "BTC/USD")]
    symbol: String,

    #[arg(short, long, default_value = "1Day")]
    timeframe: String,

    /// How many days back to fetch
    #[arg(short, long, default_value_t = 7)]
    days: i64,

    #[arg(short, long, default_value_t = 1000)]
    limit: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("fvgbot=warn")
        .init();

    let args = Args::parse();
    if !(1..=MAX_LOOKBACK_DAYS).contains(&args.days) {
        return Err(BotError::Config(format!(
            "--days must be between 1 and {}",
            MAX_LOOKBACK_DAYS
        )));
    }

    let config = TraderConfig::load(&args.config)?;
    let market = AlpacaMarketDataClient::new(&config)?;

    let end = Utc::now();
    let start = end - Duration::days(args.days);
    let bars = market
        .get_bars(&args.symbol, &args.timeframe, start, end, args.limit)
        .await?;

    println!("\nHistorical Data for {} ({}):\n", args.symbol, args.timeframe);
    println!(
        "{:<22} {:>14} {:>14} {:>14} {:>14} {:>16}",
        "time", "open", "high", "low", "close", "volume"
    );
    for bar in &bars {
        println!(
            "{:<22} {:>14.4} {:>14.4} {:>14.4} {:>14.4} {:>16.4}",
            bar.timestamp.format("%Y-%m-%d %H:%M"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        );
    }
    println!("\n{} bars", bars.len());

    match detect_fvg(&bars) {
        Some(zone) => println!(
            "First FVG: {:.4} - {:.4}",
            zone.lower_bound, zone.upper_bound
        ),
        None => println!("No FVG in this window"),
    }

    Ok(())
}
