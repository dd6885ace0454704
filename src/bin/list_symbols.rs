use clap::Parser;
use fvgbot::api::AlpacaBrokerClient;
use fvgbot::{Result, TraderConfig};
use std::path::PathBuf;

/// Print the crypto symbols the broker supports, ready to paste into `symbols`
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Include inactive and non-tradable assets
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("fvgbot=warn")
        .init();

    let args = Args::parse();
    let config = TraderConfig::load(&args.config)?;
    let broker = AlpacaBrokerClient::new(&config)?;

    let assets = broker.list_crypto_assets().await?;
    let listed: Vec<_> = assets
        .iter()
        .filter(|a| args.all || (a.tradable && a.is_active()))
        .collect();

    println!("\nSupported Crypto Symbols ({}):\n", listed.len());
    for asset in listed {
        if args.all {
            println!("\"{}\",  // {} [{}]", asset.symbol, asset.name, asset.status);
        } else {
            println!("\"{}\",", asset.symbol);
        }
    }

    Ok(())
}
