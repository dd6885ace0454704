use crate::error::BotError;
use crate::risk::RiskParams;
use crate::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BARS_URL: &str = "https://data.alpaca.markets/v1beta3/crypto/us/bars";
const DEFAULT_QUOTES_URL: &str = "https://data.alpaca.markets/v1beta3/crypto/us/latest/quotes";
const DEFAULT_BROKER_URL: &str = "https://paper-api.alpaca.markets";
const ENV_PREFIX: &str = "FVG";

/// Longest bar window accepted for entry detection
pub const MAX_LOOKBACK_DAYS: i64 = 3650;

/// Immutable trader configuration, built once at startup and shared by reference.
///
/// Percent fields are expressed in percent (`2.0` means 2%), as written in
/// `config.json`. Use [`TraderConfig::risk_params`] to get
/// the fractions the state machine works with.
#[derive(Debug, Clone, Deserialize)]
pub struct TraderConfig {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_bars_url")]
    pub bars_url: String,
    #[serde(default = "default_quotes_url")]
    pub quotes_url: String,
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    pub symbols: Vec<String>,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    pub max_drawdown_pct: f64,
    pub break_even_trigger_pct: f64,
    pub take_profit_ratio_pct: f64,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Fraction of the per-symbol allocation risked per trade is `1 / risk_divisor`
    #[serde(default = "default_risk_divisor")]
    pub risk_divisor: f64,
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_trades_dir")]
    pub trades_dir: PathBuf,
}

fn default_bars_url() -> String {
    DEFAULT_BARS_URL.to_string()
}

fn default_quotes_url() -> String {
    DEFAULT_QUOTES_URL.to_string()
}

fn default_broker_url() -> String {
    DEFAULT_BROKER_URL.to_string()
}

fn default_timeframe() -> String {
    "1Hour".to_string()
}

fn default_limit() -> u32 {
    1000
}

fn default_lookback_days() -> i64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    600
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_risk_divisor() -> f64 {
    5.0
}

fn default_rate_limit_per_minute() -> u32 {
    200
}

fn default_trades_dir() -> PathBuf {
    PathBuf::from(".")
}

impl TraderConfig {
    /// Load configuration from a JSON file, overlaid by `FVG_*` environment variables
    /// (e.g. `FVG_API_KEY`, `FVG_POLL_INTERVAL_SECS`, `FVG_SYMBOLS=BTC/USD,ETH/USD`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("symbols"),
            )
            .build()?;

        let cfg: TraderConfig = settings.try_deserialize()?;
        cfg.validate()?;

        tracing::info!(
            path = %path.display(),
            symbols = cfg.symbols.len(),
            timeframe = %cfg.timeframe,
            "Loaded trader configuration"
        );

        Ok(cfg)
    }

    /// Parse configuration from an in-memory JSON document (no environment overlay)
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(json, config::FileFormat::Json))
            .build()?;
        let cfg: TraderConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(BotError::Config("at least one symbol is required".into()));
        }
        if self.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(BotError::Config("symbols must not be blank".into()));
        }
        for (name, value) in [
            ("max_drawdown_pct", self.max_drawdown_pct),
            ("break_even_trigger_pct", self.break_even_trigger_pct),
            ("take_profit_ratio_pct", self.take_profit_ratio_pct),
        ] {
            if !(value > 0.0 && value < 100.0) {
                return Err(BotError::Config(format!(
                    "{} must be between 0 and 100 (exclusive), got {}",
                    name, value
                )));
            }
        }
        if !(self.risk_divisor > 0.0) {
            return Err(BotError::Config("risk_divisor must be positive".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(BotError::Config("poll_interval_secs must be positive".into()));
        }
        if self.limit == 0 {
            return Err(BotError::Config("limit must be positive".into()));
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.lookback_days) {
            return Err(BotError::Config(format!(
                "lookback_days must be between 1 and {}, got {}",
                MAX_LOOKBACK_DAYS, self.lookback_days
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(BotError::Config("request_timeout_secs must be positive".into()));
        }
        if self.rate_limit_per_minute == 0 {
            return Err(BotError::Config("rate_limit_per_minute must be positive".into()));
        }
        Ok(())
    }

    /// Risk thresholds as fractions
    pub fn risk_params(&self) -> RiskParams {
        RiskParams {
            max_drawdown: self.max_drawdown_pct / 100.0,
            take_profit: self.take_profit_ratio_pct / 100.0,
            break_even_trigger: self.break_even_trigger_pct / 100.0,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
