pub mod alpaca_broker;
pub mod alpaca_data;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::models::{Bar, OrderSide, OrderStatus};
use crate::Result;

pub use alpaca_broker::AlpacaBrokerClient;
pub use alpaca_data::AlpacaMarketDataClient;

// Type alias for the rate limiter to simplify signatures
pub(crate) type ApiRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub(crate) fn rate_limiter(per_minute: u32) -> Arc<ApiRateLimiter> {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)))
}

/// API key pair sent on every Alpaca request
#[derive(Clone)]
pub struct AlpacaCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for AlpacaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .finish()
    }
}

/// Historical bars and latest quotes
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Bars for `symbol` in `[start, end]`, ascending by timestamp
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Bar>>;

    /// Latest ask price
    async fn get_last_price(&self, symbol: &str) -> Result<f64>;
}

/// Order submission and account queries
#[async_trait]
pub trait Broker: Send + Sync {
    /// Submit a market order, returning the broker-assigned order id
    async fn submit_market_order(&self, symbol: &str, qty: f64, side: OrderSide) -> Result<String>;

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus>;

    /// Cash available for trading
    async fn get_account_cash(&self) -> Result<f64>;
}
