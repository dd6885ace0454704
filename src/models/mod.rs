use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::risk::ExitReason;

/// OHLCV bar as returned by the market-data service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
    #[serde(rename = "vw", default)]
    pub volume_weighted_avg: f64,
}

/// Unfilled price range left by a bullish fair value gap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FvgZone {
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker-side order status, reduced to the cases the lifecycle cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    Filled,
    Canceled,
    Rejected,
    Other(String),
}

impl OrderStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "new" => OrderStatus::New,
            "filled" => OrderStatus::Filled,
            "canceled" => OrderStatus::Canceled,
            "rejected" => OrderStatus::Rejected,
            other => OrderStatus::Other(other.to_string()),
        }
    }

    /// The order will never fill
    pub fn is_dead(&self) -> bool {
        matches!(self, OrderStatus::Canceled | OrderStatus::Rejected)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::New => f.write_str("new"),
            OrderStatus::Filled => f.write_str("filled"),
            OrderStatus::Canceled => f.write_str("canceled"),
            OrderStatus::Rejected => f.write_str("rejected"),
            OrderStatus::Other(s) => f.write_str(s),
        }
    }
}

/// Tradable instrument as listed by the broker
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Asset {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "class", default)]
    pub asset_class: String,
    pub status: String,
    pub tradable: bool,
}

impl Asset {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Closing sell accepted by the broker but not yet confirmed filled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingClose {
    pub order_id: String,
    pub reason: ExitReason,
}

/// Open trade for a single symbol
///
/// At most one exists per symbol. `stop_loss` is the only price level that
/// changes after creation, and it only moves up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub qty: f64,
    pub order_id: String,
    #[serde(default = "Utc::now")]
    pub opened_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_close: Option<PendingClose>,
}

impl Trade {
    /// Unrealized P&L at `current_price` (negative when losing)
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) * self.qty
    }

    /// Stop has been ratcheted to entry
    pub fn at_break_even(&self) -> bool {
        self.stop_loss >= self.entry_price
    }
}
