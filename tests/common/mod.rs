#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fvgbot::api::{Broker, MarketData};
use fvgbot::execution::TradingServices;
use fvgbot::models::{Bar, OrderSide, OrderStatus, Trade};
use fvgbot::persistence::{MemoryTradeStore, TradeStore};
use fvgbot::strategy::FvgDetector;
use fvgbot::{BotError, Result, TraderConfig};

pub fn test_config(symbols: &[&str]) -> TraderConfig {
    let symbols = symbols
        .iter()
        .map(|s| format!("\"{}\"", s))
        .collect::<Vec<_>>()
        .join(",");
    let json = format!(
        r#"{{
            "api_key": "key",
            "api_secret": "secret",
            "symbols": [{symbols}],
            "max_drawdown_pct": 2.0,
            "break_even_trigger_pct": 1.0,
            "take_profit_ratio_pct": 3.0,
            "poll_interval_secs": 60
        }}"#
    );
    TraderConfig::from_json_str(&json).unwrap()
}

/// Three bars whose first high sits below the third low, giving a zone starting at `entry`
pub fn fvg_bars(entry: f64) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let ranges = [
        (entry * 0.99, entry),
        (entry, entry * 1.03),
        (entry * 1.02, entry * 1.04),
    ];
    ranges
        .iter()
        .enumerate()
        .map(|(i, &(low, high))| bar(start + Duration::hours(i as i64), low, high))
        .collect()
}

/// Overlapping bars with no gap
pub fn flat_bars() -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..5)
        .map(|i| bar(start + Duration::hours(i), 99.0, 101.0))
        .collect()
}

fn bar(timestamp: DateTime<Utc>, low: f64, high: f64) -> Bar {
    Bar {
        timestamp,
        open: low,
        high,
        low,
        close: high,
        volume: 10.0,
        volume_weighted_avg: (low + high) / 2.0,
    }
}

pub fn stored_trade(entry: f64, qty: f64, order_id: &str) -> Trade {
    Trade {
        entry_price: entry,
        stop_loss: entry * (1.0 - 0.02),
        take_profit: entry * (1.0 + 0.03),
        qty,
        order_id: order_id.to_string(),
        opened_at: Utc::now(),
        pending_close: None,
    }
}

// ============== Market data ==============

/// Scripted bars and prices. Prices are consumed in order; the last one repeats.
#[derive(Default)]
pub struct FakeMarket {
    bars: Mutex<HashMap<String, Vec<Bar>>>,
    prices: Mutex<HashMap<String, VecDeque<f64>>>,
    pub price_calls: AtomicUsize,
}

impl FakeMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.lock().unwrap().insert(symbol.to_string(), bars);
        self
    }

    pub fn with_prices(self, symbol: &str, prices: &[f64]) -> Self {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_string(), prices.iter().copied().collect());
        self
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn get_bars(
        &self,
        symbol: &str,
        _timeframe: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _limit: u32,
    ) -> Result<Vec<Bar>> {
        self.bars
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| BotError::Remote(format!("symbol {} not found", symbol)))
    }

    async fn get_last_price(&self, symbol: &str) -> Result<f64> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        let mut prices = self.prices.lock().unwrap();
        let queue = prices
            .get_mut(symbol)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| BotError::Remote(format!("no quote for {}", symbol)))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue[0])
        }
    }
}

// ============== Broker ==============

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    pub id: String,
    pub symbol: String,
    pub qty: f64,
    pub side: OrderSide,
}

/// Records submitted orders. Ids are `<side>-<n>` with one counter across sides.
/// Order statuses follow a script per id (last entry repeats), defaulting to filled.
pub struct FakeBroker {
    cash: Mutex<Option<f64>>,
    next_id: AtomicUsize,
    orders: Mutex<Vec<SubmittedOrder>>,
    statuses: Mutex<HashMap<String, VecDeque<OrderStatus>>>,
    failing_sides: Mutex<HashSet<OrderSide>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self {
            cash: Mutex::new(Some(10_000.0)),
            next_id: AtomicUsize::new(1),
            orders: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            failing_sides: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_cash(self, cash: Option<f64>) -> Self {
        *self.cash.lock().unwrap() = cash;
        self
    }

    pub fn script_status(&self, order_id: &str, statuses: Vec<OrderStatus>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(order_id.to_string(), statuses.into());
    }

    pub fn fail_orders(&self, side: OrderSide) {
        self.failing_sides.lock().unwrap().insert(side);
    }

    pub fn allow_orders(&self, side: OrderSide) {
        self.failing_sides.lock().unwrap().remove(&side);
    }

    pub fn orders(&self) -> Vec<SubmittedOrder> {
        self.orders.lock().unwrap().clone()
    }

    pub fn orders_on(&self, side: OrderSide) -> Vec<SubmittedOrder> {
        self.orders()
            .into_iter()
            .filter(|o| o.side == side)
            .collect()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn submit_market_order(&self, symbol: &str, qty: f64, side: OrderSide) -> Result<String> {
        if self.failing_sides.lock().unwrap().contains(&side) {
            return Err(BotError::Order(format!("{} order refused", side)));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("{}-{}", side, n);
        self.orders.lock().unwrap().push(SubmittedOrder {
            id: id.clone(),
            symbol: symbol.to_string(),
            qty,
            side,
        });
        Ok(id)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus> {
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.get_mut(order_id) {
            Some(queue) if queue.len() > 1 => Ok(queue.pop_front().unwrap()),
            Some(queue) if !queue.is_empty() => Ok(queue[0].clone()),
            _ => Ok(OrderStatus::Filled),
        }
    }

    async fn get_account_cash(&self) -> Result<f64> {
        self.cash
            .lock()
            .unwrap()
            .ok_or_else(|| BotError::Remote("account unavailable".into()))
    }
}

// ============== Store ==============

/// Memory store that counts writes and can be told to fail saves
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryTradeStore,
    pub saves: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_saves: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Seed a trade as if left behind by an earlier run; not counted
    pub async fn inner_save(&self, symbol: &str, trade: &Trade) {
        self.inner.save(symbol, trade).await.unwrap();
    }
}

#[async_trait]
impl TradeStore for CountingStore {
    async fn load(&self, symbol: &str) -> Result<Option<Trade>> {
        self.inner.load(symbol).await
    }

    async fn save(&self, symbol: &str, trade: &Trade) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(BotError::Persistence("disk full".into()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(symbol, trade).await
    }

    async fn delete(&self, symbol: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(symbol).await
    }
}

pub struct Harness {
    pub market: Arc<FakeMarket>,
    pub broker: Arc<FakeBroker>,
    pub store: Arc<CountingStore>,
}

impl Harness {
    pub fn new(market: FakeMarket, broker: FakeBroker) -> Self {
        Self {
            market: Arc::new(market),
            broker: Arc::new(broker),
            store: Arc::new(CountingStore::new()),
        }
    }

    pub fn services(&self) -> TradingServices {
        TradingServices {
            market: self.market.clone(),
            broker: self.broker.clone(),
            store: self.store.clone(),
            detector: Arc::new(FvgDetector),
        }
    }
}
