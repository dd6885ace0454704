use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::position_manager::{PositionManager, PositionState, TradingServices};
use crate::config::TraderConfig;
use crate::error::BotError;
use crate::Result;

/// Quantity to buy for one symbol under equal-weight allocation.
///
/// `available_balance / symbol_count / risk_divisor` of capital is spent at
/// `last_price`. Returns `None` when any input makes a positive size impossible.
pub fn trade_quantity(
    available_balance: f64,
    symbol_count: usize,
    risk_divisor: f64,
    last_price: f64,
) -> Option<f64> {
    if symbol_count == 0 || !(risk_divisor > 0.0) || !(last_price > 0.0) {
        return None;
    }
    let trade_capital = (available_balance / symbol_count as f64) / risk_divisor;
    let qty = trade_capital / last_price;
    (qty > 0.0 && qty.is_finite()).then_some(qty)
}

/// Tracks which symbols currently have a worker
///
/// Cloneable; all clones share the same set.
#[derive(Clone, Default)]
pub struct SymbolRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

/// Exclusive right to run a worker for one symbol, released on drop
#[derive(Debug)]
pub struct SymbolClaim {
    symbol: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `symbol`, failing if another worker already holds it
    pub fn claim(&self, symbol: &str) -> Result<SymbolClaim> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| BotError::Worker("symbol registry lock poisoned".into()))?;

        if !active.insert(symbol.to_string()) {
            return Err(BotError::DuplicateSymbol(symbol.to_string()));
        }

        Ok(SymbolClaim {
            symbol: symbol.to_string(),
            active: self.active.clone(),
        })
    }

    pub fn is_active(&self, symbol: &str) -> bool {
        self.active
            .lock()
            .map(|a| a.contains(symbol))
            .unwrap_or(false)
    }
}

impl SymbolClaim {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl Drop for SymbolClaim {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.symbol);
        }
    }
}

/// Final result of one symbol's worker
#[derive(Debug)]
pub struct SymbolOutcome {
    pub symbol: String,
    pub result: Result<PositionState>,
}

/// Outcomes of a full run: rejected symbols first, then workers in configuration order
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<SymbolOutcome>,
}

impl RunSummary {
    /// Final state of the worker that ran `symbol`, if it finished cleanly
    pub fn state_of(&self, symbol: &str) -> Option<PositionState> {
        self.outcomes
            .iter()
            .filter(|o| o.symbol == symbol)
            .find_map(|o| o.result.as_ref().ok().copied())
    }

    pub fn failures(&self) -> impl Iterator<Item = &SymbolOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Propagate the first fatal worker error, if any
    pub fn into_result(mut self) -> Result<Self> {
        let fatal = self
            .outcomes
            .iter()
            .position(|o| matches!(&o.result, Err(e) if e.is_fatal()));

        if let Some(index) = fatal {
            if let Err(e) = self.outcomes.swap_remove(index).result {
                return Err(e);
            }
        }
        Ok(self)
    }
}

/// Runs one position manager per configured symbol, concurrently
pub struct Trader {
    config: Arc<TraderConfig>,
    services: TradingServices,
    registry: SymbolRegistry,
    cancel: CancellationToken,
}

impl Trader {
    pub fn new(config: TraderConfig, services: TradingServices, cancel: CancellationToken) -> Self {
        Self {
            config: Arc::new(config),
            services,
            registry: SymbolRegistry::new(),
            cancel,
        }
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    /// Account cash truncated to whole units. `None` if the broker can't be reached.
    async fn available_balance(&self) -> Option<f64> {
        match self.services.broker.get_account_cash().await {
            Ok(cash) => {
                let balance = cash.trunc();
                tracing::info!("Available balance to trade: {}", balance);
                Some(balance)
            }
            Err(e) => {
                tracing::error!("Error fetching balance: {}", e);
                None
            }
        }
    }

    /// Size the next entry for `symbol` from its latest price
    async fn quantity_for(&self, symbol: &str, balance: Option<f64>) -> Option<f64> {
        let balance = balance?;
        let last_price = match self.services.market.get_last_price(symbol).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(symbol = %symbol, "Error fetching last price: {}", e);
                return None;
            }
        };

        let qty = trade_quantity(
            balance,
            self.config.symbols.len(),
            self.config.risk_divisor,
            last_price,
        );
        match qty {
            Some(qty) => tracing::info!(symbol = %symbol, price = last_price, qty = qty, "Allocated quantity"),
            None => tracing::warn!(symbol = %symbol, price = last_price, "No positive quantity, entries disabled"),
        }
        qty
    }

    /// Start every symbol's worker and wait for all of them to finish.
    ///
    /// Per-symbol failures are collected in the summary; call
    /// [`RunSummary::into_result`] to turn fatal ones into an error.
    pub async fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        // All claims are held before the first worker starts
        let mut claims = Vec::new();
        for symbol in &self.config.symbols {
            match self.registry.claim(symbol) {
                Ok(claim) => claims.push(claim),
                Err(e) => {
                    tracing::error!(symbol = %symbol, "Not starting worker: {}", e);
                    summary.outcomes.push(SymbolOutcome {
                        symbol: symbol.clone(),
                        result: Err(e),
                    });
                }
            }
        }

        let balance = self.available_balance().await;
        let mut handles: Vec<(String, JoinHandle<Result<PositionState>>)> = Vec::new();

        for claim in claims {
            let symbol = claim.symbol().to_string();
            let qty = self.quantity_for(&symbol, balance).await;
            let manager = PositionManager::new(
                symbol.clone(),
                &self.config,
                self.services.clone(),
                self.cancel.child_token(),
            );

            let handle = tokio::spawn(async move {
                let _claim = claim;
                manager.run(qty).await
            });
            handles.push((symbol, handle));
        }

        tracing::info!("Started {} symbol workers", handles.len());

        for (symbol, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(BotError::Worker(format!("{} worker task: {}", symbol, e))),
            };

            match &result {
                Ok(state) => tracing::info!(symbol = %symbol, state = ?state, "Worker finished"),
                Err(e) => tracing::error!(symbol = %symbol, "Worker failed: {}", e),
            }

            summary.outcomes.push(SymbolOutcome { symbol, result });
        }

        summary
    }
}
