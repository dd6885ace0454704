use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::api::{Broker, MarketData};
use crate::config::{TraderConfig, MAX_LOOKBACK_DAYS};
use crate::error::BotError;
use crate::models::{FvgZone, OrderSide, OrderStatus, PendingClose, Trade};
use crate::persistence::TradeStore;
use crate::risk::{ExitDecision, ExitReason, RiskParams};
use crate::strategy::PatternDetector;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    NoPosition,
    Opening,
    Monitoring,
    /// Closing sell accepted, waiting for the fill
    Closing,
    ClosedProfit,
    ClosedLoss,
    ClosedBreakEven,
    ClosedByBroker,
}

impl PositionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionState::ClosedProfit
                | PositionState::ClosedLoss
                | PositionState::ClosedBreakEven
                | PositionState::ClosedByBroker
        )
    }

    fn closed_by(reason: ExitReason) -> Self {
        match reason {
            ExitReason::ExcessLoss | ExitReason::StopLoss => PositionState::ClosedLoss,
            ExitReason::BreakEvenStop => PositionState::ClosedBreakEven,
            ExitReason::TakeProfit => PositionState::ClosedProfit,
        }
    }
}

/// Remote services and store shared by every position manager
#[derive(Clone)]
pub struct TradingServices {
    pub market: Arc<dyn MarketData>,
    pub broker: Arc<dyn Broker>,
    pub store: Arc<dyn TradeStore>,
    pub detector: Arc<dyn PatternDetector>,
}

/// Lifecycle state machine for one symbol's trade.
///
/// The manager is the only writer of its symbol's record in the trade
/// store. Every transition is persisted before the in-memory trade is
/// updated, so a restart always resumes from the last committed state.
pub struct PositionManager {
    symbol: String,
    risk: RiskParams,
    timeframe: String,
    bar_limit: u32,
    lookback: chrono::Duration,
    poll_interval: Duration,
    services: TradingServices,
    cancel: CancellationToken,
    state: PositionState,
    trade: Option<Trade>,
}

impl PositionManager {
    pub fn new(
        symbol: impl Into<String>,
        config: &TraderConfig,
        services: TradingServices,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            risk: config.risk_params(),
            timeframe: config.timeframe.clone(),
            bar_limit: config.limit,
            lookback: chrono::Duration::try_days(config.lookback_days.clamp(1, MAX_LOOKBACK_DAYS))
                .unwrap_or_else(|| chrono::Duration::days(1)),
            poll_interval: config.poll_interval(),
            services,
            cancel,
            state: PositionState::NoPosition,
            trade: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    /// Trade currently tracked (mirrors the committed store record)
    pub fn trade(&self) -> Option<&Trade> {
        self.trade.as_ref()
    }

    /// Run the full lifecycle: resume or detect, open, then monitor until a
    /// terminal state, a remote error, or cancellation.
    ///
    /// `qty` is the size to buy if a new entry is found; `None` means no
    /// capital could be allocated, so only a stored trade can be managed.
    /// Only persistence failures are returned as errors.
    pub async fn run(mut self, qty: Option<f64>) -> Result<PositionState> {
        if !self.resume().await? {
            let zone = match self.detect_entry().await {
                Ok(Some(zone)) => zone,
                Ok(None) => {
                    tracing::info!(symbol = %self.symbol, "No fair value gap found");
                    return Ok(self.state);
                }
                Err(e) => {
                    tracing::warn!(symbol = %self.symbol, "Failed to fetch bars: {}", e);
                    return Ok(self.state);
                }
            };

            match qty {
                Some(qty) => self.open(zone, qty).await?,
                None => {
                    tracing::warn!(
                        symbol = %self.symbol,
                        "FVG found at {:.4} but no quantity allocated, skipping",
                        zone.lower_bound
                    );
                    return Ok(self.state);
                }
            };

            if self.state != PositionState::Monitoring {
                return Ok(self.state);
            }
        }

        self.monitor().await
    }

    /// Load a stored trade for this symbol. Returns true if one was found.
    pub async fn resume(&mut self) -> Result<bool> {
        let Some(trade) = self.services.store.load(&self.symbol).await? else {
            return Ok(false);
        };

        self.state = if trade.pending_close.is_some() {
            PositionState::Closing
        } else {
            PositionState::Monitoring
        };

        tracing::info!(
            symbol = %self.symbol,
            order_id = %trade.order_id,
            entry = trade.entry_price,
            stop_loss = trade.stop_loss,
            state = ?self.state,
            "Resuming stored trade"
        );

        self.trade = Some(trade);
        Ok(true)
    }

    /// Fetch the lookback window of bars and scan it for an entry zone
    pub async fn detect_entry(&self) -> Result<Option<FvgZone>> {
        let end = Utc::now();
        let start = end
            .checked_sub_signed(self.lookback)
            .ok_or_else(|| BotError::Config(format!("lookback {} out of range", self.lookback)))?;
        let bars = self
            .services
            .market
            .get_bars(&self.symbol, &self.timeframe, start, end, self.bar_limit)
            .await?;

        tracing::debug!(
            symbol = %self.symbol,
            bars = bars.len(),
            detector = self.services.detector.name(),
            "Scanning bars"
        );

        if bars.len() < self.services.detector.min_bars_required() {
            tracing::debug!(symbol = %self.symbol, bars = bars.len(), "Not enough bars to scan");
            return Ok(None);
        }

        Ok(self.services.detector.detect(&bars))
    }

    /// Submit the entry order for `zone` and persist the new trade.
    ///
    /// A refused order leaves the manager in `NoPosition` without retrying.
    pub async fn open(&mut self, zone: FvgZone, qty: f64) -> Result<PositionState> {
        if self.trade.is_some() {
            tracing::warn!(symbol = %self.symbol, "Trade already open, ignoring new entry");
            return Ok(self.state);
        }
        if !(qty > 0.0) || !qty.is_finite() {
            tracing::warn!(symbol = %self.symbol, qty = qty, "Invalid quantity, not opening");
            self.state = PositionState::NoPosition;
            return Ok(self.state);
        }

        self.state = PositionState::Opening;

        let entry_price = zone.lower_bound;
        let (stop_loss, take_profit) = self.risk.initial_levels(entry_price);

        tracing::info!(
            "Placing order for {}: Entry={:.4}, Stop-Loss={:.4}, Take-Profit={:.4}, QTY={}",
            self.symbol,
            entry_price,
            stop_loss,
            take_profit,
            qty
        );

        let order_id = match self
            .services
            .broker
            .submit_market_order(&self.symbol, qty, OrderSide::Buy)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(symbol = %self.symbol, "Error placing trade: {}", e);
                self.state = PositionState::NoPosition;
                return Ok(self.state);
            }
        };

        let trade = Trade {
            entry_price,
            stop_loss,
            take_profit,
            qty,
            order_id,
            opened_at: Utc::now(),
            pending_close: None,
        };

        // The buy is live at the broker from here on; failing to record it is fatal
        self.services.store.save(&self.symbol, &trade).await?;
        self.trade = Some(trade);
        self.state = PositionState::Monitoring;

        tracing::info!(symbol = %self.symbol, "Trade placed");
        Ok(self.state)
    }

    /// Poll until a terminal state. Remote and order errors stop the loop
    /// with the trade left in the store; persistence errors propagate.
    pub async fn monitor(&mut self) -> Result<PositionState> {
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(symbol = %self.symbol, "Shutdown requested, trade left in store");
                return Ok(self.state);
            }

            match self.poll_once().await {
                Ok(state) if state.is_terminal() => return Ok(state),
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(
                        symbol = %self.symbol,
                        "Error managing trade, leaving it open for the next run: {}",
                        e
                    );
                    return Ok(self.state);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(symbol = %self.symbol, "Shutdown requested, trade left in store");
                    return Ok(self.state);
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    tracing::debug!(symbol = %self.symbol, "Processing");
                }
            }
        }
    }

    /// One monitoring step. Calling it again after a terminal state is a no-op.
    pub async fn poll_once(&mut self) -> Result<PositionState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        let Some(trade) = self.trade.clone() else {
            return Ok(self.state);
        };

        if let Some(pending) = trade.pending_close.clone() {
            return self.confirm_close(trade, pending).await;
        }

        let status = self.services.broker.get_order_status(&trade.order_id).await?;
        match status {
            OrderStatus::Filled => {}
            status if status.is_dead() => {
                tracing::warn!(
                    "Order {} for {} was {}. Removing trade.",
                    trade.order_id,
                    self.symbol,
                    status
                );
                self.services.store.delete(&self.symbol).await?;
                self.trade = None;
                self.state = PositionState::ClosedByBroker;
                return Ok(self.state);
            }
            status => {
                tracing::debug!(symbol = %self.symbol, status = %status, "Entry order not filled yet");
                return Ok(self.state);
            }
        }

        let current_price = self.services.market.get_last_price(&self.symbol).await?;

        match self.risk.evaluate(&trade, current_price) {
            ExitDecision::Close(reason) => self.close(trade, reason, current_price).await,
            ExitDecision::MoveStopToBreakEven => {
                let mut updated = trade;
                if self.risk.apply_break_even(&mut updated) {
                    self.services.store.save(&self.symbol, &updated).await?;
                    tracing::info!(
                        symbol = %self.symbol,
                        price = current_price,
                        "Moved stop to break-even at {:.4}",
                        updated.stop_loss
                    );
                    self.trade = Some(updated);
                }
                Ok(self.state)
            }
            ExitDecision::Hold => {
                tracing::debug!(
                    symbol = %self.symbol,
                    price = current_price,
                    pnl = trade.unrealized_pnl(current_price),
                    "Holding"
                );
                Ok(self.state)
            }
        }
    }

    /// Submit the closing sell and record it as pending before confirming
    async fn close(
        &mut self,
        trade: Trade,
        reason: ExitReason,
        current_price: f64,
    ) -> Result<PositionState> {
        if reason == ExitReason::ExcessLoss {
            let loss = (trade.entry_price - current_price) * trade.qty;
            tracing::warn!(
                "Loss exceeded for {}: Current Loss={:.4}, Max Loss={:.4}. Closing position.",
                self.symbol,
                loss,
                self.risk.max_loss(&trade)
            );
        } else {
            tracing::info!(
                symbol = %self.symbol,
                price = current_price,
                reason = ?reason,
                "Exit triggered, closing position"
            );
        }

        // A failed sell leaves the stored trade untouched: the position is still live
        let sell_id = self
            .services
            .broker
            .submit_market_order(&self.symbol, trade.qty, OrderSide::Sell)
            .await?;

        let pending = PendingClose {
            order_id: sell_id,
            reason,
        };
        let mut closing = trade;
        closing.pending_close = Some(pending.clone());

        if let Err(e) = self.services.store.save(&self.symbol, &closing).await {
            tracing::error!(
                symbol = %self.symbol,
                order_id = %pending.order_id,
                reason = ?reason,
                "Sell order accepted but not recorded, reconcile with the broker before restarting: {}",
                e
            );
            return Err(e);
        }
        self.trade = Some(closing.clone());
        self.state = PositionState::Closing;

        self.confirm_close(closing, pending).await
    }

    /// Check the closing sell; clear the record only once it is filled
    async fn confirm_close(&mut self, trade: Trade, pending: PendingClose) -> Result<PositionState> {
        let status = self.services.broker.get_order_status(&pending.order_id).await?;

        match status {
            OrderStatus::Filled => {
                self.services.store.delete(&self.symbol).await?;
                self.trade = None;
                self.state = PositionState::closed_by(pending.reason);
                tracing::info!(
                    symbol = %self.symbol,
                    reason = ?pending.reason,
                    state = ?self.state,
                    "Position closed, trade removed"
                );
            }
            status if status.is_dead() => {
                tracing::warn!(
                    symbol = %self.symbol,
                    order_id = %pending.order_id,
                    "Closing order was {}, position still open",
                    status
                );
                let mut reopened = trade;
                reopened.pending_close = None;
                self.services.store.save(&self.symbol, &reopened).await?;
                self.trade = Some(reopened);
                self.state = PositionState::Monitoring;
            }
            status => {
                tracing::debug!(
                    symbol = %self.symbol,
                    status = %status,
                    "Waiting for closing order to fill"
                );
                self.state = PositionState::Closing;
            }
        }

        Ok(self.state)
    }
}

impl std::fmt::Debug for PositionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionManager")
            .field("symbol", &self.symbol)
            .field("state", &self.state)
            .field("trade", &self.trade)
            .finish()
    }
}
