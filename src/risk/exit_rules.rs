use serde::{Deserialize, Serialize};

use crate::models::Trade;

/// Risk thresholds, all expressed as fractions of the entry price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    pub max_drawdown: f64,
    pub take_profit: f64,
    pub break_even_trigger: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Unrealized loss exceeded the nominal maximum (slippage past the stop)
    ExcessLoss,
    StopLoss,
    /// Stop hit after it was ratcheted to entry
    BreakEvenStop,
    TakeProfit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitDecision {
    Close(ExitReason),
    MoveStopToBreakEven,
    Hold,
}

impl RiskParams {
    /// Stop-loss and take-profit levels for a fresh entry
    pub fn initial_levels(&self, entry_price: f64) -> (f64, f64) {
        let stop_loss = entry_price * (1.0 - self.max_drawdown);
        let take_profit = entry_price * (1.0 + self.take_profit);
        (stop_loss, take_profit)
    }

    /// Largest loss tolerated on the whole position
    pub fn max_loss(&self, trade: &Trade) -> f64 {
        trade.entry_price * self.max_drawdown * trade.qty
    }

    /// Evaluate exit rules for a filled trade at `current_price`.
    ///
    /// Rules are checked in priority order and the first match wins:
    /// excess loss, stop loss, take profit, then the break-even ratchet.
    pub fn evaluate(&self, trade: &Trade, current_price: f64) -> ExitDecision {
        let loss = (trade.entry_price - current_price) * trade.qty;
        if loss > self.max_loss(trade) {
            return ExitDecision::Close(ExitReason::ExcessLoss);
        }

        if current_price <= trade.stop_loss {
            let reason = if trade.at_break_even() {
                ExitReason::BreakEvenStop
            } else {
                ExitReason::StopLoss
            };
            return ExitDecision::Close(reason);
        }

        if current_price >= trade.take_profit {
            return ExitDecision::Close(ExitReason::TakeProfit);
        }

        let trigger = trade.entry_price * (1.0 + self.break_even_trigger);
        if current_price >= trigger && !trade.at_break_even() {
            return ExitDecision::MoveStopToBreakEven;
        }

        ExitDecision::Hold
    }

    /// Raise the stop to the entry price. Returns true if the stop moved.
    ///
    /// Never lowers a stop that is already at or above entry.
    pub fn apply_break_even(&self, trade: &mut Trade) -> bool {
        if trade.stop_loss >= trade.entry_price {
            return false;
        }
        trade.stop_loss = trade.entry_price;
        true
    }
}
