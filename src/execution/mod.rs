// Trade lifecycle and per-symbol orchestration
pub mod position_manager;
pub mod trader;

pub use position_manager::{PositionManager, PositionState, TradingServices};
pub use trader::{trade_quantity, RunSummary, SymbolClaim, SymbolOutcome, SymbolRegistry, Trader};
