// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use config::TraderConfig;
pub use error::BotError;
pub use execution::{PositionManager, PositionState, Trader, TradingServices};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
