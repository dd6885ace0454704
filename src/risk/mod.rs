// Risk rules for open trades
pub mod exit_rules;

pub use exit_rules::{ExitDecision, ExitReason, RiskParams};
