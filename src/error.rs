use thiserror::Error;

/// Errors surfaced by the trading agent.
///
/// Each variant maps to a different recovery decision: remote failures skip
/// the current attempt, order failures abandon the entry, persistence
/// failures stop the affected worker.
#[derive(Debug, Error)]
pub enum BotError {
    /// Market-data or broker I/O failure, timeout, or malformed payload
    #[error("remote error: {0}")]
    Remote(String),

    /// Order submission was refused or could not be sent
    #[error("order error: {0}")]
    Order(String),

    /// Trade store read or write failure
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A worker was already started for this symbol
    #[error("symbol {0} already has an active worker")]
    DuplicateSymbol(String),

    /// A per-symbol worker task panicked or was aborted
    #[error("worker failed: {0}")]
    Worker(String),
}

impl BotError {
    /// Stored trade state may have diverged from the broker.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BotError::Persistence(_) | BotError::Worker(_))
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BotError::Remote(format!("request timed out: {}", err))
        } else {
            BotError::Remote(err.to_string())
        }
    }
}

impl From<config::ConfigError> for BotError {
    fn from(err: config::ConfigError) -> Self {
        BotError::Config(err.to_string())
    }
}
